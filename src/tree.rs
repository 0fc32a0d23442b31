//! The in-memory digest tree (C2): one node per known creator, a root
//! digest that is a pure function of `{(creator, last)}`.

use crate::action::ActionEntry;
use crate::identifiers::{Digest, Name};
use std::collections::BTreeMap;

/// Per-creator node in the digest tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTreeNode {
    /// Last sequence already absorbed into the last snapshot.
    pub first: u64,
    /// Highest sequence applied for this creator.
    pub last: u64,
    /// `SHA-256(creator ∥ last)`.
    pub leaf_digest: Digest,
}

impl SyncTreeNode {
    fn new(creator: &Name, last: u64) -> Self {
        SyncTreeNode {
            first: 0,
            last,
            leaf_digest: leaf_digest(creator, last),
        }
    }
}

fn leaf_digest(creator: &Name, last: u64) -> Digest {
    Digest::of_parts([creator.to_string().as_bytes(), &last.to_le_bytes()])
}

/// In-memory digest tree over `{creator -> (first, last, leafDigest)}`.
///
/// Nodes are kept in a `BTreeMap` keyed by creator name so that root-digest
/// recomputation iterates in a canonical, insertion-order-independent key
/// order — see DESIGN.md for the rationale (open question iii).
#[derive(Debug, Clone, Default)]
pub struct SyncTree {
    nodes: BTreeMap<Name, SyncTreeNode>,
    root: Digest,
}

impl SyncTree {
    /// An empty tree; its root digest is [`Digest::ZERO`] until the first
    /// node is added.
    pub fn new() -> Self {
        SyncTree {
            nodes: BTreeMap::new(),
            root: Digest::ZERO,
        }
    }

    /// Absorb a locally-or-remotely-applied action: create the creator's
    /// node on first sight (`first = 0, last = seq`, requiring `seq == 1`)
    /// or raise `last` to `max(last, seq)`, then recompute the root.
    pub fn update(&mut self, action: &ActionEntry) {
        match self.nodes.get_mut(&action.creator) {
            None => {
                debug_assert_eq!(
                    action.seq, 1,
                    "first-seen creator must start its sequence at 1"
                );
                self.nodes
                    .insert(action.creator.clone(), SyncTreeNode::new(&action.creator, action.seq));
            }
            Some(node) => {
                if action.seq > node.last {
                    node.last = action.seq;
                    node.leaf_digest = leaf_digest(&action.creator, node.last);
                }
            }
        }
        self.recompute_root();
    }

    /// Insert an empty node (`last = 0`) for a creator observed only
    /// through a sync/recovery response, not yet through an applied
    /// action.
    pub fn add_node(&mut self, creator: &Name) {
        self.nodes
            .entry(creator.clone())
            .or_insert_with(|| SyncTreeNode::new(creator, 0));
        self.recompute_root();
    }

    /// Directly set a creator's `last` cursor, used by snapshot and
    /// recovery processing to jump a node forward without replaying every
    /// intermediate action.
    pub fn set_last(&mut self, creator: &Name, last: u64) {
        let node = self
            .nodes
            .entry(creator.clone())
            .or_insert_with(|| SyncTreeNode::new(creator, 0));
        if last > node.last {
            node.last = last;
            node.leaf_digest = leaf_digest(creator, last);
        }
        self.recompute_root();
    }

    /// Restore a node with explicit `first`/`last` cursors, as read back
    /// from a [`crate::store::TreeStore`] at startup. Bypasses the
    /// `update`/`add_node` invariants since the store is assumed to
    /// already hold a consistent snapshot.
    pub fn restore_node(&mut self, creator: &Name, first: u64, last: u64) {
        self.nodes.insert(
            creator.clone(),
            SyncTreeNode {
                first,
                last,
                leaf_digest: leaf_digest(creator, last),
            },
        );
        self.recompute_root();
    }

    /// Mark the snapshot boundary: `first := last` for every node.
    pub fn update_for_snapshot(&mut self) {
        for node in self.nodes.values_mut() {
            node.first = node.last;
        }
    }

    /// Look up a creator's node.
    pub fn lookup(&self, creator: &Name) -> Option<&SyncTreeNode> {
        self.nodes.get(creator)
    }

    /// Iterate nodes in canonical (creator-name) order.
    pub fn iter(&self) -> impl Iterator<Item = (&Name, &SyncTreeNode)> {
        self.nodes.iter()
    }

    /// Current root digest.
    pub fn root_digest(&self) -> Digest {
        self.root
    }

    /// Number of known creators.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no creators.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn recompute_root(&mut self) {
        if self.nodes.is_empty() {
            self.root = Digest::ZERO;
            return;
        }
        self.root = Digest::of_parts(self.nodes.values().map(|n| n.leaf_digest.0.as_slice()));
    }
}
