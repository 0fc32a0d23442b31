//! Snapshot bootstrap mechanism (C3/C7 supplement): lets a late joiner
//! converge without replaying the full action history, and lets a
//! long-running peer truncate its log once every other peer has had a
//! chance to observe the pre-truncation state.

use crate::data_store::DataStoreEffects;
use crate::errors::Result;
use crate::identifiers::Name;
use crate::tree::SyncTree;
use crate::wire::{CreatorCursor, SnapshotAnnouncement};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Builds a [`SnapshotAnnouncement`] from the current tree state and the
/// data store's enumeration, stamped with an identity `(snapshot_creator,
/// snapshot_seq)` that dedup logic on the receiving side can recognize and
/// ignore if already processed.
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Build the announcement a `remove_actions` pass would publish: the
    /// data store's full enumeration (spec §4.5's `(dataName, status)`
    /// pairs) plus every creator's current cursor, identified by the local
    /// creator's own next sequence number (the snapshot is itself
    /// logically an action this creator originates).
    pub async fn build<D: DataStoreEffects + ?Sized>(
        tree: &SyncTree,
        data_store: &D,
        snapshot_creator: &Name,
        snapshot_seq: u64,
    ) -> Result<SnapshotAnnouncement> {
        let items = data_store.enumerate().await?;
        let cursors = tree
            .iter()
            .map(|(creator, node)| CreatorCursor {
                creator: creator.clone(),
                last: node.last,
            })
            .collect();
        Ok(SnapshotAnnouncement {
            snapshot_creator: snapshot_creator.clone(),
            snapshot_seq,
            items,
            cursors,
        })
    }
}

/// Deduplicates snapshot announcements by `(snapshot_creator,
/// snapshot_seq)` identity so a peer that sees the same snapshot relayed
/// by two different paths applies it only once, per the design resolution
/// recorded for this open question in DESIGN.md.
#[derive(Debug, Default)]
pub struct SnapshotDedup {
    seen: HashMap<(Name, u64), Instant>,
}

impl SnapshotDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `(creator, seq)` as seen at `now`, valid for `lifetime`.
    /// Returns `true` if this is the first time it has been seen (i.e.
    /// the caller should process the snapshot), `false` if it is a
    /// within-lifetime duplicate.
    pub fn observe(&mut self, creator: &Name, seq: u64, now: Instant, lifetime: Duration) -> bool {
        self.expire(now);
        let key = (creator.clone(), seq);
        if self.seen.contains_key(&key) {
            false
        } else {
            self.seen.insert(key, now + lifetime);
            true
        }
    }

    fn expire(&mut self, now: Instant) {
        self.seen.retain(|_, expires_at| *expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionEntry, ActionKind};

    #[tokio::test]
    async fn builder_captures_every_known_creator_and_the_store_enumeration() {
        use crate::testkit::InMemoryDataStore;

        let mut tree = SyncTree::new();
        let action = ActionEntry::new(
            Name::parse("/repo/0"),
            1,
            ActionKind::Insertion,
            Name::parse("/example/data/x"),
            1,
        );
        tree.update(&action);
        let store = InMemoryDataStore::new();
        store.apply(&action).await.unwrap();

        let snap = SnapshotBuilder::build(&tree, &store, &Name::parse("/repo/snapshotter"), 1)
            .await
            .unwrap();
        assert_eq!(snap.cursors.len(), 1);
        assert_eq!(snap.cursors[0].last, 1);
        assert_eq!(snap.items.len(), 1);
        assert_eq!(snap.items[0].0, Name::parse("/example/data/x"));
    }

    #[test]
    fn dedup_rejects_repeat_identity_within_lifetime() {
        let mut dedup = SnapshotDedup::new();
        let now = Instant::now();
        let creator = Name::parse("/repo/snapshotter");
        assert!(dedup.observe(&creator, 1, now, Duration::from_secs(10)));
        assert!(!dedup.observe(&creator, 1, now, Duration::from_secs(10)));
    }

    #[test]
    fn dedup_allows_identity_again_after_expiry() {
        let mut dedup = SnapshotDedup::new();
        let now = Instant::now();
        let creator = Name::parse("/repo/snapshotter");
        assert!(dedup.observe(&creator, 1, now, Duration::from_millis(1)));
        let later = now + Duration::from_millis(5);
        assert!(dedup.observe(&creator, 1, later, Duration::from_secs(10)));
    }
}
