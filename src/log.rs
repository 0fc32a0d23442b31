//! The append-only per-process record of applied actions (C3).

use crate::action::ActionEntry;
use crate::identifiers::{Digest, Name};
use std::collections::HashMap;

/// Append-only log of `(postDigest, ActionEntry)` pairs, seeded with a
/// sentinel whose post digest is [`Digest::ZERO`] — the root digest of an
/// empty [`crate::tree::SyncTree`] — so the empty state has an addressable
/// digest too.
///
/// The log is the source of truth a fetch-Interest handler serves entries
/// from; [`crate::tree::SyncTree`] is the compact summary derived from it.
/// The post digest of each entry lets an incoming sync Interest be
/// classified against spec §4.7's three-way branch: a digest the log
/// recognizes means the requester is merely behind, not unknown.
#[derive(Debug, Clone)]
pub struct ActionLog {
    entries: Vec<ActionEntry>,
    post_digests: Vec<Digest>,
    /// Index from `(creator, seq)` to position in `entries`, for O(1) fetch
    /// lookups.
    by_creator_seq: HashMap<(Name, u64), usize>,
    /// Index from post digest to position in `entries`, for O(1) sync-digest
    /// recognition.
    by_post_digest: HashMap<Digest, usize>,
}

impl ActionLog {
    /// A fresh log seeded with [`ActionEntry::sentinel`] at [`Digest::ZERO`].
    pub fn new() -> Self {
        let sentinel = ActionEntry::sentinel();
        let mut by_creator_seq = HashMap::new();
        by_creator_seq.insert((sentinel.creator.clone(), sentinel.seq), 0);
        let mut by_post_digest = HashMap::new();
        by_post_digest.insert(Digest::ZERO, 0);
        ActionLog {
            entries: vec![sentinel],
            post_digests: vec![Digest::ZERO],
            by_creator_seq,
            by_post_digest,
        }
    }

    /// Append an entry together with the root digest it produced once
    /// applied, asserting the log's monotonicity invariant: no `(creator,
    /// seq)` pair is ever appended twice.
    pub fn append(&mut self, entry: ActionEntry, post_digest: Digest) {
        let key = (entry.creator.clone(), entry.seq);
        if self.by_creator_seq.contains_key(&key) {
            return;
        }
        let idx = self.entries.len();
        self.by_creator_seq.insert(key, idx);
        self.by_post_digest.insert(post_digest, idx);
        self.post_digests.push(post_digest);
        self.entries.push(entry);
    }

    /// Look up a previously-applied action by its originating creator and
    /// sequence number, the lookup a fetch-Interest handler performs.
    pub fn lookup(&self, creator: &Name, seq: u64) -> Option<&ActionEntry> {
        self.by_creator_seq
            .get(&(creator.clone(), seq))
            .map(|&idx| &self.entries[idx])
    }

    /// Whether `digest` appears anywhere in the log as a post digest —
    /// the spec §4.7 "found in ActionLog" check that distinguishes a peer
    /// who is merely behind from one whose digest is truly unrecognized.
    pub fn contains_digest(&self, digest: &Digest) -> bool {
        self.by_post_digest.contains_key(digest)
    }

    /// Every action ever applied for `creator`, oldest first.
    pub fn actions_for(&self, creator: &Name) -> Vec<&ActionEntry> {
        self.entries.iter().filter(|e| &e.creator == creator).collect()
    }

    /// Digest chaining the entry digests in append order; not used for
    /// sync-protocol root digests (that is [`crate::tree::SyncTree`]'s
    /// job), but useful as a tamper-evidence checksum over the whole log.
    pub fn digest(&self) -> Digest {
        Digest::of_parts(self.entries.iter().map(|e| e.digest().0.as_slice()))
    }

    /// Total number of entries, including the seed sentinel.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds only the seed sentinel.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// All entries in append order, sentinel included.
    pub fn iter(&self) -> impl Iterator<Item = &ActionEntry> {
        self.entries.iter()
    }

    /// Drop every entry for creators whose last-known sequence the caller
    /// has already folded into a snapshot, keeping only the sentinel and
    /// any creator not named in `keep_if_missing`. Used by the engine's
    /// post-snapshot `remove_actions` step.
    ///
    /// Per the design resolution recorded in DESIGN.md, this replays rows
    /// only for creators *absent* from `keep_if_missing` — i.e. it is safe
    /// to call with the full set of creators already covered by the new
    /// snapshot, and it will retain nothing beyond the sentinel for them.
    pub fn truncate_except(&mut self, keep_if_missing: &[Name]) {
        let keep: std::collections::HashSet<&Name> = keep_if_missing.iter().collect();
        let sentinel = self.entries[0].clone();
        let sentinel_digest = self.post_digests[0];
        let mut kept = vec![sentinel];
        let mut kept_digests = vec![sentinel_digest];
        for (entry, digest) in self.entries.iter().zip(self.post_digests.iter()).skip(1) {
            if !keep.contains(&entry.creator) {
                kept.push(entry.clone());
                kept_digests.push(*digest);
            }
        }
        self.by_creator_seq.clear();
        self.by_post_digest.clear();
        for (idx, (entry, digest)) in kept.iter().zip(kept_digests.iter()).enumerate() {
            self.by_creator_seq.insert((entry.creator.clone(), entry.seq), idx);
            self.by_post_digest.insert(*digest, idx);
        }
        self.entries = kept;
        self.post_digests = kept_digests;
    }
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;

    fn entry(creator: &str, seq: u64) -> ActionEntry {
        ActionEntry::new(
            Name::parse(creator),
            seq,
            ActionKind::Insertion,
            Name::parse("/example/data/x"),
            1,
        )
    }

    #[test]
    fn starts_with_sentinel_only() {
        let log = ActionLog::new();
        assert_eq!(log.len(), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn append_and_lookup() {
        let mut log = ActionLog::new();
        log.append(entry("/repo/0", 1), Digest::of(b"d1"));
        let found = log.lookup(&Name::parse("/repo/0"), 1).unwrap();
        assert_eq!(found.seq, 1);
    }

    #[test]
    fn duplicate_append_is_idempotent() {
        let mut log = ActionLog::new();
        log.append(entry("/repo/0", 1), Digest::of(b"d1"));
        log.append(entry("/repo/0", 1), Digest::of(b"d1"));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn contains_digest_recognizes_sentinel_and_appended_digests() {
        let mut log = ActionLog::new();
        assert!(log.contains_digest(&Digest::ZERO));
        assert!(!log.contains_digest(&Digest::of(b"d1")));
        log.append(entry("/repo/0", 1), Digest::of(b"d1"));
        assert!(log.contains_digest(&Digest::of(b"d1")));
    }

    #[test]
    fn truncate_except_drops_covered_creators_and_keeps_the_rest() {
        let mut log = ActionLog::new();
        log.append(entry("/repo/0", 1), Digest::of(b"d1"));
        log.append(entry("/repo/1", 1), Digest::of(b"d2"));
        log.truncate_except(&[Name::parse("/repo/0")]);
        assert!(log.lookup(&Name::parse("/repo/0"), 1).is_none());
        assert!(log.lookup(&Name::parse("/repo/1"), 1).is_some());
        assert!(!log.contains_digest(&Digest::of(b"d1")));
        assert!(log.contains_digest(&Digest::of(b"d2")));
    }

    #[test]
    fn truncate_except_covering_every_creator_leaves_only_the_sentinel() {
        let mut log = ActionLog::new();
        log.append(entry("/repo/0", 1), Digest::of(b"d1"));
        log.append(entry("/repo/1", 1), Digest::of(b"d2"));
        log.truncate_except(&[Name::parse("/repo/0"), Name::parse("/repo/1")]);
        assert!(log.is_empty());
        assert!(log.contains_digest(&Digest::ZERO));
    }
}
