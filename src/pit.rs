//! Pending Interest Table (PIT): tracks outstanding Interests this process
//! has expressed, so a late-arriving Data (or a sweep) can resolve them.

use crate::identifiers::{Digest, Name};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// What an outstanding Interest was expressed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingKind {
    Sync,
    Fetch { creator: Name, seq: u64 },
    Recovery,
}

#[derive(Debug, Clone)]
struct PitRecord {
    digest: Digest,
    kind: PendingKind,
    expires_at: Instant,
}

/// Outstanding-Interest table, dual-indexed by digest (for matching an
/// arriving Data) and by arrival order (for bounded-lifetime sweeps).
///
/// Both indices are kept in sync by construction: every mutating method
/// updates `by_digest` and `arrival` together.
#[derive(Debug, Default)]
pub struct Pit {
    by_digest: HashMap<Digest, PendingKind>,
    arrival: VecDeque<PitRecord>,
}

impl Pit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly-expressed Interest, valid until `now + lifetime`.
    pub fn insert(&mut self, digest: Digest, kind: PendingKind, now: Instant, lifetime: Duration) {
        self.by_digest.insert(digest, kind.clone());
        self.arrival.push_back(PitRecord {
            digest,
            kind,
            expires_at: now + lifetime,
        });
    }

    /// Look up (without removing) the kind of Interest outstanding for a
    /// digest, used to decide how to route an arriving Data.
    pub fn lookup(&self, digest: &Digest) -> Option<&PendingKind> {
        self.by_digest.get(digest)
    }

    /// Remove and return the entry for `digest`, e.g. once its Data has
    /// arrived and been processed.
    pub fn remove(&mut self, digest: &Digest) -> Option<PendingKind> {
        let removed = self.by_digest.remove(digest);
        if removed.is_some() {
            self.arrival.retain(|rec| &rec.digest != digest);
        }
        removed
    }

    /// Evict every entry whose lifetime has expired as of `now`, returning
    /// the evicted `(digest, kind)` pairs so the caller can decide whether
    /// to re-express them.
    pub fn sweep(&mut self, now: Instant) -> Vec<(Digest, PendingKind)> {
        let mut evicted = Vec::new();
        while let Some(front) = self.arrival.front() {
            if front.expires_at > now {
                break;
            }
            let record = self.arrival.pop_front().unwrap();
            self.by_digest.remove(&record.digest);
            evicted.push((record.digest, record.kind));
        }
        evicted
    }

    /// Digests of every currently-pending sync Interest, used to answer
    /// parked long-poll-style sync Interests once local state changes.
    pub fn sync_digests(&self) -> Vec<Digest> {
        self.by_digest
            .iter()
            .filter(|(_, kind)| matches!(kind, PendingKind::Sync))
            .map(|(digest, _)| *digest)
            .collect()
    }

    /// Number of outstanding Interests.
    pub fn len(&self) -> usize {
        self.by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup() {
        let mut pit = Pit::new();
        let digest = Digest::of(b"d1");
        pit.insert(digest, PendingKind::Sync, Instant::now(), Duration::from_secs(4));
        assert_eq!(pit.lookup(&digest), Some(&PendingKind::Sync));
    }

    #[test]
    fn remove_clears_both_indices() {
        let mut pit = Pit::new();
        let digest = Digest::of(b"d1");
        pit.insert(digest, PendingKind::Sync, Instant::now(), Duration::from_secs(4));
        pit.remove(&digest);
        assert!(pit.lookup(&digest).is_none());
        assert_eq!(pit.len(), 0);
    }

    #[test]
    fn sweep_evicts_only_expired_entries_in_arrival_order() {
        let mut pit = Pit::new();
        let now = Instant::now();
        let d1 = Digest::of(b"d1");
        let d2 = Digest::of(b"d2");
        pit.insert(d1, PendingKind::Sync, now, Duration::from_millis(0));
        pit.insert(d2, PendingKind::Sync, now, Duration::from_secs(60));

        let evicted = pit.sweep(now + Duration::from_millis(1));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, d1);
        assert!(pit.lookup(&d1).is_none());
        assert!(pit.lookup(&d2).is_some());
    }

    #[test]
    fn sweep_is_idempotent_once_drained() {
        let mut pit = Pit::new();
        let now = Instant::now();
        pit.insert(Digest::of(b"d1"), PendingKind::Sync, now, Duration::from_millis(0));
        let first = pit.sweep(now + Duration::from_millis(1));
        let second = pit.sweep(now + Duration::from_millis(1));
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }
}
