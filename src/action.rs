//! The atomic unit of replication: [`ActionEntry`].

use crate::identifiers::{Digest, Name};
use serde::{Deserialize, Serialize};

/// Tagged kind of an [`ActionEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// A data object was inserted into the store.
    Insertion,
    /// A data object was deleted from the store.
    Deletion,
    /// Reserved for future action kinds; applying one is a protocol
    /// violation today.
    Others,
}

impl ActionKind {
    fn tag(self) -> &'static str {
        match self {
            ActionKind::Insertion => "insertion",
            ActionKind::Deletion => "deletion",
            ActionKind::Others => "others",
        }
    }
}

/// One entry in a creator's replicated action log.
///
/// `entry_name` is the canonical encoding used for lookups (by the fetch
/// Interest handler) and would be the payload a real deployment signs;
/// this crate treats signing as the `Validator` collaborator's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEntry {
    /// Identity of the peer that originated this action.
    pub creator: Name,
    /// Monotonically increasing sequence number within `creator`, starting
    /// at 1.
    pub seq: u64,
    /// Tagged action kind.
    pub action: ActionKind,
    /// Name of the referenced data object (meaningful for Insertion and
    /// Deletion).
    pub data_name: Name,
    /// Per-(dataName, action) counter; informational only.
    pub version: u64,
    /// Canonical name encoding of the fields above.
    pub entry_name: Name,
}

impl ActionEntry {
    /// Build an entry and derive its canonical `entryName`.
    pub fn new(
        creator: Name,
        seq: u64,
        action: ActionKind,
        data_name: Name,
        version: u64,
    ) -> Self {
        let entry_name = Self::encode_name(&creator, seq, action, &data_name, version);
        Self {
            creator,
            seq,
            action,
            data_name,
            version,
            entry_name,
        }
    }

    /// A sentinel entry used to seed the [`crate::log::ActionLog`] so the
    /// digest of the empty state is addressable. Carries no creator
    /// identity and is never applied.
    pub fn sentinel() -> Self {
        ActionEntry::new(Name::root(), 0, ActionKind::Others, Name::root(), 0)
    }

    fn encode_name(
        creator: &Name,
        seq: u64,
        action: ActionKind,
        data_name: &Name,
        version: u64,
    ) -> Name {
        creator
            .append_str(action.tag())
            .append(data_name.to_string().into_bytes())
            .append(version.to_string().into_bytes())
            .append(seq.to_string().into_bytes())
    }

    /// Hash this entry for inclusion in the tree's leaf digest or the
    /// action log's digest chain.
    pub fn digest(&self) -> Digest {
        Digest::of(self.entry_name.to_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_name_is_deterministic() {
        let creator = Name::parse("/repo/0");
        let data = Name::parse("/example/data/1");
        let a = ActionEntry::new(creator.clone(), 1, ActionKind::Insertion, data.clone(), 1);
        let b = ActionEntry::new(creator, 1, ActionKind::Insertion, data, 1);
        assert_eq!(a.entry_name, b.entry_name);
    }

    #[test]
    fn different_seq_changes_entry_name() {
        let creator = Name::parse("/repo/0");
        let data = Name::parse("/example/data/1");
        let a = ActionEntry::new(creator.clone(), 1, ActionKind::Insertion, data.clone(), 1);
        let b = ActionEntry::new(creator, 2, ActionKind::Insertion, data, 1);
        assert_ne!(a.entry_name, b.entry_name);
    }
}
