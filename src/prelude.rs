//! Curated re-exports for embedding hosts.

pub use crate::action::{ActionEntry, ActionKind};
pub use crate::command::{Command, ControlCommand, ControlStatus, StartParameters};
pub use crate::config::SyncConfig;
pub use crate::data_store::{DataStatus, DataStoreEffects};
pub use crate::engine::{SyncEngine, SyncInterestOutcome};
pub use crate::errors::{Result, SyncError};
pub use crate::identifiers::{Digest, Name};
pub use crate::net::NetworkEffects;
pub use crate::store::{SqliteTreeStore, TreeStore};
pub use crate::validator::{AllowAllValidator, Validator};
pub use crate::wire::{FetchResponse, RecoveryResponse, SnapshotAnnouncement, SyncResponse, SyncWireMessage};
