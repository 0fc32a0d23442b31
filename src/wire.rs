//! Wire codec for sync, fetch, and recovery messages (C5).
//!
//! Follows the schema-versioned tagged-payload shape the anti-entropy
//! crate uses for its own `SyncWireMessage`: a fixed `schema_version`
//! alongside a payload enum, encoded with `bincode` over `serde`.

use crate::action::ActionEntry;
use crate::data_store::DataStatus;
use crate::errors::{Result, SyncError};
use crate::identifiers::{Digest, Name};
use serde::{Deserialize, Serialize};

/// Current wire schema version. Bump when `SyncWirePayload` gains or
/// changes a variant in a way older peers can't decode.
pub const SYNC_WIRE_SCHEMA_VERSION: u16 = 1;

/// Per-creator cursor advertised in a sync-response or recovery-response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorCursor {
    pub creator: Name,
    pub last: u64,
}

/// Payload of the Data returned for a `<syncPrefix>/sync/<rootDigest>`
/// Interest: the set of creators whose cursor is not yet reflected in the
/// digest the requester advertised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Root digest this response was computed against.
    pub root_digest: Digest,
    /// Creators (and their current `last`) the requester should fetch.
    pub cursors: Vec<CreatorCursor>,
}

/// Payload of the Data returned for a `<syncPrefix>/fetch/<creator>/<seq>`
/// Interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub action: ActionEntry,
}

/// Payload of the Data returned for a `<syncPrefix>/recovery/<digest>`
/// Interest: the full known state, used to resynchronize a peer whose
/// advertised digest nobody recognizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryResponse {
    pub cursors: Vec<CreatorCursor>,
}

/// Payload announcing a snapshot boundary, carried out-of-band from the
/// three Interest/Data exchanges above so a fetcher can recognize
/// snapshot-covered gaps instead of treating them as unreachable sequence
/// numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotAnnouncement {
    pub snapshot_creator: Name,
    pub snapshot_seq: u64,
    /// Enumeration of the local data store at the moment the snapshot was
    /// built, so a receiver can reconcile store contents directly instead
    /// of only catching up the tree's per-creator cursors.
    pub items: Vec<(Name, DataStatus)>,
    pub cursors: Vec<CreatorCursor>,
}

/// Tagged payload carried by every [`SyncWireMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncWirePayload {
    Sync(SyncResponse),
    Fetch(FetchResponse),
    Recovery(RecoveryResponse),
    Snapshot(SnapshotAnnouncement),
}

/// The message actually placed on the wire as the content of a Data
/// packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWireMessage {
    pub schema_version: u16,
    pub payload: SyncWirePayload,
}

impl SyncWireMessage {
    pub fn sync(resp: SyncResponse) -> Self {
        SyncWireMessage {
            schema_version: SYNC_WIRE_SCHEMA_VERSION,
            payload: SyncWirePayload::Sync(resp),
        }
    }

    pub fn fetch(resp: FetchResponse) -> Self {
        SyncWireMessage {
            schema_version: SYNC_WIRE_SCHEMA_VERSION,
            payload: SyncWirePayload::Fetch(resp),
        }
    }

    pub fn recovery(resp: RecoveryResponse) -> Self {
        SyncWireMessage {
            schema_version: SYNC_WIRE_SCHEMA_VERSION,
            payload: SyncWirePayload::Recovery(resp),
        }
    }

    pub fn snapshot(resp: SnapshotAnnouncement) -> Self {
        SyncWireMessage {
            schema_version: SYNC_WIRE_SCHEMA_VERSION,
            payload: SyncWirePayload::Snapshot(resp),
        }
    }

    /// Encode as the byte payload of a Data packet.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(SyncError::from)
    }

    /// Decode a Data packet's content back into a message, rejecting
    /// payloads stamped with a schema version this build doesn't
    /// understand.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let msg: SyncWireMessage = bincode::deserialize(bytes).map_err(SyncError::from)?;
        if msg.schema_version != SYNC_WIRE_SCHEMA_VERSION {
            return Err(SyncError::Decode(format!(
                "unsupported wire schema version {}",
                msg.schema_version
            )));
        }
        Ok(msg)
    }
}
