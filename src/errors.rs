//! Crate-wide error taxonomy for the sync engine.
//!
//! One enum, one variant per failure class in the design's error policy:
//! decode/validation/timeout errors are recoverable locally (the engine
//! responds or retries and never returns them to a caller), while
//! `ProtocolViolation` and `Storage` propagate out of handlers.

use crate::identifiers::Name;

/// Errors surfaced by the sync engine and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A received action carries a sequence number beyond the known final
    /// sequence for its creator, or an unrecognized action kind was applied.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A `SyncMessage` or command parameter block failed to decode.
    #[error("decode error: {0}")]
    Decode(String),

    /// An Interest, Data, or command parameter block failed signature
    /// validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A fetch for `(creator, seq)` exhausted its retry budget.
    #[error("fetch exhausted for {creator}/{seq} after {attempts} attempts")]
    FetchExhausted {
        /// Creator whose action could not be fetched.
        creator: Name,
        /// Sequence number that could not be fetched.
        seq: u64,
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The backing `TreeStore` failed to open, prepare, or execute a
    /// statement.
    #[error("storage error: {0}")]
    Storage(String),

    /// A digest could not be extracted from an Interest or Data name.
    #[error("malformed digest in name: {0}")]
    DigestError(String),

    /// The requested operation, action, or digest was not found locally.
    #[error("not found: {0}")]
    NotFound(String),

    /// The network collaborator reported a transport-level failure.
    #[error("network error: {0}")]
    Network(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for SyncError {
    fn from(err: bincode::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}
