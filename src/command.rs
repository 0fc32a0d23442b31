//! Command surface (C8): the local control-plane protocol for asking the
//! engine to originate a new action, plus the `start`/`check`/`stop`
//! control Interests that start, query, and stop the engine's outgoing
//! sync loop. Distinct from the wire types in [`crate::wire`] since
//! commands never cross the network as sync/fetch/recovery Data does —
//! they arrive from the CLI or an embedding host, or (for control
//! commands) as Interests under `<commandPrefix>/sync/{start,check,stop}`
//! — but they reuse the same `bincode`-over-`serde` codec.

use crate::action::ActionKind;
use crate::errors::{Result, SyncError};
use crate::identifiers::Name;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A locally-originated request to insert or delete a data object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Insert { data_name: Name, version: u64 },
    Delete { data_name: Name, version: u64 },
}

impl Command {
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(SyncError::from)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(SyncError::from)
    }

    /// The `ActionKind` this command will produce once executed.
    pub fn kind(&self) -> ActionKind {
        match self {
            Command::Insert { .. } => ActionKind::Insertion,
            Command::Delete { .. } => ActionKind::Deletion,
        }
    }

    pub fn data_name(&self) -> &Name {
        match self {
            Command::Insert { data_name, .. } | Command::Delete { data_name, .. } => data_name,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Command::Insert { version, .. } | Command::Delete { version, .. } => *version,
        }
    }
}

/// Optional parameter block carried by a `start` control Interest: lets
/// the caller override the peer's creator name for this run. A random
/// 64-bit suffix is appended so repeated `start`s (e.g. from a test
/// harness spinning up several short-lived peers under the same base
/// name) never collide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StartParameters {
    pub creator_override: Option<Name>,
}

impl StartParameters {
    /// Resolve the creator name a `start` command should run the engine
    /// under: the override (with a random suffix appended for
    /// uniqueness) if given, or `default_creator` unchanged.
    pub fn resolve_creator(&self, default_creator: &Name) -> Name {
        match &self.creator_override {
            Some(base) => base.append(rand::thread_rng().gen::<u64>().to_string().into_bytes()),
            None => default_creator.clone(),
        }
    }
}

/// A request arriving on one of the `<commandPrefix>/sync/{start,check,
/// stop}` control Interests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCommand {
    /// Start the engine's outgoing sync loop.
    Start(StartParameters),
    /// Query whether the engine is currently running.
    Check,
    /// Stop the engine's outgoing sync loop.
    Stop,
}

impl ControlCommand {
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(SyncError::from)
    }

    /// Decode a control command's parameter block. A decode failure here
    /// is the caller's cue to reply with status `403`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(SyncError::from)
    }
}

/// Reply status for a control command, per the design's status-code
/// table: `100` start succeeded, `200` check-running, `300`
/// check-stopped or stop-acknowledged, `401` validation failure, `403`
/// parameter decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlStatus {
    StartedRunning = 100,
    CheckRunning = 200,
    StoppedOrAcknowledged = 300,
    ValidationFailed = 401,
    DecodeFailed = 403,
}

impl ControlStatus {
    pub fn code(self) -> u16 {
        self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_command_roundtrips() {
        let cmd = ControlCommand::Start(StartParameters {
            creator_override: Some(Name::parse("/repo/override")),
        });
        let bytes = cmd.encode().unwrap();
        let decoded = ControlCommand::decode(&bytes).unwrap();
        assert_eq!(cmd, decoded);
    }

    #[test]
    fn start_parameters_without_override_keep_default_creator() {
        let params = StartParameters::default();
        let default = Name::parse("/repo/self");
        assert_eq!(params.resolve_creator(&default), default);
    }

    #[test]
    fn start_parameters_with_override_append_a_unique_suffix() {
        let params = StartParameters {
            creator_override: Some(Name::parse("/repo/override")),
        };
        let default = Name::parse("/repo/self");
        let resolved = params.resolve_creator(&default);
        assert!(resolved.to_string().starts_with("/repo/override/"));
        assert_eq!(resolved.len(), 3);
    }

    #[test]
    fn status_codes_match_the_design_table() {
        assert_eq!(ControlStatus::StartedRunning.code(), 100);
        assert_eq!(ControlStatus::CheckRunning.code(), 200);
        assert_eq!(ControlStatus::StoppedOrAcknowledged.code(), 300);
        assert_eq!(ControlStatus::ValidationFailed.code(), 401);
        assert_eq!(ControlStatus::DecodeFailed.code(), 403);
    }

    #[test]
    fn command_roundtrips() {
        let cmd = Command::Insert {
            data_name: Name::parse("/example/data/x"),
            version: 1,
        };
        let bytes = cmd.encode().unwrap();
        let decoded = Command::decode(&bytes).unwrap();
        assert_eq!(cmd, decoded);
    }

    #[test]
    fn kind_matches_variant() {
        let cmd = Command::Delete {
            data_name: Name::parse("/example/data/x"),
            version: 1,
        };
        assert_eq!(cmd.kind(), ActionKind::Deletion);
    }
}
