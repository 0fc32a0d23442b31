//! Sync engine runtime configuration.
//!
//! Collects every timing constant named in the protocol design into one
//! struct with a `Default` carrying the design's defaults, the same shape
//! as `aura_core::effects::sync::AntiEntropyConfig` /
//! `aura-anti-entropy::config::AntiEntropyRuntimeConfig`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and width parameters for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Freshness of a sync-response Data packet.
    pub sync_response_freshness: Duration,
    /// Base re-expression interval for the outgoing sync Interest.
    pub sync_interest_reexpress: Duration,
    /// Initial recovery-Interest retransmission interval, doubled on each
    /// unanswered retransmit up to `recovery_retransmit_cap`.
    pub default_recovery_retransmit_interval: Duration,
    /// Upper bound on the recovery retransmission backoff.
    pub recovery_retransmit_cap: Duration,
    /// Maximum fetch attempts per `(creator, seq)` before giving up.
    pub retry_times: u32,
    /// Width of the per-creator outstanding-fetch window.
    pub pipeline: u64,
    /// Lifetime of fetch and normal-data Interests.
    pub default_interest_lifetime: Duration,
    /// Lower bound of the uniform delay before reprocessing an unknown
    /// sync digest.
    pub unknown_digest_delay_min: Duration,
    /// Upper bound of the uniform delay before reprocessing an unknown
    /// sync digest.
    pub unknown_digest_delay_max: Duration,
    /// Lower bound of the jitter added to re-expressed Interests.
    pub jitter_min: Duration,
    /// Upper bound of the jitter added to re-expressed Interests.
    pub jitter_max: Duration,
    /// Delay from "synchronized" becoming true to `remove_actions` firing,
    /// absent any contradicting sync Interest in the interval.
    pub quiescence_to_snapshot_delay: Duration,
    /// PIT entry lifetime.
    pub entry_lifetime: Duration,
    /// Interval between PIT sweeps.
    pub clean_period: Duration,
    /// Lifetime of a snapshot-dedup `snapshotList` entry.
    pub snapshot_dedup_lifetime: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_response_freshness: Duration::from_secs(1),
            sync_interest_reexpress: Duration::from_secs(4),
            default_recovery_retransmit_interval: Duration::from_millis(200),
            recovery_retransmit_cap: Duration::from_secs(100),
            retry_times: 4,
            pipeline: 3,
            default_interest_lifetime: Duration::from_secs(4),
            unknown_digest_delay_min: Duration::from_millis(200),
            unknown_digest_delay_max: Duration::from_millis(1000),
            jitter_min: Duration::from_millis(100),
            jitter_max: Duration::from_millis(500),
            quiescence_to_snapshot_delay: Duration::from_secs(5),
            entry_lifetime: Duration::from_secs(4),
            clean_period: Duration::from_secs(4),
            snapshot_dedup_lifetime: Duration::from_secs(10),
        }
    }
}

/// TOML-deserializable configuration for the `ndnreposync` host process.
///
/// Layered on top of [`SyncConfig`] the way a CLI host in this ecosystem
/// reads a typed config file and falls back to programmatic defaults —
/// mirroring `aura-config-fs`'s role relative to `aura-core`'s in-memory
/// config structs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncConfigFile {
    /// Overrides for the timing parameters; any field left unset falls
    /// back to [`SyncConfig::default`].
    #[serde(default)]
    pub sync: SyncConfigOverrides,
}

/// Optional overrides loaded from TOML; `None` means "use the default".
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncConfigOverrides {
    pub sync_interest_reexpress_secs: Option<u64>,
    pub pipeline: Option<u64>,
    pub retry_times: Option<u32>,
}

impl SyncConfigFile {
    /// Merge the file overrides on top of the design defaults.
    pub fn resolve(&self) -> SyncConfig {
        let mut cfg = SyncConfig::default();
        if let Some(secs) = self.sync.sync_interest_reexpress_secs {
            cfg.sync_interest_reexpress = Duration::from_secs(secs);
        }
        if let Some(pipeline) = self.sync.pipeline {
            cfg.pipeline = pipeline;
        }
        if let Some(retry_times) = self.sync.retry_times {
            cfg.retry_times = retry_times;
        }
        cfg
    }
}
