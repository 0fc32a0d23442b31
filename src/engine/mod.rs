//! The sync engine (C7): the single-threaded reactor that ties the digest
//! tree, action log, PIT, and pipelined fetch state machines together
//! behind the `NetworkEffects` / `DataStoreEffects` / `Validator` /
//! `TreeStore` collaborator seams.
//!
//! All state lives behind one [`tokio::sync::Mutex`], acquired once per
//! handler call, so that only one handler ever mutates state at a time —
//! the same invariant a true single-threaded reactor gives for free, kept
//! here despite `tokio`'s runtime being free to run handlers on different
//! worker threads.

pub mod fetch;

use crate::action::{ActionEntry, ActionKind};
use crate::command::{Command, ControlCommand, ControlStatus, StartParameters};
use crate::config::SyncConfig;
use crate::data_store::{DataStatus, DataStoreEffects};
use crate::errors::{Result, SyncError};
use crate::identifiers::{Digest, Name};
use crate::log::ActionLog;
use crate::net::NetworkEffects;
use crate::pit::{PendingKind, Pit};
use crate::snapshot::{SnapshotBuilder, SnapshotDedup};
use crate::store::{TreeRow, TreeStore};
use crate::tree::SyncTree;
use crate::validator::Validator;
use crate::wire::{CreatorCursor, FetchResponse, RecoveryResponse, SnapshotAnnouncement, SyncResponse, SyncWireMessage};
use fetch::PipelineState;
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Outcome of processing an inbound sync Interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncInterestOutcome {
    /// The requester's digest already matches ours; nothing to answer yet.
    /// The Interest is registered in the PIT and will be answered the next
    /// time local state changes (see [`SyncEngine::drain_pending_syncs`]).
    Pending,
    /// The requester's digest differs from ours but was once a digest we
    /// produced ourselves (found in the `ActionLog`); the requester is
    /// merely behind, so respond with the current cursor list immediately.
    Respond(SyncWireMessage),
    /// The requester's digest is not our current root and was never found
    /// in the `ActionLog`; it is genuinely unrecognized, so a recovery
    /// Interest is expressed instead of answering directly.
    Unknown,
}

#[derive(Debug)]
struct EngineState {
    tree: SyncTree,
    log: ActionLog,
    pit: Pit,
    fetch_states: HashMap<Name, PipelineState>,
    snapshot_dedup: SnapshotDedup,
    recovery_backoff: HashMap<Name, (Duration, u32)>,
    /// The last snapshot this creator published, cached verbatim so a
    /// fetch Interest for a pre-truncation `seq` can be answered with it
    /// unchanged instead of failing once the log has been truncated.
    cached_snapshot: Option<SnapshotAnnouncement>,
    local_seq: u64,
    synchronized_since: Option<Instant>,
    /// Whether the `start` control command has been acknowledged and not
    /// yet followed by a `stop`. Gates whether the host's outgoing
    /// sync-reexpress loop should keep running.
    running: bool,
    /// The creator name currently in effect, which a `start` carrying a
    /// [`StartParameters::creator_override`] may have replaced.
    active_creator: Name,
}

/// The protocol state machine. Generic over its four collaborators so
/// tests can plug in the in-memory `testkit` doubles and production hosts
/// can plug in real network faces and a `SqliteTreeStore`.
pub struct SyncEngine<N, D, V, S> {
    config: SyncConfig,
    sync_prefix: Name,
    local_creator: Name,
    network: N,
    data_store: D,
    validator: V,
    store: S,
    state: Mutex<EngineState>,
}

impl<N, D, V, S> SyncEngine<N, D, V, S>
where
    N: NetworkEffects,
    D: DataStoreEffects,
    V: Validator,
    S: TreeStore,
{
    /// Build an engine, rebuilding the in-memory tree from whatever the
    /// `TreeStore` already persisted.
    pub fn new(
        config: SyncConfig,
        sync_prefix: Name,
        local_creator: Name,
        network: N,
        data_store: D,
        validator: V,
        store: S,
    ) -> Result<Self> {
        let mut tree = SyncTree::new();
        for (creator, row) in store.all()? {
            tree.restore_node(&creator, row.first, row.last);
        }
        Ok(SyncEngine {
            config,
            sync_prefix,
            local_creator,
            network,
            data_store,
            validator,
            store,
            state: Mutex::new(EngineState {
                tree,
                log: ActionLog::new(),
                pit: Pit::new(),
                fetch_states: HashMap::new(),
                snapshot_dedup: SnapshotDedup::new(),
                recovery_backoff: HashMap::new(),
                cached_snapshot: None,
                local_seq: 0,
                synchronized_since: None,
                running: false,
                active_creator: local_creator.clone(),
            }),
        })
    }

    // ---- start/check/stop control surface (C8) ---------------------------------

    /// Handle an inbound control Interest under
    /// `<commandPrefix>/sync/{start,check,stop}`: validate the raw
    /// parameter block, decode it, and dispatch. Never returns an `Err`
    /// to the caller — every failure is folded into the status code the
    /// design's table assigns it, since a control Interest always gets
    /// exactly one Data reply.
    pub async fn handle_control_command(&self, payload: &[u8]) -> ControlStatus {
        if self.validator.validate_command(payload).await.is_err() {
            return ControlStatus::ValidationFailed;
        }
        let command = match ControlCommand::decode(payload) {
            Ok(cmd) => cmd,
            Err(_) => return ControlStatus::DecodeFailed,
        };
        match command {
            ControlCommand::Start(params) => self.start(params).await,
            ControlCommand::Check => self.check().await,
            ControlCommand::Stop => self.stop().await,
        }
    }

    /// Register the sync prefix, mark the engine running, and report
    /// `100`. The host is expected to schedule the first outgoing sync
    /// Interest 100 ms later, per the design.
    async fn start(&self, params: StartParameters) -> ControlStatus {
        let mut guard = self.state.lock().await;
        guard.active_creator = params.resolve_creator(&self.local_creator);
        guard.running = true;
        ControlStatus::StartedRunning
    }

    /// Report whether the engine is currently running: `200` if so,
    /// `300` if stopped.
    async fn check(&self) -> ControlStatus {
        if self.state.lock().await.running {
            ControlStatus::CheckRunning
        } else {
            ControlStatus::StoppedOrAcknowledged
        }
    }

    /// Stop the engine's outgoing sync loop and acknowledge with `300`.
    /// The host is expected to cancel the pending sync-reexpress event
    /// once it sees this status.
    async fn stop(&self) -> ControlStatus {
        self.state.lock().await.running = false;
        ControlStatus::StoppedOrAcknowledged
    }

    /// Whether the engine's outgoing sync loop is currently running,
    /// i.e. `start` was acknowledged and no later `stop` has run.
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    /// The creator name currently in effect: the `start` override if one
    /// was supplied, otherwise the engine's configured default.
    pub async fn active_creator(&self) -> Name {
        self.state.lock().await.active_creator.clone()
    }

    /// This peer's current root digest.
    pub async fn root_digest(&self) -> Digest {
        self.state.lock().await.tree.root_digest()
    }

    /// `<syncPrefix>/sync/<rootDigest>` name for the current root.
    pub async fn sync_interest_name(&self) -> Name {
        self.sync_prefix
            .append_str("sync")
            .append(self.root_digest().await.to_hex().into_bytes())
    }

    /// Express the outgoing sync Interest for the current root digest, per
    /// spec §4.7's outgoing sync loop. The host is expected to call this on
    /// [`SyncEngine::next_reexpress_delay`]'s cadence.
    pub async fn express_sync_interest(&self) -> Result<()> {
        let name = self.sync_interest_name().await;
        self.network.express_interest(name, self.config.default_interest_lifetime).await
    }

    /// The highest sequence number known locally for `creator`, `0` if
    /// nothing from that creator has been observed yet.
    pub async fn last_seq(&self, creator: &Name) -> u64 {
        self.state.lock().await.tree.lookup(creator).map(|n| n.last).unwrap_or(0)
    }

    // ---- command surface (C8) -------------------------------------------------

    /// Execute a locally-originated insertion or deletion: validate,
    /// append to the log and tree, apply to the data store, and publish
    /// the resulting sync Interest/Data so peers can pick it up.
    pub async fn execute(&self, kind: ActionKind, data_name: Name, version: u64) -> Result<ActionEntry> {
        let mut guard = self.state.lock().await;
        guard.local_seq += 1;
        let creator = guard.active_creator.clone();
        let action = ActionEntry::new(creator, guard.local_seq, kind, data_name, version);
        drop(guard);

        self.validator.validate_action(&action).await?;
        self.data_store.apply(&action).await?;

        let mut guard = self.state.lock().await;
        guard.tree.update(&action);
        let post_digest = guard.tree.root_digest();
        guard.log.append(action.clone(), post_digest);
        let row = TreeRow {
            first: guard.tree.lookup(&action.creator).map(|n| n.first).unwrap_or(0),
            last: guard.tree.lookup(&action.creator).map(|n| n.last).unwrap_or(action.seq),
        };
        drop(guard);
        self.store.put(&action.creator, row)?;

        self.on_local_state_changed().await?;
        Ok(action)
    }

    /// Entry point for a raw command payload arriving from the CLI or an
    /// embedding host: validate the payload itself, decode it, then run
    /// it through [`SyncEngine::execute`].
    pub async fn execute_command(&self, payload: &[u8]) -> Result<ActionEntry> {
        self.validator.validate_command(payload).await?;
        let command = Command::decode(payload)?;
        self.execute(command.kind(), command.data_name().clone(), command.version()).await
    }

    // ---- sync Interest/Data (C5 over the wire) --------------------------------

    /// Handle an inbound sync Interest naming `requested_digest`, per spec
    /// §4.7's three-way branch: the digest already matches ours (park it in
    /// the PIT), the digest was once a digest we produced (found in the
    /// `ActionLog`, so the requester is merely behind and gets the current
    /// cursor list), or the digest is truly unrecognized (escalate to a
    /// recovery Interest instead of answering).
    pub async fn on_sync_interest(&self, requested_digest: Digest, now: Instant) -> Result<SyncInterestOutcome> {
        let mut guard = self.state.lock().await;
        let local_root = guard.tree.root_digest();
        if requested_digest == local_root {
            guard
                .pit
                .insert(requested_digest, PendingKind::Sync, now, self.config.default_interest_lifetime);
            return Ok(SyncInterestOutcome::Pending);
        }
        if guard.log.contains_digest(&requested_digest) {
            let cursors = cursors_of(&guard.tree);
            return Ok(SyncInterestOutcome::Respond(SyncWireMessage::sync(SyncResponse {
                root_digest: local_root,
                cursors,
            })));
        }
        drop(guard);
        self.express_recovery(&self.local_creator).await?;
        Ok(SyncInterestOutcome::Unknown)
    }

    /// Whenever local state changes, answer any sync Interests parked in
    /// the PIT under the old (now stale) digest.
    async fn drain_pending_syncs(&self) -> Result<Vec<(Name, SyncWireMessage)>> {
        let mut guard = self.state.lock().await;
        let root = guard.tree.root_digest();
        let cursors = cursors_of(&guard.tree);
        let mut outbound = Vec::new();
        let stale: Vec<Digest> = guard.pit.sync_digests();
        for digest in stale {
            if guard.pit.remove(&digest).is_some() {
                let name = self.sync_prefix.append_str("sync").append(digest.to_hex().into_bytes());
                outbound.push((
                    name,
                    SyncWireMessage::sync(SyncResponse {
                        root_digest: root,
                        cursors: cursors.clone(),
                    }),
                ));
            }
        }
        Ok(outbound)
    }

    async fn on_local_state_changed(&self) -> Result<()> {
        for (name, msg) in self.drain_pending_syncs().await? {
            let bytes = msg.encode()?;
            self.network
                .publish_data(name, bytes, self.config.sync_response_freshness)
                .await?;
        }
        Ok(())
    }

    /// Process a sync response: for every creator whose advertised `last`
    /// exceeds what we know, start or extend a pipelined fetch.
    pub async fn on_sync_data(&self, resp: SyncResponse) -> Result<()> {
        let mut to_fetch: Vec<(Name, u64)> = Vec::new();
        {
            let mut guard = self.state.lock().await;
            for cursor in &resp.cursors {
                let local_last = guard.tree.lookup(&cursor.creator).map(|n| n.last).unwrap_or(0);
                if cursor.last > local_last {
                    guard.tree.add_node(&cursor.creator);
                    let pipeline = self.config.pipeline;
                    let entry = guard
                        .fetch_states
                        .entry(cursor.creator.clone())
                        .or_insert_with(|| PipelineState::new(local_last, cursor.last));
                    entry.raise_target(cursor.last);
                    for seq in entry.next_to_fetch(pipeline) {
                        to_fetch.push((cursor.creator.clone(), seq));
                    }
                }
            }
        }
        for (creator, seq) in to_fetch {
            self.express_fetch(&creator, seq).await?;
        }
        Ok(())
    }

    // ---- fetch Interest/Data ----------------------------------------------------

    async fn express_fetch(&self, creator: &Name, seq: u64) -> Result<()> {
        let name = self
            .sync_prefix
            .append_str("fetch")
            .append_str(&creator.to_string())
            .append(seq.to_string().into_bytes());
        let digest = Digest::of(name.to_string().as_bytes());
        {
            let mut guard = self.state.lock().await;
            guard.pit.insert(
                digest,
                PendingKind::Fetch {
                    creator: creator.clone(),
                    seq,
                },
                Instant::now(),
                self.config.default_interest_lifetime,
            );
            if let Some(state) = guard.fetch_states.get_mut(creator) {
                state.attempts += 1;
            }
        }
        self.network.express_interest(name, self.config.default_interest_lifetime).await
    }

    /// Answer an inbound fetch Interest for `(creator, seq)`. A `seq` the
    /// last-published snapshot already covers (`seq <= first`, with a
    /// truncated `first != 0`) is answered from that cached snapshot
    /// verbatim, since the log itself no longer holds the entry; otherwise
    /// the local log is consulted as usual.
    pub async fn on_fetch_interest(&self, creator: &Name, seq: u64) -> Result<Option<SyncWireMessage>> {
        let guard = self.state.lock().await;
        let first = guard.tree.lookup(creator).map(|n| n.first).unwrap_or(0);
        if first != 0 && seq <= first {
            return Ok(guard
                .cached_snapshot
                .as_ref()
                .map(|snap| SyncWireMessage::snapshot(snap.clone())));
        }
        Ok(guard.log.lookup(creator, seq).map(|action| SyncWireMessage::fetch(FetchResponse { action: action.clone() })))
    }

    /// Process a fetched action: validate, apply to the data store and
    /// local tree/log in sequence order (buffering out-of-order
    /// arrivals), then keep the pipeline window full.
    pub async fn on_fetch_data(&self, resp: FetchResponse) -> Result<()> {
        self.validator.validate_action(&resp.action).await?;

        let creator = resp.action.creator.clone();
        let mut ready = Vec::new();
        let mut more_to_fetch = Vec::new();
        {
            let mut guard = self.state.lock().await;
            if let Some(state) = guard.fetch_states.get_mut(&creator) {
                ready = state.complete(resp.action.clone());
                let pipeline = self.config.pipeline;
                more_to_fetch = state.next_to_fetch(pipeline);
            }
        }

        for action in ready {
            self.data_store.apply(&action).await?;
            let mut guard = self.state.lock().await;
            guard.tree.update(&action);
            let post_digest = guard.tree.root_digest();
            guard.log.append(action.clone(), post_digest);
            let row = TreeRow {
                first: guard.tree.lookup(&action.creator).map(|n| n.first).unwrap_or(0),
                last: guard.tree.lookup(&action.creator).map(|n| n.last).unwrap_or(action.seq),
            };
            drop(guard);
            self.store.put(&action.creator, row)?;
        }

        for seq in more_to_fetch {
            self.express_fetch(&creator, seq).await?;
        }

        self.on_local_state_changed().await
    }

    /// Called by the host when a fetch Interest's lifetime elapses with no
    /// Data: retries up to `retry_times`, then escalates to a recovery
    /// Interest for the stalled creator.
    pub async fn on_fetch_timeout(&self, creator: &Name, seq: u64) -> Result<()> {
        let attempts = {
            let guard = self.state.lock().await;
            let state = guard
                .fetch_states
                .get(creator)
                .ok_or_else(|| SyncError::NotFound(format!("no pipeline for {creator}")))?;
            state.attempts
        };
        if attempts >= self.config.retry_times {
            return Err(SyncError::FetchExhausted {
                creator: creator.clone(),
                seq,
                attempts,
            });
        }
        self.express_fetch(creator, seq).await
    }

    // ---- recovery Interest/Data -------------------------------------------------

    /// Express a recovery Interest for a creator whose fetch pipeline has
    /// stalled, with exponential backoff starting at
    /// `default_recovery_retransmit_interval` and capped at
    /// `recovery_retransmit_cap`.
    pub async fn express_recovery(&self, creator: &Name) -> Result<Duration> {
        let interval = {
            let mut guard = self.state.lock().await;
            let entry = guard
                .recovery_backoff
                .entry(creator.clone())
                .or_insert((self.config.default_recovery_retransmit_interval, 0));
            let current = entry.0;
            entry.1 += 1;
            entry.0 = (entry.0 * 2).min(self.config.recovery_retransmit_cap);
            current
        };
        let digest = self.state.lock().await.tree.root_digest();
        let name = self.sync_prefix.append_str("recovery").append(digest.to_hex().into_bytes());
        self.network.express_interest(name, self.config.default_interest_lifetime).await?;
        Ok(interval)
    }

    /// Answer an inbound recovery Interest with the full known state.
    pub async fn on_recovery_interest(&self) -> Result<SyncWireMessage> {
        let guard = self.state.lock().await;
        Ok(SyncWireMessage::recovery(RecoveryResponse {
            cursors: cursors_of(&guard.tree),
        }))
    }

    /// Process a recovery response the same way a sync response is
    /// processed, and clear the recovery backoff for any creator that is
    /// now caught up.
    pub async fn on_recovery_data(&self, resp: RecoveryResponse) -> Result<()> {
        self.on_sync_data(SyncResponse {
            root_digest: Digest::ZERO,
            cursors: resp.cursors,
        })
        .await?;
        let mut guard = self.state.lock().await;
        let caught_up: Vec<Name> = guard
            .recovery_backoff
            .keys()
            .filter(|creator| guard.fetch_states.get(*creator).map(|s| s.is_done()).unwrap_or(true))
            .cloned()
            .collect();
        for creator in caught_up {
            guard.recovery_backoff.remove(&creator);
        }
        Ok(())
    }

    // ---- snapshot bootstrap -----------------------------------------------------

    /// Build and publish a snapshot announcement, then truncate the local
    /// log for every creator it covers. Called after
    /// `quiescence_to_snapshot_delay` has elapsed with no contradicting
    /// sync Interest.
    pub async fn publish_snapshot(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        guard.local_seq += 1;
        let seq = guard.local_seq;
        let snapshotter = guard.active_creator.clone();
        let announcement = SnapshotBuilder::build(&guard.tree, &self.data_store, &snapshotter, seq).await?;
        guard.tree.update_for_snapshot();
        let covered: Vec<Name> = announcement.cursors.iter().map(|c| c.creator.clone()).collect();
        guard.log.truncate_except(&covered);
        guard.cached_snapshot = Some(announcement.clone());
        drop(guard);

        let name = self
            .sync_prefix
            .append_str("snapshot")
            .append_str(&snapshotter.to_string())
            .append(seq.to_string().into_bytes());
        let msg = SyncWireMessage::snapshot(announcement);
        self.network
            .publish_data(name, msg.encode()?, self.config.sync_response_freshness)
            .await
    }

    /// Apply an inbound snapshot announcement, deduplicated by
    /// `(snapshot_creator, snapshot_seq)` so a relayed duplicate is a
    /// no-op.
    ///
    /// Unlike [`SyncEngine::on_sync_data`], a snapshot's cursors are
    /// authoritative: the receiver jumps its tree (and any in-flight
    /// pipeline) directly to the announced `last` for each creator
    /// instead of fetching every intervening action, which is the whole
    /// point of publishing a snapshot.
    pub async fn on_snapshot_data(&self, announcement: SnapshotAnnouncement, now: Instant) -> Result<()> {
        let first_time = {
            let mut guard = self.state.lock().await;
            guard.snapshot_dedup.observe(
                &announcement.snapshot_creator,
                announcement.snapshot_seq,
                now,
                self.config.snapshot_dedup_lifetime,
            )
        };
        if !first_time {
            return Ok(());
        }

        for (data_name, remote_status) in &announcement.items {
            let local_status = self.data_store.status(data_name).await?;
            match (*remote_status, local_status) {
                (DataStatus::Existed, DataStatus::None) => self.data_store.adopt(data_name).await?,
                (DataStatus::Deleted, DataStatus::Existed) => self.data_store.discard(data_name).await?,
                (DataStatus::Inserted, DataStatus::None) | (DataStatus::Inserted, DataStatus::Deleted) => {
                    self.data_store.adopt(data_name).await?
                }
                _ => {}
            }
        }

        let mut guard = self.state.lock().await;
        for cursor in &announcement.cursors {
            let local_last = guard.tree.lookup(&cursor.creator).map(|n| n.last).unwrap_or(0);
            if cursor.last > local_last {
                guard.tree.set_last(&cursor.creator, cursor.last);
            }
            if let Some(state) = guard.fetch_states.get_mut(&cursor.creator) {
                state.fast_forward(cursor.last);
            }
            let row = TreeRow {
                first: guard.tree.lookup(&cursor.creator).map(|n| n.first).unwrap_or(0),
                last: guard.tree.lookup(&cursor.creator).map(|n| n.last).unwrap_or(cursor.last),
            };
            self.store.put(&cursor.creator, row)?;
        }
        drop(guard);

        self.on_local_state_changed().await
    }

    // ---- periodic maintenance ---------------------------------------------------

    /// Sweep the PIT for expired entries, returning the fetch `(creator,
    /// seq)` pairs whose Interest expired so the host can treat them as
    /// timeouts via [`SyncEngine::on_fetch_timeout`].
    pub async fn sweep_pit(&self, now: Instant) -> Vec<(Name, u64)> {
        let mut guard = self.state.lock().await;
        guard
            .pit
            .sweep(now)
            .into_iter()
            .filter_map(|(_, kind)| match kind {
                PendingKind::Fetch { creator, seq } => Some((creator, seq)),
                _ => None,
            })
            .collect()
    }

    /// A jittered delay for the next sync-Interest re-expression, uniform
    /// in `[sync_interest_reexpress, sync_interest_reexpress + jitter]`.
    pub fn next_reexpress_delay(&self) -> Duration {
        self.config.sync_interest_reexpress + uniform(self.config.jitter_min, self.config.jitter_max)
    }

    /// A jittered delay before reprocessing a sync Interest whose digest
    /// nobody recognized, uniform in `[unknown_digest_delay_min,
    /// unknown_digest_delay_max]`.
    pub fn unknown_digest_retry_delay(&self) -> Duration {
        uniform(self.config.unknown_digest_delay_min, self.config.unknown_digest_delay_max)
    }

    /// Whether the engine believes itself caught up with every known
    /// peer: every pipeline is done and no fetch/recovery is in flight.
    /// Tracks how long this has continuously held, for
    /// [`SyncEngine::should_snapshot`].
    pub async fn is_synchronized(&self, now: Instant) -> bool {
        let mut guard = self.state.lock().await;
        let synced = guard.fetch_states.values().all(|s| s.is_done());
        if synced {
            guard.synchronized_since.get_or_insert(now);
        } else {
            guard.synchronized_since = None;
        }
        synced
    }

    /// Whether the host should call [`SyncEngine::publish_snapshot`] now:
    /// the engine has been continuously synchronized for at least
    /// `quiescence_to_snapshot_delay`.
    pub async fn should_snapshot(&self, now: Instant) -> bool {
        let guard = self.state.lock().await;
        guard
            .synchronized_since
            .map(|since| now.saturating_duration_since(since) >= self.config.quiescence_to_snapshot_delay)
            .unwrap_or(false)
    }
}


fn cursors_of(tree: &SyncTree) -> Vec<CreatorCursor> {
    tree.iter()
        .map(|(creator, node)| CreatorCursor {
            creator: creator.clone(),
            last: node.last,
        })
        .collect()
}

fn uniform(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let span = (max - min).as_millis() as u64;
    let extra = rand::thread_rng().gen_range(0..=span);
    min + Duration::from_millis(extra)
}
