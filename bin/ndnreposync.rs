//! `ndnreposync` — host process and control tool for the anti-entropy sync
//! engine.
//!
//! With no control flag, runs as a daemon: hosts a [`SyncEngine`] against a
//! durable `SqliteTreeStore` and drives its periodic maintenance (PIT sweep,
//! quiescence/snapshot check) on a one-second tick. With `-s`/`-c`/`--stop`,
//! mirrors the original `ndnreposync` control tool: sends a single
//! start/check/stop control command to a freshly built engine and exits
//! nonzero unless the reply status is success (`100`/`200`/`300`), the same
//! convention the original command-line tool uses against a remote daemon.

use anyhow::{Context, Result};
use clap::Parser;
use repo_sync::command::{ControlCommand, ControlStatus, StartParameters};
use repo_sync::config::SyncConfigFile;
use repo_sync::identifiers::Name;
use repo_sync::store::SqliteTreeStore;
use repo_sync::testkit::{InMemoryDataStore, RecordingNetwork};
use repo_sync::validator::AllowAllValidator;
use repo_sync::SyncEngine;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// NDN repo-ng style anti-entropy synchronization daemon and control tool.
#[derive(Parser, Debug)]
#[command(name = "ndnreposync")]
#[command(about = "Multi-writer anti-entropy sync for a content-addressed object repository")]
struct Cli {
    /// Name prefix this process listens and advertises sync state on.
    repo_prefix: String,

    /// Send a `start` control command instead of running as a daemon.
    #[arg(short = 's', long = "start", conflicts_with_all = ["check", "stop"])]
    start: bool,

    /// Send a `check` control command instead of running as a daemon.
    #[arg(short = 'c', long = "check", conflicts_with_all = ["start", "stop"])]
    check: bool,

    /// Send a `stop` control command instead of running as a daemon.
    #[arg(long = "stop", conflicts_with_all = ["start", "check"])]
    stop: bool,

    /// Control-command reply lifetime in milliseconds; exceeding it without
    /// a reply is treated as a timeout and exits nonzero. Unused in daemon
    /// mode.
    #[arg(short = 'l', long = "lifetime", default_value_t = 4000)]
    lifetime_ms: u64,

    /// Creator name to run under: the daemon's own identity, or (with
    /// `-s`) the override `start` should apply before appending its random
    /// uniqueness suffix.
    #[arg(short = 'n', long = "creator")]
    creator: Option<String>,

    /// Path to the SQLite database backing the digest tree.
    #[arg(long = "store", default_value = "ndn_repo_sync.db")]
    store_path: PathBuf,

    /// Path to a TOML file overriding the protocol's timing defaults.
    #[arg(long = "config")]
    config_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let exit_code = runtime.block_on(run(cli))?;
    std::process::exit(exit_code);
}

fn load_config(config_path: &Option<PathBuf>) -> Result<repo_sync::config::SyncConfig> {
    match config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let file: SyncConfigFile = toml::from_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            Ok(file.resolve())
        }
        None => Ok(SyncConfigFile::default().resolve()),
    }
}

/// Dispatches to either the control-command path (`-s`/`-c`/`--stop`) or the
/// daemon loop, returning the process exit code.
async fn run(cli: Cli) -> Result<i32> {
    let config = load_config(&cli.config_path)?;
    let sync_prefix = Name::parse(&cli.repo_prefix);
    let creator = cli
        .creator
        .as_deref()
        .map(|c| sync_prefix.append_str(c))
        .unwrap_or_else(|| sync_prefix.append_str("self"));

    if cli.start || cli.check || cli.stop {
        return send_control_command(&cli, sync_prefix, creator, config).await;
    }

    run_daemon(sync_prefix, creator, config, cli.store_path).await?;
    Ok(0)
}

/// Build a throwaway in-memory engine and exercise a single control command
/// against it, the way the original control tool exercises one against a
/// remote daemon over the network. Exits nonzero on anything but success.
async fn send_control_command(cli: &Cli, sync_prefix: Name, creator: Name, config: repo_sync::config::SyncConfig) -> Result<i32> {
    let engine = SyncEngine::new(
        config,
        sync_prefix,
        creator,
        RecordingNetwork::new(),
        InMemoryDataStore::new(),
        AllowAllValidator,
        repo_sync::store::InMemoryTreeStore::new(),
    )?;

    let command = if cli.start {
        ControlCommand::Start(StartParameters {
            creator_override: cli.creator.as_deref().map(Name::parse),
        })
    } else if cli.check {
        ControlCommand::Check
    } else {
        ControlCommand::Stop
    };

    let lifetime = Duration::from_millis(cli.lifetime_ms);
    let status = tokio::time::timeout(lifetime, engine.handle_control_command(&command.encode()?))
        .await
        .context("control command timed out waiting for a reply")?;

    info!(status = status.code(), "control command reply");
    Ok(match status {
        ControlStatus::StartedRunning | ControlStatus::CheckRunning | ControlStatus::StoppedOrAcknowledged => 0,
        ControlStatus::ValidationFailed | ControlStatus::DecodeFailed => 1,
    })
}

/// Runs the engine as a long-lived daemon against a durable store,
/// periodically sweeping the PIT and checking for quiescence-triggered
/// snapshots until the process is killed.
async fn run_daemon(sync_prefix: Name, creator: Name, config: repo_sync::config::SyncConfig, store_path: PathBuf) -> Result<()> {
    let store = SqliteTreeStore::open(&store_path).with_context(|| format!("opening tree store at {}", store_path.display()))?;

    info!(
        repo_prefix = %sync_prefix,
        creator = %creator,
        store = %store_path.display(),
        "starting ndnreposync"
    );

    // A real deployment plugs in an NDN forwarder face here; this binary
    // ships with the in-memory `testkit` doubles so it runs standalone for
    // local experimentation.
    let engine = Arc::new(SyncEngine::new(
        config,
        sync_prefix,
        creator,
        RecordingNetwork::new(),
        InMemoryDataStore::new(),
        AllowAllValidator,
        store,
    )?);
    engine.handle_control_command(&ControlCommand::Start(StartParameters::default()).encode()?).await;

    // The outgoing sync loop (spec §4.7): re-express the sync Interest for
    // our current root digest on `next_reexpress_delay()`'s cadence, for
    // as long as `start` has been acknowledged and no `stop` has run.
    let reexpress_engine = engine.clone();
    tokio::spawn(async move {
        loop {
            let delay = reexpress_engine.next_reexpress_delay();
            tokio::time::sleep(delay).await;
            if !reexpress_engine.is_running().await {
                continue;
            }
            if let Err(err) = reexpress_engine.express_sync_interest().await {
                warn!(error = %err, "failed to express outgoing sync Interest");
            }
        }
    });

    loop {
        let now = std::time::Instant::now();
        for (creator, seq) in engine.sweep_pit(now).await {
            if let Err(err) = engine.on_fetch_timeout(&creator, seq).await {
                warn!(%creator, seq, error = %err, "fetch timeout handling failed");
            }
        }
        if engine.is_synchronized(now).await && engine.should_snapshot(now).await {
            engine.publish_snapshot().await?;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
