//! Integration tests driving the full sync/fetch/recovery/snapshot
//! protocol between two in-process peers wired together through
//! `repo_sync::testkit`'s in-memory doubles.

use repo_sync::action::ActionKind;
use repo_sync::config::SyncConfig;
use repo_sync::engine::SyncEngine;
use repo_sync::identifiers::Name;
use repo_sync::store::InMemoryTreeStore;
use repo_sync::testkit::{InMemoryDataStore, NetworkEvent, RecordingNetwork};
use repo_sync::validator::AllowAllValidator;
use repo_sync::wire::SyncWirePayload;
use std::sync::Arc;
use std::time::{Duration, Instant};

type TestEngine = SyncEngine<Arc<RecordingNetwork>, Arc<InMemoryDataStore>, AllowAllValidator, InMemoryTreeStore>;

fn make_engine(creator: &str) -> (TestEngine, Arc<RecordingNetwork>, Arc<InMemoryDataStore>) {
    let net = Arc::new(RecordingNetwork::new());
    let store = Arc::new(InMemoryDataStore::new());
    let engine = SyncEngine::new(
        SyncConfig::default(),
        Name::parse("/repo"),
        Name::parse(creator),
        net.clone(),
        store.clone(),
        AllowAllValidator,
        InMemoryTreeStore::new(),
    )
    .expect("engine construction cannot fail for a fresh in-memory store");
    (engine, net, store)
}

fn seq_from_name(name: &Name) -> u64 {
    let last = name.components().last().expect("name has a component");
    String::from_utf8_lossy(last).parse().expect("last component is a sequence number")
}

fn is_fetch_interest(name: &Name) -> bool {
    name.to_string().contains("/fetch/")
}

/// S1: a peer with zero actions discovers and fetches a single action
/// from a peer that has one.
#[tokio::test]
async fn two_peer_basic_sync_converges() {
    let (a, _a_net, a_store) = make_engine("/repo/a");
    let (b, b_net, b_store) = make_engine("/repo/b");

    let action = a
        .execute(ActionKind::Insertion, Name::parse("/example/data/x"), 1)
        .await
        .unwrap();

    let digest_b = b.root_digest().await;
    let now = Instant::now();
    let outcome = a.on_sync_interest(digest_b, now).await.unwrap();
    let resp = match outcome {
        repo_sync::engine::SyncInterestOutcome::Respond(msg) => match msg.payload {
            SyncWirePayload::Sync(resp) => resp,
            _ => panic!("expected a sync payload"),
        },
        repo_sync::engine::SyncInterestOutcome::Pending => panic!("digests differ, must respond"),
        repo_sync::engine::SyncInterestOutcome::Unknown => panic!("digest is the sentinel, must be found in the log"),
    };
    b.on_sync_data(resp).await.unwrap();

    let events = b_net.drain();
    let fetch_names: Vec<Name> = events
        .into_iter()
        .filter_map(|ev| match ev {
            NetworkEvent::Interest { name, .. } if is_fetch_interest(&name) => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(fetch_names.len(), 1);

    let seq = seq_from_name(&fetch_names[0]);
    let fetch_msg = a.on_fetch_interest(&action.creator, seq).await.unwrap().unwrap();
    let fetch_resp = match fetch_msg.payload {
        SyncWirePayload::Fetch(resp) => resp,
        _ => panic!("expected a fetch payload"),
    };
    b.on_fetch_data(fetch_resp).await.unwrap();

    assert_eq!(a.root_digest().await, b.root_digest().await);
    assert_eq!(a_store.len(), b_store.len());
    assert!(b.is_synchronized(Instant::now()).await);
}

/// S2: a late joiner with zero actions of its own converges against two
/// existing peers one at a time, ending up with the exact per-creator
/// cursors both peers have produced — not an aggregate or a guess.
#[tokio::test]
async fn late_joiner_converges_via_actions_from_every_peer() {
    let (p0, _p0_net, _p0_store) = make_engine("/repo/p0");
    let (p1, _p1_net, _p1_store) = make_engine("/repo/p1");
    let (p2, p2_net, _p2_store) = make_engine("/repo/p2");

    p0.execute(ActionKind::Insertion, Name::parse("/example/data/a"), 1)
        .await
        .unwrap();
    p0.execute(ActionKind::Insertion, Name::parse("/example/data/b"), 1)
        .await
        .unwrap();
    p1.execute(ActionKind::Insertion, Name::parse("/example/data/c"), 1)
        .await
        .unwrap();

    let p0_creator = Name::parse("/repo/p0");
    let p1_creator = Name::parse("/repo/p1");
    let p2_creator = Name::parse("/repo/p2");

    // p2 syncs against p0 first: its own fetch Interests land on its own
    // network (p2_net), answered directly by p0.
    let digest_p2 = p2.root_digest().await;
    let outcome = p0.on_sync_interest(digest_p2, Instant::now()).await.unwrap();
    let resp = match outcome {
        repo_sync::engine::SyncInterestOutcome::Respond(msg) => match msg.payload {
            SyncWirePayload::Sync(r) => r,
            _ => unreachable!(),
        },
        repo_sync::engine::SyncInterestOutcome::Pending => panic!("digests differ, must respond"),
        repo_sync::engine::SyncInterestOutcome::Unknown => panic!("joiner's zero digest is always the sentinel"),
    };
    p2.on_sync_data(resp).await.unwrap();

    loop {
        let batch: Vec<Name> = p2_net
            .drain()
            .into_iter()
            .filter_map(|ev| match ev {
                NetworkEvent::Interest { name, .. } if is_fetch_interest(&name) => Some(name),
                _ => None,
            })
            .collect();
        if batch.is_empty() {
            break;
        }
        for name in batch {
            let seq = seq_from_name(&name);
            let fetch_msg = p0.on_fetch_interest(&p0_creator, seq).await.unwrap().unwrap();
            let fetch_resp = match fetch_msg.payload {
                SyncWirePayload::Fetch(r) => r,
                _ => unreachable!(),
            };
            p2.on_fetch_data(fetch_resp).await.unwrap();
        }
    }

    assert_eq!(p2.last_seq(&p0_creator).await, 2);
    assert_eq!(p2.last_seq(&p1_creator).await, 0);
    assert_eq!(p2.last_seq(&p2_creator).await, 0);

    // p2's digest now reflects p0's actions, which p1 never produced and
    // so cannot find in its own ActionLog: p1 must treat it as truly
    // unknown and fall back to the recovery path instead of a plain sync
    // response.
    let digest_p2 = p2.root_digest().await;
    let outcome = p1.on_sync_interest(digest_p2, Instant::now()).await.unwrap();
    assert_eq!(outcome, repo_sync::engine::SyncInterestOutcome::Unknown);

    let recovery_msg = p1.on_recovery_interest().await.unwrap();
    let recovery_resp = match recovery_msg.payload {
        SyncWirePayload::Recovery(r) => r,
        _ => unreachable!(),
    };
    p2.on_recovery_data(recovery_resp).await.unwrap();

    loop {
        let batch: Vec<Name> = p2_net
            .drain()
            .into_iter()
            .filter_map(|ev| match ev {
                NetworkEvent::Interest { name, .. } if is_fetch_interest(&name) => Some(name),
                _ => None,
            })
            .collect();
        if batch.is_empty() {
            break;
        }
        for name in batch {
            let seq = seq_from_name(&name);
            let fetch_msg = p1.on_fetch_interest(&p1_creator, seq).await.unwrap().unwrap();
            let fetch_resp = match fetch_msg.payload {
                SyncWirePayload::Fetch(r) => r,
                _ => unreachable!(),
            };
            p2.on_fetch_data(fetch_resp).await.unwrap();
        }
    }

    assert_eq!(p2.last_seq(&p0_creator).await, 2);
    assert_eq!(p2.last_seq(&p1_creator).await, 1);
    assert_eq!(p2.last_seq(&p2_creator).await, 0);
}

/// S4: a pipeline of width 3 against 20 outstanding insertions issues
/// exactly 20 fetch Interests, never more than 3 outstanding at once.
#[tokio::test]
async fn pipelined_fetch_issues_exactly_one_interest_per_action() {
    let (a, _a_net, _a_store) = make_engine("/repo/a");
    let (b, b_net, _b_store) = make_engine("/repo/b");

    let creator = Name::parse("/repo/a");
    for i in 0..20 {
        a.execute(ActionKind::Insertion, Name::parse(&format!("/example/data/{i}")), 1)
            .await
            .unwrap();
    }

    let digest_b = b.root_digest().await;
    let outcome = a.on_sync_interest(digest_b, Instant::now()).await.unwrap();
    let resp = match outcome {
        repo_sync::engine::SyncInterestOutcome::Respond(msg) => match msg.payload {
            SyncWirePayload::Sync(r) => r,
            _ => unreachable!(),
        },
        repo_sync::engine::SyncInterestOutcome::Pending => panic!("digests differ, must respond"),
        repo_sync::engine::SyncInterestOutcome::Unknown => panic!("digest is the sentinel, must be found in the log"),
    };
    b.on_sync_data(resp).await.unwrap();

    let mut total_fetches = 0u64;
    loop {
        let events = b_net.drain();
        let batch: Vec<Name> = events
            .into_iter()
            .filter_map(|ev| match ev {
                NetworkEvent::Interest { name, .. } if is_fetch_interest(&name) => Some(name),
                _ => None,
            })
            .collect();
        if batch.is_empty() {
            break;
        }
        assert!(batch.len() <= 3, "pipeline width must bound outstanding fetches");
        for name in batch {
            total_fetches += 1;
            let seq = seq_from_name(&name);
            let fetch_msg = a.on_fetch_interest(&creator, seq).await.unwrap().unwrap();
            let fetch_resp = match fetch_msg.payload {
                SyncWirePayload::Fetch(r) => r,
                _ => unreachable!(),
            };
            b.on_fetch_data(fetch_resp).await.unwrap();
        }
    }

    assert_eq!(total_fetches, 20);
    assert_eq!(a.root_digest().await, b.root_digest().await);
}

/// S3: a snapshot announcement lets a peer converge without individually
/// fetching every prior action, and is idempotent under a replayed
/// duplicate.
#[tokio::test]
async fn snapshot_bootstrap_converges_without_per_action_fetch() {
    let (a, a_net, _a_store) = make_engine("/repo/a");
    let (b, _b_net, b_store) = make_engine("/repo/b");

    for i in 0..5 {
        a.execute(ActionKind::Insertion, Name::parse(&format!("/example/data/{i}")), 1)
            .await
            .unwrap();
    }

    a.publish_snapshot().await.unwrap();

    let events = a_net.drain();
    let announcement = events
        .into_iter()
        .find_map(|ev| match ev {
            NetworkEvent::Data { content, .. } => {
                let msg = repo_sync::wire::SyncWireMessage::decode(&content).ok()?;
                match msg.payload {
                    SyncWirePayload::Snapshot(s) => Some(s),
                    _ => None,
                }
            }
            _ => None,
        })
        .expect("a snapshot Data packet was published");

    let now = Instant::now();
    b.on_snapshot_data(announcement.clone(), now).await.unwrap();
    assert_eq!(a.root_digest().await, b.root_digest().await);
    assert_eq!(b_store.len(), 5, "snapshot items must reconcile the data store, not just the tree cursors");

    // A replayed duplicate (same snapshot_creator/snapshot_seq) must be a
    // no-op, not a second pipeline.
    b.on_snapshot_data(announcement, now).await.unwrap();
    assert!(b.is_synchronized(Instant::now()).await);
    assert_eq!(b_store.len(), 5);
}

/// A snapshot's `(dataName, status)` enumeration reconciles deletions too:
/// a peer that still has an object a snapshot reports `Deleted` removes it
/// locally, matching spec §4.7's snapshot comparison table.
#[tokio::test]
async fn snapshot_items_reconcile_a_remote_deletion() {
    let (a, a_net, _a_store) = make_engine("/repo/a");
    let (b, _b_net, b_store) = make_engine("/repo/b");

    let data_name = Name::parse("/example/data/x");
    a.execute(ActionKind::Insertion, data_name.clone(), 1).await.unwrap();
    a.execute(ActionKind::Deletion, data_name.clone(), 1).await.unwrap();
    b_store.seed_existing(&data_name);
    assert_eq!(b_store.len(), 1);

    a.publish_snapshot().await.unwrap();
    let announcement = a_net
        .drain()
        .into_iter()
        .find_map(|ev| match ev {
            NetworkEvent::Data { content, .. } => {
                let msg = repo_sync::wire::SyncWireMessage::decode(&content).ok()?;
                match msg.payload {
                    SyncWirePayload::Snapshot(s) => Some(s),
                    _ => None,
                }
            }
            _ => None,
        })
        .expect("a snapshot Data packet was published");

    b.on_snapshot_data(announcement, Instant::now()).await.unwrap();
    assert_eq!(b_store.len(), 0, "remote Deleted + local Existed must delete locally");
}

/// S5: recovery retransmission backs off exponentially from the
/// configured initial interval.
#[tokio::test]
async fn recovery_backoff_doubles_each_retransmit() {
    let (a, _net, _store) = make_engine("/repo/a");
    let creator = Name::parse("/repo/b");

    let first = a.express_recovery(&creator).await.unwrap();
    let second = a.express_recovery(&creator).await.unwrap();
    let third = a.express_recovery(&creator).await.unwrap();

    assert_eq!(first, Duration::from_millis(200));
    assert_eq!(second, Duration::from_millis(400));
    assert_eq!(third, Duration::from_millis(800));
}

/// S6: a fetch that times out `retry_times` times without ever
/// succeeding is reported as exhausted rather than retried forever.
#[tokio::test]
async fn fetch_exhaustion_after_configured_retries() {
    let (a, _a_net, _a_store) = make_engine("/repo/a");
    let (b, _b_net, _b_store) = make_engine("/repo/b");

    a.execute(ActionKind::Insertion, Name::parse("/example/data/x"), 1)
        .await
        .unwrap();

    let digest_b = b.root_digest().await;
    let outcome = a.on_sync_interest(digest_b, Instant::now()).await.unwrap();
    let resp = match outcome {
        repo_sync::engine::SyncInterestOutcome::Respond(msg) => match msg.payload {
            SyncWirePayload::Sync(r) => r,
            _ => unreachable!(),
        },
        repo_sync::engine::SyncInterestOutcome::Pending => panic!("digests differ, must respond"),
        repo_sync::engine::SyncInterestOutcome::Unknown => panic!("digest is the sentinel, must be found in the log"),
    };
    b.on_sync_data(resp).await.unwrap();

    let creator = Name::parse("/repo/a");
    for _ in 0..3 {
        b.on_fetch_timeout(&creator, 1).await.unwrap();
    }
    let result = b.on_fetch_timeout(&creator, 1).await;
    assert!(matches!(result, Err(repo_sync::SyncError::FetchExhausted { .. })));
}
