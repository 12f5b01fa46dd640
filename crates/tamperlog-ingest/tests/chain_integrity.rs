//! End-to-end behaviour of the ingest path against a file-backed database.

use std::sync::Arc;

use serde_json::json;
use tamperlog_broadcast::Broadcaster;
use tamperlog_chain::{ChainVerdict, TamperReason};
use tamperlog_db::{open_pool, DbPool, DbRuntimeSettings};
use tamperlog_ingest::{IngestCoordinator, IngestError};
use tamperlog_store::LogStore;

struct Harness {
    _dir: tempfile::TempDir,
    pool: DbPool,
    coord: Arc<IngestCoordinator>,
}

fn harness(capacity: usize) -> Harness {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let pool = open_pool(dir.path().join("events.db"), DbRuntimeSettings::default())
        .expect("event log should open");
    let coord = Arc::new(IngestCoordinator::new(
        LogStore::new(pool.clone()),
        Broadcaster::new(capacity),
    ));
    Harness {
        _dir: dir,
        pool,
        coord,
    }
}

#[test]
fn sequential_appends_form_an_intact_chain() {
    let h = harness(16);
    let mut prev: Option<String> = None;
    for n in 1..=10u64 {
        let entry = h
            .coord
            .append("order.created", "shop", json!({ "order": n }))
            .unwrap();
        assert_eq!(entry.sequence, n);
        assert_eq!(entry.prev_hash, prev);
        prev = Some(entry.hash);
    }

    assert_eq!(h.coord.verify().unwrap(), ChainVerdict::Intact { length: 10 });
}

#[test]
fn recent_returns_newest_first() {
    let h = harness(16);
    for kind in ["a", "b", "c", "d", "e"] {
        h.coord.append(kind, "app", json!({})).unwrap();
    }

    let kinds: Vec<String> = h
        .coord
        .recent(3, None)
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(kinds, vec!["e", "d", "c"]);

    let older: Vec<u64> = h
        .coord
        .recent(10, Some(3))
        .unwrap()
        .iter()
        .map(|e| e.sequence)
        .collect();
    assert_eq!(older, vec![2, 1]);
}

#[test]
fn validation_failure_leaves_log_unchanged() {
    let h = harness(16);
    h.coord.append("a", "app", json!(1)).unwrap();

    let err = h.coord.append("b", "", json!(2)).unwrap_err();
    assert!(err.is_client_error());

    let err = h.coord.append("b", "app", serde_json::Value::Null).unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));

    assert_eq!(h.coord.store().count().unwrap(), 1);
    let next = h.coord.append("c", "app", json!(3)).unwrap();
    assert_eq!(next.sequence, 2);
}

#[test]
fn payload_edit_is_detected_at_that_entry() {
    let h = harness(16);
    for n in 1..=5 {
        h.coord.append("reading", "sensor", json!({ "value": n })).unwrap();
    }

    {
        let conn = h.pool.get().unwrap();
        conn.execute_batch(
            "DROP TRIGGER event_log_no_update;
             UPDATE event_log SET data_payload = '{\"value\":99}' WHERE sequence = 3;",
        )
        .unwrap();
    }

    assert_eq!(
        h.coord.verify().unwrap(),
        ChainVerdict::TamperDetected {
            at: 3,
            reason: TamperReason::HashMismatch
        }
    );
}

#[test]
fn rehashed_edit_breaks_the_next_link() {
    let h = harness(16);
    for n in 1..=4 {
        h.coord.append("reading", "sensor", json!({ "value": n })).unwrap();
    }

    // Rewrite entry 2 and recompute its own hash so it is self-consistent.
    let genesis = h.coord.recent(1, Some(2)).unwrap().remove(0);
    let forged_hash = tamperlog_chain::compute_hash(
        "reading",
        "sensor",
        &tamperlog_chain::canonical_encode(&json!({ "value": 42 })),
        Some(genesis.hash.as_str()),
    );
    {
        let conn = h.pool.get().unwrap();
        conn.execute_batch("DROP TRIGGER event_log_no_update;").unwrap();
        conn.execute(
            "UPDATE event_log SET data_payload = ?1, hash = ?2 WHERE sequence = 2",
            rusqlite::params!["{\"value\":42}", forged_hash],
        )
        .unwrap();
    }

    assert_eq!(
        h.coord.verify().unwrap(),
        ChainVerdict::TamperDetected {
            at: 3,
            reason: TamperReason::BrokenLink
        }
    );
}

#[test]
fn deleted_entry_is_detected_as_gap() {
    let h = harness(16);
    for n in 1..=4 {
        h.coord.append("reading", "sensor", json!(n)).unwrap();
    }
    {
        let conn = h.pool.get().unwrap();
        conn.execute_batch(
            "DROP TRIGGER event_log_no_delete;
             DELETE FROM event_log WHERE sequence = 2;",
        )
        .unwrap();
    }

    assert_eq!(
        h.coord.verify().unwrap(),
        ChainVerdict::TamperDetected {
            at: 2,
            reason: TamperReason::OutOfSequence { found: 3 }
        }
    );
}

#[test]
fn unparseable_payload_is_detected_at_that_entry() {
    let h = harness(16);
    for n in 1..=3 {
        h.coord.append("reading", "sensor", json!({ "value": n })).unwrap();
    }
    {
        let conn = h.pool.get().unwrap();
        conn.execute_batch(
            "DROP TRIGGER event_log_no_update;
             UPDATE event_log SET data_payload = 'garbage' WHERE sequence = 2;",
        )
        .unwrap();
    }

    assert_eq!(
        h.coord.verify().unwrap(),
        ChainVerdict::TamperDetected {
            at: 2,
            reason: TamperReason::Undecodable
        }
    );
}

#[test]
fn unreadable_timestamp_is_detected_at_that_entry() {
    let h = harness(16);
    for n in 1..=3 {
        h.coord.append("reading", "sensor", json!(n)).unwrap();
    }
    {
        let conn = h.pool.get().unwrap();
        conn.execute_batch(
            "DROP TRIGGER event_log_no_update;
             UPDATE event_log SET timestamp = 'last tuesday' WHERE sequence = 3;",
        )
        .unwrap();
    }

    assert_eq!(
        h.coord.verify().unwrap(),
        ChainVerdict::TamperDetected {
            at: 3,
            reason: TamperReason::Undecodable
        }
    );
}

#[test]
fn float_payloads_survive_storage() {
    let h = harness(16);
    let payloads = [
        json!({ "x": 1.0715660391465826e-75 }),
        json!({ "x": 0.1, "y": -2.5e300, "z": 5e-324 }),
        json!([1.7976931348623157e308, 123456.789]),
    ];
    for payload in &payloads {
        let entry = h.coord.append("measurement", "lab", payload.clone()).unwrap();
        assert_eq!(&entry.data_payload, payload);
    }

    let stored = h.coord.recent(10, None).unwrap();
    for (entry, payload) in stored.iter().rev().zip(&payloads) {
        assert_eq!(&entry.data_payload, payload);
    }
    assert_eq!(h.coord.verify().unwrap(), ChainVerdict::Intact { length: 3 });
}

#[test]
fn storage_failure_commits_and_publishes_nothing() {
    let h = harness(16);
    let mut sub = h.coord.subscribe();
    h.coord.append("a", "app", json!(1)).unwrap();
    assert!(sub.try_recv().is_some());

    {
        let conn = h.pool.get().unwrap();
        conn.execute_batch("ALTER TABLE event_log RENAME TO event_log_moved;")
            .unwrap();
    }

    let err = h.coord.append("b", "app", json!(2)).unwrap_err();
    assert!(matches!(err, IngestError::Storage(_)));
    assert!(!err.is_client_error());
    assert!(sub.try_recv().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_never_fork() {
    let h = harness(256);
    let mut sub = h.coord.subscribe();

    let mut handles = Vec::new();
    for n in 0..100u64 {
        let coord = Arc::clone(&h.coord);
        handles.push(tokio::task::spawn_blocking(move || {
            coord.append("tick", &format!("worker-{}", n % 7), json!({ "n": n }))
        }));
    }

    let mut sequences = Vec::new();
    for handle in handles {
        sequences.push(handle.await.unwrap().unwrap().sequence);
    }
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=100).collect::<Vec<u64>>());

    assert_eq!(h.coord.verify().unwrap(), ChainVerdict::Intact { length: 100 });

    // Notifications arrive in commit order, not completion order.
    for expected in 1..=100u64 {
        assert_eq!(sub.recv().await.unwrap().sequence, expected);
    }
}

#[tokio::test]
async fn subscriber_sees_only_entries_after_subscribing() {
    let h = harness(16);
    h.coord.append("a", "app", json!(1)).unwrap();

    let mut sub = h.coord.subscribe();
    let b = h.coord.append("b", "app", json!(2)).unwrap();
    let c = h.coord.append("c", "app", json!(3)).unwrap();

    assert_eq!(*sub.recv().await.unwrap(), b);
    assert_eq!(*sub.recv().await.unwrap(), c);
    assert!(sub.try_recv().is_none());
}

#[test]
fn slow_subscriber_never_blocks_append() {
    let h = harness(1);
    let mut slow = h.coord.subscribe();

    for n in 1..=5 {
        h.coord.append("burst", "app", json!(n)).unwrap();
    }

    assert_eq!(slow.try_recv().unwrap().sequence, 1);
    assert!(slow.try_recv().is_none());
    assert_eq!(h.coord.broadcaster().subscriber_count(), 1);
    assert_eq!(h.coord.store().count().unwrap(), 5);
}
