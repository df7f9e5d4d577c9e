//! Audit ledger behaviour against a real SQLite file

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use rulesync_ledger::{
    AuditLedger, DeploymentAction, DeploymentRecord, DeploymentSink, Error, FilesApplied, Outcome,
};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::{TempDir, tempdir};

fn ledger() -> (TempDir, AuditLedger) {
    let dir = tempdir().unwrap();
    let ledger = AuditLedger::open(dir.path().join("state").join("ledger.sqlite3")).unwrap();
    (dir, ledger)
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
}

fn attempt(node: &str, started: DateTime<Utc>, outcome: Outcome) -> DeploymentRecord {
    let mut record = DeploymentRecord::start(node);
    record.started_at = started;
    let detail = (!outcome.is_success()).then(|| "liveness check failed".to_string());
    record.finish_at(outcome, detail, started + Duration::seconds(5));
    record
}

#[test]
fn deployment_count_matches_attempts() {
    let (_dir, ledger) = ledger();
    let outcomes = [
        Outcome::Success,
        Outcome::Failed,
        Outcome::Success,
        Outcome::RolledBack,
        Outcome::Success,
    ];
    for (i, outcome) in outcomes.iter().enumerate() {
        ledger
            .record_deployment(&attempt("node-a", at(10, i as u32), *outcome))
            .unwrap();
    }

    let node = ledger.node("node-a").unwrap().unwrap();
    assert_eq!(node.deployment_count, 5);
    assert_eq!(node.first_seen, at(10, 0));
    assert_eq!(node.last_seen, at(10, 4) + Duration::seconds(5));
    assert_eq!(node.last_success_at, Some(at(10, 4) + Duration::seconds(5)));
    assert!(node.active);

    let stats = ledger.query_stats_at(7, at(11, 0)).unwrap();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.successful, 3);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.rolled_back, 1);
    assert_eq!(stats.successful + stats.failed, stats.total);
    assert_eq!(stats.success_rate, 60.0);
}

#[test]
fn failures_do_not_move_last_success() {
    let (_dir, ledger) = ledger();
    ledger
        .record_deployment(&attempt("node-a", at(1, 8), Outcome::Success))
        .unwrap();
    ledger
        .record_deployment(&attempt("node-a", at(2, 8), Outcome::Failed))
        .unwrap();

    let node = ledger.node("node-a").unwrap().unwrap();
    assert_eq!(node.last_success_at, Some(at(1, 8) + Duration::seconds(5)));
    assert_eq!(node.last_seen, at(2, 8) + Duration::seconds(5));
    assert!(node.last_seen >= node.first_seen);
}

#[test]
fn stats_respect_window_and_break_down() {
    let (_dir, ledger) = ledger();
    ledger
        .record_deployment(&attempt("old", at(1, 12), Outcome::Success))
        .unwrap();
    ledger
        .record_deployment(&attempt("node-a", at(9, 12), Outcome::Success))
        .unwrap();
    ledger
        .record_deployment(&attempt("node-b", at(9, 13), Outcome::Failed))
        .unwrap();
    ledger
        .record_deployment(&attempt("node-a", at(10, 9), Outcome::RolledBack))
        .unwrap();

    let stats = ledger.query_stats_at(3, at(11, 0)).unwrap();

    assert_eq!(stats.total, 3);
    let per_node: Vec<_> = stats
        .by_node
        .iter()
        .map(|n| (n.node_id.as_str(), n.total, n.successful, n.failed))
        .collect();
    assert_eq!(per_node, vec![("node-a", 2, 1, 1), ("node-b", 1, 0, 1)]);

    let per_day: Vec<_> = stats
        .daily
        .iter()
        .map(|d| (d.day.to_string(), d.total, d.successful))
        .collect();
    assert_eq!(
        per_day,
        vec![("2024-05-09".to_string(), 2, 1), ("2024-05-10".to_string(), 1, 0)]
    );
}

#[test]
fn empty_ledger_has_zero_rate() {
    let (_dir, ledger) = ledger();
    let stats = ledger.query_stats(7).unwrap();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.success_rate, 0.0);
    assert!(stats.by_node.is_empty());
}

#[test]
fn unfinished_records_are_rejected() {
    let (_dir, ledger) = ledger();
    let record = DeploymentRecord::start("node-a");
    let err = ledger.record_deployment(&record).unwrap_err();
    assert!(matches!(err, Error::Unfinished { id } if id == record.id));
    assert!(ledger.node("node-a").unwrap().is_none());
}

#[test]
fn records_round_trip_through_storage() {
    let (_dir, ledger) = ledger();
    let mut record = attempt("node-a", at(3, 3), Outcome::Success);
    record.action = DeploymentAction::Deploy;
    record.files_applied = FilesApplied {
        rules: 2,
        decoders: 1,
    };
    record.backup_path = Some("/backup/rulesync-20240503_030000_000000".into());
    record.generation = Some("sha256:abc".into());

    let id = ledger.record_deployment(&record).unwrap();
    assert_eq!(id, record.id);

    let stored = ledger.recent_deployments(10).unwrap();
    assert_eq!(stored, vec![record]);
}

#[test]
fn deployments_are_append_only() {
    let (_dir, ledger) = ledger();
    let record = attempt("node-a", at(3, 3), Outcome::Success);
    ledger.record_deployment(&record).unwrap();

    let conn = rusqlite_connection(&ledger);
    assert!(
        conn.execute("UPDATE deployments SET outcome = 'FAILED'", [])
            .is_err()
    );
    assert!(conn.execute("DELETE FROM deployments", []).is_err());

    // A duplicate id is a second append of the same attempt.
    assert!(ledger.record_deployment(&record).is_err());
    assert_eq!(ledger.node("node-a").unwrap().unwrap().deployment_count, 1);
}

#[test]
fn nodes_are_listed_most_recent_first() {
    let (_dir, ledger) = ledger();
    ledger
        .record_deployment(&attempt("early", at(1, 0), Outcome::Success))
        .unwrap();
    ledger
        .record_deployment(&attempt("late", at(5, 0), Outcome::Success))
        .unwrap();
    ledger
        .record_deployment(&attempt("middle", at(3, 0), Outcome::Failed))
        .unwrap();

    let names: Vec<_> = ledger
        .list_nodes()
        .unwrap()
        .into_iter()
        .map(|n| n.node_id)
        .collect();
    assert_eq!(names, vec!["late", "middle", "early"]);
}

#[test]
fn registration_and_active_flag() {
    let (_dir, ledger) = ledger();
    ledger.register_node("node-a", Some("edge collector")).unwrap();

    let node = ledger.node("node-a").unwrap().unwrap();
    assert_eq!(node.deployment_count, 0);
    assert_eq!(node.description.as_deref(), Some("edge collector"));

    assert!(ledger.set_node_active("node-a", false).unwrap());
    assert!(!ledger.node("node-a").unwrap().unwrap().active);
    assert!(!ledger.set_node_active("ghost", false).unwrap());
}

#[test]
fn concurrent_attempts_for_one_node_are_all_counted() {
    let (_dir, ledger) = ledger();
    let threads = 6;
    let per_thread = 5;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let ledger = ledger.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for i in 0..per_thread {
                    let outcome = if (t + i) % 2 == 0 {
                        Outcome::Success
                    } else {
                        Outcome::Failed
                    };
                    let mut record = DeploymentRecord::start("shared");
                    record.finish(outcome, None);
                    ledger.record_deployment(&record).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let expected = (threads * per_thread) as u64;
    let node = ledger.node("shared").unwrap().unwrap();
    assert_eq!(node.deployment_count, expected);

    let stats = ledger.query_stats(1).unwrap();
    assert_eq!(stats.total, expected);
    assert_eq!(stats.successful + stats.failed, expected);
}

fn rusqlite_connection(ledger: &AuditLedger) -> rusqlite::Connection {
    rusqlite::Connection::open(ledger.path()).unwrap()
}
