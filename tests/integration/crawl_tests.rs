//! Integration tests for the crawl controller
//!
//! These tests drive the full coordinator against a deterministic in-memory
//! directory and check coverage, dedup, isolation and resume end-to-end.

mod common;

use common::{test_config, FakeDirectory, FakeFactory};
use directory_sweep::crawler::Coordinator;
use directory_sweep::state::PrefixState;
use directory_sweep::storage::{RunStatus, SqliteStorage, Storage};
use directory_sweep::SweepError;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn open(path: &Path) -> SqliteStorage {
    SqliteStorage::new(path, Duration::from_secs(5)).expect("Failed to open database")
}

/// Every three-letter combination over `abc`, suffixed so names are longer than any prefix
fn dense_names() -> Vec<String> {
    let letters = ['a', 'b', 'c'];
    let mut names = Vec::new();
    for x in letters {
        for y in letters {
            for z in letters {
                names.push(format!("{}{}{}a", x, y, z));
            }
        }
    }
    names
}

#[tokio::test]
async fn test_truncated_prefix_is_split_until_complete() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sweep.db");

    // 'a' has 5 entries but the site shows at most 4
    let directory = FakeDirectory::new(&["aaa", "aab", "aba", "abb", "abx", "bba"], 2, 4);
    let factory = FakeFactory::new(directory);
    let activity = factory.activity();

    let config = test_config(&db_path, "ab", &["a"], 4, 0, 2);
    let mut coordinator =
        Coordinator::new(config, factory, "hash", true).expect("Failed to create coordinator");
    let report = coordinator.run().await.expect("Crawl failed");

    let searched: HashSet<String> = activity
        .lock()
        .unwrap()
        .searched_prefixes()
        .into_iter()
        .collect();
    let expected: HashSet<String> = ["a", "aa", "ab"].iter().map(|s| s.to_string()).collect();
    assert_eq!(searched, expected);

    assert_eq!(report.status, RunStatus::Completed);
    let expansions = report.expansions();
    assert_eq!(expansions.len(), 1);
    assert_eq!(expansions[0].prefix, "a");
    assert_eq!(expansions[0].children, 2);

    // Every 'a' record is stored once, including the one hidden behind the ceiling
    let storage = open(&db_path);
    assert_eq!(storage.count_records().unwrap(), 5);
    assert_eq!(storage.count_complete_records().unwrap(), 5);

    // Summary fields survive the later detail-only upsert
    let record = storage
        .get_record("10004")
        .unwrap()
        .expect("abx should be stored");
    assert_eq!(record.name.as_deref(), Some("abx"));
    assert_eq!(record.search_prefix.as_deref(), Some("ab"));
    assert!(record.has_complete_detail());
}

#[tokio::test]
async fn test_every_prefix_is_dispatched_once() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sweep.db");

    let names = dense_names();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let factory = FakeFactory::new(FakeDirectory::new(&name_refs, 2, 5));
    let activity = factory.activity();

    let config = test_config(&db_path, "abc", &["a", "b", "c"], 5, 0, 3);
    let mut coordinator = Coordinator::new(config, factory, "hash", true).unwrap();
    let report = coordinator.run().await.unwrap();

    let searched = activity.lock().unwrap().searched_prefixes();
    let distinct: HashSet<&String> = searched.iter().collect();
    assert_eq!(searched.len(), distinct.len(), "a prefix was dispatched twice");

    // 3 seeds, each split into 3 children that are complete
    assert_eq!(searched.len(), 12);
    assert_eq!(report.prefixes.len(), 12);
    assert_eq!(report.expansions().len(), 3);
    assert!(coordinator.frontier().is_exhausted());

    let storage = open(&db_path);
    assert_eq!(storage.count_records().unwrap(), 27);

    let frontier = storage.load_frontier(report.run_id).unwrap();
    assert_eq!(frontier.len(), 12);
    assert!(frontier.iter().all(|e| e.state.is_terminal()));
}

#[tokio::test]
async fn test_threshold_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sweep.db");

    // Ceiling 4, margin 1: three records is truncated, two is complete
    let directory = FakeDirectory::new(&["aaa", "abb", "baa", "bab", "bba"], 10, 4);
    let factory = FakeFactory::new(directory);
    let activity = factory.activity();

    let config = test_config(&db_path, "ab", &["a", "b"], 4, 1, 1);
    let mut coordinator = Coordinator::new(config, factory, "hash", true).unwrap();
    coordinator.run().await.unwrap();

    let searched: HashSet<String> = activity
        .lock()
        .unwrap()
        .searched_prefixes()
        .into_iter()
        .collect();
    let expected: HashSet<String> = ["a", "b", "ba", "bb"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(searched, expected);
}

#[tokio::test]
async fn test_workers_use_isolated_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sweep.db");

    let directory = FakeDirectory::new(
        &["aaa", "aab", "aac", "bba", "bbb", "cca", "ccb", "dda", "ddb"],
        1,
        100,
    )
    .with_page_delay(Duration::from_millis(20));
    let factory = FakeFactory::new(directory);
    let activity = factory.activity();

    let config = test_config(&db_path, "abcd", &["a", "b", "c", "d"], 100, 5, 2);
    let mut coordinator = Coordinator::new(config, factory, "hash", true).unwrap();
    coordinator.run().await.unwrap();

    let activity = activity.lock().unwrap();

    // One session per worker, never shared
    assert_eq!(activity.sessions.len(), 2);
    let session_ids: HashSet<&String> = activity.sessions.iter().map(|(_, _, s)| s).collect();
    assert_eq!(session_ids.len(), 2);
    let workers: HashSet<u32> = activity.sessions.iter().map(|(w, _, _)| *w).collect();
    assert_eq!(workers, [0, 1].into_iter().collect());

    // Both sessions paged at the same time, but no session was used twice at once
    assert_eq!(activity.max_active, 2);
    assert_eq!(activity.overlaps, 0);

    // Each record's tabs were fetched in order through a single session
    let mut per_record: std::collections::HashMap<&String, Vec<(&String, &String)>> =
        std::collections::HashMap::new();
    for (session, identity, tab) in &activity.tabs {
        per_record.entry(identity).or_default().push((session, tab));
    }
    assert_eq!(per_record.len(), 9);
    for tabs in per_record.values() {
        let order: Vec<&str> = tabs.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(order, vec!["situation", "dossier", "diplomas", "personal"]);
        let sessions: HashSet<&String> = tabs.iter().map(|(s, _)| *s).collect();
        assert_eq!(sessions.len(), 1);
    }
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sweep.db");
    let names = ["aaa", "aab", "aba", "abb", "abx"];

    let config = test_config(&db_path, "ab", &["a"], 4, 0, 2);
    let mut first = Coordinator::new(
        config.clone(),
        FakeFactory::new(FakeDirectory::new(&names, 2, 4)),
        "hash",
        true,
    )
    .unwrap();
    let first_report = first.run().await.unwrap();
    let after_first = open(&db_path).count_records().unwrap();

    let mut second = Coordinator::new(
        config,
        FakeFactory::new(FakeDirectory::new(&names, 2, 4)),
        "hash",
        true,
    )
    .unwrap();
    let second_report = second.run().await.unwrap();

    // A fresh run re-dispatches everything but creates no duplicate rows
    assert_ne!(first_report.run_id, second_report.run_id);
    assert_eq!(first_report.prefixes.len(), second_report.prefixes.len());
    assert_eq!(open(&db_path).count_records().unwrap(), after_first);
    assert_eq!(after_first, 5);
}

#[tokio::test]
async fn test_failed_prefix_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sweep.db");

    // 'b' would be truncated, but its search fails
    let directory = FakeDirectory::new(&["aaa", "baa", "bab", "bba", "bbb", "cca"], 10, 4)
        .failing("b");
    let factory = FakeFactory::new(directory);
    let activity = factory.activity();

    let config = test_config(&db_path, "abc", &["a", "b", "c"], 4, 0, 2);
    let mut coordinator = Coordinator::new(config, factory, "hash", true).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    let failed = report.failed_prefixes();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].prefix, "b");
    assert_eq!(failed[0].records_found, 0);

    // Not retried, not expanded
    let searched = activity.lock().unwrap().searched_prefixes();
    assert_eq!(searched.iter().filter(|p| p.as_str() == "b").count(), 1);
    assert!(!searched.iter().any(|p| p.starts_with('b') && p.len() > 1));

    let storage = open(&db_path);
    assert_eq!(storage.count_records().unwrap(), 2);
    assert_eq!(
        storage.get_failed_prefixes(report.run_id).unwrap()[0].0,
        "b"
    );
}

#[tokio::test]
async fn test_crashed_drain_gets_a_fresh_session() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sweep.db");

    let directory = FakeDirectory::new(&["aaa", "bbb", "ccc"], 10, 100).crashing("b");
    let factory = FakeFactory::new(directory);
    let activity = factory.activity();

    let config = test_config(&db_path, "abc", &["a", "b", "c"], 100, 5, 1);
    let mut coordinator = Coordinator::new(config, factory, "hash", true).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    let failed = report.failed_prefixes();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].prefix, "b");
    assert!(failed[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("crashed"));

    // The worker rebuilt its session and went on with 'c'
    let activity = activity.lock().unwrap();
    let generations: Vec<(u32, u32)> = activity.sessions.iter().map(|(w, g, _)| (*w, *g)).collect();
    assert_eq!(generations, vec![(0, 0), (0, 1)]);
    assert!(activity.searched_prefixes().contains(&"c".to_string()));
    assert_eq!(open(&db_path).count_records().unwrap(), 2);
}

#[tokio::test]
async fn test_interrupted_run_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sweep.db");
    let names = ["aaa", "bbb", "ccc"];
    let config = test_config(&db_path, "abc", &["a", "b", "c"], 100, 5, 2);

    // Shutdown before anything is dispatched
    let mut interrupted = Coordinator::new(
        config.clone(),
        FakeFactory::new(FakeDirectory::new(&names, 10, 100)),
        "hash",
        true,
    )
    .unwrap();
    interrupted.shutdown_token().cancel();
    let report = interrupted.run().await.unwrap();
    assert_eq!(report.status, RunStatus::Interrupted);
    assert!(report.prefixes.is_empty());
    let run_id = report.run_id;

    // Pretend 'a' finished before the interruption and 'b' was in flight
    {
        let mut storage = open(&db_path);
        storage
            .upsert_frontier_state(run_id, "a", PrefixState::Completed)
            .unwrap();
        storage
            .upsert_frontier_state(run_id, "b", PrefixState::InFlight)
            .unwrap();
    }

    let factory = FakeFactory::new(FakeDirectory::new(&names, 10, 100));
    let activity = factory.activity();
    let mut resumed = Coordinator::new(config, factory, "hash", false).unwrap();
    assert!(resumed.is_resumed());
    assert_eq!(resumed.run_id(), run_id);

    let report = resumed.run().await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);

    let searched: HashSet<String> = activity
        .lock()
        .unwrap()
        .searched_prefixes()
        .into_iter()
        .collect();
    let expected: HashSet<String> = ["b", "c"].iter().map(|s| s.to_string()).collect();
    assert_eq!(searched, expected);
}

#[tokio::test]
async fn test_changed_config_starts_new_run() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sweep.db");
    let names = ["aaa"];
    let config = test_config(&db_path, "abc", &["a"], 100, 5, 1);

    let mut interrupted = Coordinator::new(
        config.clone(),
        FakeFactory::new(FakeDirectory::new(&names, 10, 100)),
        "hash-1",
        true,
    )
    .unwrap();
    interrupted.shutdown_token().cancel();
    let first = interrupted.run().await.unwrap();

    let next = Coordinator::new(
        config,
        FakeFactory::new(FakeDirectory::new(&names, 10, 100)),
        "hash-2",
        false,
    )
    .unwrap();

    assert!(!next.is_resumed());
    assert_ne!(next.run_id(), first.run_id);
}

#[tokio::test]
async fn test_shutdown_lets_in_flight_prefixes_finish() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sweep.db");
    let names = ["aaa", "aab", "bba", "bbb", "cca", "ccb", "dda", "ddb"];
    let config = test_config(&db_path, "abcd", &["a", "b", "c", "d"], 100, 5, 2);

    let directory =
        FakeDirectory::new(&names, 1, 100).with_page_delay(Duration::from_millis(50));
    let factory = FakeFactory::new(directory);
    let activity = factory.activity();
    let mut coordinator = Coordinator::new(config.clone(), factory, "hash", true).unwrap();

    // Cancel once both workers have started searching
    let shutdown = coordinator.shutdown_token();
    let watcher = Arc::clone(&activity);
    tokio::spawn(async move {
        loop {
            let started = watcher.lock().unwrap().searches.len() >= 2;
            if started {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(10), coordinator.run())
        .await
        .expect("shutdown should not hang")
        .unwrap();

    assert_eq!(report.status, RunStatus::Interrupted);
    assert_eq!(report.prefixes.len(), 2);
    assert!(report.prefixes.iter().all(|p| p.error.is_none()));

    let searched: HashSet<String> = activity
        .lock()
        .unwrap()
        .searched_prefixes()
        .into_iter()
        .collect();
    let expected: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
    assert_eq!(searched, expected);

    // The prefixes in flight at shutdown were drained in full
    let storage = open(&db_path);
    assert_eq!(storage.count_records().unwrap(), 4);
    assert_eq!(storage.count_complete_records().unwrap(), 4);

    let states: Vec<(String, PrefixState)> = storage
        .load_frontier(report.run_id)
        .unwrap()
        .into_iter()
        .map(|e| (e.prefix, e.state))
        .collect();
    assert_eq!(
        states,
        vec![
            ("a".to_string(), PrefixState::Completed),
            ("b".to_string(), PrefixState::Completed),
            ("c".to_string(), PrefixState::Queued),
            ("d".to_string(), PrefixState::Queued),
        ]
    );

    // The queued remainder is picked up by the next run
    let factory = FakeFactory::new(FakeDirectory::new(&names, 1, 100));
    let activity = factory.activity();
    let mut resumed = Coordinator::new(config, factory, "hash", false).unwrap();
    assert!(resumed.is_resumed());
    assert_eq!(resumed.run_id(), report.run_id);

    let report = resumed.run().await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    let searched: HashSet<String> = activity
        .lock()
        .unwrap()
        .searched_prefixes()
        .into_iter()
        .collect();
    let expected: HashSet<String> = ["c", "d"].iter().map(|s| s.to_string()).collect();
    assert_eq!(searched, expected);
    assert_eq!(open(&db_path).count_records().unwrap(), 8);
}

#[tokio::test]
async fn test_navigation_error_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sweep.db");

    let directory = FakeDirectory::new(&["aaa", "bbb"], 10, 100).misnavigating("a");
    let factory = FakeFactory::new(directory);
    let activity = factory.activity();

    let config = test_config(&db_path, "ab", &["a", "b"], 100, 5, 1);
    let mut coordinator = Coordinator::new(config, factory, "hash", true).unwrap();
    let run_id = coordinator.run_id();

    let outcome = tokio::time::timeout(Duration::from_secs(10), coordinator.run())
        .await
        .expect("run should stop after the navigation error");

    assert!(matches!(outcome, Err(SweepError::Navigation(_))));
    assert_eq!(open(&db_path).get_run(run_id).unwrap().status, RunStatus::Failed);

    // Nothing is dispatched after the failure
    assert_eq!(activity.lock().unwrap().searched_prefixes(), vec!["a".to_string()]);
}

#[tokio::test]
async fn test_dispatch_storage_failure_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sweep.db");

    let directory = FakeDirectory::new(&["aaa", "aab", "aba", "abb", "abx"], 2, 4);
    let factory = FakeFactory::new(directory);
    let activity = factory.activity();

    let config = test_config(&db_path, "ab", &["a"], 4, 0, 1);
    let mut coordinator = Coordinator::new(config, factory, "hash", true).unwrap();
    let run_id = coordinator.run_id();

    // 'a' expands, but marking its first child in flight is rejected by the database
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_dispatch BEFORE UPDATE ON frontier
         WHEN NEW.prefix = 'aa' AND NEW.state = 'in_flight'
         BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
    )
    .unwrap();
    drop(conn);

    let outcome = tokio::time::timeout(Duration::from_secs(10), coordinator.run())
        .await
        .expect("run should stop after the storage error");

    assert!(matches!(outcome, Err(SweepError::Storage(_))));
    assert_eq!(open(&db_path).get_run(run_id).unwrap().status, RunStatus::Failed);
    assert_eq!(activity.lock().unwrap().searched_prefixes(), vec!["a".to_string()]);
}
