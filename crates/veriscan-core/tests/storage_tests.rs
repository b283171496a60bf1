use std::collections::BTreeMap;
use std::sync::Arc;

use veriscan_core::classify::FileCategory;
use veriscan_core::hasher::HashAlgorithm;
use veriscan_core::storage::models::*;
use veriscan_core::storage::Database;

fn make_result(session_id: &str, path: &str, digest: &str, status: ResultStatus) -> AnalysisResult {
    let mut digests = BTreeMap::new();
    if status != ResultStatus::Failed {
        digests.insert("sha256".to_string(), digest.to_string());
        digests.insert("md5".to_string(), format!("md5-{}", digest));
    }
    AnalysisResult {
        session_id: session_id.to_string(),
        file_path: path.to_string(),
        file_name: path.rsplit('/').next().unwrap_or(path).to_string(),
        category: FileCategory::Document,
        file_size: 128,
        status,
        error_message: match status {
            ResultStatus::Failed => Some("read failed".to_string()),
            _ => None,
        },
        digests,
        metadata: serde_json::json!({ "analyzer": "document" }),
        parse_skips: 0,
        duration_ms: 3,
    }
}

fn open_session(db: &Database, session_id: &str) {
    db.create_session(session_id, &["/data".to_string()], "{}")
        .unwrap();
}

#[test]
fn test_session_lifecycle() {
    let db = Database::open_in_memory().unwrap();
    open_session(&db, "s-1");

    let session = db.get_session("s-1").unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Running);
    assert_eq!(session.root_paths, vec!["/data".to_string()]);
    assert!(session.ended_at.is_none());

    db.update_session_progress("s-1", 10, 7, 6, 1).unwrap();
    let closed = db
        .close_session("s-1", SessionStatus::Completed, None)
        .unwrap();
    assert!(closed);

    let session = db.get_session("s-1").unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.total_files, 10);
    assert_eq!(session.successful_files, 6);
    assert!(session.ended_at.is_some());
}

#[test]
fn test_session_transitions_out_of_running_exactly_once() {
    let db = Database::open_in_memory().unwrap();
    open_session(&db, "s-once");

    assert!(db
        .close_session("s-once", SessionStatus::Cancelled, None)
        .unwrap());
    // A second transition is a no-op: the first status sticks.
    assert!(!db
        .close_session("s-once", SessionStatus::Completed, None)
        .unwrap());
    let session = db.get_session("s-once").unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
}

#[test]
fn test_record_and_read_back_results() {
    let db = Database::open_in_memory().unwrap();
    open_session(&db, "s-2");

    db.record_result(&make_result("s-2", "/data/a.txt", "aaa", ResultStatus::Success))
        .unwrap();
    db.record_result(&make_result("s-2", "/data/b.txt", "bbb", ResultStatus::Failed))
        .unwrap();

    let results = db.get_results("s-2", &ResultFilter::default()).unwrap();
    assert_eq!(results.len(), 2);
    let ok = results.iter().find(|r| r.file_path == "/data/a.txt").unwrap();
    assert_eq!(ok.status, "success");
    assert_eq!(ok.digests["sha256"], "aaa");
    assert_eq!(ok.metadata["analyzer"], "document");
    let failed = results.iter().find(|r| r.file_path == "/data/b.txt").unwrap();
    assert_eq!(failed.status, "failed");
    assert!(failed.digests.is_empty());

    let success_only = db
        .get_results(
            "s-2",
            &ResultFilter {
                success_only: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(success_only.len(), 1);
}

#[test]
fn test_reanalysis_appends_instead_of_overwriting() {
    let db = Database::open_in_memory().unwrap();
    open_session(&db, "s-append");

    db.record_result(&make_result("s-append", "/data/x.txt", "v1", ResultStatus::Success))
        .unwrap();
    db.record_result(&make_result("s-append", "/data/x.txt", "v2", ResultStatus::Success))
        .unwrap();

    let results = db.get_results("s-append", &ResultFilter::default()).unwrap();
    assert_eq!(results.len(), 2);
}

#[test]
fn test_find_duplicates_groups_by_digest() {
    let db = Database::open_in_memory().unwrap();
    open_session(&db, "s-3");

    // A, B, C share a digest; D is unique; E failed and must be excluded
    // even though it would share the digest.
    for (path, digest, status) in [
        ("/data/a", "dup", ResultStatus::Success),
        ("/data/b", "dup", ResultStatus::Success),
        ("/data/c", "dup", ResultStatus::Success),
        ("/data/d", "unique", ResultStatus::Success),
        ("/data/e", "dup", ResultStatus::Failed),
    ] {
        db.record_result(&make_result("s-3", path, digest, status))
            .unwrap();
    }

    let groups = db.find_duplicates("s-3", HashAlgorithm::Sha256).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].digest, "dup");
    assert_eq!(
        groups[0].paths,
        vec!["/data/a".to_string(), "/data/b".to_string(), "/data/c".to_string()]
    );
}

#[test]
fn test_find_duplicates_scoped_to_session_and_algorithm() {
    let db = Database::open_in_memory().unwrap();
    open_session(&db, "s-4a");
    open_session(&db, "s-4b");

    db.record_result(&make_result("s-4a", "/one", "shared", ResultStatus::Success))
        .unwrap();
    db.record_result(&make_result("s-4b", "/two", "shared", ResultStatus::Success))
        .unwrap();

    // The digest is shared across sessions, not within either.
    assert!(db.find_duplicates("s-4a", HashAlgorithm::Sha256).unwrap().is_empty());
    assert!(db.find_duplicates("s-4b", HashAlgorithm::Sha256).unwrap().is_empty());
    // No blake3 digests were ever recorded.
    assert!(db.find_duplicates("s-4a", HashAlgorithm::Blake3).unwrap().is_empty());
}

#[test]
fn test_statistics_aggregate_and_are_stable() {
    let db = Database::open_in_memory().unwrap();
    open_session(&db, "s-5");

    db.record_result(&make_result("s-5", "/data/a", "a", ResultStatus::Success))
        .unwrap();
    db.record_result(&make_result("s-5", "/data/b", "b", ResultStatus::Success))
        .unwrap();
    db.record_result(&make_result("s-5", "/data/c", "c", ResultStatus::Failed))
        .unwrap();

    let first = db.statistics("s-5").unwrap();
    assert_eq!(first.total_results, 3);
    assert_eq!(first.successful, 2);
    assert_eq!(first.failed, 1);
    assert!((first.success_rate - 2.0 / 3.0 * 100.0).abs() < 1e-9);
    assert_eq!(first.total_bytes, 3 * 128);
    assert_eq!(first.by_category["document"], 3);
    assert_eq!(first.largest_files.len(), 2);

    // Read-only: a second call without new writes is identical.
    let second = db.statistics("s-5").unwrap();
    assert_eq!(first.total_results, second.total_results);
    assert_eq!(first.total_bytes, second.total_bytes);
    assert_eq!(first.by_category, second.by_category);
}

#[test]
fn test_statistics_for_empty_session() {
    let db = Database::open_in_memory().unwrap();
    open_session(&db, "s-empty");

    let stats = db.statistics("s-empty").unwrap();
    assert_eq!(stats.total_results, 0);
    assert_eq!(stats.success_rate, 0.0);
    assert!(stats.largest_files.is_empty());
}

#[test]
fn test_concurrent_result_recording_loses_nothing() {
    const WORKERS: usize = 4;
    const PER_WORKER: usize = 50;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("stress.db");
    let db = Arc::new(Database::open(db_path.to_str().unwrap()).unwrap());
    open_session(&db, "s-stress");

    let mut handles = Vec::new();
    for worker in 0..WORKERS {
        let db = Arc::clone(&db);
        handles.push(std::thread::spawn(move || {
            for i in 0..PER_WORKER {
                let path = format!("/stress/w{}/f{}", worker, i);
                let digest = format!("digest-{}-{}", worker, i);
                db.record_result(&make_result("s-stress", &path, &digest, ResultStatus::Success))
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let results = db.get_results("s-stress", &ResultFilter::default()).unwrap();
    assert_eq!(results.len(), WORKERS * PER_WORKER);

    // No duplicate rows and no corrupted rows: every path appears once with
    // its own digest.
    let mut paths: Vec<&str> = results.iter().map(|r| r.file_path.as_str()).collect();
    paths.sort_unstable();
    paths.dedup();
    assert_eq!(paths.len(), WORKERS * PER_WORKER);
    for result in &results {
        assert!(result.digests["sha256"].contains("digest-"));
    }
}

#[test]
fn test_cleanup_old_sessions() {
    let db = Database::open_in_memory().unwrap();
    open_session(&db, "s-old");
    open_session(&db, "s-new");
    db.record_result(&make_result("s-old", "/old/a", "x", ResultStatus::Success))
        .unwrap();

    // Age the old session well past the cutoff.
    db.with_connection(|conn| {
        conn.execute(
            "UPDATE analysis_session SET started_at = '2020-01-01T00:00:00+00:00' \
             WHERE session_id = 's-old'",
            [],
        )?;
        Ok(())
    })
    .unwrap();

    let removed = db.cleanup_old_sessions(30).unwrap();
    assert_eq!(removed, 1);
    assert!(db.get_session("s-old").unwrap().is_none());
    assert!(db.get_session("s-new").unwrap().is_some());

    // Cascades removed the old session's results too.
    let orphan_count: i64 = db
        .with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM analysis_result WHERE session_id = 's-old'",
                [],
                |row| row.get(0),
            )
        })
        .unwrap();
    assert_eq!(orphan_count, 0);
}

#[test]
fn test_category_filter() {
    let db = Database::open_in_memory().unwrap();
    open_session(&db, "s-filter");

    let mut image = make_result("s-filter", "/img/a.png", "img", ResultStatus::Success);
    image.category = FileCategory::Image;
    db.record_result(&image).unwrap();
    db.record_result(&make_result("s-filter", "/doc/b.txt", "doc", ResultStatus::Success))
        .unwrap();

    let images = db
        .get_results(
            "s-filter",
            &ResultFilter {
                category: Some(FileCategory::Image),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].category, "image");
}
