use std::fs;
use std::path::{Path, PathBuf};

use veriscan_core::hasher::HashAlgorithm;
use veriscan_core::storage::models::{ResultFilter, SessionStatus};
use veriscan_core::storage::Database;
use veriscan_core::{AnalysisManager, AppConfig, Error, SilentReporter};

struct TestRun {
    _dir: tempfile::TempDir,
    db_path: PathBuf,
    root: PathBuf,
}

fn test_run() -> TestRun {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("veriscan-test.db");
    let root = dir.path().join("root");
    fs::create_dir(&root).unwrap();
    TestRun {
        db_path,
        root,
        _dir: dir,
    }
}

fn config_for(run: &TestRun) -> AppConfig {
    AppConfig {
        database_path: run.db_path.to_string_lossy().into_owned(),
        worker_count: 2,
        hash_algorithms: vec![HashAlgorithm::Md5, HashAlgorithm::Sha256],
        ..Default::default()
    }
}

#[cfg(unix)]
fn revoke_read(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o000)).unwrap();
}

#[cfg(unix)]
#[test]
fn test_mixed_tree_scenario() {
    // Three files: a 10-byte text file, an empty file, and one with read
    // permission revoked. Expect success=2, failed=1, and the unreadable
    // file's failure reason naming a read error.
    let run = test_run();
    fs::write(run.root.join("ten_bytes.txt"), "0123456789").unwrap();
    fs::write(run.root.join("empty.txt"), "").unwrap();
    let locked = run.root.join("locked.txt");
    fs::write(&locked, "secret").unwrap();
    revoke_read(&locked);

    let mut config = config_for(&run);
    config.max_files_per_analysis = 10;
    let manager = AnalysisManager::new(config);
    let summary = manager.run_session(&[run.root.clone()], &SilentReporter).unwrap();

    assert_eq!(summary.status, SessionStatus::Completed);
    assert_eq!(summary.discovered_files, 3);
    assert_eq!(summary.successful_files, 2);
    assert_eq!(summary.failed_files, 1);

    let db = Database::open(run.db_path.to_str().unwrap()).unwrap();
    let results = db
        .get_results(&summary.session_id, &ResultFilter::default())
        .unwrap();
    assert_eq!(results.len(), 3);

    let failure = results.iter().find(|r| r.status == "failed").unwrap();
    assert!(failure.file_path.ends_with("locked.txt"));
    let reason = failure.error_message.as_deref().unwrap();
    assert!(
        reason.contains("read failed"),
        "failure reason should name a read error, got: {reason}"
    );

    // Both successful rows carry both configured digests.
    for result in results.iter().filter(|r| r.status == "success") {
        assert!(result.digests.contains_key("md5"));
        assert!(result.digests.contains_key("sha256"));
    }
}

#[test]
fn test_identical_content_forms_one_duplicate_group() {
    let run = test_run();
    fs::write(run.root.join("copy_one.txt"), "identical bytes").unwrap();
    fs::write(run.root.join("copy_two.txt"), "identical bytes").unwrap();
    fs::write(run.root.join("other.txt"), "different bytes").unwrap();

    let manager = AnalysisManager::new(config_for(&run));
    let summary = manager.run_session(&[run.root.clone()], &SilentReporter).unwrap();
    assert_eq!(summary.duplicate_groups, 1);

    let db = Database::open(run.db_path.to_str().unwrap()).unwrap();
    let groups = db
        .find_duplicates(&summary.session_id, HashAlgorithm::Sha256)
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].paths.len(), 2);
    assert!(groups[0].paths.iter().any(|p| p.ends_with("copy_one.txt")));
    assert!(groups[0].paths.iter().any(|p| p.ends_with("copy_two.txt")));
}

#[test]
fn test_max_files_is_a_hard_cap_not_a_failure() {
    let run = test_run();
    for i in 0..10 {
        fs::write(run.root.join(format!("file_{i:02}.txt")), format!("{i}")).unwrap();
    }

    let mut config = config_for(&run);
    config.max_files_per_analysis = 4;
    let manager = AnalysisManager::new(config);
    let summary = manager.run_session(&[run.root.clone()], &SilentReporter).unwrap();

    assert_eq!(summary.discovered_files, 4);
    assert_eq!(summary.processed_files, 4);
    assert_eq!(summary.failed_files, 0);

    // Files past the cap left no trace — they are not failures.
    let db = Database::open(run.db_path.to_str().unwrap()).unwrap();
    let results = db
        .get_results(&summary.session_id, &ResultFilter::default())
        .unwrap();
    assert_eq!(results.len(), 4);
}

#[test]
fn test_accounting_completeness() {
    let run = test_run();
    fs::write(run.root.join("a.txt"), "alpha").unwrap();
    fs::write(run.root.join("b.log"), "not a recognized log line\n").unwrap();
    fs::write(run.root.join("c.png"), "not actually a png").unwrap();
    let nested = run.root.join("nested");
    fs::create_dir(&nested).unwrap();
    fs::write(nested.join("d.txt"), "delta").unwrap();

    let manager = AnalysisManager::new(config_for(&run));
    let summary = manager.run_session(&[run.root.clone()], &SilentReporter).unwrap();

    assert_eq!(summary.status, SessionStatus::Completed);
    assert_eq!(
        summary.successful_files + summary.failed_files,
        summary.discovered_files
    );
    assert_eq!(summary.processed_files, summary.discovered_files);

    let total_by_category: usize = summary.by_category.values().sum();
    assert_eq!(total_by_category, summary.processed_files);
}

#[test]
fn test_zero_workers_is_fatal_before_any_session_exists() {
    let run = test_run();
    fs::write(run.root.join("a.txt"), "alpha").unwrap();

    let mut config = config_for(&run);
    config.worker_count = 0;
    let manager = AnalysisManager::new(config);
    let err = manager
        .run_session(&[run.root.clone()], &SilentReporter)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));

    // The session never started: the store was never touched.
    assert!(!run.db_path.exists());
}

#[test]
fn test_zero_max_files_is_fatal() {
    let run = test_run();
    let mut config = config_for(&run);
    config.max_files_per_analysis = 0;
    let manager = AnalysisManager::new(config);
    let err = manager
        .run_session(&[run.root.clone()], &SilentReporter)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert!(!run.db_path.exists());
}

#[test]
fn test_missing_root_is_fatal() {
    let run = test_run();
    let manager = AnalysisManager::new(config_for(&run));
    let missing = run.root.join("does-not-exist");
    let err = manager
        .run_session(&[missing], &SilentReporter)
        .unwrap_err();
    assert!(matches!(err, Error::UnreadableRoot { .. }));
    assert!(!run.db_path.exists());
}

#[cfg(unix)]
#[test]
fn test_unreadable_root_is_fatal() {
    let run = test_run();
    let sealed = run.root.join("sealed");
    fs::create_dir(&sealed).unwrap();
    revoke_read(&sealed);

    let manager = AnalysisManager::new(config_for(&run));
    let err = manager
        .run_session(&[sealed.clone()], &SilentReporter)
        .unwrap_err();
    assert!(matches!(err, Error::UnreadableRoot { .. }));

    // Restore permissions so the tempdir can be removed.
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(&sealed, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_digest_determinism_across_sessions() {
    let run = test_run();
    fs::write(run.root.join("stable.txt"), "stable contents").unwrap();

    let manager = AnalysisManager::new(config_for(&run));
    let first = manager.run_session(&[run.root.clone()], &SilentReporter).unwrap();
    let second = manager.run_session(&[run.root.clone()], &SilentReporter).unwrap();

    let db = Database::open(run.db_path.to_str().unwrap()).unwrap();
    let results_first = db.get_results(&first.session_id, &ResultFilter::default()).unwrap();
    let results_second = db.get_results(&second.session_id, &ResultFilter::default()).unwrap();
    assert_eq!(results_first.len(), 1);
    assert_eq!(results_second.len(), 1);
    assert_eq!(results_first[0].digests, results_second[0].digests);
}

#[test]
fn test_cancellation_preserves_recorded_results() {
    let run = test_run();
    for i in 0..200 {
        fs::write(run.root.join(format!("file_{i:03}.txt")), format!("{i}")).unwrap();
    }

    let mut config = config_for(&run);
    config.worker_count = 2;
    let manager = AnalysisManager::new(config);

    let cancel_token = manager.cancel_token();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(2));
        cancel_token.store(true, std::sync::atomic::Ordering::Relaxed);
    });

    let summary = manager.run_session(&[run.root.clone()], &SilentReporter).unwrap();
    canceller.join().unwrap();

    // On a tiny tree the run may finish before the token is observed; both
    // outcomes are valid. Either way nothing recorded may be lost.
    assert!(matches!(
        summary.status,
        SessionStatus::Completed | SessionStatus::Cancelled
    ));
    let db = Database::open(run.db_path.to_str().unwrap()).unwrap();
    let stats = db.statistics(&summary.session_id).unwrap();
    assert_eq!(stats.total_results, summary.processed_files as i64);
    assert!(summary.processed_files <= summary.discovered_files);

    let session = db.get_session(&summary.session_id).unwrap().unwrap();
    assert_eq!(session.status, summary.status);
}

#[test]
fn test_oversized_file_fails_without_being_read() {
    let run = test_run();
    fs::write(run.root.join("small.txt"), "ok").unwrap();
    fs::write(run.root.join("big.txt"), vec![b'x'; 2 * 1024 * 1024]).unwrap();

    let mut config = config_for(&run);
    config.max_file_size_mb = 1;
    let manager = AnalysisManager::new(config);
    let summary = manager.run_session(&[run.root.clone()], &SilentReporter).unwrap();

    assert_eq!(summary.successful_files, 1);
    assert_eq!(summary.failed_files, 1);

    let db = Database::open(run.db_path.to_str().unwrap()).unwrap();
    let results = db
        .get_results(&summary.session_id, &ResultFilter::default())
        .unwrap();
    let oversized = results.iter().find(|r| r.status == "failed").unwrap();
    assert!(oversized
        .error_message
        .as_deref()
        .unwrap()
        .contains("oversized"));
    assert!(oversized.digests.is_empty());
}

#[cfg(unix)]
#[test]
fn test_disallowed_symlink_recorded_as_failed() {
    let run = test_run();
    let target = run.root.join("real.txt");
    fs::write(&target, "real").unwrap();
    std::os::unix::fs::symlink(&target, run.root.join("alias.txt")).unwrap();

    let manager = AnalysisManager::new(config_for(&run));
    let summary = manager.run_session(&[run.root.clone()], &SilentReporter).unwrap();

    assert_eq!(summary.discovered_files, 2);
    assert_eq!(summary.successful_files, 1);
    assert_eq!(summary.failed_files, 1);

    let db = Database::open(run.db_path.to_str().unwrap()).unwrap();
    let results = db
        .get_results(&summary.session_id, &ResultFilter::default())
        .unwrap();
    let symlink_row = results.iter().find(|r| r.status == "failed").unwrap();
    assert!(symlink_row
        .error_message
        .as_deref()
        .unwrap()
        .contains("symlink"));
}

#[test]
fn test_single_file_root() {
    let run = test_run();
    let file = run.root.join("single.txt");
    fs::write(&file, "just one").unwrap();

    let manager = AnalysisManager::new(config_for(&run));
    let summary = manager.run_session(&[file], &SilentReporter).unwrap();
    assert_eq!(summary.discovered_files, 1);
    assert_eq!(summary.successful_files, 1);
}

#[test]
fn test_network_log_with_bad_lines_is_partial_not_failed() {
    let run = test_run();
    let content = "\
10.0.0.1 - - [01/Aug/2026:10:00:00 +0000] \"GET / HTTP/1.1\" 200 100\n\
completely malformed line\n\
10.0.0.1 - - [01/Aug/2026:10:00:02 +0000] \"GET /a HTTP/1.1\" 200 100\n";
    fs::write(run.root.join("access.log"), content).unwrap();

    let manager = AnalysisManager::new(config_for(&run));
    let summary = manager.run_session(&[run.root.clone()], &SilentReporter).unwrap();
    assert_eq!(summary.failed_files, 0);

    let db = Database::open(run.db_path.to_str().unwrap()).unwrap();
    let results = db
        .get_results(&summary.session_id, &ResultFilter::default())
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, "partial");
    assert_eq!(results[0].parse_skips, 1);
}
