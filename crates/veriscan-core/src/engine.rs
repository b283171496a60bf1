use crate::analyzers::{AnalyzerRegistry, FileFacts};
use crate::classify::Classifier;
use crate::config::AppConfig;
use crate::error::Error;
use crate::hasher::{self, HashAlgorithm};
use crate::progress::ProgressReporter;
use crate::scanner::{self, DeniedEntry, Discovery, FileTask};
use crate::storage::models::{AnalysisResult, ResultStatus, SessionStatus};
use crate::storage::Database;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Write the persisted per-session progress row every N completed files
/// instead of on every result.
const PROGRESS_WRITE_INTERVAL: usize = 50;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Orchestrates one scan-and-analyze session: validates inputs, walks the
/// roots on a dedicated thread, fans tasks out to a fixed-size worker pool
/// over a bounded queue, and collects everything into the results store.
///
/// A single file's failure becomes a failed result row; it never stops the
/// pool. Only startup validation and store unavailability are fatal.
pub struct AnalysisManager {
    config: AppConfig,
    db_path: String,
    cancel: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub discovered_files: usize,
    pub processed_files: usize,
    pub successful_files: usize,
    pub failed_files: usize,
    pub duplicate_groups: usize,
    pub total_bytes: u64,
    pub by_category: BTreeMap<String, usize>,
    pub duration: Duration,
    pub files_per_second: f64,
}

/// Shared mutable state outside the store: atomic counters for live
/// progress, plus the per-run aggregation maps.
struct RunState<'a> {
    db: &'a Database,
    session_id: &'a str,
    cancel: &'a AtomicBool,
    discovered: AtomicUsize,
    processed: AtomicUsize,
    failed: AtomicUsize,
    total_bytes: AtomicU64,
    by_category: DashMap<&'static str, usize>,
    digest_groups: DashMap<String, usize>,
    store_error: Mutex<Option<rusqlite::Error>>,
    primary_algorithm: HashAlgorithm,
}

impl AnalysisManager {
    pub fn new(config: AppConfig) -> Self {
        let db_path = config.database_path.clone();
        Self {
            config,
            db_path,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_db_path(mut self, path: &str) -> Self {
        self.db_path = path.to_string();
        self
    }

    /// Cooperative cancellation handle. Setting it lets in-flight workers
    /// finish their current file; no new tasks are picked up afterwards.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run one full session over the given roots and return its summary.
    ///
    /// Fatal conditions (invalid configuration, unreadable root, store
    /// unavailable) abort before or during the run; everything else is
    /// contained per file. On cancellation the summary reflects the results
    /// recorded before the token was observed, with status `cancelled`.
    pub fn run_session(
        &self,
        roots: &[PathBuf],
        reporter: &dyn ProgressReporter,
    ) -> Result<SessionSummary, Error> {
        self.config.validate()?;
        if roots.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one root path is required".to_string(),
            ));
        }
        for root in roots {
            validate_root(root)?;
        }

        self.cancel.store(false, Ordering::Relaxed);

        let db = Database::open(&self.db_path)?;
        let session_id = generate_session_id();
        let config_json = serde_json::to_string(&self.config).unwrap_or_default();
        let root_strings: Vec<String> = roots
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        db.create_session(&session_id, &root_strings, &config_json)?;
        info!("Session {} started over {} root(s)", session_id, roots.len());
        reporter.on_session_start(&session_id);

        let start = Instant::now();
        let classifier = Classifier::new(self.config.category_priority.clone());
        let registry = AnalyzerRegistry::with_defaults(&self.config);
        let walk_options = scanner::default_walk_options(&self.config);

        let state = RunState {
            db: &db,
            session_id: &session_id,
            cancel: &self.cancel,
            discovered: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            total_bytes: AtomicU64::new(0),
            by_category: DashMap::new(),
            digest_groups: DashMap::new(),
            store_error: Mutex::new(None),
            primary_algorithm: self.config.hash_algorithms[0],
        };

        let (task_tx, task_rx) =
            crossbeam_channel::bounded::<FileTask>(self.config.queue_depth);

        std::thread::scope(|scope| {
            let state_ref = &state;
            let classifier_ref = &classifier;
            let registry_ref = &registry;
            let config_ref = &self.config;
            let walk_options_ref = &walk_options;

            // Discovery runs on its own thread and blocks on the bounded
            // queue when the walk outpaces the workers.
            scope.spawn(move || {
                scanner::walk_roots(roots, walk_options_ref, classifier_ref, |discovery| {
                    if state_ref.cancel.load(Ordering::Relaxed) {
                        return false;
                    }
                    match discovery {
                        Discovery::Task(task) => {
                            let seen = state_ref.discovered.fetch_add(1, Ordering::Relaxed) + 1;
                            reporter.on_file_discovered(seen, &task.path.to_string_lossy());
                            // Send fails only when every worker has exited,
                            // which means cancellation or store failure.
                            task_tx.send(task).is_ok()
                        }
                        Discovery::Denied(denied) => {
                            state_ref.discovered.fetch_add(1, Ordering::Relaxed);
                            let result = denied_result(state_ref.session_id, &denied);
                            record_outcome(state_ref, reporter, result);
                            true
                        }
                    }
                });
                // task_tx drops here; workers drain the queue and exit.
            });

            for _ in 0..self.config.effective_worker_count() {
                let task_rx = task_rx.clone();
                scope.spawn(move || {
                    loop {
                        if state_ref.cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        let task = match task_rx.recv() {
                            Ok(task) => task,
                            Err(_) => break,
                        };
                        let result = analyze_task(
                            &task,
                            state_ref.session_id,
                            config_ref,
                            classifier_ref,
                            registry_ref,
                        );
                        record_outcome(state_ref, reporter, result);
                    }
                });
            }
            drop(task_rx);
        });

        let discovered = state.discovered.load(Ordering::Relaxed);
        let processed = state.processed.load(Ordering::Relaxed);
        let failed = state.failed.load(Ordering::Relaxed);
        let successful = processed - failed;

        if let Some(store_err) = state.store_error.into_inner().unwrap() {
            let _ = db.close_session(
                &session_id,
                SessionStatus::Failed,
                Some(&store_err.to_string()),
            );
            error!("Session {} aborted: results store failed", session_id);
            return Err(Error::Database(store_err));
        }

        db.update_session_progress(
            &session_id,
            discovered as i64,
            processed as i64,
            successful as i64,
            failed as i64,
        )?;
        let status = if self.cancel.load(Ordering::Relaxed) {
            SessionStatus::Cancelled
        } else {
            SessionStatus::Completed
        };
        db.close_session(&session_id, status, None)?;

        let duration = start.elapsed();
        let files_per_second = if duration.as_secs_f64() > 0.0 {
            processed as f64 / duration.as_secs_f64()
        } else {
            0.0
        };
        let summary = SessionSummary {
            session_id: session_id.clone(),
            status,
            discovered_files: discovered,
            processed_files: processed,
            successful_files: successful,
            failed_files: failed,
            duplicate_groups: state
                .digest_groups
                .iter()
                .filter(|entry| *entry.value() > 1)
                .count(),
            total_bytes: state.total_bytes.load(Ordering::Relaxed),
            by_category: state
                .by_category
                .iter()
                .map(|entry| (entry.key().to_string(), *entry.value()))
                .collect(),
            duration,
            files_per_second,
        };
        info!(
            "Session {} {}: {} discovered, {} ok, {} failed in {:.2}s",
            summary.session_id,
            status.as_str(),
            summary.discovered_files,
            summary.successful_files,
            summary.failed_files,
            duration.as_secs_f64(),
        );
        reporter.on_session_complete(&summary);
        Ok(summary)
    }
}

/// Record one result and update the shared counters. A store failure flips
/// the cancel flag: results can no longer be guaranteed durable, so the
/// session winds down and surfaces the error as fatal.
fn record_outcome(state: &RunState<'_>, reporter: &dyn ProgressReporter, result: AnalysisResult) {
    let is_failed = result.status == ResultStatus::Failed;
    let category = result.category.as_str();
    let file_size = result.file_size;
    let primary_digest = result
        .digests
        .get(state.primary_algorithm.as_str())
        .cloned();

    match state.db.record_result(&result) {
        Ok(_) => {
            if is_failed {
                state.failed.fetch_add(1, Ordering::Relaxed);
            } else if let Some(digest) = primary_digest {
                *state.digest_groups.entry(digest).or_insert(0) += 1;
            }
            *state.by_category.entry(category).or_insert(0) += 1;
            state.total_bytes.fetch_add(file_size, Ordering::Relaxed);

            let done = state.processed.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.on_file_complete(
                done,
                state.discovered.load(Ordering::Relaxed),
                state.failed.load(Ordering::Relaxed),
            );
            if done % PROGRESS_WRITE_INTERVAL == 0 {
                let failed = state.failed.load(Ordering::Relaxed);
                let _ = state.db.update_session_progress(
                    state.session_id,
                    state.discovered.load(Ordering::Relaxed) as i64,
                    done as i64,
                    (done - failed) as i64,
                    failed as i64,
                );
            }
        }
        Err(err) => {
            error!("Recording result for {} failed: {}", result.file_path, err);
            let mut slot = state.store_error.lock().unwrap();
            if slot.is_none() {
                *slot = Some(err);
            }
            state.cancel.store(true, Ordering::Relaxed);
        }
    }
}

/// Run the full per-file pipeline: size gate, digests, analyzer dispatch.
/// Every failure mode, analyzer panics included, is folded into the
/// returned result so the caller has nothing to catch.
fn analyze_task(
    task: &FileTask,
    session_id: &str,
    config: &AppConfig,
    classifier: &Classifier,
    registry: &AnalyzerRegistry,
) -> AnalysisResult {
    let start = Instant::now();
    let category = classifier.refine_with_signature(&task.path, task.category);
    let mut result = AnalysisResult {
        session_id: session_id.to_string(),
        file_path: task.path.to_string_lossy().into_owned(),
        file_name: task
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        category,
        file_size: task.size,
        status: ResultStatus::Failed,
        error_message: None,
        digests: BTreeMap::new(),
        metadata: serde_json::Value::Null,
        parse_skips: 0,
        duration_ms: 0,
    };

    // Oversized files are rejected from metadata alone, without a read.
    if task.size > config.max_file_size_bytes() {
        result.error_message = Some(format!(
            "oversized: {} bytes exceeds the configured {} MB limit",
            task.size, config.max_file_size_mb
        ));
        result.duration_ms = start.elapsed().as_millis() as u64;
        return result;
    }

    match hasher::compute_digests(&task.path, &config.hash_algorithms, config.chunk_size) {
        Ok(digests) => result.digests = digests,
        Err(err) => {
            result.error_message = Some(format!("read failed during hashing: {}", err));
            result.duration_ms = start.elapsed().as_millis() as u64;
            return result;
        }
    }

    let facts = FileFacts::for_path(&task.path, task.size);
    let analyzer = registry.resolve(category);
    let outcome = catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&task.path, &facts)));
    match outcome {
        Ok(Ok(output)) => {
            result.status = if output.parse_skips > 0 {
                ResultStatus::Partial
            } else {
                ResultStatus::Success
            };
            result.metadata = output.metadata;
            result.parse_skips = output.parse_skips;
        }
        Ok(Err(err)) => {
            debug!("Analyzer rejected {}: {}", result.file_path, err);
            result.error_message = Some(err.to_string());
        }
        Err(_) => {
            error!("Analyzer panicked on {}", result.file_path);
            result.error_message = Some("analyzer panicked".to_string());
        }
    }
    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}

fn denied_result(session_id: &str, denied: &DeniedEntry) -> AnalysisResult {
    AnalysisResult {
        session_id: session_id.to_string(),
        file_path: denied.path.to_string_lossy().into_owned(),
        file_name: denied
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        category: denied.category,
        file_size: 0,
        status: ResultStatus::Failed,
        error_message: Some(denied.reason.clone()),
        digests: BTreeMap::new(),
        metadata: serde_json::Value::Null,
        parse_skips: 0,
        duration_ms: 0,
    }
}

fn validate_root(root: &Path) -> Result<(), Error> {
    let metadata = fs::metadata(root).map_err(|source| Error::UnreadableRoot {
        path: root.to_path_buf(),
        source,
    })?;
    if metadata.is_dir() {
        fs::read_dir(root).map_err(|source| Error::UnreadableRoot {
            path: root.to_path_buf(),
            source,
        })?;
    } else {
        fs::File::open(root).map_err(|source| Error::UnreadableRoot {
            path: root.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Time-derived session ids, unique within a process via the counter suffix.
fn generate_session_id() -> String {
    let sequence = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{:04}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S"),
        sequence
    )
}
