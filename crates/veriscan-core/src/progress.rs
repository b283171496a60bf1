use crate::engine::SessionSummary;

/// Trait for reporting session progress.
///
/// CLI implements with tracing/indicatif; tests use SilentReporter.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_session_start(&self, _session_id: &str) {}
    fn on_file_discovered(&self, _discovered: usize, _current_path: &str) {}
    fn on_file_complete(&self, _completed: usize, _discovered: usize, _failed: usize) {}
    fn on_session_complete(&self, _summary: &SessionSummary) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
