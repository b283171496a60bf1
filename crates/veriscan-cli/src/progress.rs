use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use veriscan_core::{ProgressReporter, SessionSummary};

/// CLI progress reporter using an indicatif bar.
///
/// Discovery and analysis overlap, so one bar carries both: the length
/// grows as the walk finds files and the position advances as workers
/// finish them.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for CliReporter {
    fn on_session_start(&self, session_id: &str) {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.cyan} Analyzing [{bar:30.cyan/dim}] {pos}/{len} files ({msg})",
            )
            .unwrap()
            .progress_chars("━╸─")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.set_message("0 failed");
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        *self.bar.lock().unwrap() = Some(pb);
        eprintln!("  Session {}", session_id);
    }

    fn on_file_discovered(&self, discovered: usize, _current_path: &str) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_length(discovered as u64);
        }
    }

    fn on_file_complete(&self, completed: usize, discovered: usize, failed: usize) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            if pb.length() != Some(discovered as u64) {
                pb.set_length(discovered as u64);
            }
            pb.set_position(completed as u64);
            pb.set_message(format!("{} failed", failed));
        }
    }

    fn on_session_complete(&self, summary: &SessionSummary) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
        eprintln!(
            "  \x1b[32m✓\x1b[0m Analysis complete: {} files ({} failed) in {:.2}s",
            summary.processed_files,
            summary.failed_files,
            summary.duration.as_secs_f64()
        );
    }
}
