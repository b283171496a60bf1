use crate::classify::{Classifier, FileCategory};
use glob::Pattern;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// One file's unit of scheduled work. Created during the walk, consumed
/// exactly once by a worker, never persisted.
#[derive(Debug, Clone)]
pub struct FileTask {
    pub path: PathBuf,
    pub category: FileCategory,
    pub size: u64,
    pub depth: usize,
}

/// A path the walk could not turn into a task but must not drop silently:
/// disallowed symlinks and entries whose metadata could not be read. The
/// engine records these as failed results for traceability.
#[derive(Debug, Clone)]
pub struct DeniedEntry {
    pub path: PathBuf,
    pub category: FileCategory,
    pub reason: String,
}

#[derive(Debug)]
pub enum Discovery {
    Task(FileTask),
    Denied(DeniedEntry),
}

#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub max_depth: usize,
    pub follow_symlinks: bool,
    /// Hard cap: discovery stops once this many entries (tasks + denied)
    /// have been produced. Files beyond the cap are not tasks at all.
    pub max_files: usize,
    pub ignore_patterns: Vec<String>,
    pub blocked_extensions: Vec<String>,
}

/// Walk the root paths depth-first in sorted order so a fixed filesystem
/// state always yields the same discovery sequence. Feeds each discovery to
/// `sink`; a `false` return stops the walk early (cancellation).
///
/// Directory read errors below the roots are logged and skipped, matching
/// the tolerance of the rest of the pipeline: only unreadable *roots* are
/// fatal, and those are rejected before the walk starts.
pub fn walk_roots(
    roots: &[PathBuf],
    options: &WalkOptions,
    classifier: &Classifier,
    mut sink: impl FnMut(Discovery) -> bool,
) -> usize {
    let ignore: Vec<Pattern> = options
        .ignore_patterns
        .iter()
        .filter_map(|raw| match Pattern::new(raw) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                warn!("Invalid ignore pattern '{}': {}", raw, err);
                None
            }
        })
        .collect();
    let blocked: HashSet<String> = options
        .blocked_extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut discovered = 0usize;

    'roots: for root in roots {
        let walker = WalkDir::new(root)
            .max_depth(options.max_depth)
            .follow_links(options.follow_symlinks)
            .sort_by_file_name();

        for entry in walker {
            if discovered >= options.max_files {
                break 'roots;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };

            let path = entry.path();
            if ignore.iter().any(|pattern| pattern.matches_path(path)) {
                continue;
            }

            if !options.follow_symlinks && entry.path_is_symlink() {
                // Disallowed symlinks are recorded as failures, not dropped.
                discovered += 1;
                let denied = Discovery::Denied(DeniedEntry {
                    path: path.to_path_buf(),
                    category: classifier.classify_by_extension(path),
                    reason: "symlink skipped: symlink traversal is disabled".to_string(),
                });
                if !sink(denied) {
                    break 'roots;
                }
                continue;
            }

            if !entry.file_type().is_file() {
                continue;
            }

            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                if blocked.contains(&ext.to_ascii_lowercase()) {
                    continue;
                }
            }

            let discovery = match entry.metadata() {
                Ok(metadata) => {
                    discovered += 1;
                    Discovery::Task(FileTask {
                        path: path.to_path_buf(),
                        category: classifier.classify_by_extension(path),
                        size: metadata.len(),
                        depth: entry.depth(),
                    })
                }
                Err(err) => {
                    discovered += 1;
                    Discovery::Denied(DeniedEntry {
                        path: path.to_path_buf(),
                        category: classifier.classify_by_extension(path),
                        reason: format!("metadata read failed: {}", err),
                    })
                }
            };

            if !sink(discovery) {
                break 'roots;
            }
        }
    }

    discovered
}

/// Convenience used by tests and the CLI dry-run path: collect the walk
/// into a vector instead of streaming it.
pub fn collect_tasks(
    roots: &[PathBuf],
    options: &WalkOptions,
    classifier: &Classifier,
) -> Vec<Discovery> {
    let mut all = Vec::new();
    walk_roots(roots, options, classifier, |discovery| {
        all.push(discovery);
        true
    });
    all
}

pub fn default_walk_options(config: &crate::config::AppConfig) -> WalkOptions {
    WalkOptions {
        max_depth: config.max_path_depth,
        follow_symlinks: config.follow_symlinks,
        max_files: config.max_files_per_analysis,
        ignore_patterns: config.ignore_patterns.clone(),
        blocked_extensions: config.blocked_extensions.clone(),
    }
}
