pub mod document;
pub mod generic;
pub mod image;
pub mod media;
pub mod network;
pub mod security;

use crate::classify::FileCategory;
use crate::config::AppConfig;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Facts the worker already knows about a file before dispatching it. An
/// analyzer must not re-hash or re-walk; it only reads content.
#[derive(Debug, Clone)]
pub struct FileFacts {
    pub size: u64,
    pub extension: Option<String>,
}

impl FileFacts {
    pub fn for_path(path: &Path, size: u64) -> Self {
        Self {
            size,
            extension: path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase()),
        }
    }
}

/// Typed failure from one analyzer run. Contained at the task boundary and
/// recorded as a failed result; never escalated past the worker.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported content: {0}")]
    Unsupported(String),
}

/// Analyzer output: open-schema metadata plus per-line parse accounting.
#[derive(Debug, Default)]
pub struct AnalyzerOutput {
    pub metadata: serde_json::Value,
    /// Records within the file that could not be parsed (log lines etc).
    /// Non-zero skips mark the result as partial, not failed.
    pub parse_skips: u64,
}

impl AnalyzerOutput {
    pub fn with_metadata(metadata: serde_json::Value) -> Self {
        Self {
            metadata,
            parse_skips: 0,
        }
    }
}

/// One analyzer variant. Implementations must not retry I/O, must not mutate
/// shared state, and must complete in time proportional to file size.
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;

    fn analyze(&self, path: &Path, facts: &FileFacts) -> Result<AnalyzerOutput, AnalyzerError>;
}

/// Maps a detected file category to the analyzer responsible for it.
/// Categories with no registration resolve to the Generic fallback, so
/// resolution never fails and the engine never needs a special case.
pub struct AnalyzerRegistry {
    analyzers: HashMap<FileCategory, Arc<dyn Analyzer>>,
    fallback: Arc<dyn Analyzer>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self {
            analyzers: HashMap::new(),
            fallback: Arc::new(generic::GenericAnalyzer),
        }
    }

    /// Build a registry with every built-in analyzer, honoring the feature
    /// toggles. Disabled categories fall through to Generic.
    pub fn with_defaults(config: &AppConfig) -> Self {
        let mut registry = Self::new();
        registry.register(FileCategory::Image, Arc::new(image::ImageAnalyzer));
        registry.register(FileCategory::Document, Arc::new(document::DocumentAnalyzer));
        registry.register(FileCategory::Media, Arc::new(media::MediaAnalyzer));
        if config.enable_network_analyzer {
            registry.register(
                FileCategory::Network,
                Arc::new(network::NetworkAnalyzer::new(config.network.clone())),
            );
        }
        if config.enable_security_analyzer {
            registry.register(
                FileCategory::Security,
                Arc::new(security::SecurityAnalyzer::new(config.risk.clone())),
            );
        }
        registry
    }

    /// Idempotent; the last registration for a category wins, so callers can
    /// override a built-in without touching dispatch.
    pub fn register(&mut self, category: FileCategory, analyzer: Arc<dyn Analyzer>) {
        self.analyzers.insert(category, analyzer);
    }

    pub fn resolve(&self, category: FileCategory) -> Arc<dyn Analyzer> {
        self.analyzers
            .get(&category)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
