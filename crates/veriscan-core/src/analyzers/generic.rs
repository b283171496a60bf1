use super::{Analyzer, AnalyzerError, AnalyzerOutput, FileFacts};
use serde_json::json;
use std::path::Path;

/// Fallback analyzer for categories with no specific registration. Records
/// basic filesystem metadata only; digests are attached by the worker.
pub struct GenericAnalyzer;

impl Analyzer for GenericAnalyzer {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn analyze(&self, path: &Path, facts: &FileFacts) -> Result<AnalyzerOutput, AnalyzerError> {
        let metadata = std::fs::metadata(path)?;
        let modified = metadata
            .modified()
            .ok()
            .map(chrono::DateTime::<chrono::Utc>::from)
            .map(|t| t.to_rfc3339());

        Ok(AnalyzerOutput::with_metadata(json!({
            "analyzer": self.name(),
            "extension": facts.extension,
            "size_bytes": facts.size,
            "modified": modified,
            "read_only": metadata.permissions().readonly(),
        })))
    }
}
