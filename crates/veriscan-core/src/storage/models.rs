use crate::classify::FileCategory;
use serde::Serialize;
use std::collections::BTreeMap;

/// Represents one analysis session — a single bounded invocation of the
/// engine over a set of root paths.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub root_paths: Vec<String>,
    pub config_json: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub status: SessionStatus,
    pub total_files: i64,
    pub processed_files: i64,
    pub successful_files: i64,
    pub failed_files: i64,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(SessionStatus::Running),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Partial,
    Failed,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Partial => "partial",
            ResultStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(ResultStatus::Success),
            "partial" => Some(ResultStatus::Partial),
            "failed" => Some(ResultStatus::Failed),
            _ => None,
        }
    }
}

/// The outcome of analyzing one file once. Owned by the store after
/// submission; rows are append-only — re-analysis of the same path within a
/// session inserts a new row.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub session_id: String,
    pub file_path: String,
    pub file_name: String,
    pub category: FileCategory,
    pub file_size: u64,
    pub status: ResultStatus,
    pub error_message: Option<String>,
    /// Algorithm name → lowercase hex digest. Empty when hashing failed.
    pub digests: BTreeMap<String, String>,
    /// Analyzer-specific metadata, open schema, stored as a JSON blob.
    pub metadata: serde_json::Value,
    /// Lines/records within the file that could not be parsed. Counted,
    /// never escalated to a file failure.
    pub parse_skips: u64,
    pub duration_ms: u64,
}

/// A stored result read back from the database.
#[derive(Debug, Clone, Serialize)]
pub struct StoredResult {
    pub id: i64,
    pub session_id: String,
    pub file_path: String,
    pub file_name: String,
    pub category: String,
    pub file_size: i64,
    pub status: String,
    pub error_message: Option<String>,
    pub digests: BTreeMap<String, String>,
    pub metadata: serde_json::Value,
    pub parse_skips: i64,
    pub duration_ms: i64,
    pub created_at: String,
}

/// Filters for result listings (report/duplicate subcommands).
#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub category: Option<FileCategory>,
    pub success_only: bool,
    pub limit: Option<i64>,
    pub offset: i64,
}

/// A set of result paths sharing one digest under one algorithm. Derived on
/// demand from stored rows, never persisted independently.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub algorithm: String,
    pub digest: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LargestFile {
    pub file_path: String,
    pub file_size: i64,
}

/// Aggregate statistics for a session, purely derived from stored rows.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatistics {
    pub total_results: i64,
    pub successful: i64,
    pub failed: i64,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub total_bytes: i64,
    pub parse_skips: i64,
    pub by_category: BTreeMap<String, i64>,
    pub largest_files: Vec<LargestFile>,
}
