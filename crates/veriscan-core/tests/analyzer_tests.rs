use std::fs;
use std::path::Path;
use std::sync::Arc;

use veriscan_core::analyzers::{
    Analyzer, AnalyzerError, AnalyzerOutput, AnalyzerRegistry, FileFacts,
};
use veriscan_core::classify::FileCategory;
use veriscan_core::storage::models::ResultFilter;
use veriscan_core::storage::Database;
use veriscan_core::{AnalysisManager, AppConfig, SilentReporter};

struct MarkerAnalyzer(&'static str);

impl Analyzer for MarkerAnalyzer {
    fn name(&self) -> &'static str {
        self.0
    }

    fn analyze(&self, _path: &Path, _facts: &FileFacts) -> Result<AnalyzerOutput, AnalyzerError> {
        Ok(AnalyzerOutput::with_metadata(serde_json::json!({
            "analyzer": self.0
        })))
    }
}

#[test]
fn test_registry_falls_back_to_generic() {
    let registry = AnalyzerRegistry::new();
    // No registrations at all: every category resolves to the fallback.
    for category in [
        FileCategory::Image,
        FileCategory::Security,
        FileCategory::Generic,
    ] {
        assert_eq!(registry.resolve(category).name(), "generic");
    }
}

#[test]
fn test_registry_last_registration_wins() {
    let mut registry = AnalyzerRegistry::new();
    registry.register(FileCategory::Image, Arc::new(MarkerAnalyzer("first")));
    registry.register(FileCategory::Image, Arc::new(MarkerAnalyzer("second")));
    assert_eq!(registry.resolve(FileCategory::Image).name(), "second");
}

#[test]
fn test_defaults_honor_feature_toggles() {
    let enabled = AnalyzerRegistry::with_defaults(&AppConfig::default());
    assert_eq!(enabled.resolve(FileCategory::Security).name(), "security");
    assert_eq!(enabled.resolve(FileCategory::Network).name(), "network");

    let config = AppConfig {
        enable_security_analyzer: false,
        enable_network_analyzer: false,
        ..Default::default()
    };
    let disabled = AnalyzerRegistry::with_defaults(&config);
    // Disabled categories fall through to the generic analyzer.
    assert_eq!(disabled.resolve(FileCategory::Security).name(), "generic");
    assert_eq!(disabled.resolve(FileCategory::Network).name(), "generic");
    assert_eq!(disabled.resolve(FileCategory::Image).name(), "image");
}

fn run_over(root: &Path, db_path: &Path) -> String {
    let config = AppConfig {
        database_path: db_path.to_string_lossy().into_owned(),
        worker_count: 2,
        ..Default::default()
    };
    let manager = AnalysisManager::new(config);
    let summary = manager
        .run_session(&[root.to_path_buf()], &SilentReporter)
        .unwrap();
    summary.session_id
}

#[test]
fn test_security_file_gets_risk_assessment() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    fs::create_dir(&root).unwrap();
    fs::write(
        root.join("loader.bat"),
        "start CreateRemoteThread VirtualAllocEx payload",
    )
    .unwrap();

    let db_path = dir.path().join("t.db");
    let session_id = run_over(&root, &db_path);

    let db = Database::open(db_path.to_str().unwrap()).unwrap();
    let results = db.get_results(&session_id, &ResultFilter::default()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].category, "security");
    assert_eq!(results[0].status, "success");

    // One triggered factor kind (suspicious strings, weight 50) with low
    // entropy and no header anomalies lands on 50 / medium.
    let risk = &results[0].metadata["risk"];
    assert_eq!(risk["risk_score"], 50);
    assert_eq!(risk["risk_level"], "medium");
    assert!(risk["recommendation"].as_str().unwrap().len() > 10);
    let strings = results[0].metadata["suspicious_strings"].as_array().unwrap();
    assert_eq!(strings.len(), 2);
}

#[test]
fn test_extensionless_executable_classified_by_signature() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("mystery"), b"\x7fELF\x02\x01\x01\x00rest").unwrap();

    let db_path = dir.path().join("t.db");
    let session_id = run_over(&root, &db_path);

    let db = Database::open(db_path.to_str().unwrap()).unwrap();
    let results = db.get_results(&session_id, &ResultFilter::default()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].category, "security");
    assert_eq!(results[0].metadata["executable"]["format"], "elf");
}

#[test]
fn test_image_and_document_metadata_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    fs::create_dir(&root).unwrap();

    // Minimal PNG header with a 32x16 IHDR.
    let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
    png.extend_from_slice(&13u32.to_be_bytes());
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&32u32.to_be_bytes());
    png.extend_from_slice(&16u32.to_be_bytes());
    png.extend_from_slice(&[8, 6, 0, 0, 0]);
    fs::write(root.join("tiny.png"), &png).unwrap();
    fs::write(root.join("readme.txt"), "two words\n").unwrap();

    let db_path = dir.path().join("t.db");
    let session_id = run_over(&root, &db_path);

    let db = Database::open(db_path.to_str().unwrap()).unwrap();
    let results = db.get_results(&session_id, &ResultFilter::default()).unwrap();
    assert_eq!(results.len(), 2);

    let image = results.iter().find(|r| r.category == "image").unwrap();
    assert_eq!(image.metadata["width"], 32);
    assert_eq!(image.metadata["height"], 16);

    let document = results.iter().find(|r| r.category == "document").unwrap();
    assert_eq!(document.metadata["words"], 2);
    assert_eq!(document.metadata["encoding"], "utf-8");
}

#[test]
fn test_unsupported_content_is_failed_result_with_detail() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("broken.png"), "not image bytes").unwrap();

    let db_path = dir.path().join("t.db");
    let session_id = run_over(&root, &db_path);

    let db = Database::open(db_path.to_str().unwrap()).unwrap();
    let results = db.get_results(&session_id, &ResultFilter::default()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, "failed");
    assert!(results[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("unsupported content"));
    // Hashing ran before the analyzer rejected the content, so the digests
    // are still recorded on the failed row.
    assert!(!results[0].digests.is_empty());
}

#[test]
fn test_ssh_brute_force_surfaces_in_stored_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    fs::create_dir(&root).unwrap();
    let mut log = String::new();
    for i in 0..7 {
        log.push_str(&format!(
            "Aug  2 03:10:{i:02} bastion sshd[412]: Failed password for root from 198.51.100.23 port 50000 ssh2\n"
        ));
    }
    fs::write(root.join("auth.log"), log).unwrap();

    let db_path = dir.path().join("t.db");
    let session_id = run_over(&root, &db_path);

    let db = Database::open(db_path.to_str().unwrap()).unwrap();
    let results = db.get_results(&session_id, &ResultFilter::default()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].category, "network");
    let suspicious = results[0].metadata["suspicious_activity"].as_array().unwrap();
    assert_eq!(suspicious.len(), 1);
    assert_eq!(suspicious[0]["kind"], "brute_force_source");
    assert_eq!(suspicious[0]["ip"], "198.51.100.23");
}
