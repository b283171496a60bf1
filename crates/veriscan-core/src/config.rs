use crate::classify::FileCategory;
use crate::error::Error;
use crate::hasher::HashAlgorithm;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on the worker pool regardless of configuration, so a
/// misconfigured worker_count cannot exhaust file descriptors.
pub const MAX_WORKERS: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: String,
    pub worker_count: usize,
    /// Depth of the bounded task queue between the walker and the workers.
    pub queue_depth: usize,
    /// Hard cap on files discovered per session. Files beyond the cap are
    /// never turned into tasks.
    pub max_files_per_analysis: usize,
    pub max_file_size_mb: u64,
    pub chunk_size: usize,
    pub hash_algorithms: Vec<HashAlgorithm>,
    pub max_path_depth: usize,
    pub follow_symlinks: bool,
    pub ignore_patterns: Vec<String>,
    /// Extensions excluded from discovery entirely (no task, no result).
    pub blocked_extensions: Vec<String>,
    pub enable_security_analyzer: bool,
    pub enable_network_analyzer: bool,
    /// Tie-break order when more than one category claims a file.
    pub category_priority: Vec<FileCategory>,
    pub risk: RiskConfig,
    pub network: NetworkConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: "veriscan.db".to_string(),
            worker_count: 4,
            queue_depth: 256,
            max_files_per_analysis: 50_000,
            max_file_size_mb: 1024,
            chunk_size: 8192,
            hash_algorithms: vec![
                HashAlgorithm::Md5,
                HashAlgorithm::Sha1,
                HashAlgorithm::Sha256,
            ],
            max_path_depth: 20,
            follow_symlinks: false,
            ignore_patterns: Vec::new(),
            blocked_extensions: Vec::new(),
            enable_security_analyzer: true,
            enable_network_analyzer: true,
            category_priority: vec![
                FileCategory::Network,
                FileCategory::Security,
                FileCategory::Image,
                FileCategory::Document,
                FileCategory::Media,
            ],
            risk: RiskConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

/// Weights and thresholds for the security analyzer's risk scoring.
/// All values are configuration so tests can pin them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Entropy above this value counts as a risk factor.
    pub entropy_threshold: f64,
    pub entropy_weight: u32,
    pub suspicious_string_weight: u32,
    /// Applied once per detected executable-header anomaly.
    pub header_anomaly_weight: u32,
    pub critical_threshold: u32,
    pub high_threshold: u32,
    pub medium_threshold: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            entropy_threshold: 7.5,
            entropy_weight: 40,
            suspicious_string_weight: 50,
            header_anomaly_weight: 15,
            critical_threshold: 80,
            high_threshold: 60,
            medium_threshold: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Failed authentication attempts from one source before it is flagged.
    pub brute_force_threshold: usize,
    /// Line cap per log file; lines past it are not read.
    pub max_lines: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            brute_force_threshold: 5,
            max_lines: 50_000,
        }
    }
}

impl AppConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn effective_worker_count(&self) -> usize {
        self.worker_count.min(MAX_WORKERS)
    }

    /// Startup validation. Failures here are fatal: no session is created.
    pub fn validate(&self) -> Result<(), Error> {
        if self.worker_count == 0 {
            return Err(Error::InvalidConfig(
                "worker_count must be greater than zero".to_string(),
            ));
        }
        if self.max_files_per_analysis == 0 {
            return Err(Error::InvalidConfig(
                "max_files_per_analysis must be greater than zero".to_string(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(Error::InvalidConfig(
                "queue_depth must be greater than zero".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.hash_algorithms.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one hash algorithm must be configured".to_string(),
            ));
        }
        if self.category_priority.is_empty() {
            return Err(Error::InvalidConfig(
                "category_priority must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from an optional YAML/JSON file plus VERISCAN_*
/// environment overrides. Missing file falls back to defaults.
pub fn load_configuration(config_file: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();
    builder = match config_file {
        Some(path) => builder.add_source(ConfigFile::from(path)),
        None => builder.add_source(ConfigFile::with_name("veriscan").required(false)),
    };
    let settings = builder
        .add_source(Environment::with_prefix("VERISCAN"))
        .build()?;
    settings.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = AppConfig {
            worker_count: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker_count"));
    }

    #[test]
    fn test_zero_max_files_rejected() {
        let config = AppConfig {
            max_files_per_analysis: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_algorithm_list_rejected() {
        let config = AppConfig {
            hash_algorithms: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_count_is_bounded() {
        let config = AppConfig {
            worker_count: 10_000,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_worker_count(), MAX_WORKERS);
    }

    #[test]
    fn test_max_file_size_conversion() {
        let config = AppConfig {
            max_file_size_mb: 2,
            ..Default::default()
        };
        assert_eq!(config.max_file_size_bytes(), 2 * 1024 * 1024);
    }
}
