use super::{Analyzer, AnalyzerError, AnalyzerOutput, FileFacts};
use crate::config::RiskConfig;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Byte cap for entropy and string scanning. Large binaries get their first
/// megabyte examined, which is where packers and droppers live anyway.
const SCAN_LIMIT: usize = 1024 * 1024;

/// API names and markers that rarely appear together in benign files.
/// Grouped so the report can say *why* a file looked hostile.
static SUSPICIOUS_STRINGS: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("process-injection", "CreateRemoteThread"),
        ("process-injection", "VirtualAllocEx"),
        ("process-injection", "WriteProcessMemory"),
        ("hooking", "SetWindowsHookEx"),
        ("loader", "GetProcAddress"),
        ("loader", "LoadLibrary"),
        ("downloader", "URLDownloadToFile"),
        ("downloader", "InternetOpen"),
        ("downloader", "HttpSendRequest"),
        ("persistence", "RegSetValueEx"),
        ("persistence", "RegCreateKeyEx"),
        ("persistence", "CreateService"),
        ("evasion", "IsDebuggerPresent"),
        ("evasion", "CheckRemoteDebuggerPresent"),
        ("crypto", "CryptAcquireContext"),
        ("crypto", "CryptEncrypt"),
        ("test-signature", "EICAR-STANDARD-ANTIVIRUS-TEST-FILE"),
    ]
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Risk assessment attached to security-category results. A pure function of
/// the inputs: re-scoring the same metadata yields the same assessment.
#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub entropy: f64,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub recommendation: String,
}

/// Shannon entropy of the byte distribution, 0.0 to 8.0 bits per byte.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }
    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &count in counts.iter() {
        if count > 0 {
            let p = count as f64 / len;
            entropy -= p * p.log2();
        }
    }
    entropy
}

/// Capped weighted sum of triggered factors mapped to a level by the
/// configured thresholds. Adding a triggered factor never lowers the score.
pub fn assess_risk(
    entropy: f64,
    suspicious_strings: &[String],
    header_anomalies: &[String],
    risk: &RiskConfig,
) -> RiskAssessment {
    let mut score = 0u32;
    let mut factors = Vec::new();

    if entropy > risk.entropy_threshold {
        score += risk.entropy_weight;
        factors.push(format!(
            "high entropy {:.2} (possible packing or encryption)",
            entropy
        ));
    }
    if !suspicious_strings.is_empty() {
        score += risk.suspicious_string_weight;
        factors.push(format!(
            "suspicious strings present ({})",
            suspicious_strings.join(", ")
        ));
    }
    for anomaly in header_anomalies {
        score += risk.header_anomaly_weight;
        factors.push(format!("executable header anomaly: {}", anomaly));
    }

    let score = score.min(100);
    let level = if score >= risk.critical_threshold {
        RiskLevel::Critical
    } else if score >= risk.high_threshold {
        RiskLevel::High
    } else if score >= risk.medium_threshold {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    RiskAssessment {
        entropy,
        risk_score: score,
        risk_level: level,
        risk_factors: factors,
        recommendation: recommendation_for(level).to_string(),
    }
}

fn recommendation_for(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Low => "Exercise normal caution, monitor for unusual behavior",
        RiskLevel::Medium => "Increased caution recommended, scan with updated antivirus",
        RiskLevel::High => "High risk detected, avoid execution, submit for analysis",
        RiskLevel::Critical => "Critical risk - do not execute, isolate immediately",
    }
}

/// Security analyzer: entropy, suspicious-string table, executable header
/// anomaly checks, and the derived risk assessment.
pub struct SecurityAnalyzer {
    risk: RiskConfig,
}

impl SecurityAnalyzer {
    pub fn new(risk: RiskConfig) -> Self {
        Self { risk }
    }
}

impl Analyzer for SecurityAnalyzer {
    fn name(&self) -> &'static str {
        "security"
    }

    fn analyze(&self, path: &Path, facts: &FileFacts) -> Result<AnalyzerOutput, AnalyzerError> {
        let mut file = File::open(path)?;
        let mut data = Vec::with_capacity(SCAN_LIMIT.min(facts.size as usize + 1));
        file.by_ref().take(SCAN_LIMIT as u64).read_to_end(&mut data)?;

        let entropy = shannon_entropy(&data);
        let matched = find_suspicious_strings(&data);
        let matched_names: Vec<String> = matched
            .iter()
            .map(|(_, needle)| needle.to_string())
            .collect();
        let header = inspect_executable_header(&data);
        let assessment = assess_risk(entropy, &matched_names, &header.anomalies, &self.risk);

        Ok(AnalyzerOutput::with_metadata(json!({
            "analyzer": self.name(),
            "bytes_scanned": data.len(),
            "entropy": entropy,
            "suspicious_strings": matched
                .iter()
                .map(|(category, needle)| json!({ "category": category, "value": needle }))
                .collect::<Vec<_>>(),
            "executable": {
                "format": header.format,
                "anomalies": header.anomalies,
            },
            "risk": assessment,
        })))
    }
}

fn find_suspicious_strings(data: &[u8]) -> Vec<(&'static str, &'static str)> {
    let text = String::from_utf8_lossy(data).to_ascii_lowercase();
    SUSPICIOUS_STRINGS
        .iter()
        .filter(|(_, needle)| text.contains(&needle.to_ascii_lowercase()))
        .copied()
        .collect()
}

struct HeaderInspection {
    format: Option<&'static str>,
    anomalies: Vec<String>,
}

/// Structural checks on recognized executable headers. A file that is not an
/// executable yields no format and no anomalies; that is not an error.
fn inspect_executable_header(data: &[u8]) -> HeaderInspection {
    if data.starts_with(b"MZ") {
        return inspect_pe(data);
    }
    if data.starts_with(b"\x7fELF") {
        return HeaderInspection {
            format: Some("elf"),
            anomalies: Vec::new(),
        };
    }
    HeaderInspection {
        format: None,
        anomalies: Vec::new(),
    }
}

fn inspect_pe(data: &[u8]) -> HeaderInspection {
    let mut anomalies = Vec::new();

    if data.len() < 64 {
        anomalies.push("truncated DOS header".to_string());
        return HeaderInspection {
            format: Some("pe"),
            anomalies,
        };
    }

    let pe_offset = u32::from_le_bytes([data[60], data[61], data[62], data[63]]) as usize;
    if pe_offset + 24 > data.len() {
        anomalies.push("PE header offset beyond file contents".to_string());
        return HeaderInspection {
            format: Some("pe"),
            anomalies,
        };
    }
    if &data[pe_offset..pe_offset + 4] != b"PE\x00\x00" {
        anomalies.push("missing PE signature at declared offset".to_string());
        return HeaderInspection {
            format: Some("pe"),
            anomalies,
        };
    }

    // COFF header follows the signature: machine, section count, timestamp.
    let coff = &data[pe_offset + 4..pe_offset + 24];
    let section_count = u16::from_le_bytes([coff[2], coff[3]]);
    let timestamp = u32::from_le_bytes([coff[4], coff[5], coff[6], coff[7]]);

    if section_count > 10 {
        anomalies.push(format!("excessive section count ({})", section_count));
    } else if section_count < 2 {
        anomalies.push(format!("too few sections ({})", section_count));
    }
    if timestamp == 0 {
        anomalies.push("zeroed build timestamp".to_string());
    }

    HeaderInspection {
        format: Some("pe"),
        anomalies,
    }
}
