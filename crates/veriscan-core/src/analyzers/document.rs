use super::{Analyzer, AnalyzerError, AnalyzerOutput, FileFacts};
use serde_json::json;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Content read cap for text statistics and PDF structure sniffing.
const SCAN_LIMIT: usize = 1024 * 1024;

/// Document analyzer. Text files get line/word/encoding statistics; binary
/// document formats are identified by container signature (PDF header, ZIP
/// for OOXML, OLE compound files). Full format decoding is out of scope.
pub struct DocumentAnalyzer;

impl Analyzer for DocumentAnalyzer {
    fn name(&self) -> &'static str {
        "document"
    }

    fn analyze(&self, path: &Path, facts: &FileFacts) -> Result<AnalyzerOutput, AnalyzerError> {
        let mut file = File::open(path)?;
        let mut data = Vec::with_capacity(SCAN_LIMIT.min(facts.size as usize + 1));
        file.by_ref().take(SCAN_LIMIT as u64).read_to_end(&mut data)?;

        let metadata = if data.starts_with(b"%PDF-") {
            analyze_pdf(&data)
        } else if data.starts_with(b"PK\x03\x04") {
            json!({
                "analyzer": self.name(),
                "container": "zip",
                "kind": ooxml_kind(facts.extension.as_deref()),
            })
        } else if data.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]) {
            json!({
                "analyzer": self.name(),
                "container": "ole",
                "kind": legacy_office_kind(facts.extension.as_deref()),
            })
        } else {
            analyze_text(&data, facts.size as usize > SCAN_LIMIT)
        };

        Ok(AnalyzerOutput::with_metadata(metadata))
    }
}

fn analyze_pdf(data: &[u8]) -> serde_json::Value {
    let version = data
        .get(5..8)
        .and_then(|v| std::str::from_utf8(v).ok())
        .map(|v| v.trim_end_matches(|c: char| !c.is_ascii_digit()).to_string());
    let encrypted = contains(data, b"/Encrypt");
    let has_eof = contains(data, b"%%EOF");
    json!({
        "analyzer": "document",
        "container": "pdf",
        "pdf_version": version,
        "encrypted": encrypted,
        "truncated": !has_eof,
    })
}

fn analyze_text(data: &[u8], capped: bool) -> serde_json::Value {
    let (text, encoding) = match std::str::from_utf8(data) {
        Ok(text) => (text.to_string(), "utf-8"),
        Err(_) => (
            data.iter().map(|&b| b as char).collect::<String>(),
            "latin-1",
        ),
    };

    let lines = text.lines().count();
    let words = text.split_whitespace().count();
    let characters = text.chars().count();

    json!({
        "analyzer": "document",
        "container": "text",
        "encoding": encoding,
        "lines": lines,
        "words": words,
        "characters": characters,
        "scan_capped": capped,
    })
}

fn ooxml_kind(extension: Option<&str>) -> &'static str {
    match extension {
        Some("docx") => "word",
        Some("xlsx") => "spreadsheet",
        Some("pptx") => "presentation",
        _ => "zip-archive",
    }
}

fn legacy_office_kind(extension: Option<&str>) -> &'static str {
    match extension {
        Some("doc") => "word",
        Some("xls") => "spreadsheet",
        Some("ppt") => "presentation",
        _ => "compound-document",
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}
