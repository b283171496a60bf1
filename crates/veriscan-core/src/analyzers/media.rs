use super::{Analyzer, AnalyzerError, AnalyzerOutput, FileFacts};
use serde_json::json;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const HEADER_READ: usize = 4096;

/// Media analyzer: container identification and the tag/technical fields
/// that live in fixed header positions (ID3 version and tag size, WAV format
/// block, MP4 brand). Codec-level decoding stays out of scope.
pub struct MediaAnalyzer;

impl Analyzer for MediaAnalyzer {
    fn name(&self) -> &'static str {
        "media"
    }

    fn analyze(&self, path: &Path, _facts: &FileFacts) -> Result<AnalyzerOutput, AnalyzerError> {
        let mut file = File::open(path)?;
        let mut header = [0u8; HEADER_READ];
        let read = file.read(&mut header)?;
        let data = &header[..read];

        let metadata = parse_media_header(data).ok_or_else(|| {
            AnalyzerError::Unsupported("unrecognized media container".to_string())
        })?;
        Ok(AnalyzerOutput::with_metadata(metadata))
    }
}

fn parse_media_header(data: &[u8]) -> Option<serde_json::Value> {
    if data.starts_with(b"ID3") && data.len() >= 10 {
        // ID3v2 header: version, flags, then a 28-bit syncsafe tag size.
        let tag_size = syncsafe_u32(&data[6..10]);
        return Some(json!({
            "analyzer": "media",
            "container": "mp3",
            "id3_version": format!("2.{}.{}", data[3], data[4]),
            "id3_tag_bytes": tag_size,
        }));
    }
    if data.len() >= 2 && data[0] == 0xFF && (data[1] & 0xE0) == 0xE0 {
        return Some(json!({
            "analyzer": "media",
            "container": "mp3",
            "id3_version": serde_json::Value::Null,
        }));
    }
    if data.starts_with(b"fLaC") {
        return Some(json!({ "analyzer": "media", "container": "flac" }));
    }
    if data.starts_with(b"OggS") {
        return Some(json!({ "analyzer": "media", "container": "ogg" }));
    }
    if data.len() >= 12 && &data[0..4] == b"RIFF" {
        match &data[8..12] {
            b"WAVE" => {
                // Canonical WAV layout puts the fmt chunk right after the
                // RIFF header; fall back to container-only when it is not.
                let (channels, sample_rate) = if data.len() >= 28 && &data[12..16] == b"fmt " {
                    (
                        Some(u16::from_le_bytes([data[22], data[23]])),
                        Some(u32::from_le_bytes([data[24], data[25], data[26], data[27]])),
                    )
                } else {
                    (None, None)
                };
                return Some(json!({
                    "analyzer": "media",
                    "container": "wav",
                    "channels": channels,
                    "sample_rate": sample_rate,
                }));
            }
            b"AVI " => {
                return Some(json!({ "analyzer": "media", "container": "avi" }));
            }
            _ => return None,
        }
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        let brand = String::from_utf8_lossy(&data[8..12]).trim().to_string();
        return Some(json!({
            "analyzer": "media",
            "container": "mp4",
            "major_brand": brand,
        }));
    }
    if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(json!({ "analyzer": "media", "container": "matroska" }));
    }
    None
}

fn syncsafe_u32(bytes: &[u8]) -> u32 {
    ((bytes[0] as u32 & 0x7F) << 21)
        | ((bytes[1] as u32 & 0x7F) << 14)
        | ((bytes[2] as u32 & 0x7F) << 7)
        | (bytes[3] as u32 & 0x7F)
}
