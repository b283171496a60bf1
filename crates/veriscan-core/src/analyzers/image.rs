use super::{Analyzer, AnalyzerError, AnalyzerOutput, FileFacts};
use serde_json::json;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Header bytes read for dimension extraction. JPEG dimension markers can
/// sit past kilobytes of EXIF, so this is generous but still bounded.
const HEADER_READ_LIMIT: usize = 64 * 1024;

/// Image analyzer: format identification and pixel dimensions straight from
/// the container header. No decoder is involved; a recognized signature with
/// unparseable dimensions degrades to a format-only answer.
pub struct ImageAnalyzer;

impl Analyzer for ImageAnalyzer {
    fn name(&self) -> &'static str {
        "image"
    }

    fn analyze(&self, path: &Path, facts: &FileFacts) -> Result<AnalyzerOutput, AnalyzerError> {
        let mut file = File::open(path)?;
        let mut header = vec![0u8; HEADER_READ_LIMIT.min(facts.size as usize).max(32)];
        let read = read_up_to(&mut file, &mut header)?;
        header.truncate(read);

        let parsed = parse_image_header(&header);
        let Some(parsed) = parsed else {
            return Err(AnalyzerError::Unsupported(
                "unrecognized image signature".to_string(),
            ));
        };

        Ok(AnalyzerOutput::with_metadata(json!({
            "analyzer": self.name(),
            "format": parsed.format,
            "width": parsed.width,
            "height": parsed.height,
        })))
    }
}

struct ParsedImage {
    format: &'static str,
    width: Option<u32>,
    height: Option<u32>,
}

fn parse_image_header(data: &[u8]) -> Option<ParsedImage> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        // IHDR is always the first chunk: width/height at offsets 16/20.
        let (width, height) = if data.len() >= 24 {
            (Some(be_u32(&data[16..20])), Some(be_u32(&data[20..24])))
        } else {
            (None, None)
        };
        return Some(ParsedImage {
            format: "png",
            width,
            height,
        });
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        let (width, height) = if data.len() >= 10 {
            (
                Some(le_u16(&data[6..8]) as u32),
                Some(le_u16(&data[8..10]) as u32),
            )
        } else {
            (None, None)
        };
        return Some(ParsedImage {
            format: "gif",
            width,
            height,
        });
    }
    if data.starts_with(b"BM") {
        let (width, height) = if data.len() >= 26 {
            (
                Some(le_u32(&data[18..22])),
                // Height may be negative for top-down bitmaps.
                Some((le_u32(&data[22..26]) as i32).unsigned_abs()),
            )
        } else {
            (None, None)
        };
        return Some(ParsedImage {
            format: "bmp",
            width,
            height,
        });
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        let (width, height) = jpeg_dimensions(data);
        return Some(ParsedImage {
            format: "jpeg",
            width,
            height,
        });
    }
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some(ParsedImage {
            format: "webp",
            width: None,
            height: None,
        });
    }
    if data.starts_with(b"II*\x00") || data.starts_with(b"MM\x00*") {
        return Some(ParsedImage {
            format: "tiff",
            width: None,
            height: None,
        });
    }
    None
}

/// Walk JPEG markers until a start-of-frame segment carries the dimensions.
fn jpeg_dimensions(data: &[u8]) -> (Option<u32>, Option<u32>) {
    let mut offset = 2usize;
    while offset + 4 <= data.len() {
        if data[offset] != 0xFF {
            offset += 1;
            continue;
        }
        let marker = data[offset + 1];
        // SOF0..SOF3, SOF5..SOF7, SOF9..SOF11, SOF13..SOF15 carry dimensions.
        let is_sof = matches!(marker, 0xC0..=0xCF)
            && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            if offset + 9 <= data.len() {
                let height = be_u16(&data[offset + 5..offset + 7]) as u32;
                let width = be_u16(&data[offset + 7..offset + 9]) as u32;
                return (Some(width), Some(height));
            }
            return (None, None);
        }
        if marker == 0xD8 || marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            offset += 2;
            continue;
        }
        let segment_len = be_u16(&data[offset + 2..offset + 4]) as usize;
        if segment_len < 2 {
            break;
        }
        offset += 2 + segment_len;
    }
    (None, None)
}

fn read_up_to(file: &mut File, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0usize;
    while filled < buffer.len() {
        let read = file.read(&mut buffer[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn be_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}
