use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// File categories the engine dispatches on. One category per file; overlap
/// is resolved by the configured priority order, never by fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Document,
    Media,
    Network,
    Security,
    Generic,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Image => "image",
            FileCategory::Document => "document",
            FileCategory::Media => "media",
            FileCategory::Network => "network",
            FileCategory::Security => "security",
            FileCategory::Generic => "generic",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "image" => Some(FileCategory::Image),
            "document" => Some(FileCategory::Document),
            "media" => Some(FileCategory::Media),
            "network" => Some(FileCategory::Network),
            "security" => Some(FileCategory::Security),
            "generic" => Some(FileCategory::Generic),
            _ => None,
        }
    }

    /// Extensions claimed by this category (lowercase, no dot).
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            FileCategory::Image => &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"],
            FileCategory::Document => &[
                "pdf", "docx", "doc", "xlsx", "xls", "pptx", "ppt", "txt", "rtf",
            ],
            FileCategory::Media => &[
                "mp3", "wav", "flac", "m4a", "aac", "ogg", "wma", "mp4", "avi", "mkv", "mov",
                "wmv", "flv", "webm",
            ],
            FileCategory::Network => &["log", "pcap", "cap", "access", "auth", "syslog"],
            FileCategory::Security => &[
                "exe", "dll", "scr", "bat", "cmd", "ps1", "vbs", "js", "jar", "apk", "dex", "so",
                "dylib", "bin", "com", "pif",
            ],
            FileCategory::Generic => &[],
        }
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps files to categories using extension tables and, for extensionless
/// files, executable magic bytes. The priority list decides ties when user
/// configuration makes more than one category claim an extension.
#[derive(Debug, Clone)]
pub struct Classifier {
    priority: Vec<FileCategory>,
}

impl Classifier {
    pub fn new(priority: Vec<FileCategory>) -> Self {
        Self { priority }
    }

    /// Extension-only classification, cheap enough for the walk phase.
    pub fn classify_by_extension(&self, path: &Path) -> FileCategory {
        let extension = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return FileCategory::Generic,
        };

        for &category in &self.priority {
            if category.extensions().contains(&extension.as_str()) {
                return category;
            }
        }
        FileCategory::Generic
    }

    /// Signature refinement for files the extension pass left generic:
    /// extensionless executables (MZ / ELF) classify as security so they are
    /// not analyzed as opaque blobs. Unreadable files stay generic; the
    /// hashing step will surface the read error.
    pub fn refine_with_signature(&self, path: &Path, category: FileCategory) -> FileCategory {
        if category != FileCategory::Generic || path.extension().is_some() {
            return category;
        }
        match read_magic(path) {
            Some(magic) if magic.starts_with(b"MZ") || magic.starts_with(b"\x7fELF") => {
                FileCategory::Security
            }
            _ => category,
        }
    }
}

fn read_magic(path: &Path) -> Option<[u8; 4]> {
    let mut file = File::open(path).ok()?;
    let mut magic = [0u8; 4];
    let read = file.read(&mut magic).ok()?;
    if read < 4 {
        return None;
    }
    Some(magic)
}
