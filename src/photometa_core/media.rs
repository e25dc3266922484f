use crate::photometa_core::analysis::AnalysisRecord;
use crate::photometa_core::error::{PhotometaError, Result};
use crate::photometa_core::photo::{ExifRecord, IptcRecord, XmpRecord};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Identity of an entry in the collection, assigned once at submission.
pub type EntryId = Uuid;

/// Where the bytes of a submitted file live.
#[derive(Debug, Clone)]
pub enum FileContent {
    Memory(Arc<[u8]>),
    /// Read lazily when the entry starts processing.
    Path(PathBuf),
}

/// A file handed to the pipeline. Never modified after construction.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    content: FileContent,
}

impl RawFile {
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        let bytes: Arc<[u8]> = bytes.into();
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: bytes.len() as u64,
            content: FileContent::Memory(bytes),
        }
    }

    /// Describe a file on disk. Only the size is read here; the content is
    /// read when the file is processed.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PhotometaError::PathNotFound(path.to_path_buf()));
        }
        let size = fs::metadata(path)?.len();

        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        Ok(Self {
            name,
            mime_type: mime_type_for_path(path).to_string(),
            size,
            content: FileContent::Path(path.to_path_buf()),
        })
    }

    /// Load the full byte content.
    pub fn read(&self) -> Result<Arc<[u8]>> {
        match &self.content {
            FileContent::Memory(bytes) => Ok(Arc::clone(bytes)),
            FileContent::Path(path) => fs::read(path)
                .map(Arc::from)
                .map_err(|e| PhotometaError::Unreadable {
                    name: self.name.clone(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Boundary check applied before a file becomes an entry.
    pub fn is_image(&self) -> bool {
        self.mime_type.to_lowercase().starts_with("image/")
    }
}

/// Extension to MIME type table (lowercase extensions).
const MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("webp", "image/webp"),
    ("heic", "image/heic"),
    ("heif", "image/heif"),
    ("avif", "image/avif"),
    // RAW formats
    ("raw", "image/raw"),
    ("cr2", "image/cr2"),
    ("nef", "image/nef"),
    ("arw", "image/arw"),
    ("dng", "image/dng"),
    // Non-image types seen in photo folders
    ("txt", "text/plain"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("xml", "application/xml"),
    ("xmp", "application/rdf+xml"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("exe", "application/x-msdownload"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
];

/// Derive a declared MIME type from a file extension.
pub fn mime_type_for_path(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return "application/octet-stream";
    };
    let ext = ext.to_lowercase();
    MIME_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}

/// Pixel dimensions. `0 x 0` when the image could not be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn megapixels(&self) -> f64 {
        (self.width as f64 * self.height as f64) / 1_000_000.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub x: u32,
    pub y: u32,
}

impl From<Dimensions> for Resolution {
    fn from(d: Dimensions) -> Self {
        Self {
            x: d.width,
            y: d.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityChecks {
    pub has_executable_code: bool,
    pub has_suspicious_headers: bool,
    pub is_valid_format: bool,
}

impl Default for SecurityChecks {
    fn default() -> Self {
        Self {
            has_executable_code: false,
            has_suspicious_headers: false,
            is_valid_format: true,
        }
    }
}

/// Hashes and security verdict for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIntegrity {
    pub md5_hash: String,
    pub sha256_hash: String,
    pub crc32_hash: String,
    pub is_corrupted: bool,
    pub security_checks: SecurityChecks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicInfo {
    pub file_name: String,
    pub file_size: u64,
    pub file_size_formatted: String,
    pub format: String,
    pub dimensions: Dimensions,
    pub resolution: Resolution,
    pub file_integrity: FileIntegrity,
}

impl BasicInfo {
    /// Basic info known before any parsing: name, size and declared format.
    pub fn for_file(file: &RawFile) -> Self {
        Self {
            file_name: file.name.clone(),
            file_size: file.size,
            file_size_formatted: format_file_size(file.size),
            format: if file.mime_type.is_empty() {
                "Unknown".to_string()
            } else {
                file.mime_type.clone()
            },
            dimensions: Dimensions::default(),
            resolution: Resolution::default(),
            file_integrity: FileIntegrity::default(),
        }
    }
}

/// Lifecycle of an entry. `Completed` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Error(String),
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Error(_) => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Error(_))
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_advance_to(&self, next: &ProcessingStatus) -> bool {
        match (self, next) {
            (ProcessingStatus::Pending, ProcessingStatus::Processing) => true,
            (ProcessingStatus::Pending, ProcessingStatus::Error(_)) => true,
            (ProcessingStatus::Processing, ProcessingStatus::Completed) => true,
            (ProcessingStatus::Processing, ProcessingStatus::Error(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStatus::Error(message) => write!(f, "error: {}", message),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// One submitted file and everything extracted from it.
#[derive(Debug, Clone)]
pub struct ImageMetadataEntry {
    pub id: EntryId,
    pub file: Arc<RawFile>,
    /// Data URI of the original bytes.
    pub preview: Option<String>,
    pub basic_info: BasicInfo,
    pub exif: ExifRecord,
    pub iptc: IptcRecord,
    pub xmp: XmpRecord,
    pub analysis: Option<AnalysisRecord>,
    pub status: ProcessingStatus,
}

impl ImageMetadataEntry {
    /// A freshly accepted file, before any parsing.
    pub fn pending(file: Arc<RawFile>) -> Self {
        let basic_info = BasicInfo::for_file(&file);
        Self {
            id: Uuid::new_v4(),
            file,
            preview: None,
            basic_info,
            exif: ExifRecord::default(),
            iptc: IptcRecord::default(),
            xmp: XmpRecord::default(),
            analysis: None,
            status: ProcessingStatus::Pending,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            ProcessingStatus::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ProcessingStatus::Completed
    }
}

/// Human readable size: `0 Bytes`, `1.5 KB`, `12.34 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
