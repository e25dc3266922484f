use md5::Md5;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Magic bytes of native executables. Prefix match only.
pub const EXECUTABLE_SIGNATURES: &[(&str, &[u8])] = &[
    ("MZ", &[0x4D, 0x5A]),
    ("ELF", &[0x7F, 0x45, 0x4C, 0x46]),
    ("Mach-O 32", &[0xFE, 0xED, 0xFA, 0xCE]),
    ("Mach-O 64", &[0xFE, 0xED, 0xFA, 0xCF]),
    ("Mach-O 64 LE", &[0xCF, 0xFA, 0xED, 0xFE]),
    ("Mach-O 32 LE", &[0xCE, 0xFA, 0xED, 0xFE]),
];

/// Leading bytes of the image containers we accept.
pub const IMAGE_SIGNATURES: &[(&str, &[u8])] = &[
    ("JPEG", &[0xFF, 0xD8, 0xFF]),
    ("PNG", &[0x89, 0x50, 0x4E, 0x47]),
    ("GIF", &[0x47, 0x49, 0x46]),
    ("BMP", &[0x42, 0x4D]),
    ("TIFF", &[0x49, 0x49, 0x2A, 0x00]),
    ("TIFF", &[0x4D, 0x4D, 0x00, 0x2A]),
    ("WebP", &[0x52, 0x49, 0x46, 0x46]),
];

/// Markup and archive formats that should never arrive as an image.
pub const DISALLOWED_SIGNATURES: &[(&str, &[u8])] = &[
    ("HTML", b"<html"),
    ("XML", b"<?xml"),
    ("ZIP", &[0x50, 0x4B, 0x03, 0x04]),
    ("ZIP", &[0x50, 0x4B, 0x05, 0x06]),
    ("ZIP", &[0x50, 0x4B, 0x07, 0x08]),
];

/// Declared MIME types considered plausible for an image upload.
pub const VALID_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/tiff",
    "image/webp",
    "image/heic",
    "image/heif",
    "image/raw",
    "image/cr2",
    "image/nef",
    "image/arw",
    "image/dng",
];

/// File extensions considered plausible for an image upload (lowercase).
pub const VALID_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp", "heic", "heif", "raw", "cr2", "nef",
    "arw", "dng",
];

/// Digests of a file's content, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentHashes {
    pub md5: String,
    pub sha256: String,
    pub crc32: String,
}

/// Hash the full byte sequence with MD5, SHA-256 and CRC-32.
pub fn hash_content(bytes: &[u8]) -> ContentHashes {
    ContentHashes {
        md5: md5_hex(bytes),
        sha256: sha256_hex(bytes),
        crc32: crc32_hex(bytes),
    }
}

pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// IEEE CRC-32 (reflected polynomial 0xEDB88320), 8 hex digits.
pub fn crc32_hex(bytes: &[u8]) -> String {
    format!("{:08x}", crc32fast::hash(bytes))
}

fn matching_signature(bytes: &[u8], table: &[(&'static str, &[u8])]) -> Option<&'static str> {
    table
        .iter()
        .find(|(_, magic)| bytes.starts_with(magic))
        .map(|(name, _)| *name)
}

/// Name of the image container the bytes start with, if any.
pub fn sniff_image_format(bytes: &[u8]) -> Option<&'static str> {
    matching_signature(bytes, IMAGE_SIGNATURES)
}

pub fn has_executable_signature(bytes: &[u8]) -> bool {
    if let Some(kind) = matching_signature(bytes, EXECUTABLE_SIGNATURES) {
        log::debug!("Executable signature found: {}", kind);
        return true;
    }
    false
}

/// True when the bytes start with a disallowed signature, or with no known
/// image signature at all. Unknown-but-harmless formats are flagged too.
pub fn has_suspicious_header(bytes: &[u8]) -> bool {
    if let Some(kind) = matching_signature(bytes, DISALLOWED_SIGNATURES) {
        log::debug!("Disallowed signature found: {}", kind);
        return true;
    }
    sniff_image_format(bytes).is_none()
}

/// Name-based check of the declared MIME type or file extension.
pub fn is_declared_format_plausible(mime_type: &str, file_name: &str) -> bool {
    if VALID_MIME_TYPES.contains(&mime_type.to_lowercase().as_str()) {
        return true;
    }

    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| VALID_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
