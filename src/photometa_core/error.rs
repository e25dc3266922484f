use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhotometaError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read {name}: {reason}")]
    Unreadable { name: String, reason: String },

    // Filesystem errors
    #[error("Directory walker error: {0}")]
    Walkdir(#[from] walkdir::Error),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Input boundary
    #[error("Not an image ({mime_type}): {name}")]
    UnsupportedType { name: String, mime_type: String },

    // Geocoding
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Geocoding failed: {0}")]
    Geocode(String),

    // Serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Date parsing error: {0}")]
    InvalidDateFormat(String),

    // Generic errors
    #[error("Argument error: {0}")]
    Argument(String),

    #[error("{0}")]
    Other(String),
}

/// Result type for photometa operations.
pub type Result<T> = std::result::Result<T, PhotometaError>;
