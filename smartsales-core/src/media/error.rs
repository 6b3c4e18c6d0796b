//! Error types for the device media server client

use thiserror::Error;

/// Device media errors
#[derive(Error, Debug)]
pub enum MediaError {
    /// Base URL blank or unparsable
    #[error("Invalid device address: {0}")]
    InvalidBaseUrl(String),

    /// No device endpoint discovered yet
    #[error("Device is not connected")]
    NotConnected,

    /// Request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("{method} {path} failed with status {status}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
    },

    /// Local file error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Json(#[from] serde_json::Error),

    /// Uploading to object storage failed
    #[error("Upload failed: {0}")]
    Upload(String),
}

/// Result type for media operations
pub type MediaResult<T> = Result<T, MediaError>;
