//! Error types for the BLE transport and payload codec
//!
//! These never leave the provisioning module: the gateway folds them into
//! outcome variants before anything above it sees them.

use std::collections::BTreeSet;

use thiserror::Error;

/// Errors raised by a GATT characteristic transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Bluetooth adapter missing or switched off
    #[error("Bluetooth unavailable")]
    AdapterUnavailable,

    /// Peripheral address unknown to the adapter
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Runtime permissions missing
    #[error("Missing permissions: {0:?}")]
    PermissionDenied(BTreeSet<String>),

    /// Characteristic not exposed by the connected service
    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(uuid::Uuid),

    /// Device rejected the submitted credentials
    #[error("Credentials rejected: {0}")]
    CredentialRejected(String),

    /// Any other link-level failure
    #[error("BLE transport failed: {0}")]
    Transport(String),
}

/// Result type for transport operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors raised while decoding device payloads
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Device answered with an empty payload
    #[error("Device returned an empty response")]
    Empty,

    /// JSON payload could not be parsed
    #[error("Failed to parse device response: {0}")]
    InvalidJson(String),

    /// Delimited payload had the wrong shape or command
    #[error("Malformed device response: {0}")]
    Malformed(String),

    /// A required field was absent or blank
    #[error("Device response missing field: {0}")]
    MissingField(&'static str),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::InvalidJson(err.to_string())
    }
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;
