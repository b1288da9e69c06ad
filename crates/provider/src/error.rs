//! Error types for the wodata provider

use thiserror::Error;

/// Result type alias using the provider Error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Provider error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to decode value: {0}")]
    Decode(String),

    #[error("Failed to encode value: {0}")]
    Encode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    #[error("Data source {0} is not supported by this provider")]
    UnsupportedDataSource(String),

    #[error("Attribute {name} must be a {expected}")]
    AttributeType { name: String, expected: String },

    #[error("Unsupported state version {0}")]
    UnsupportedStateVersion(i64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Incompatible plugin protocol: client offers {offered}, provider speaks {supported}")]
    IncompatibleProtocol { offered: String, supported: u32 },
}
