//! Error types for GER

use thiserror::Error;

/// Result type alias for GER operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Main error type for GER
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid field name: {0:?}")]
    InvalidFieldName(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
