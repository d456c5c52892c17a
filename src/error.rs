//! Error types for laurel

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaurelError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid activity: {0}")]
    InvalidActivity(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Signature error: {0}")]
    Signature(String),

    #[error("Fingerprint mismatch: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Key error: {0}")]
    Keys(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LaurelError>;
