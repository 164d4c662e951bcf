//! Custom error types for rustbuzz.
//!
//! This module defines all error types used throughout the library.
//! All functions return `Result<T, BuzzError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for rustbuzz operations.
#[derive(Debug, Error)]
pub enum BuzzError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Feed or table parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Publication date could not be parsed while aggregating
    #[error("Invalid publication date {value:?}: {reason}")]
    Date {
        /// Raw date string as received
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for BuzzError {
    fn from(err: figment::Error) -> Self {
        BuzzError::Config(err.to_string())
    }
}

/// Result type alias using `BuzzError`
pub type Result<T> = std::result::Result<T, BuzzError>;

