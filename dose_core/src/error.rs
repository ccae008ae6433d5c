//! Error types for the dose_core library.

use chrono::NaiveDate;
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for dose_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or empty time-of-day configuration on an active schedule
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Reversed date range
    #[error("Invalid window: end {end} is before start {start}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },

    /// Attempt to move a dose record out of a terminal status
    #[error("Invalid dose transition: {0}")]
    InvalidTransition(String),

    /// Referenced schedule or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}
