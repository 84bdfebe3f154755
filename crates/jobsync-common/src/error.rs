//! Error types shared across jobsync crates

use thiserror::Error;

/// Result type alias for jobsync operations
pub type Result<T> = std::result::Result<T, JobsyncError>;

/// Errors that are not tied to a particular backend
#[derive(Error, Debug)]
pub enum JobsyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or malformed configuration. Always raised before any I/O.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Staging error: {0}")]
    Staging(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl JobsyncError {
    /// Build a configuration error listing every missing variable at once
    pub fn missing_vars(vars: &[&str]) -> Self {
        JobsyncError::Config(format!(
            "missing required environment variable(s): {}",
            vars.join(", ")
        ))
    }
}
