//! Ingestion error types

use std::time::Duration;

use jobsync_common::JobsyncError;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors raised by the ingestion pipeline
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Common(#[from] JobsyncError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The merge transaction was rolled back. Staged rows are still in place.
    #[error("Merge failed: {0}")]
    Merge(String),

    #[error("{failed} of {total} page(s) failed after retry: {pages:?}")]
    PartialFetch {
        failed: usize,
        total: u32,
        pages: Vec<u32>,
    },

    #[error("Run exceeded its deadline of {0:?}")]
    Timeout(Duration),
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Common(JobsyncError::Io(err))
    }
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        IngestError::Common(JobsyncError::Csv(err))
    }
}

impl IngestError {
    /// Configuration problems are never worth retrying
    pub fn is_config(&self) -> bool {
        matches!(self, IngestError::Common(JobsyncError::Config(_)))
    }
}
