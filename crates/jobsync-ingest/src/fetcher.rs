//! Single-page client for the job-search API
//!
//! Each page gets one retry after a fixed backoff. A page that fails twice is
//! reported as [`PageOutcome::Failed`]; it never aborts the run, the caller
//! decides what to do with failed pages.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, error, warn};

use crate::config::ApiConfig;
use crate::models::{RawListing, SearchPage};
use crate::Result;

/// Requests per page: the first attempt plus one retry
pub const MAX_ATTEMPTS: u32 = 2;

/// Why a single attempt failed
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    /// Non-success HTTP status
    Status(StatusCode),
    /// Connection, timeout or body decoding problem
    Transport(String),
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptFailure::Status(status) => write!(f, "HTTP {}", status),
            AttemptFailure::Transport(msg) => write!(f, "{}", msg),
        }
    }
}

/// Result of fetching one page
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Fetched { page: u32, listings: Vec<RawListing> },
    Failed { page: u32, last_failure: AttemptFailure },
}

impl PageOutcome {
    pub fn page(&self) -> u32 {
        match self {
            PageOutcome::Fetched { page, .. } | PageOutcome::Failed { page, .. } => *page,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PageOutcome::Failed { .. })
    }

    /// Listings for the page; a failed page contributes nothing
    pub fn into_listings(self) -> Vec<RawListing> {
        match self {
            PageOutcome::Fetched { listings, .. } => listings,
            PageOutcome::Failed { .. } => Vec::new(),
        }
    }
}

/// Anything that can produce one page of raw listings
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> PageOutcome;
}

/// HTTP client bound to one search configuration
#[derive(Debug, Clone)]
pub struct AdzunaClient {
    client: Client,
    search_url: String,
    query: Vec<(&'static str, String)>,
    retry_backoff: Duration,
}

impl AdzunaClient {
    pub fn new(api: &ApiConfig, retry_backoff: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(api.timeout())
            .user_agent(concat!("jobsync-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let query = vec![
            ("app_id", api.app_id.clone()),
            ("app_key", api.app_key.clone()),
            ("results_per_page", api.results_per_page.to_string()),
            ("what", api.what.clone()),
            ("content-type", "application/json".to_string()),
        ];

        Ok(Self {
            client,
            search_url: api.search_url(),
            query,
            retry_backoff,
        })
    }

    /// Fetch one page, retrying exactly once after the backoff
    pub async fn fetch_page_with_retry(&self, page: u32) -> PageOutcome {
        let first = match self.attempt(page).await {
            Ok(listings) => return PageOutcome::Fetched { page, listings },
            Err(failure) => failure,
        };

        warn!(page, attempt = 1, reason = %first, "Failed to fetch page, retrying");
        tokio::time::sleep(self.retry_backoff).await;

        match self.attempt(page).await {
            Ok(listings) => PageOutcome::Fetched { page, listings },
            Err(second) => {
                error!(page, attempt = MAX_ATTEMPTS, reason = %second, "Failed again to fetch page, skipping it");
                PageOutcome::Failed {
                    page,
                    last_failure: second,
                }
            },
        }
    }

    async fn attempt(&self, page: u32) -> std::result::Result<Vec<RawListing>, AttemptFailure> {
        let url = format!("{}/{}", self.search_url, page);

        let response = self
            .client
            .get(&url)
            .query(&self.query)
            .send()
            .await
            .map_err(|e| AttemptFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptFailure::Status(status));
        }

        let body: SearchPage = response
            .json()
            .await
            .map_err(|e| AttemptFailure::Transport(format!("invalid response body: {}", e)))?;

        debug!(page, results = body.results.len(), "Fetched page");
        Ok(body.results)
    }
}

#[async_trait]
impl PageSource for AdzunaClient {
    async fn fetch_page(&self, page: u32) -> PageOutcome {
        self.fetch_page_with_retry(page).await
    }
}
