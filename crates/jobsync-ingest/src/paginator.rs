//! Drives a [`PageSource`] across pages `1..=max_pages`

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::fetcher::{PageOutcome, PageSource};
use crate::models::RawListing;
use crate::{IngestError, Result};

/// Everything one pass over the page range produced
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// Listings from every successful page, in page order
    pub listings: Vec<RawListing>,
    pub pages_fetched: u32,
    /// Pages that failed after retry and were counted as empty
    pub failed_pages: Vec<u32>,
    /// Set when pagination stopped at an empty page before `max_pages`
    pub stopped_at: Option<u32>,
}

impl FetchReport {
    pub fn pages_attempted(&self) -> u32 {
        self.pages_fetched + self.failed_pages.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.failed_pages.is_empty()
    }

    /// Turn failed pages into an error for callers that require a complete fetch
    pub fn require_complete(self) -> Result<Self> {
        if self.is_complete() {
            return Ok(self);
        }
        Err(IngestError::PartialFetch {
            failed: self.failed_pages.len(),
            total: self.pages_attempted(),
            pages: self.failed_pages,
        })
    }
}

/// Fetch every page and concatenate the results
///
/// Up to `concurrency` pages are in flight; outcomes are consumed in page
/// order so the concatenated batch is the same as a sequential fetch.
pub async fn fetch_all_pages<S>(source: &S, config: &FetchConfig) -> FetchReport
where
    S: PageSource + ?Sized,
{
    let mut report = FetchReport::default();
    let mut outcomes = stream::iter(1..=config.max_pages)
        .map(|page| source.fetch_page(page))
        .buffered(config.concurrency.max(1));

    while let Some(outcome) = outcomes.next().await {
        match outcome {
            PageOutcome::Fetched { page, listings } => {
                report.pages_fetched += 1;
                if listings.is_empty() && config.stop_on_empty_page {
                    info!(page, "Empty page, stopping pagination");
                    report.stopped_at = Some(page);
                    break;
                }
                report.listings.extend(listings);
            },
            PageOutcome::Failed { page, .. } => report.failed_pages.push(page),
        }
    }

    if !report.failed_pages.is_empty() {
        warn!(
            failed = report.failed_pages.len(),
            pages = ?report.failed_pages,
            "Some pages failed after retry and were treated as empty"
        );
    }
    info!(
        pages = report.pages_attempted(),
        listings = report.listings.len(),
        "Fetched listings"
    );

    report
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fetcher::AttemptFailure;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves canned pages; unknown pages are empty
    struct FakeSource {
        pages: HashMap<u32, Vec<&'static str>>,
        failing: Vec<u32>,
        requested: Mutex<Vec<u32>>,
    }

    impl FakeSource {
        fn new(pages: &[(u32, Vec<&'static str>)], failing: &[u32]) -> Self {
            Self {
                pages: pages.iter().cloned().collect(),
                failing: failing.to_vec(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn fetch_page(&self, page: u32) -> PageOutcome {
            self.requested.lock().unwrap().push(page);
            // later pages finish first to exercise ordering
            tokio::time::sleep(Duration::from_millis(u64::from(10 - page.min(10)))).await;
            if self.failing.contains(&page) {
                return PageOutcome::Failed {
                    page,
                    last_failure: AttemptFailure::Status(StatusCode::BAD_GATEWAY),
                };
            }
            let listings = self
                .pages
                .get(&page)
                .map(|ids| ids.iter().map(|id| RawListing(json!({ "id": id }))).collect())
                .unwrap_or_default();
            PageOutcome::Fetched { page, listings }
        }
    }

    fn ids(report: &FetchReport) -> Vec<String> {
        report.listings.iter().filter_map(|l| l.str_field("id")).collect()
    }

    fn config(max_pages: u32, concurrency: usize, stop_on_empty_page: bool) -> FetchConfig {
        FetchConfig {
            max_pages,
            concurrency,
            retry_backoff_ms: 0,
            stop_on_empty_page,
        }
    }

    #[tokio::test]
    async fn test_fetches_full_range_through_empty_pages() {
        let source = FakeSource::new(&[(1, vec!["a", "b"]), (3, vec!["c"])], &[]);
        let report = fetch_all_pages(&source, &config(5, 1, false)).await;

        assert_eq!(ids(&report), vec!["a", "b", "c"]);
        assert_eq!(report.pages_fetched, 5);
        assert!(report.stopped_at.is_none());
        assert_eq!(*source.requested.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_concurrent_fetch_preserves_page_order() {
        let source = FakeSource::new(
            &[(1, vec!["a"]), (2, vec!["b"]), (3, vec!["c"]), (4, vec!["d"])],
            &[],
        );
        let report = fetch_all_pages(&source, &config(4, 4, false)).await;
        assert_eq!(ids(&report), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_failed_pages_are_reported() {
        let source = FakeSource::new(&[(1, vec!["a"]), (2, vec!["b"]), (3, vec!["c"])], &[2]);
        let report = fetch_all_pages(&source, &config(3, 2, false)).await;

        assert_eq!(ids(&report), vec!["a", "c"]);
        assert_eq!(report.failed_pages, vec![2]);
        assert_eq!(report.pages_attempted(), 3);

        match report.require_complete() {
            Err(IngestError::PartialFetch { failed, total, pages }) => {
                assert_eq!(failed, 1);
                assert_eq!(total, 3);
                assert_eq!(pages, vec![2]);
            },
            other => panic!("expected PartialFetch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_on_empty_page() {
        let source = FakeSource::new(&[(1, vec!["a"]), (2, vec!["b"]), (4, vec!["d"])], &[]);
        let report = fetch_all_pages(&source, &config(10, 1, true)).await;

        assert_eq!(ids(&report), vec!["a", "b"]);
        assert_eq!(report.stopped_at, Some(3));
        assert_eq!(*source.requested.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_page_does_not_stop_pagination() {
        let source = FakeSource::new(&[(1, vec!["a"]), (3, vec!["c"])], &[2]);
        let report = fetch_all_pages(&source, &config(3, 1, true)).await;

        assert_eq!(ids(&report), vec!["a", "c"]);
        assert!(report.stopped_at.is_none());
    }
}
