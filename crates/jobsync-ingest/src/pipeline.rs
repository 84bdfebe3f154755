//! Run orchestration
//!
//! Steps run in a fixed order: fetch (and write the CSV stage), ensure the
//! warehouse schema, load the stage, merge. The warehouse steps are retried
//! as a whole step with a fixed delay; the fetch step relies on the
//! per-page retry in the fetcher. The whole run is bounded by a deadline.
//!
//! Only one run may be in flight against a given staging file and warehouse
//! schema at a time. Nothing here enforces that; the scheduler must.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{AppConfig, FetchConfig, PipelineConfig};
use crate::fetcher::{AdzunaClient, PageSource};
use crate::models::NormalizedListing;
use crate::normalizer::normalize_batch;
use crate::paginator::fetch_all_pages;
use crate::staging::CsvStage;
use crate::upsert::UpsertEngine;
use crate::warehouse::{MergeStats, Warehouse};
use crate::{IngestError, Result};

/// What the fetch step produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchSummary {
    pub pages_fetched: u32,
    pub failed_pages: Vec<u32>,
    pub stopped_at: Option<u32>,
    pub raw_listings: usize,
    pub normalized: usize,
    pub staging_path: PathBuf,
}

/// Outcome of one full run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub run_at: DateTime<Utc>,
    pub backend: &'static str,
    pub fetch: FetchSummary,
    pub merge: MergeStats,
}

/// Fetch every page, normalize, and replace the CSV stage
///
/// With `fail_on_partial`, any page that failed after retry aborts the step
/// before the stage is touched.
pub async fn fetch_and_stage<S>(
    source: &S,
    fetch: &FetchConfig,
    stage: &CsvStage,
    fail_on_partial: bool,
) -> Result<FetchSummary>
where
    S: PageSource + ?Sized,
{
    let mut report = fetch_all_pages(source, fetch).await;
    if fail_on_partial {
        report = report.require_complete()?;
    }

    let listings = normalize_batch(&report.listings);
    stage.write(&listings)?;

    Ok(FetchSummary {
        pages_fetched: report.pages_fetched,
        failed_pages: report.failed_pages,
        stopped_at: report.stopped_at,
        raw_listings: report.listings.len(),
        normalized: listings.len(),
        staging_path: stage.path().to_path_buf(),
    })
}

/// Runs `$op` until it succeeds or the loader gives up on it
macro_rules! with_step_retries {
    ($loader:expr, $step:expr, $op:expr) => {{
        let mut attempt = 0u32;
        loop {
            match $op.await {
                Ok(value) => break value,
                Err(err) => $loader.retry_or_fail($step, &mut attempt, err).await?,
            }
        }
    }};
}

/// Warehouse-side steps with step-level retries
pub struct Loader<'a, W: Warehouse + ?Sized> {
    warehouse: &'a W,
    retries: u32,
    retry_delay: Duration,
}

impl<'a, W: Warehouse + ?Sized> Loader<'a, W> {
    pub fn new(warehouse: &'a W, config: &PipelineConfig) -> Self {
        Self {
            warehouse,
            retries: config.step_retries,
            retry_delay: config.step_retry_delay(),
        }
    }

    async fn retry_or_fail(&self, step: &str, attempt: &mut u32, err: IngestError) -> Result<()> {
        if err.is_config() || *attempt >= self.retries {
            return Err(err);
        }
        *attempt += 1;
        warn!(
            step,
            attempt = *attempt,
            max_retries = self.retries,
            error = %err,
            delay_secs = self.retry_delay.as_secs(),
            "Step failed, retrying"
        );
        tokio::time::sleep(self.retry_delay).await;
        Ok(())
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        with_step_retries!(self, "ensure_schema", self.warehouse.ensure_schema());
        Ok(())
    }

    /// Load `listings` into the warehouse stage, merge, then clear the stage
    ///
    /// A failed merge is retried against the rows already staged; the stage
    /// is never reloaded once a merge could have committed.
    pub async fn load_and_merge(
        &self,
        listings: &[NormalizedListing],
        run_at: DateTime<Utc>,
    ) -> Result<MergeStats> {
        let mut engine = UpsertEngine::new(self.warehouse);

        let staged = with_step_retries!(self, "load_stage", engine.load_stage(listings));
        info!(rows = staged, backend = self.warehouse.backend(), "Stage loaded");

        self.merge_then_clear(&mut engine, run_at).await
    }

    /// Merge rows an earlier process left in the warehouse stage, then clear it
    pub async fn merge_staged(&self, run_at: DateTime<Utc>) -> Result<MergeStats> {
        let mut engine = UpsertEngine::new(self.warehouse);

        let staged = with_step_retries!(self, "resume_stage", engine.resume_stage());
        info!(rows = staged, backend = self.warehouse.backend(), "Resuming staged rows");

        self.merge_then_clear(&mut engine, run_at).await
    }

    async fn merge_then_clear(
        &self,
        engine: &mut UpsertEngine<'a, W>,
        run_at: DateTime<Utc>,
    ) -> Result<MergeStats> {
        let stats = with_step_retries!(self, "merge", engine.merge(run_at));
        with_step_retries!(self, "clear_stage", engine.clear_stage());

        info!(
            inserted = stats.inserted,
            updated = stats.updated,
            state = %engine.state(),
            "Upsert complete"
        );
        Ok(stats)
    }
}

/// Full fetch-to-merge run
pub struct Pipeline<'a, W: Warehouse + ?Sized> {
    config: &'a AppConfig,
    source: Box<dyn PageSource + 'a>,
    stage: CsvStage,
    loader: Loader<'a, W>,
    fail_on_partial: bool,
}

impl<'a, W: Warehouse + ?Sized> Pipeline<'a, W> {
    pub fn new(config: &'a AppConfig, warehouse: &'a W) -> Result<Self> {
        config.api.validate()?;
        config.fetch.validate()?;
        let client = AdzunaClient::new(&config.api, config.fetch.retry_backoff())?;

        Ok(Self {
            config,
            source: Box::new(client),
            stage: CsvStage::new(&config.staging.csv_path),
            loader: Loader::new(warehouse, &config.pipeline),
            fail_on_partial: false,
        })
    }

    /// Replace the HTTP client with another page source
    pub fn with_source(mut self, source: impl PageSource + 'a) -> Self {
        self.source = Box::new(source);
        self
    }

    /// Abort the run when any page fails after retry
    pub fn fail_on_partial(mut self, enabled: bool) -> Self {
        self.fail_on_partial = enabled;
        self
    }

    pub async fn fetch_and_stage(&self) -> Result<FetchSummary> {
        fetch_and_stage(
            self.source.as_ref(),
            &self.config.fetch,
            &self.stage,
            self.fail_on_partial,
        )
        .await
    }

    /// Run every step under the configured deadline
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let run_at = Utc::now();
        let deadline = self.config.pipeline.run_timeout();

        let span = info_span!("run", %run_id);
        let steps = self.run_steps(run_id, run_at).instrument(span);

        match tokio::time::timeout(deadline, steps).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%run_id, deadline_secs = deadline.as_secs(), "Run exceeded its deadline");
                Err(IngestError::Timeout(deadline))
            },
        }
    }

    async fn run_steps(&self, run_id: Uuid, run_at: DateTime<Utc>) -> Result<RunReport> {
        info!(search = %self.config.api.what, country = %self.config.api.country, "Starting run");

        let fetch = self.fetch_and_stage().await?;
        if !fetch.failed_pages.is_empty() {
            warn!(failed_pages = ?fetch.failed_pages, "Continuing with a partial batch");
        }

        self.loader.ensure_schema().await?;

        let listings = self.stage.read()?;
        let merge = self.loader.load_and_merge(&listings, run_at).await?;

        let report = RunReport {
            run_id,
            run_at,
            backend: self.loader.warehouse.backend(),
            fetch,
            merge,
        };
        info!(
            fetched = report.fetch.raw_listings,
            normalized = report.fetch.normalized,
            failed_pages = report.fetch.failed_pages.len(),
            inserted = report.merge.inserted,
            updated = report.merge.updated,
            "Run complete"
        );
        Ok(report)
    }
}
