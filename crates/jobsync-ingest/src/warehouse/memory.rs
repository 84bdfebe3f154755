//! In-process warehouse
//!
//! Same contract as the Postgres backend, held behind a mutex. Merges are
//! computed on a copy of the table and swapped in at the end, so a reader
//! never sees half a batch. Used for `--backend memory` dry runs and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobsync_common::JobsyncError;
use tracing::{debug, info};

use super::{MergeStats, Warehouse};
use crate::models::{DurableRecord, NormalizedListing};
use crate::{IngestError, Result};

const POISONED: &str = "memory warehouse lock poisoned";

#[derive(Debug, Default)]
struct State {
    schema_ready: bool,
    staging: Vec<NormalizedListing>,
    jobs: BTreeMap<String, DurableRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    state: Mutex<State>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| IngestError::from(JobsyncError::Staging(POISONED.to_string())))
    }

    fn ready(&self) -> Result<MutexGuard<'_, State>> {
        schema_ready(self.lock()?)
    }

    /// Snapshot of the durable table, ordered by `job_id`
    pub fn records(&self) -> Result<Vec<DurableRecord>> {
        Ok(self.lock()?.jobs.values().cloned().collect())
    }
}

fn schema_ready(state: MutexGuard<'_, State>) -> Result<MutexGuard<'_, State>> {
    if !state.schema_ready {
        return Err(JobsyncError::Staging("schema has not been created".to_string()).into());
    }
    Ok(state)
}

/// Last staged row per `job_id`, in first-seen order
fn dedup_last_wins(staged: &[NormalizedListing]) -> Vec<&NormalizedListing> {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut rows: Vec<&NormalizedListing> = Vec::new();
    for listing in staged {
        match position.get(listing.job_id.as_str()) {
            Some(&i) => rows[i] = listing,
            None => {
                position.insert(listing.job_id.as_str(), rows.len());
                rows.push(listing);
            },
        }
    }
    rows
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.lock()?.schema_ready = true;
        Ok(())
    }

    async fn load_staging(&self, listings: &[NormalizedListing]) -> Result<usize> {
        let mut state = self.ready()?;
        state.staging = listings.to_vec();
        debug!(rows = listings.len(), "Loaded staging rows");
        Ok(listings.len())
    }

    async fn merge_staging(&self, run_at: DateTime<Utc>) -> Result<MergeStats> {
        let state = self
            .state
            .lock()
            .map_err(|_| IngestError::Merge(POISONED.to_string()))?;
        let mut state = schema_ready(state)?;

        let mut jobs = state.jobs.clone();
        let mut stats = MergeStats {
            staged: state.staging.len(),
            ..Default::default()
        };

        for listing in dedup_last_wins(&state.staging) {
            match jobs.get_mut(&listing.job_id) {
                Some(existing) => {
                    existing.listing = listing.clone();
                    existing.updated_at = run_at;
                    stats.updated += 1;
                },
                None => {
                    jobs.insert(
                        listing.job_id.clone(),
                        DurableRecord {
                            listing: listing.clone(),
                            inserted_at: run_at,
                            updated_at: run_at,
                        },
                    );
                    stats.inserted += 1;
                },
            }
        }

        state.jobs = jobs;
        info!(inserted = stats.inserted, updated = stats.updated, "Merged staging into jobs");
        Ok(stats)
    }

    async fn clear_staging(&self) -> Result<()> {
        self.ready()?.staging.clear();
        Ok(())
    }

    async fn staged_count(&self) -> Result<u64> {
        Ok(self.ready()?.staging.len() as u64)
    }

    async fn get_record(&self, job_id: &str) -> Result<Option<DurableRecord>> {
        Ok(self.ready()?.jobs.get(job_id).cloned())
    }

    async fn record_count(&self) -> Result<u64> {
        Ok(self.ready()?.jobs.len() as u64)
    }
}
