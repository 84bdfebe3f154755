//! Staging → durable table reconciliation
//!
//! One engine per run. It walks `Idle → StageLoaded → Merged → StageCleared`
//! and refuses out-of-order steps, so the stage is only ever cleared after a
//! merge has committed. A failed merge leaves the engine in `StageLoaded`
//! and the staged rows untouched, ready for another merge attempt.

use chrono::{DateTime, Utc};
use jobsync_common::JobsyncError;
use tracing::{info, instrument};

use crate::models::NormalizedListing;
use crate::warehouse::{MergeStats, Warehouse};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertState {
    Idle,
    StageLoaded,
    Merged,
    StageCleared,
}

impl std::fmt::Display for UpsertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UpsertState::Idle => "IDLE",
            UpsertState::StageLoaded => "STAGE_LOADED",
            UpsertState::Merged => "MERGED",
            UpsertState::StageCleared => "STAGE_CLEARED",
        };
        f.write_str(name)
    }
}

pub struct UpsertEngine<'a, W: Warehouse + ?Sized> {
    warehouse: &'a W,
    state: UpsertState,
}

impl<'a, W: Warehouse + ?Sized> UpsertEngine<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self {
            warehouse,
            state: UpsertState::Idle,
        }
    }

    pub fn state(&self) -> UpsertState {
        self.state
    }

    fn expect_state(&self, allowed: &[UpsertState], step: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(JobsyncError::Staging(format!("cannot {} in state {}", step, self.state)).into())
    }

    /// Replace the warehouse stage with `listings`
    ///
    /// Allowed before a merge has committed; reloading a loaded stage just
    /// replaces it.
    pub async fn load_stage(&mut self, listings: &[NormalizedListing]) -> Result<usize> {
        self.expect_state(&[UpsertState::Idle, UpsertState::StageLoaded], "load stage")?;
        let rows = self.warehouse.load_staging(listings).await?;
        self.state = UpsertState::StageLoaded;
        Ok(rows)
    }

    /// Adopt rows a previous process already staged
    pub async fn resume_stage(&mut self) -> Result<u64> {
        self.expect_state(&[UpsertState::Idle], "resume stage")?;
        let rows = self.warehouse.staged_count().await?;
        self.state = UpsertState::StageLoaded;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn merge(&mut self, run_at: DateTime<Utc>) -> Result<MergeStats> {
        self.expect_state(&[UpsertState::StageLoaded], "merge")?;
        let stats = self.warehouse.merge_staging(run_at).await?;
        self.state = UpsertState::Merged;
        Ok(stats)
    }

    pub async fn clear_stage(&mut self) -> Result<()> {
        self.expect_state(&[UpsertState::Merged], "clear stage")?;
        self.warehouse.clear_staging().await?;
        self.state = UpsertState::StageCleared;
        Ok(())
    }

    /// Merge then clear, for callers that don't retry the steps separately
    pub async fn merge_and_clear(&mut self, run_at: DateTime<Utc>) -> Result<MergeStats> {
        let stats = self.merge(run_at).await?;
        self.clear_stage().await?;
        info!(
            inserted = stats.inserted,
            updated = stats.updated,
            state = %self.state,
            "Upsert complete"
        );
        Ok(stats)
    }

    /// Load, merge and clear one batch
    pub async fn upsert(
        &mut self,
        listings: &[NormalizedListing],
        run_at: DateTime<Utc>,
    ) -> Result<MergeStats> {
        self.load_stage(listings).await?;
        self.merge_and_clear(run_at).await
    }
}
