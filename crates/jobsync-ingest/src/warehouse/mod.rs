//! Durable storage for listings
//!
//! A warehouse owns two tables: a disposable staging table that holds one
//! run's batch, and the durable `jobs` table keyed on `job_id`. The
//! [`Warehouse`] trait is the contract the upsert engine drives; backends
//! differ only in where the rows live.

mod memory;
mod postgres;

pub use memory::MemoryWarehouse;
pub use postgres::PostgresWarehouse;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DurableRecord, NormalizedListing};
use crate::Result;

/// Durable table name
pub const JOBS_TABLE: &str = "jobs";
/// Staging table name
pub const STAGING_TABLE: &str = "jobs_staging";

/// What one merge did to the durable table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Rows read from staging, duplicates included
    pub staged: usize,
    pub inserted: usize,
    pub updated: usize,
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Create the schema, durable table and staging table if missing
    async fn ensure_schema(&self) -> Result<()>;

    /// Replace the staging table contents with `listings`, atomically
    async fn load_staging(&self, listings: &[NormalizedListing]) -> Result<usize>;

    /// Merge staged rows into the durable table in one transaction
    ///
    /// Existing `job_id`s get every mutable column overwritten and
    /// `updated_at = run_at`; new ones are inserted with
    /// `inserted_at = updated_at = run_at`. When the same `job_id` is staged
    /// more than once the last staged row wins. On error nothing is applied
    /// and the staging table is left as it was.
    async fn merge_staging(&self, run_at: DateTime<Utc>) -> Result<MergeStats>;

    /// Empty the staging table
    async fn clear_staging(&self) -> Result<()>;

    async fn staged_count(&self) -> Result<u64>;

    async fn get_record(&self, job_id: &str) -> Result<Option<DurableRecord>>;

    async fn record_count(&self) -> Result<u64>;
}
