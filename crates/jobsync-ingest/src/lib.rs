//! Jobsync Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Daily extract-normalize-load pipeline for job postings.
//!
//! # Stages
//!
//! - **Fetch**: [`fetcher::AdzunaClient`] pulls one search page with a single retry,
//!   [`paginator::fetch_all_pages`] drives it across the configured page range
//! - **Normalize**: [`normalizer`] flattens raw listings into [`models::NormalizedListing`]
//! - **Stage**: [`staging`] writes the batch as a CSV file that is replaced every run
//! - **Upsert**: [`upsert::UpsertEngine`] loads the stage into a [`warehouse::Warehouse`],
//!   merges it into the durable table keyed on `job_id`, then clears the stage
//!
//! [`pipeline::Pipeline`] runs the stages in order.
//!
//! # Example
//!
//! ```no_run
//! use jobsync_ingest::config::AppConfig;
//! use jobsync_ingest::pipeline::Pipeline;
//! use jobsync_ingest::warehouse::MemoryWarehouse;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let warehouse = MemoryWarehouse::new();
//!     let report = Pipeline::new(&config, &warehouse)?.run().await?;
//!     println!("{} inserted, {} updated", report.merge.inserted, report.merge.updated);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod normalizer;
pub mod paginator;
pub mod pipeline;
pub mod staging;
pub mod upsert;
pub mod warehouse;

pub use error::{IngestError, Result};
