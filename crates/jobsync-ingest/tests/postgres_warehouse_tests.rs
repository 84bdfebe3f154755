//! Postgres warehouse against a real database
//!
//! Requires Docker. Run with `cargo test -- --ignored`.

mod common;

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use common::init_tracing;
use jobsync_ingest::models::NormalizedListing;
use jobsync_ingest::upsert::UpsertEngine;
use jobsync_ingest::warehouse::{PostgresWarehouse, Warehouse};
use jobsync_ingest::IngestError;
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

async fn start() -> Result<(ContainerAsync<Postgres>, PostgresWarehouse)> {
    init_tracing();
    let container = Postgres::default().with_tag("16-alpine").start().await?;

    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let conn_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

    let pool = PgPoolOptions::new().max_connections(5).connect(&conn_string).await?;
    let warehouse = PostgresWarehouse::new(pool, "jobsync_test")?;
    warehouse.ensure_schema().await?;
    Ok((container, warehouse))
}

fn titled(id: &str, title: &str) -> NormalizedListing {
    NormalizedListing {
        title: Some(title.to_string()),
        created: Some("2024-11-10T12:34:56Z".to_string()),
        ..NormalizedListing::new(id)
    }
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker
async fn test_merge_inserts_then_updates() -> Result<()> {
    let (_container, wh) = start().await?;
    let run_1 = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();
    let run_2 = run_1 + Duration::days(1);

    let stats = UpsertEngine::new(&wh).upsert(&[titled("1", "Data Engineer")], run_1).await?;
    assert_eq!((stats.inserted, stats.updated), (1, 0));

    let row = wh.get_record("1").await?.unwrap();
    assert!(row.listing.company.is_none());
    assert_eq!(row.listing.created.as_deref(), Some("2024-11-10T12:34:56Z"));
    assert_eq!(row.inserted_at, run_1);
    assert_eq!(row.updated_at, run_1);

    let stats = UpsertEngine::new(&wh)
        .upsert(&[titled("1", "Senior Data Engineer")], run_2)
        .await?;
    assert_eq!((stats.inserted, stats.updated), (0, 1));

    let row = wh.get_record("1").await?.unwrap();
    assert_eq!(row.listing.title.as_deref(), Some("Senior Data Engineer"));
    assert_eq!(row.inserted_at, run_1);
    assert_eq!(row.updated_at, run_2);
    assert_eq!(wh.staged_count().await?, 0);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker
async fn test_duplicate_ids_in_one_batch() -> Result<()> {
    let (_container, wh) = start().await?;
    let run_at = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();

    let batch = vec![titled("1", "first"), titled("2", "other"), titled("1", "second")];
    let stats = UpsertEngine::new(&wh).upsert(&batch, run_at).await?;
    assert_eq!(stats.staged, 3);
    assert_eq!(stats.inserted, 2);

    let row = wh.get_record("1").await?.unwrap();
    assert_eq!(row.listing.title.as_deref(), Some("second"));
    assert_eq!(wh.record_count().await?, 2);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker
async fn test_failed_merge_rolls_back_and_keeps_stage() -> Result<()> {
    let (_container, wh) = start().await?;
    let run_at = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();

    let mut bad = titled("2", "bad timestamp");
    bad.created = Some("not a timestamp".to_string());
    let batch = vec![titled("1", "ok"), bad];

    let mut engine = UpsertEngine::new(&wh);
    engine.load_stage(&batch).await?;
    let err = engine.merge_and_clear(run_at).await.unwrap_err();
    assert!(matches!(err, IngestError::Merge(_)));

    assert_eq!(wh.record_count().await?, 0);
    assert_eq!(wh.staged_count().await?, 2);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker
async fn test_large_batch_spans_insert_chunks() -> Result<()> {
    let (_container, wh) = start().await?;
    let run_at = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();

    let batch: Vec<NormalizedListing> =
        (0..2500).map(|i| titled(&i.to_string(), "Data Engineer")).collect();
    let staged = wh.load_staging(&batch).await?;
    assert_eq!(staged, 2500);
    assert_eq!(wh.staged_count().await?, 2500);

    let stats = wh.merge_staging(run_at).await?;
    assert_eq!(stats.inserted, 2500);
    Ok(())
}
