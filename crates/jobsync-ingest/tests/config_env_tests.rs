//! Loading configuration from the process environment
//!
//! These tests mutate process-wide environment variables and run serially.

use jobsync_ingest::config::{AppConfig, WarehouseConfig, DEFAULT_MAX_PAGES};
use serial_test::serial;

const ALL_VARS: &[&str] = &[
    "API_ID",
    "API_KEY",
    "ADZUNA_COUNTRY",
    "FETCH_MAX_PAGES",
    "FETCH_CONCURRENCY",
    "STAGING_CSV_PATH",
    "WAREHOUSE_USER",
    "WAREHOUSE_PASSWORD",
    "WAREHOUSE_ACCOUNT",
    "WAREHOUSE_NAME",
    "WAREHOUSE_DATABASE",
    "WAREHOUSE_SCHEMA",
    "SNOWFLAKE_USER",
    "SNOWFLAKE_PASSWORD",
    "SNOWFLAKE_ACCOUNT",
    "SNOWFLAKE_WAREHOUSE",
    "SNOWFLAKE_DATABASE",
    "SNOWFLAKE_SCHEMA",
];

fn clear_env() {
    for var in ALL_VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_missing_credentials_are_named() {
    clear_env();
    std::env::set_var("API_ID", "abc");

    let err = AppConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("API_KEY"), "{}", err);
    assert!(!err.contains("API_ID"), "{}", err);
    clear_env();
}

#[test]
#[serial]
fn test_app_config_from_env() {
    clear_env();
    std::env::set_var("API_ID", "abc");
    std::env::set_var("API_KEY", "def");
    std::env::set_var("ADZUNA_COUNTRY", "gb");
    std::env::set_var("FETCH_CONCURRENCY", "4");
    std::env::set_var("STAGING_CSV_PATH", "/tmp/jobsync/job_data.csv");

    let config = AppConfig::from_env().unwrap();
    assert_eq!(config.api.app_id, "abc");
    assert!(config.api.search_url().ends_with("/gb/search"));
    assert_eq!(config.fetch.max_pages, DEFAULT_MAX_PAGES);
    assert_eq!(config.fetch.concurrency, 4);
    assert_eq!(config.staging.csv_path.to_str(), Some("/tmp/jobsync/job_data.csv"));
    clear_env();
}

#[test]
#[serial]
fn test_invalid_number_is_a_config_error() {
    clear_env();
    std::env::set_var("API_ID", "abc");
    std::env::set_var("API_KEY", "def");
    std::env::set_var("FETCH_MAX_PAGES", "lots");

    let err = AppConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("FETCH_MAX_PAGES"), "{}", err);
    clear_env();
}

#[test]
#[serial]
fn test_warehouse_accepts_snowflake_names() {
    clear_env();
    std::env::set_var("SNOWFLAKE_USER", "loader");
    std::env::set_var("SNOWFLAKE_PASSWORD", "hunter2");
    std::env::set_var("SNOWFLAKE_ACCOUNT", "db.internal:6432");
    std::env::set_var("SNOWFLAKE_WAREHOUSE", "etl_wh");
    std::env::set_var("SNOWFLAKE_DATABASE", "jobs");
    std::env::set_var("WAREHOUSE_SCHEMA", "raw");

    let config = WarehouseConfig::from_env().unwrap();
    assert_eq!(config.user, "loader");
    assert_eq!(config.schema, "raw");
    assert_eq!(config.host_and_port().unwrap(), ("db.internal".to_string(), 6432));
    assert!(!format!("{:?}", config).contains("hunter2"));
    clear_env();
}
