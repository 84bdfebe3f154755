//! Configuration management
//!
//! Everything is read from the environment (after loading `.env`) once at
//! startup and handed to the pipeline components by reference. Required
//! values are checked up front so a run never starts fetching with blank
//! credentials.

use std::path::PathBuf;
use std::time::Duration;

use jobsync_common::{JobsyncError, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_API_BASE_URL: &str = "http://api.adzuna.com/v1/api/jobs";
pub const DEFAULT_COUNTRY: &str = "fr";
pub const DEFAULT_SEARCH_TERM: &str = "data engineer";
pub const DEFAULT_RESULTS_PER_PAGE: u32 = 20;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Pages 1..=N are requested on every run
pub const DEFAULT_MAX_PAGES: u32 = 100;
pub const DEFAULT_FETCH_CONCURRENCY: usize = 1;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1000;

pub const DEFAULT_STAGING_CSV_PATH: &str = "job_data.csv";

pub const DEFAULT_WAREHOUSE_PORT: u16 = 5432;
pub const DEFAULT_WAREHOUSE_MAX_CONNECTIONS: u32 = 5;

/// Step-level retries wrap the warehouse steps, on top of the fetcher's own retry
pub const DEFAULT_STEP_RETRIES: u32 = 2;
pub const DEFAULT_STEP_RETRY_DELAY_SECS: u64 = 300;
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 3600;

/// Reads a variable, treating blank values as unset
fn lookup<F>(get: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn lookup_parsed<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(get, key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| JobsyncError::Config(format!("{} has an invalid value: '{}'", key, raw))),
        None => Ok(default),
    }
}

/// Process environment lookup
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// ============================================================================
// Upstream API
// ============================================================================

/// Credentials and fixed query parameters for the job-search API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub app_id: String,
    pub app_key: String,
    pub base_url: String,
    pub country: String,
    /// Search keyword, sent as `what`
    pub what: String,
    pub results_per_page: u32,
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_id = lookup(get, "API_ID");
        let app_key = lookup(get, "API_KEY");

        let missing: Vec<&str> = [("API_ID", &app_id), ("API_KEY", &app_key)]
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| *k)
            .collect();
        if !missing.is_empty() {
            return Err(JobsyncError::missing_vars(&missing));
        }

        let config = Self {
            app_id: app_id.unwrap_or_default(),
            app_key: app_key.unwrap_or_default(),
            base_url: lookup(get, "ADZUNA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            country: lookup(get, "ADZUNA_COUNTRY").unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            what: lookup(get, "ADZUNA_WHAT").unwrap_or_else(|| DEFAULT_SEARCH_TERM.to_string()),
            results_per_page: lookup_parsed(get, "ADZUNA_RESULTS_PER_PAGE", DEFAULT_RESULTS_PER_PAGE)?,
            timeout_secs: lookup_parsed(get, "ADZUNA_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let blank: Vec<&str> = [("API_ID", &self.app_id), ("API_KEY", &self.app_key)]
            .iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| *k)
            .collect();
        if !blank.is_empty() {
            return Err(JobsyncError::missing_vars(&blank));
        }
        if self.base_url.is_empty() {
            return Err(JobsyncError::Config("API base URL cannot be empty".to_string()));
        }
        if self.results_per_page == 0 {
            return Err(JobsyncError::Config(
                "ADZUNA_RESULTS_PER_PAGE must be greater than 0".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(JobsyncError::Config("ADZUNA_TIMEOUT_SECS must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// `<base_url>/<country>/search`, the page index is appended per request
    pub fn search_url(&self) -> String {
        format!("{}/{}/search", self.base_url.trim_end_matches('/'), self.country)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============================================================================
// Fetch behavior
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub max_pages: u32,
    /// Pages in flight at once. 1 keeps the fetch fully sequential.
    pub concurrency: usize,
    /// Wait between the first failed attempt and the retry
    pub retry_backoff_ms: u64,
    /// Stop at the first page that comes back successfully with no results
    pub stop_on_empty_page: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            concurrency: DEFAULT_FETCH_CONCURRENCY,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            stop_on_empty_page: false,
        }
    }
}

impl FetchConfig {
    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            max_pages: lookup_parsed(get, "FETCH_MAX_PAGES", DEFAULT_MAX_PAGES)?,
            concurrency: lookup_parsed(get, "FETCH_CONCURRENCY", DEFAULT_FETCH_CONCURRENCY)?,
            retry_backoff_ms: lookup_parsed(get, "FETCH_RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS)?,
            stop_on_empty_page: lookup_parsed(get, "FETCH_STOP_ON_EMPTY_PAGE", false)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_pages == 0 {
            return Err(JobsyncError::Config("FETCH_MAX_PAGES must be greater than 0".to_string()));
        }
        if self.concurrency == 0 {
            return Err(JobsyncError::Config("FETCH_CONCURRENCY must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

// ============================================================================
// Staging
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    pub csv_path: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from(DEFAULT_STAGING_CSV_PATH),
        }
    }
}

impl StagingConfig {
    pub fn from_lookup<F>(get: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            csv_path: lookup(get, "STAGING_CSV_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STAGING_CSV_PATH)),
        }
    }
}

// ============================================================================
// Warehouse connectivity
// ============================================================================

/// Warehouse connection parameters
///
/// `account` is the host, optionally with `:port`. `warehouse` names the
/// compute resource and is sent as the connection's application name.
#[derive(Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub account: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub max_connections: u32,
}

impl std::fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("user", &self.user)
            .field("password", &"***")
            .field("account", &self.account)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl WarehouseConfig {
    /// `WAREHOUSE_*` variables, with the `SNOWFLAKE_*` names accepted as fallbacks
    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        const FIELDS: [(&str, &str); 6] = [
            ("WAREHOUSE_USER", "SNOWFLAKE_USER"),
            ("WAREHOUSE_PASSWORD", "SNOWFLAKE_PASSWORD"),
            ("WAREHOUSE_ACCOUNT", "SNOWFLAKE_ACCOUNT"),
            ("WAREHOUSE_NAME", "SNOWFLAKE_WAREHOUSE"),
            ("WAREHOUSE_DATABASE", "SNOWFLAKE_DATABASE"),
            ("WAREHOUSE_SCHEMA", "SNOWFLAKE_SCHEMA"),
        ];

        let mut values = Vec::with_capacity(FIELDS.len());
        let mut missing = Vec::new();
        for (primary, fallback) in FIELDS {
            match lookup(get, primary).or_else(|| lookup(get, fallback)) {
                Some(v) => values.push(v),
                None => {
                    missing.push(primary);
                    values.push(String::new());
                },
            }
        }
        if !missing.is_empty() {
            return Err(JobsyncError::missing_vars(&missing));
        }

        let mut values = values.into_iter();
        let mut next = || values.next().unwrap_or_default();
        let config = Self {
            user: next(),
            password: next(),
            account: next(),
            warehouse: next(),
            database: next(),
            schema: next(),
            max_connections: lookup_parsed(
                get,
                "WAREHOUSE_MAX_CONNECTIONS",
                DEFAULT_WAREHOUSE_MAX_CONNECTIONS,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&env_lookup)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(JobsyncError::Config(
                "WAREHOUSE_MAX_CONNECTIONS must be greater than 0".to_string(),
            ));
        }
        if !is_identifier(&self.schema) {
            return Err(JobsyncError::Config(format!(
                "WAREHOUSE_SCHEMA '{}' must be a plain identifier",
                self.schema
            )));
        }
        self.host_and_port()?;
        Ok(())
    }

    /// Split `account` into host and port
    pub fn host_and_port(&self) -> Result<(String, u16)> {
        match self.account.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| {
                    JobsyncError::Config(format!("WAREHOUSE_ACCOUNT has an invalid port: '{}'", port))
                })?;
                Ok((host.to_string(), port))
            },
            None => Ok((self.account.clone(), DEFAULT_WAREHOUSE_PORT)),
        }
    }
}

/// Schema names are interpolated into DDL, so only `[A-Za-z_][A-Za-z0-9_]*` is allowed
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// Run orchestration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub step_retries: u32,
    pub step_retry_delay_secs: u64,
    pub run_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            step_retries: DEFAULT_STEP_RETRIES,
            step_retry_delay_secs: DEFAULT_STEP_RETRY_DELAY_SECS,
            run_timeout_secs: DEFAULT_RUN_TIMEOUT_SECS,
        }
    }
}

impl PipelineConfig {
    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            step_retries: lookup_parsed(get, "PIPELINE_STEP_RETRIES", DEFAULT_STEP_RETRIES)?,
            step_retry_delay_secs: lookup_parsed(
                get,
                "PIPELINE_STEP_RETRY_DELAY_SECS",
                DEFAULT_STEP_RETRY_DELAY_SECS,
            )?,
            run_timeout_secs: lookup_parsed(get, "PIPELINE_RUN_TIMEOUT_SECS", DEFAULT_RUN_TIMEOUT_SECS)?,
        };
        if config.run_timeout_secs == 0 {
            return Err(JobsyncError::Config(
                "PIPELINE_RUN_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn step_retry_delay(&self) -> Duration {
        Duration::from_secs(self.step_retry_delay_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// Everything a fetch-and-stage run needs. Warehouse settings are loaded
/// separately by the commands that touch the warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub fetch: FetchConfig,
    pub staging: StagingConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            api: ApiConfig::from_lookup(get)?,
            fetch: FetchConfig::from_lookup(get)?,
            staging: StagingConfig::from_lookup(get),
            pipeline: PipelineConfig::from_lookup(get)?,
        })
    }

    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&env_lookup)
    }
}
