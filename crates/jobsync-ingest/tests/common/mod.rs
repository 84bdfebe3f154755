//! Shared helpers for the ingest integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use jobsync_ingest::config::{ApiConfig, AppConfig, FetchConfig, PipelineConfig, StagingConfig};
use serde_json::{json, Value};

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,jobsync_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Formatted log output collected from the current thread
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route this thread's events into a buffer until the guard drops
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        use tracing_subscriber::{fmt, EnvFilter};

        let logs = Self::default();
        let writer = logs.clone();
        let subscriber = fmt()
            .with_env_filter(EnvFilter::new("jobsync_ingest=debug"))
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    pub fn lines(&self) -> Vec<String> {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf).lines().map(str::to_string).collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn api_config(base_url: &str) -> ApiConfig {
    ApiConfig {
        app_id: "test-id".to_string(),
        app_key: "test-key".to_string(),
        base_url: base_url.to_string(),
        country: "fr".to_string(),
        what: "data engineer".to_string(),
        results_per_page: 20,
        timeout_secs: 5,
    }
}

pub fn app_config(base_url: &str, max_pages: u32, csv_dir: &Path) -> AppConfig {
    AppConfig {
        api: api_config(base_url),
        fetch: FetchConfig {
            max_pages,
            concurrency: 2,
            retry_backoff_ms: 10,
            stop_on_empty_page: false,
        },
        staging: StagingConfig {
            csv_path: csv_dir.join("job_data.csv"),
        },
        pipeline: PipelineConfig {
            step_retries: 0,
            step_retry_delay_secs: 0,
            run_timeout_secs: 60,
        },
    }
}

/// A listing shaped like the search API's
pub fn listing(id: &str, title: &str, company: Option<&str>) -> Value {
    let mut value = json!({
        "id": id,
        "title": title,
        "location": { "display_name": "Paris, Ile-de-France", "area": ["France", "Paris"] },
        "latitude": 48.8566,
        "longitude": 2.3522,
        "salary_min": 45000,
        "salary_max": 60000,
        "contract_type": "permanent",
        "description": "Build and run batch pipelines",
        "category": { "label": "IT Jobs", "tag": "it-jobs" },
        "created": "2024-11-10T12:34:56Z",
        "redirect_url": format!("https://example.com/job/{}", id),
    });
    if let Some(name) = company {
        value["company"] = json!({ "display_name": name });
    }
    value
}

pub fn page_body(results: Vec<Value>) -> Value {
    json!({ "count": results.len(), "results": results })
}
