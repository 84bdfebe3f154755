//! Listing records at each stage of the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One listing exactly as the search API returned it
///
/// Kept as loose JSON so that absent or oddly typed fields never fail
/// deserialization of the page. Consumed immediately by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawListing(pub Value);

impl RawListing {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// String field, also accepting numbers (ids are sometimes numeric)
    pub fn str_field(&self, key: &str) -> Option<String> {
        value_to_string(self.get(key)?)
    }

    pub fn f64_field(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// `parent.child`, null when either level is missing
    pub fn nested_str(&self, parent: &str, child: &str) -> Option<String> {
        value_to_string(self.get(parent)?.get(child)?)
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Page body returned by `GET <search-endpoint>/<page>`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub results: Vec<RawListing>,
}

/// Canonical flat listing
///
/// Field order is the staging column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NormalizedListing {
    pub job_id: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub contract_type: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Upstream creation time, kept as the string the API sent
    pub created: Option<String>,
    pub redirect_url: Option<String>,
}

impl NormalizedListing {
    /// Column names in staging/table order
    pub const COLUMNS: [&'static str; 13] = [
        "job_id",
        "title",
        "company",
        "location",
        "latitude",
        "longitude",
        "salary_min",
        "salary_max",
        "contract_type",
        "description",
        "category",
        "created",
        "redirect_url",
    ];

    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Default::default()
        }
    }
}

/// A listing as held in the durable table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurableRecord {
    #[serde(flatten)]
    pub listing: NormalizedListing,
    /// Set once, on first insert
    pub inserted_at: DateTime<Utc>,
    /// Refreshed on every merge that touches the row
    pub updated_at: DateTime<Utc>,
}
