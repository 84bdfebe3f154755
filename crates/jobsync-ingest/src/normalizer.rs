//! Raw listing → flat schema
//!
//! Nested objects (`company`, `location`, `category`) are read through a safe
//! two-level lookup: a missing parent yields a null field, never an error.
//! Row order follows input order; duplicates are left for the merge to resolve.

use tracing::{debug, warn};

use crate::models::{NormalizedListing, RawListing};

/// Map one raw record. `None` when the record carries no usable `id`.
pub fn normalize(raw: &RawListing) -> Option<NormalizedListing> {
    let job_id = raw.str_field("id").filter(|id| !id.trim().is_empty())?;

    Some(NormalizedListing {
        job_id,
        title: raw.str_field("title"),
        company: raw.nested_str("company", "display_name"),
        location: raw.nested_str("location", "display_name"),
        latitude: raw.f64_field("latitude"),
        longitude: raw.f64_field("longitude"),
        salary_min: raw.f64_field("salary_min"),
        salary_max: raw.f64_field("salary_max"),
        contract_type: raw.str_field("contract_type"),
        description: raw.str_field("description"),
        category: raw.nested_str("category", "label"),
        created: raw.str_field("created"),
        redirect_url: raw.str_field("redirect_url"),
    })
}

/// Map a whole batch, dropping (and logging) records without an id
pub fn normalize_batch(raw: &[RawListing]) -> Vec<NormalizedListing> {
    let mut dropped = 0usize;
    let listings: Vec<NormalizedListing> = raw
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let listing = normalize(record);
            if listing.is_none() {
                dropped += 1;
                warn!(index, "Dropping raw listing without an id");
            }
            listing
        })
        .collect();

    debug!(input = raw.len(), output = listings.len(), dropped, "Normalized batch");
    listings
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_record() -> RawListing {
        RawListing(json!({
            "id": "4928374",
            "title": "Data Engineer",
            "company": { "display_name": "Acme", "__CLASS__": "Adzuna::API::Response::Company" },
            "location": { "display_name": "Paris, Ile-de-France", "area": ["France", "Paris"] },
            "latitude": 48.8566,
            "longitude": 2.3522,
            "salary_min": 45000,
            "salary_max": 60000.0,
            "contract_type": "permanent",
            "description": "Build pipelines",
            "category": { "label": "IT Jobs", "tag": "it-jobs" },
            "created": "2024-11-10T12:34:56Z",
            "redirect_url": "https://example.com/job/4928374"
        }))
    }

    #[test]
    fn test_maps_every_field() {
        let listing = normalize(&full_record()).unwrap();
        assert_eq!(listing.job_id, "4928374");
        assert_eq!(listing.title.as_deref(), Some("Data Engineer"));
        assert_eq!(listing.company.as_deref(), Some("Acme"));
        assert_eq!(listing.location.as_deref(), Some("Paris, Ile-de-France"));
        assert_eq!(listing.latitude, Some(48.8566));
        assert_eq!(listing.longitude, Some(2.3522));
        assert_eq!(listing.salary_min, Some(45000.0));
        assert_eq!(listing.salary_max, Some(60000.0));
        assert_eq!(listing.contract_type.as_deref(), Some("permanent"));
        assert_eq!(listing.description.as_deref(), Some("Build pipelines"));
        assert_eq!(listing.category.as_deref(), Some("IT Jobs"));
        assert_eq!(listing.created.as_deref(), Some("2024-11-10T12:34:56Z"));
        assert_eq!(listing.redirect_url.as_deref(), Some("https://example.com/job/4928374"));
    }

    #[test]
    fn test_missing_company_is_null_not_error() {
        let raw = RawListing(json!({ "id": "1", "title": "Data Engineer" }));
        let listing = normalize(&raw).unwrap();
        assert_eq!(listing.job_id, "1");
        assert!(listing.company.is_none());
        assert!(listing.location.is_none());
        assert!(listing.category.is_none());
    }

    #[test]
    fn test_parent_without_sub_field_is_null() {
        let raw = RawListing(json!({ "id": "1", "company": {}, "category": { "tag": "it-jobs" } }));
        let listing = normalize(&raw).unwrap();
        assert!(listing.company.is_none());
        assert!(listing.category.is_none());
    }

    #[test]
    fn test_parent_of_wrong_type_is_null() {
        let raw = RawListing(json!({ "id": "1", "company": "Acme", "location": [1, 2] }));
        let listing = normalize(&raw).unwrap();
        assert!(listing.company.is_none());
        assert!(listing.location.is_none());
    }

    #[test]
    fn test_batch_keeps_order_and_duplicates() {
        let raw = vec![
            RawListing(json!({ "id": "2", "title": "B" })),
            RawListing(json!({ "title": "no id" })),
            RawListing(json!({ "id": "1", "title": "A" })),
            RawListing(json!({ "id": "2", "title": "B again" })),
        ];
        let ids: Vec<String> = normalize_batch(&raw).into_iter().map(|l| l.job_id).collect();
        assert_eq!(ids, vec!["2", "1", "2"]);
    }
}
