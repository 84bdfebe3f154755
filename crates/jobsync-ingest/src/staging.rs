//! CSV staging file
//!
//! Format: one header row with the [`NormalizedListing::COLUMNS`] names, fields
//! quoted only when needed, null written as an empty field. On read, both an
//! empty field and the literal `NULL` token come back as null.
//!
//! Every write replaces the previous file wholesale (write to a sibling temp
//! file, fsync, rename), so nothing accumulates across runs.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use jobsync_common::{JobsyncError, Result};
use tracing::info;

use crate::models::NormalizedListing;

pub const NULL_TOKEN: &str = "NULL";

/// Encode a batch as CSV into any writer
pub fn write_listings<W: Write>(writer: W, listings: &[NormalizedListing]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(NormalizedListing::COLUMNS)?;
    for listing in listings {
        wtr.serialize(listing)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Decode a CSV batch, checking the header against the expected columns
pub fn read_listings<R: Read>(reader: R) -> Result<Vec<NormalizedListing>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers = rdr.headers()?.clone();
    if !headers.iter().eq(NormalizedListing::COLUMNS.iter().copied()) {
        return Err(JobsyncError::Staging(format!(
            "unexpected staging header: {:?}",
            headers.iter().collect::<Vec<_>>()
        )));
    }

    let mut listings = Vec::new();
    for (index, record) in rdr.records().enumerate() {
        // header is line 1
        listings.push(decode_row(&record?, index + 2)?);
    }
    Ok(listings)
}

fn field(record: &StringRecord, index: usize) -> Option<String> {
    record
        .get(index)
        .filter(|v| !v.is_empty() && *v != NULL_TOKEN)
        .map(str::to_string)
}

fn float_field(record: &StringRecord, index: usize, line: usize) -> Result<Option<f64>> {
    field(record, index)
        .map(|raw| {
            raw.parse::<f64>().map_err(|_| {
                JobsyncError::Parse(format!(
                    "line {}: column {} is not a number: '{}'",
                    line,
                    NormalizedListing::COLUMNS[index],
                    raw
                ))
            })
        })
        .transpose()
}

fn decode_row(record: &StringRecord, line: usize) -> Result<NormalizedListing> {
    let job_id = field(record, 0)
        .ok_or_else(|| JobsyncError::Staging(format!("line {}: job_id is empty", line)))?;

    Ok(NormalizedListing {
        job_id,
        title: field(record, 1),
        company: field(record, 2),
        location: field(record, 3),
        latitude: float_field(record, 4, line)?,
        longitude: float_field(record, 5, line)?,
        salary_min: float_field(record, 6, line)?,
        salary_max: float_field(record, 7, line)?,
        contract_type: field(record, 8),
        description: field(record, 9),
        category: field(record, 10),
        created: field(record, 11),
        redirect_url: field(record, 12),
    })
}

/// The staging file on local disk
#[derive(Debug, Clone)]
pub struct CsvStage {
    path: PathBuf,
}

impl CsvStage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the staging file with `listings`
    pub fn write(&self, listings: &[NormalizedListing]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let file = File::create(&tmp_path)?;
        write_listings(&file, listings)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, &self.path)?;

        info!(path = %self.path.display(), rows = listings.len(), "Wrote staging file");
        Ok(())
    }

    pub fn read(&self) -> Result<Vec<NormalizedListing>> {
        let file = File::open(&self.path).map_err(|e| {
            JobsyncError::Staging(format!("cannot open {}: {}", self.path.display(), e))
        })?;
        read_listings(file)
    }
}
