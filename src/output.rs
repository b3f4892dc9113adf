//! Output formatting and persistence for CLI results.
//!
//! Supports pretty-printing, JSON serialization, CSV append for status
//! snapshots, and CSV export of resolved paths.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::model::Coord;
use csv::WriterBuilder;
use std::fmt::Debug;
use std::fs::OpenOptions;
use std::path::Path;

#[derive(Serialize)]
struct PathRow {
    seq: usize,
    lat: f64,
    lng: f64,
}

/// Logs a value using Rust's debug pretty-print format.
pub fn print_pretty<T: Debug>(value: &T) {
    debug!("{:#?}", value);
}

/// Logs a value as pretty-printed JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends a record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record<T: Serialize>(path: &str, record: &T) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// Writes a path as `seq,lat,lng` rows, replacing any existing file.
pub fn write_path_csv(path: &str, coords: &[Coord]) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(true).from_path(path)?;
    for (seq, c) in coords.iter().enumerate() {
        writer.serialize(PathRow {
            seq,
            lat: c.lat,
            lng: c.lng,
        })?;
    }
    writer.flush()?;
    debug!(path, points = coords.len(), "Wrote path CSV");
    Ok(())
}
