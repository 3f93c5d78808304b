//! Viewing-history CSV ingestion
//!
//! Parses a user-exported viewing history into `ViewingRecord`s. Column
//! mapping is header-driven; rows missing a title or a parseable date are
//! dropped silently. Only structurally malformed input is an error.

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One valid row of the viewing history, immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewingRecord {
    pub title: String,
    pub watched_on: NaiveDate,
}

/// Date formats accepted in history exports, tried in order
const DATE_FORMATS: &[&str] = &["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d", "%d/%m/%Y"];

/// Parse a watch date, trying each known export format
pub fn parse_watch_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Stable fingerprint of the raw export, used to bind checkpoints to one file
pub fn source_digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Read a viewing-history CSV into records
///
/// The header row determines which columns hold the title and the watch
/// date (names come from `config`, matched case-insensitively). Rows with
/// an empty title or an unparseable date are skipped, not errors.
pub fn read_history(bytes: &[u8], config: &IngestConfig) -> Result<Vec<ViewingRecord>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::Parse("history file is not valid UTF-8".to_string()))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| Error::Parse(format!("missing header row: {}", e)))?
        .clone();

    let title_idx = find_column(&headers, &config.title_column).ok_or_else(|| {
        Error::Parse(format!("no '{}' column in header row", config.title_column))
    })?;
    let date_idx = find_column(&headers, &config.date_column).ok_or_else(|| {
        Error::Parse(format!("no '{}' column in header row", config.date_column))
    })?;

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for row in reader.records() {
        let row = row?;
        let title = row.get(title_idx).map(str::trim).unwrap_or_default();
        let date = row.get(date_idx).and_then(parse_watch_date);

        match (title.is_empty(), date) {
            (false, Some(watched_on)) => records.push(ViewingRecord {
                title: title.to_string(),
                watched_on,
            }),
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!("Dropped {} rows missing a title or date", dropped);
    }

    Ok(records)
}

fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}
