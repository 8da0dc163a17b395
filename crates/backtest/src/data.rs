//! Historical bar loading from CSV.
//!
//! Expected header: `timestamp,open,high,low,close,volume`. Timestamps are
//! RFC 3339 strings or integer epoch milliseconds.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use common::{Bar, Error, Result};

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Load every bar in `path` for `symbol`, sorted by timestamp.
pub fn load_bars(path: impl AsRef<Path>, symbol: &str) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    let reader = csv::Reader::from_path(path)?;
    let bars = collect(reader, symbol)?;
    info!(symbol, path = %path.display(), bars = bars.len(), "Historical bars loaded");
    Ok(bars)
}

/// Same as [`load_bars`] over any reader.
pub fn read_bars<R: Read>(input: R, symbol: &str) -> Result<Vec<Bar>> {
    collect(csv::Reader::from_reader(input), symbol)
}

fn collect<R: Read>(mut reader: csv::Reader<R>, symbol: &str) -> Result<Vec<Bar>> {
    let mut bars = Vec::new();
    for row in reader.deserialize() {
        let row: CsvRow = row?;
        bars.push(Bar {
            symbol: symbol.to_string(),
            timestamp: parse_timestamp(&row.timestamp)?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    // Stable: duplicates stay in file order for the indicator window to refuse.
    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(millis) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| Error::Config(format!("timestamp out of range: {raw}")));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Config(format!("bad timestamp '{raw}': {e}")))
}
