//! Historical bar loading for backtesting.
//!
//! Expected CSV format (only `timestamp`, `close` and `atr` are required,
//! every other column may be empty or omitted):
//! ```csv
//! timestamp,close,atr,magnet_price,magnet_strength,conflict_index,volatility_pressure,secondary_strength,trend_aligned,liquidity_score,magnet_tier,stop_price
//! 2024-09-01T00:00:00Z,43000,250,44000,85,0.1,0.4,40,true,70,1,42800
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

const COLUMNS: [&str; 12] = [
    "timestamp",
    "close",
    "atr",
    "magnet_price",
    "magnet_strength",
    "conflict_index",
    "volatility_pressure",
    "secondary_strength",
    "trend_aligned",
    "liquidity_score",
    "magnet_tier",
    "stop_price",
];

const REQUIRED_COLUMNS: usize = 3;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: expected at least {expected} columns, got {got}")]
    ColumnCount {
        line: usize,
        expected: usize,
        got: usize,
    },

    #[error("line {line}: invalid {field} '{value}'")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("CSV contains no data rows")]
    Empty,
}

/// One bar with the magnet signals attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRecord {
    pub timestamp: DateTime<Utc>,
    pub close: Decimal,
    pub atr: Decimal,
    pub magnet_price: Option<Decimal>,
    pub magnet_strength: Option<Decimal>,
    pub conflict_index: Option<Decimal>,
    pub volatility_pressure: Option<Decimal>,
    pub secondary_strength: Option<Decimal>,
    pub trend_aligned: Option<bool>,
    pub liquidity_score: Option<Decimal>,
    pub magnet_tier: Option<u8>,
    pub stop_price: Option<Decimal>,
}

/// Trait for loading historical bars.
pub trait DataLoader: Send + Sync {
    /// Bars in `[start, end]`, oldest first.
    fn load_bars(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<BarRecord>;

    /// Get the available date range in the data.
    fn available_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)>;
}

/// CSV bar loader.
#[derive(Debug, Clone)]
pub struct CsvBarLoader {
    bars: Vec<BarRecord>,
}

impl CsvBarLoader {
    /// Load bars from a CSV file.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| DataError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_csv_content(&content)
    }

    /// Load bars from CSV content string.
    pub fn from_csv_content(content: &str) -> Result<Self, DataError> {
        let mut bars = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            // Skip header
            if idx == 0 && line.starts_with("timestamp") {
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            bars.push(parse_row(idx + 1, line)?);
        }

        if bars.is_empty() {
            return Err(DataError::Empty);
        }

        bars.sort_by_key(|bar| bar.timestamp);
        Ok(Self { bars })
    }

    /// Create a loader from in-memory bars.
    pub fn from_bars(mut bars: Vec<BarRecord>) -> Self {
        bars.sort_by_key(|bar| bar.timestamp);
        Self { bars }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

impl DataLoader for CsvBarLoader {
    fn load_bars(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<BarRecord> {
        self.bars
            .iter()
            .filter(|bar| bar.timestamp >= start && bar.timestamp <= end)
            .cloned()
            .collect()
    }

    fn available_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.bars.first()?;
        let last = self.bars.last()?;
        Some((first.timestamp, last.timestamp))
    }
}

fn parse_row(line: usize, raw: &str) -> Result<BarRecord, DataError> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() < REQUIRED_COLUMNS {
        return Err(DataError::ColumnCount {
            line,
            expected: REQUIRED_COLUMNS,
            got: parts.len(),
        });
    }

    let field = |idx: usize| parts.get(idx).copied().filter(|v| !v.is_empty());

    Ok(BarRecord {
        timestamp: required(line, 0, parts[0])?,
        close: required(line, 1, parts[1])?,
        atr: required(line, 2, parts[2])?,
        magnet_price: optional(line, 3, field(3))?,
        magnet_strength: optional(line, 4, field(4))?,
        conflict_index: optional(line, 5, field(5))?,
        volatility_pressure: optional(line, 6, field(6))?,
        secondary_strength: optional(line, 7, field(7))?,
        trend_aligned: optional(line, 8, field(8))?,
        liquidity_score: optional(line, 9, field(9))?,
        magnet_tier: optional(line, 10, field(10))?,
        stop_price: optional(line, 11, field(11))?,
    })
}

fn required<T: FromStr>(line: usize, idx: usize, value: &str) -> Result<T, DataError> {
    value.parse().map_err(|_| DataError::InvalidField {
        line,
        field: COLUMNS[idx],
        value: value.to_string(),
    })
}

fn optional<T: FromStr>(line: usize, idx: usize, value: Option<&str>) -> Result<Option<T>, DataError> {
    value.map(|v| required(line, idx, v)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_csv_parsing() {
        let csv = r#"timestamp,close,atr,magnet_price,magnet_strength,conflict_index,volatility_pressure,secondary_strength,trend_aligned,liquidity_score,magnet_tier,stop_price
2024-09-01T01:00:00Z,43100,250,,,,,,,,,
2024-09-01T00:00:00Z,43000,250,44000,85,0.1,0.4,40,true,70,2,42800
"#;

        let loader = CsvBarLoader::from_csv_content(csv).unwrap();
        assert_eq!(loader.len(), 2);

        let range = loader.available_range().unwrap();
        assert_eq!(range.0, Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap());
        assert_eq!(range.1, Utc.with_ymd_and_hms(2024, 9, 1, 1, 0, 0).unwrap());

        let bars = loader.load_bars(range.0, range.1);
        assert_eq!(bars[0].magnet_price, Some(dec!(44000)));
        assert_eq!(bars[0].trend_aligned, Some(true));
        assert_eq!(bars[0].magnet_tier, Some(2));
        assert_eq!(bars[1].magnet_price, None);
        assert_eq!(bars[1].stop_price, None);
    }

    #[test]
    fn test_short_rows_leave_optional_columns_empty() {
        let csv = "2024-09-01T00:00:00Z,43000,250,44000\n";

        let loader = CsvBarLoader::from_csv_content(csv).unwrap();
        let bar = &loader.bars[0];

        assert_eq!(bar.magnet_price, Some(dec!(44000)));
        assert_eq!(bar.magnet_strength, None);
        assert_eq!(bar.liquidity_score, None);
    }

    #[test]
    fn test_invalid_field_reports_line_and_column() {
        let csv = "timestamp,close,atr\n2024-09-01T00:00:00Z,abc,250\n";

        let err = CsvBarLoader::from_csv_content(csv).unwrap_err();
        assert!(matches!(
            err,
            DataError::InvalidField { line: 2, field: "close", .. }
        ));
    }

    #[test]
    fn test_missing_required_columns() {
        let err = CsvBarLoader::from_csv_content("2024-09-01T00:00:00Z,43000\n").unwrap_err();
        assert!(matches!(err, DataError::ColumnCount { got: 2, .. }));
    }

    #[test]
    fn test_empty_csv_rejected() {
        let err = CsvBarLoader::from_csv_content("timestamp,close,atr\n").unwrap_err();
        assert!(matches!(err, DataError::Empty));
    }
}
