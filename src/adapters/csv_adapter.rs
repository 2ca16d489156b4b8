//! CSV file adapters: historical bars and external signal columns.
//!
//! Bar files live at `<dir>/<SYMBOL>_<interval>.csv` with the header
//! `timestamp,open,high,low,close,volume`. Timestamps may be RFC 3339,
//! unix seconds or `YYYY-MM-DD`.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::domain::bar::{parse_timestamp, BarInterval, PriceBar, TimeRange};
use crate::domain::error::DcabotError;
use crate::domain::rules::SignalSnapshot;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::signal_port::SignalSource;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn csv_path(&self, symbol: &str, interval: BarInterval) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", symbol, interval.label()))
    }

    /// Symbols that have a file for `interval`, sorted.
    pub fn list_symbols(&self, interval: BarInterval) -> Result<Vec<String>, DcabotError> {
        let entries = fs::read_dir(&self.base_path)?;
        let suffix = format!("_{}.csv", interval.label());
        let mut symbols = Vec::new();

        for entry in entries {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(symbol) = name.strip_suffix(&suffix) {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}

fn field<T: FromStr>(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    symbol: &str,
) -> Result<T, DcabotError>
where
    T::Err: std::fmt::Display,
{
    let raw = record.get(index).ok_or_else(|| DcabotError::InvalidData {
        symbol: symbol.to_string(),
        reason: format!("missing {name} column"),
    })?;
    raw.trim().parse().map_err(|e| DcabotError::InvalidData {
        symbol: symbol.to_string(),
        reason: format!("invalid {name} value '{raw}': {e}"),
    })
}

fn timestamp_field(
    record: &csv::StringRecord,
    symbol: &str,
) -> Result<DateTime<Utc>, DcabotError> {
    let raw = record.get(0).unwrap_or_default();
    parse_timestamp(raw).ok_or_else(|| DcabotError::InvalidData {
        symbol: symbol.to_string(),
        reason: format!("invalid timestamp '{raw}'"),
    })
}

/// Read a whole bar file, sorted ascending by timestamp.
pub fn read_bars(path: &Path, symbol: &str) -> Result<Vec<PriceBar>, DcabotError> {
    let content = fs::read_to_string(path).map_err(|e| DcabotError::DataUnavailable {
        symbol: symbol.to_string(),
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;

    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut bars = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| DcabotError::InvalidData {
            symbol: symbol.to_string(),
            reason: format!("CSV parse error: {}", e),
        })?;

        bars.push(PriceBar {
            timestamp: timestamp_field(&record, symbol)?,
            open: field(&record, 1, "open", symbol)?,
            high: field(&record, 2, "high", symbol)?,
            low: field(&record, 3, "low", symbol)?,
            close: field(&record, 4, "close", symbol)?,
            volume: field(&record, 5, "volume", symbol)?,
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

impl MarketDataPort for CsvAdapter {
    fn historical_bars(
        &self,
        symbol: &str,
        interval: BarInterval,
        range: &TimeRange,
    ) -> Result<Vec<PriceBar>, DcabotError> {
        let mut bars = read_bars(&self.csv_path(symbol, interval), symbol)?;
        bars.retain(|b| range.contains(b.timestamp));
        Ok(bars)
    }
}

/// Buy/sell columns from a `timestamp,buy,sell` file. Bars with no row
/// get no signal.
pub struct CsvSignalSource {
    rows: BTreeMap<DateTime<Utc>, SignalSnapshot>,
}

impl CsvSignalSource {
    pub fn from_file(path: &Path) -> Result<Self, DcabotError> {
        let name = path.display().to_string();
        let content = fs::read_to_string(path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut rows = BTreeMap::new();

        for result in rdr.records() {
            let record = result.map_err(|e| DcabotError::InvalidData {
                symbol: name.clone(),
                reason: format!("CSV parse error: {}", e),
            })?;
            let flag = |index: usize, column: &str| -> Result<bool, DcabotError> {
                match record.get(index).map(|s| s.trim().to_lowercase()).as_deref() {
                    Some("1" | "true") => Ok(true),
                    Some("0" | "false" | "") | None => Ok(false),
                    Some(other) => Err(DcabotError::InvalidData {
                        symbol: name.clone(),
                        reason: format!("invalid {column} flag '{other}'"),
                    }),
                }
            };
            let snapshot = SignalSnapshot {
                buy: flag(1, "buy")?,
                sell: flag(2, "sell")?,
            };
            rows.insert(timestamp_field(&record, &name)?, snapshot);
        }

        Ok(Self { rows })
    }
}

impl SignalSource for CsvSignalSource {
    fn signals(&self, bars: &[PriceBar]) -> Result<Vec<SignalSnapshot>, DcabotError> {
        Ok(bars
            .iter()
            .map(|b| self.rows.get(&b.timestamp).copied().unwrap_or_default())
            .collect())
    }
}
