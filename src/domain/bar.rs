//! Price bar representation, bar intervals and time ranges.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::DcabotError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Check that a series is strictly ascending by timestamp.
pub fn validate_series(symbol: &str, bars: &[PriceBar]) -> Result<(), DcabotError> {
    for pair in bars.windows(2) {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(DcabotError::InvalidData {
                symbol: symbol.to_string(),
                reason: format!(
                    "bar at {} does not follow {}",
                    pair[1].timestamp, pair[0].timestamp
                ),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarInterval {
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "1hour")]
    OneHour,
    #[serde(rename = "4hour")]
    FourHours,
    #[serde(rename = "1day")]
    OneDay,
}

impl BarInterval {
    pub fn duration(&self) -> Duration {
        match self {
            BarInterval::OneMinute => Duration::minutes(1),
            BarInterval::FiveMinutes => Duration::minutes(5),
            BarInterval::FifteenMinutes => Duration::minutes(15),
            BarInterval::ThirtyMinutes => Duration::minutes(30),
            BarInterval::OneHour => Duration::hours(1),
            BarInterval::FourHours => Duration::hours(4),
            BarInterval::OneDay => Duration::days(1),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BarInterval::OneMinute => "1min",
            BarInterval::FiveMinutes => "5min",
            BarInterval::FifteenMinutes => "15min",
            BarInterval::ThirtyMinutes => "30min",
            BarInterval::OneHour => "1hour",
            BarInterval::FourHours => "4hour",
            BarInterval::OneDay => "1day",
        }
    }
}

impl fmt::Display for BarInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BarInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1min" => Ok(BarInterval::OneMinute),
            "5min" => Ok(BarInterval::FiveMinutes),
            "15min" => Ok(BarInterval::FifteenMinutes),
            "30min" => Ok(BarInterval::ThirtyMinutes),
            "1hour" | "1h" => Ok(BarInterval::OneHour),
            "4hour" | "4h" => Ok(BarInterval::FourHours),
            "1day" | "1d" => Ok(BarInterval::OneDay),
            other => Err(format!("unknown bar interval '{other}'")),
        }
    }
}

/// Inclusive time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimeRange { start, end }
    }

    /// The `count` intervals ending at `end`. A span reaching past the
    /// earliest representable time starts there instead.
    pub fn trailing(end: DateTime<Utc>, interval: BarInterval, count: usize) -> Self {
        let start = i32::try_from(count)
            .ok()
            .and_then(|n| interval.duration().checked_mul(n))
            .and_then(|span| end.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        TimeRange { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Parse an RFC 3339 timestamp, unix seconds, or a `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(secs) = value.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
