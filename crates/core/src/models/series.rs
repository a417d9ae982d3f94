use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::CoreError;

/// Time window for a historical series query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "24h")]
    Day,
    #[default]
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl Period {
    /// All periods in the order the detail view offers them.
    pub const ALL: [Period; 4] = [Period::Day, Period::Week, Period::Month, Period::Quarter];

    /// Number of days sent upstream as the `days` query parameter.
    pub fn days(&self) -> u32 {
        match self {
            Period::Day => 1,
            Period::Week => 7,
            Period::Month => 30,
            Period::Quarter => 90,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "24h",
            Period::Week => "7d",
            Period::Month => "30d",
            Period::Quarter => "90d",
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "24h" | "1d" => Ok(Period::Day),
            "7d" => Ok(Period::Week),
            "30d" => Ok(Period::Month),
            "90d" => Ok(Period::Quarter),
            other => Err(CoreError::InvalidPeriod(other.to_string())),
        }
    }
}

/// One raw `(timestamp, price)` sample as returned upstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
    pub price: f64,
}

impl RawSample {
    pub fn new(timestamp_ms: i64, price: f64) -> Self {
        Self {
            timestamp_ms,
            price,
        }
    }
}

/// A single chart point: the raw sample plus its display-ready date label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub date: String,
    pub price: f64,
}

/// The instrument/period pair a series belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub instrument_id: String,
    pub period: Period,
}

impl Selection {
    pub fn new(instrument_id: impl Into<String>, period: Period) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            period,
        }
    }
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.instrument_id, self.period)
    }
}

/// Price series for exactly one `Selection`, ascending by timestamp.
///
/// Replaced wholesale on each fetch; never appended to.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSet {
    selection: Selection,
    points: Arc<[SeriesPoint]>,
}

impl SeriesSet {
    pub fn new(selection: Selection, points: Vec<SeriesPoint>) -> Self {
        Self {
            selection,
            points: points.into(),
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
