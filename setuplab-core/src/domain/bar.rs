//! PriceBar: one OHLCV observation inside a trading session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar keyed by its opening timestamp in milliseconds since the Unix epoch.
///
/// Bars for one session must be sorted ascending by `timestamp` before they
/// reach the classifier. The bar loader sorts; hand-built slices must too.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl PriceBar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: 0.0,
        }
    }

    /// Returns true if any OHLC field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Basic OHLC sanity check: high >= low, and open/close inside the range.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }

    /// Bar timestamp as a UTC datetime. `None` only for out-of-range epochs.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// True when the closed range `[low, high]` contains `price`.
    pub fn covers(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}
