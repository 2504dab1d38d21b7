//! Bar — the canonical market data unit produced by vendor import.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::{Exchange, Interval};

/// OHLCV bar for a single contract.
///
/// `datetime` is the bar's *opening* instant with an explicit UTC offset.
/// Vendor exports stamp closing times; the importer converts them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub exchange: Exchange,
    pub interval: Interval,
    pub datetime: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub turnover: f64,
    pub open_interest: f64,
}

/// Round `value` to the nearest multiple of `target`.
pub fn round_to(value: f64, target: f64) -> f64 {
    (value / target).round() * target
}
