//! Bar intervals.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bar granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "d")]
    Daily,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown interval '{0}' (expected one of 1m, 5m, 15m, 30m, 1h, d)")]
pub struct IntervalParseError(pub String);

impl Interval {
    /// Fixed nominal length of one bar.
    pub fn duration(&self) -> Duration {
        match self {
            Self::Minute1 => Duration::minutes(1),
            Self::Minute5 => Duration::minutes(5),
            Self::Minute15 => Duration::minutes(15),
            Self::Minute30 => Duration::minutes(30),
            Self::Hour1 => Duration::hours(1),
            Self::Daily => Duration::days(1),
        }
    }

    pub fn is_daily(&self) -> bool {
        matches!(self, Self::Daily)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute1 => "1m",
            Self::Minute5 => "5m",
            Self::Minute15 => "15m",
            Self::Minute30 => "30m",
            Self::Hour1 => "1h",
            Self::Daily => "d",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = IntervalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1m" => Ok(Self::Minute1),
            "5m" => Ok(Self::Minute5),
            "15m" => Ok(Self::Minute15),
            "30m" => Ok(Self::Minute30),
            "1h" => Ok(Self::Hour1),
            "d" | "1d" | "daily" => Ok(Self::Daily),
            other => Err(IntervalParseError(other.to_string())),
        }
    }
}
