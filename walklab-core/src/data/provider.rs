//! Daily bar source trait and structured error types.
//!
//! The calendar is built from a single historical query against a
//! `DailyBarSource`. Storage backends live behind this trait so tests can
//! substitute in-memory sources.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDate};
use thiserror::Error;

use crate::domain::Exchange;

/// Errors raised by bar storage backends.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bar CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Source of a reference instrument's daily bar timestamps.
pub trait DailyBarSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Timestamps of every daily bar for `instrument` on `exchange` with a
    /// date in `[start, end]`, in increasing order.
    fn load_daily_bars(
        &self,
        instrument: &str,
        exchange: Exchange,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DateTime<FixedOffset>>, DataError>;
}

/// In-memory source holding one instrument's timestamps. Queries ignore the
/// instrument and exchange and filter by date only.
#[derive(Debug, Clone, Default)]
pub struct StaticDailyBarSource {
    timestamps: Vec<DateTime<FixedOffset>>,
}

impl StaticDailyBarSource {
    pub fn new(timestamps: Vec<DateTime<FixedOffset>>) -> Self {
        Self { timestamps }
    }
}

impl DailyBarSource for StaticDailyBarSource {
    fn name(&self) -> &str {
        "static"
    }

    fn load_daily_bars(
        &self,
        _instrument: &str,
        _exchange: Exchange,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DateTime<FixedOffset>>, DataError> {
        Ok(self
            .timestamps
            .iter()
            .filter(|ts| (start..=end).contains(&ts.date_naive()))
            .copied()
            .collect())
    }
}
