//! Canonical bar CSV store.
//!
//! One row per bar with columns
//! `symbol,exchange,interval,datetime,open,high,low,close,volume,turnover,open_interest`.
//! `datetime` is RFC 3339 with an explicit offset.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate};

use super::provider::{DailyBarSource, DataError};
use crate::domain::{Bar, Exchange};

/// Write bars to `writer` as CSV with a header row.
pub fn write_bars<W: Write>(writer: W, bars: &[Bar]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for bar in bars {
        wtr.serialize(bar)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write bars to a CSV file, creating parent directories as needed.
pub fn write_bars_csv(path: &Path, bars: &[Bar]) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| DataError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = std::fs::File::create(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_bars(file, bars).map_err(|source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

/// Read every bar from a CSV file written by [`write_bars_csv`].
pub fn read_bars_csv(path: &Path) -> Result<Vec<Bar>, DataError> {
    let csv_err = |source: csv::Error| DataError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = csv::Reader::from_path(path).map_err(csv_err)?;
    rdr.deserialize().collect::<Result<Vec<Bar>, _>>().map_err(csv_err)
}

/// Daily bar source backed by a bar CSV file.
#[derive(Debug, Clone)]
pub struct CsvDailyBarSource {
    path: PathBuf,
}

impl CsvDailyBarSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DailyBarSource for CsvDailyBarSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn load_daily_bars(
        &self,
        instrument: &str,
        exchange: Exchange,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DateTime<FixedOffset>>, DataError> {
        let mut timestamps: Vec<DateTime<FixedOffset>> = read_bars_csv(&self.path)?
            .into_iter()
            .filter(|bar| {
                bar.interval.is_daily()
                    && bar.symbol == instrument
                    && bar.exchange == exchange
                    && (start..=end).contains(&bar.datetime.date_naive())
            })
            .map(|bar| bar.datetime)
            .collect();
        timestamps.sort();
        Ok(timestamps)
    }
}
