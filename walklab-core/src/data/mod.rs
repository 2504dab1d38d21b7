//! Daily bar sources and the canonical bar CSV store

pub mod csv_store;
pub mod provider;

pub use csv_store::{read_bars_csv, write_bars_csv, CsvDailyBarSource};
pub use provider::{DailyBarSource, DataError, StaticDailyBarSource};
