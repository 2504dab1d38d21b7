//! WalkLab core — trading calendar, session arithmetic and vendor bar import.
//!
//! This crate has no knowledge of strategies or backtesting. It provides:
//! - Domain types: exchanges, bar intervals and canonical bars
//! - `TradingCalendar`: an ordered session index built from a reference
//!   instrument's daily bars, with night-session aware open/close instants
//! - Daily bar sources used to build the calendar (trait + CSV store)
//! - Vendor text export import with session-aware timestamp correction

pub mod calendar;
pub mod data;
pub mod domain;
pub mod vendor;

pub use calendar::{CalendarError, Session, SessionHours, TradingCalendar};
pub use data::{CsvDailyBarSource, DailyBarSource, DataError};
pub use domain::{Bar, Exchange, Interval};
pub use vendor::{
    ImportError, ImportedFile, SessionTimestampNormalizer, VendorImporter, VendorImportOptions,
};
