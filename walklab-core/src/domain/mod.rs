//! Domain types for WalkLab

pub mod bar;
pub mod exchange;
pub mod interval;

pub use bar::Bar;
pub use exchange::{Exchange, ExchangeParseError};
pub use interval::{Interval, IntervalParseError};
