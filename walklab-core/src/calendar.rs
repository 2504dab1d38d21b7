//! Trading calendar — an ordered session index built from daily bars.
//!
//! Sessions are derived purely from the days on which a reference instrument
//! actually traded, so weekends and holidays fall out of the source data
//! rather than from calendar rules.
//!
//! Session arithmetic follows the exchange convention that a trading day
//! starts with the *previous* trading day's night session:
//! - open(i)  = date(i - 1) at `night_open` for i > 0, date(0) at 00:00 for i = 0
//! - close(i) = date(i) at `day_close`
//!
//! All instants are expressed in the exchange's timezone.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::data::{DailyBarSource, DataError};
use crate::domain::Exchange;

/// Errors raised when the calendar cannot answer a query.
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("no trading-day data available for {instrument}.{exchange}")]
    Empty {
        instrument: String,
        exchange: Exchange,
    },

    #[error("date {date} is after the last known session {last}")]
    DateOutOfRange { date: NaiveDate, last: NaiveDate },

    #[error("session index {index} out of range (calendar has {len} sessions)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Source(#[from] DataError),
}

/// Local wall-clock times that bound a session.
///
/// Every instrument is modeled with the same night-session open and
/// day-session close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHours {
    /// Night session open on the previous trading day (default 21:00).
    pub night_open: NaiveTime,
    /// Day session close (default 15:00).
    pub day_close: NaiveTime,
}

impl Default for SessionHours {
    fn default() -> Self {
        Self {
            night_open: NaiveTime::from_hms_opt(21, 0, 0).unwrap_or_default(),
            day_close: NaiveTime::from_hms_opt(15, 0, 0).unwrap_or_default(),
        }
    }
}

/// One trading session with its resolved open and close instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub index: usize,
    pub date: NaiveDate,
    pub open: DateTime<Tz>,
    pub close: DateTime<Tz>,
}

/// Resolve a local wall-clock time in `tz`.
///
/// Ambiguous times resolve to the earliest instant; non-existent times are
/// read as UTC wall time.
pub fn local_instant(tz: &Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

/// Immutable, strictly increasing sequence of trading sessions.
#[derive(Debug, Clone)]
pub struct TradingCalendar {
    instrument: String,
    exchange: Exchange,
    tz: Tz,
    hours: SessionHours,
    dates: Vec<NaiveDate>,
}

impl TradingCalendar {
    /// Build a calendar from daily bar timestamps in any timezone.
    ///
    /// Each timestamp is converted to the exchange timezone and truncated to
    /// its date. Input order does not matter; duplicates collapse.
    pub fn from_timestamps<I, T>(
        instrument: impl Into<String>,
        exchange: Exchange,
        hours: SessionHours,
        timestamps: I,
    ) -> Result<Self, CalendarError>
    where
        I: IntoIterator<Item = DateTime<T>>,
        T: TimeZone,
    {
        let tz = exchange.timezone();
        let dates = timestamps
            .into_iter()
            .map(|ts| ts.with_timezone(&tz).date_naive());
        Self::from_dates(instrument, exchange, hours, dates)
    }

    /// Build a calendar from session dates.
    pub fn from_dates<I>(
        instrument: impl Into<String>,
        exchange: Exchange,
        hours: SessionHours,
        dates: I,
    ) -> Result<Self, CalendarError>
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let instrument = instrument.into();
        let mut dates: Vec<NaiveDate> = dates.into_iter().collect();
        let raw = dates.len();
        dates.sort_unstable();
        dates.dedup();

        if dates.is_empty() {
            return Err(CalendarError::Empty {
                instrument,
                exchange,
            });
        }

        debug!(
            instrument = %instrument,
            exchange = %exchange,
            bars = raw,
            sessions = dates.len(),
            first = %dates[0],
            last = %dates[dates.len() - 1],
            "built trading calendar"
        );

        Ok(Self {
            instrument,
            exchange,
            tz: exchange.timezone(),
            hours,
            dates,
        })
    }

    /// Run the one-time daily bar query and build the calendar from it.
    pub fn load(
        source: &dyn DailyBarSource,
        instrument: &str,
        exchange: Exchange,
        start: NaiveDate,
        end: NaiveDate,
        hours: SessionHours,
    ) -> Result<Self, CalendarError> {
        let timestamps = source.load_daily_bars(instrument, exchange, start, end)?;
        Self::from_timestamps(instrument, exchange, hours, timestamps)
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn hours(&self) -> SessionHours {
        self.hours
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Always false for a constructed calendar.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn first_date(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn last_date(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    pub fn last_index(&self) -> usize {
        self.dates.len() - 1
    }

    /// Session at `index` with resolved open/close instants.
    pub fn session(&self, index: usize) -> Option<Session> {
        let date = *self.dates.get(index)?;
        Some(Session {
            index,
            date,
            open: self.open_at(index),
            close: self.close_at(index),
        })
    }

    /// Index of the first session whose date is on or after `date`.
    ///
    /// Dates before the first session resolve to index 0; callers that need
    /// to reject those must check `first_date()` themselves.
    pub fn find_first_session_at_or_after(&self, date: NaiveDate) -> Result<usize, CalendarError> {
        let idx = self.dates.partition_point(|d| *d < date);
        if idx == self.dates.len() {
            return Err(CalendarError::DateOutOfRange {
                date,
                last: self.last_date(),
            });
        }
        Ok(idx)
    }

    /// Instant at which session `index` starts trading.
    ///
    /// A session opens with the previous session's night session. The first
    /// session has no predecessor and opens at its own midnight.
    pub fn session_open(&self, index: usize) -> Result<DateTime<Tz>, CalendarError> {
        self.check_index(index)?;
        Ok(self.open_at(index))
    }

    /// Instant at which session `index` stops trading (its day-session close).
    pub fn session_close(&self, index: usize) -> Result<DateTime<Tz>, CalendarError> {
        self.check_index(index)?;
        Ok(self.close_at(index))
    }

    /// Latest session whose day start (date at 00:00) is strictly before `instant`.
    pub fn previous_session_strictly_before<T: TimeZone>(
        &self,
        instant: &DateTime<T>,
    ) -> Option<Session> {
        let instant = instant.with_timezone(&self.tz);
        let count = self
            .dates
            .partition_point(|d| self.day_start(*d) < instant);
        count.checked_sub(1).and_then(|i| self.session(i))
    }

    /// Number of sessions with `start <= date <= end`.
    pub fn count_sessions_between(&self, start: NaiveDate, end: NaiveDate) -> usize {
        if end < start {
            return 0;
        }
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end);
        hi - lo
    }

    fn check_index(&self, index: usize) -> Result<(), CalendarError> {
        if index >= self.dates.len() {
            return Err(CalendarError::IndexOutOfRange {
                index,
                len: self.dates.len(),
            });
        }
        Ok(())
    }

    fn day_start(&self, date: NaiveDate) -> DateTime<Tz> {
        local_instant(&self.tz, date, NaiveTime::default())
    }

    fn open_at(&self, index: usize) -> DateTime<Tz> {
        match index.checked_sub(1) {
            Some(prev) => local_instant(&self.tz, self.dates[prev], self.hours.night_open),
            None => self.day_start(self.dates[0]),
        }
    }

    fn close_at(&self, index: usize) -> DateTime<Tz> {
        local_instant(&self.tz, self.dates[index], self.hours.day_close)
    }
}
