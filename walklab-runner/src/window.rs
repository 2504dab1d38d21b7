//! Train/test window schedule over a trading calendar.
//!
//! Windows are counted in sessions, not calendar days. The schedule alternates
//! Train and Test, starting with Train at the first session on or after the
//! requested start date. A window that would run past the calendar's last
//! session is clipped and ends the schedule.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use walklab_core::calendar::local_instant;
use walklab_core::TradingCalendar;

use crate::config::{ConfigError, WindowConfig, WindowMode};
use crate::walk_forward::WalkForwardError;

/// Which half of a walk-forward step a window belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Train,
    Test,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Train => write!(f, "train"),
            Phase::Test => write!(f, "test"),
        }
    }
}

/// A contiguous run of sessions `[start_index, end_index]` (both inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub phase: Phase,
    pub start_index: usize,
    pub end_index: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Open of the first session.
    pub open: DateTime<FixedOffset>,
    /// Close of the last session.
    pub close: DateTime<FixedOffset>,
    /// The window was clipped at the calendar's last session.
    pub truncated: bool,
}

impl Window {
    /// Number of sessions in the window.
    pub fn session_count(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

/// Iterator over the alternating Train/Test windows of one run.
#[derive(Debug, Clone)]
pub struct WindowSchedule<'a> {
    calendar: &'a TradingCalendar,
    train_sessions: usize,
    test_sessions: usize,
    mode: WindowMode,
    end_bound: DateTime<Tz>,
    cursor: usize,
    phase: Phase,
    done: bool,
}

impl<'a> WindowSchedule<'a> {
    /// Plan windows over `[start_date, end_date]`.
    ///
    /// A window is started only while its first session opens before the end
    /// of `end_date` in the calendar's timezone; the window itself may run
    /// past that bound.
    pub fn new(
        calendar: &'a TradingCalendar,
        windows: &WindowConfig,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, WalkForwardError> {
        windows.validate()?;
        if start_date > end_date {
            return Err(ConfigError::Invalid(format!(
                "start_date {start_date} is after end_date {end_date}"
            ))
            .into());
        }
        if start_date < calendar.first_date() {
            return Err(WalkForwardError::StartBeforeCalendar {
                start: start_date,
                first: calendar.first_date(),
            });
        }
        let cursor = calendar.find_first_session_at_or_after(start_date)?;
        let end_bound = local_instant(
            &calendar.timezone(),
            end_date,
            NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default(),
        );

        Ok(Self {
            calendar,
            train_sessions: windows.train_sessions,
            test_sessions: windows.test_sessions,
            mode: windows.mode,
            end_bound,
            cursor,
            phase: Phase::Train,
            done: false,
        })
    }
}

impl Iterator for WindowSchedule<'_> {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.done {
            return None;
        }
        let last = self.calendar.last_index();
        let first = match self.calendar.session(self.cursor) {
            Some(session) if session.open < self.end_bound => session,
            _ => {
                self.done = true;
                return None;
            }
        };

        let len = match self.phase {
            Phase::Train => self.train_sessions,
            Phase::Test => self.test_sessions,
        };
        let wanted_end = self.cursor + len - 1;
        let truncated = wanted_end > last;
        let end_index = wanted_end.min(last);
        let final_session = self.calendar.session(end_index)?;

        let window = Window {
            phase: self.phase,
            start_index: self.cursor,
            end_index,
            start_date: first.date,
            end_date: final_session.date,
            open: first.open.fixed_offset(),
            close: final_session.close.fixed_offset(),
            truncated,
        };

        match self.phase {
            Phase::Train => {
                self.cursor = end_index + 1;
                self.phase = Phase::Test;
                // No session left to test on.
                if truncated || self.cursor > last {
                    self.done = true;
                }
            }
            Phase::Test => {
                if truncated || end_index == last {
                    self.done = true;
                }
                self.cursor = match self.mode {
                    WindowMode::Rolling => (end_index + 1).saturating_sub(self.train_sessions),
                    WindowMode::Adjacent => end_index + 1,
                };
                self.phase = Phase::Train;
            }
        }

        Some(window)
    }
}
