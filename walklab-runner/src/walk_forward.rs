//! Walk-forward controller: alternate optimization and out-of-sample testing.
//!
//! Each train window is optimized and the best candidate is carried into the
//! following test window. Test-window daily PnL is concatenated in order and
//! summarized once at the end. Windows are executed strictly in sequence
//! because every test depends on the train step before it.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use walklab_core::{CalendarError, TradingCalendar};

use crate::collaborator::{
    BacktestRequest, Backtester, DailyPnl, OptimizationRequest, Optimizer, ParameterSet,
    RankedParameters,
};
use crate::config::{ConfigError, RunId, WalkForwardConfig};
use crate::window::{Phase, Window, WindowSchedule};

/// Current schema version for persisted walk-forward results.
pub const SCHEMA_VERSION: u32 = 1;

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors that abort a walk-forward run.
#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("start date {start} precedes the trading calendar (first session {first})")]
    StartBeforeCalendar { start: NaiveDate, first: NaiveDate },

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error("optimizer returned no viable parameters for train window {start}..={end}")]
    NoViableParameters { start: NaiveDate, end: NaiveDate },

    #[error("walk-forward run cancelled after {completed_windows} windows")]
    Cancelled { completed_windows: usize },

    #[error("calendar is built from {actual} but the config names {expected}")]
    CalendarMismatch { expected: String, actual: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failure reported by the optimizer or backtester, passed through as is.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

// ─── Result types ────────────────────────────────────────────────────

/// Audit entry for one executed window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowRecord<S> {
    pub window: Window,
    /// Parameters chosen on (train) or applied to (test) this window.
    pub parameters: ParameterSet,
    /// Objective value of the chosen candidate. Train windows only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_value: Option<f64>,
    /// Best optimizer candidates, best first, capped at `keep_top_n`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<RankedParameters>,
    /// Backtest statistics. Test windows only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<S>,
    /// Number of daily PnL rows contributed. Test windows only.
    #[serde(default)]
    pub pnl_days: usize,
}

/// Complete outcome of a walk-forward run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardResult<S> {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub strategy: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub windows: Vec<WindowRecord<S>>,
    /// Out-of-sample daily PnL of every test window, in window order.
    pub daily_pnl: Vec<DailyPnl>,
    /// Parameters of the last train window, if any ran.
    pub final_parameters: Option<ParameterSet>,
    /// Statistics over `daily_pnl`.
    pub statistics: S,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl<S> WalkForwardResult<S> {
    pub fn train_windows(&self) -> impl Iterator<Item = &WindowRecord<S>> {
        self.windows
            .iter()
            .filter(|r| r.window.phase == Phase::Train)
    }

    pub fn test_windows(&self) -> impl Iterator<Item = &WindowRecord<S>> {
        self.windows
            .iter()
            .filter(|r| r.window.phase == Phase::Test)
    }
}

// ─── Controller ──────────────────────────────────────────────────────

/// Drives one walk-forward run over a trading calendar.
pub struct WalkForwardController<'a, O: ?Sized, B: ?Sized> {
    config: &'a WalkForwardConfig,
    calendar: &'a TradingCalendar,
    optimizer: &'a O,
    backtester: &'a B,
}

impl<'a, O, B> WalkForwardController<'a, O, B>
where
    O: Optimizer + ?Sized,
    B: Backtester + ?Sized,
{
    pub fn new(
        config: &'a WalkForwardConfig,
        calendar: &'a TradingCalendar,
        optimizer: &'a O,
        backtester: &'a B,
    ) -> Self {
        Self {
            config,
            calendar,
            optimizer,
            backtester,
        }
    }

    /// The schedule this controller would execute.
    pub fn schedule(&self) -> Result<WindowSchedule<'a>, WalkForwardError> {
        WindowSchedule::new(
            self.calendar,
            &self.config.windows,
            self.config.start_date,
            self.config.end_date,
        )
    }

    /// Run to completion.
    pub fn run(&self) -> Result<WalkForwardResult<B::Statistics>, WalkForwardError> {
        self.run_with_cancel(None)
    }

    /// Run, checking `cancel` before every window.
    ///
    /// A cancelled run returns `WalkForwardError::Cancelled` and no partial
    /// statistics.
    pub fn run_with_cancel(
        &self,
        cancel: Option<&AtomicBool>,
    ) -> Result<WalkForwardResult<B::Statistics>, WalkForwardError> {
        let config = self.config;
        config.validate()?;
        self.check_calendar()?;
        let run_id = config.run_id();
        let schedule = self.schedule()?;
        let grid_size = match config.parameters.grid_size() {
            Some(n) => n.to_string(),
            None => "overflow".to_string(),
        };

        info!(
            run_id = %&run_id[..12],
            strategy = %config.strategy,
            objective = %config.objective,
            start = %config.start_date,
            end = %config.end_date,
            train_sessions = config.windows.train_sessions,
            test_sessions = config.windows.test_sessions,
            mode = ?config.windows.mode,
            calendar = %calendar_id(self.calendar),
            sessions_in_range = self
                .calendar
                .count_sessions_between(config.start_date, config.end_date),
            grid_size = %grid_size,
            "walk-forward run starting"
        );

        let mut records: Vec<WindowRecord<B::Statistics>> = Vec::new();
        let mut daily_pnl: Vec<DailyPnl> = Vec::new();
        let mut selected: Option<ParameterSet> = None;

        for window in schedule {
            if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
                warn!(completed_windows = records.len(), "walk-forward run cancelled");
                return Err(WalkForwardError::Cancelled {
                    completed_windows: records.len(),
                });
            }
            if window.truncated {
                warn!(
                    phase = %window.phase,
                    start = %window.start_date,
                    end = %window.end_date,
                    sessions = window.session_count(),
                    "window clipped at the end of the trading calendar"
                );
            }

            let record = match window.phase {
                Phase::Train => {
                    let record = self.train(window)?;
                    selected = Some(record.parameters.clone());
                    record
                }
                Phase::Test => {
                    let parameters = selected.clone().ok_or_else(|| {
                        WalkForwardError::NoViableParameters {
                            start: window.start_date,
                            end: window.end_date,
                        }
                    })?;
                    let (record, pnl) = self.test(window, parameters)?;
                    append_daily_pnl(&mut daily_pnl, pnl);
                    record
                }
            };
            records.push(record);
        }

        let statistics = self
            .backtester
            .aggregate_statistics(&daily_pnl, &config.market)
            .map_err(|e| {
                error!(error = %e, "aggregate statistics failed");
                e
            })?;

        info!(
            run_id = %&run_id[..12],
            windows = records.len(),
            pnl_days = daily_pnl.len(),
            statistics = ?statistics,
            "walk-forward run complete"
        );

        Ok(WalkForwardResult {
            schema_version: SCHEMA_VERSION,
            run_id,
            strategy: config.strategy.clone(),
            start_date: config.start_date,
            end_date: config.end_date,
            windows: records,
            daily_pnl,
            final_parameters: selected,
            statistics,
        })
    }

    /// The calendar handed in must be the one `[calendar]` describes.
    fn check_calendar(&self) -> Result<(), WalkForwardError> {
        let wanted = &self.config.calendar;
        if self.calendar.instrument() != wanted.instrument
            || self.calendar.exchange() != wanted.exchange
        {
            return Err(WalkForwardError::CalendarMismatch {
                expected: format!("{}.{}", wanted.instrument, wanted.exchange),
                actual: calendar_id(self.calendar),
            });
        }
        Ok(())
    }

    fn train(&self, window: Window) -> Result<WindowRecord<B::Statistics>, WalkForwardError> {
        let config = self.config;
        let request = OptimizationRequest {
            strategy: &config.strategy,
            parameter_space: &config.parameters,
            objective: &config.objective,
            window: &window,
            market: &config.market,
        };
        let mut ranked = self.optimizer.optimize(&request).map_err(|e| {
            error!(start = %window.start_date, end = %window.end_date, error = %e, "optimizer failed");
            e
        })?;

        let best = ranked
            .first()
            .cloned()
            .ok_or(WalkForwardError::NoViableParameters {
                start: window.start_date,
                end: window.end_date,
            })?;

        info!(
            phase = "train",
            start = %window.open,
            end = %window.close,
            sessions = window.session_count(),
            candidates = ranked.len(),
            objective_value = best.objective_value,
            parameters = ?best.parameters,
            "train window optimized"
        );

        ranked.truncate(config.keep_top_n);
        Ok(WindowRecord {
            window,
            parameters: best.parameters,
            objective_value: Some(best.objective_value),
            candidates: ranked,
            statistics: None,
            pnl_days: 0,
        })
    }

    fn test(
        &self,
        window: Window,
        parameters: ParameterSet,
    ) -> Result<(WindowRecord<B::Statistics>, Vec<DailyPnl>), WalkForwardError> {
        let config = self.config;
        let request = BacktestRequest {
            strategy: &config.strategy,
            parameters: &parameters,
            window: &window,
            market: &config.market,
        };
        let outcome = self.backtester.run_backtest(&request).map_err(|e| {
            error!(start = %window.start_date, end = %window.end_date, error = %e, "backtest failed");
            e
        })?;

        info!(
            phase = "test",
            start = %window.open,
            end = %window.close,
            sessions = window.session_count(),
            pnl_days = outcome.daily_pnl.len(),
            parameters = ?parameters,
            statistics = ?outcome.statistics,
            "test window evaluated"
        );

        let record = WindowRecord {
            window,
            parameters,
            objective_value: None,
            candidates: Vec::new(),
            statistics: Some(outcome.statistics),
            pnl_days: outcome.daily_pnl.len(),
        };
        Ok((record, outcome.daily_pnl))
    }
}

fn calendar_id(calendar: &TradingCalendar) -> String {
    format!("{}.{}", calendar.instrument(), calendar.exchange())
}

/// Append one test window's PnL, warning when its dates do not continue
/// strictly after what is already stitched.
fn append_daily_pnl(stitched: &mut Vec<DailyPnl>, window_pnl: Vec<DailyPnl>) {
    if let (Some(last), Some(next)) = (stitched.last(), window_pnl.first()) {
        if next.date <= last.date {
            warn!(
                previous = %last.date,
                next = %next.date,
                "test window PnL overlaps the previous window"
            );
        }
    }
    stitched.extend(window_pnl);
}
