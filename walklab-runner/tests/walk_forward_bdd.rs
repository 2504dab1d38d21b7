//! BDD tests for the walk-forward controller.
//!
//! The optimizer and backtester are scripted fakes that record every request,
//! so the tests can check exactly which windows were executed and with what.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use walklab_core::{CalendarError, Exchange, SessionHours, TradingCalendar};
use walklab_runner::{
    load_artifacts, save_artifacts, BacktestOutcome, BacktestRequest, Backtester, DailyPnl,
    MarketConfig, OptimizationRequest, Optimizer, ParameterRange, ParameterSet, ParameterSpace,
    Phase, RankedParameters, WalkForwardConfig, WalkForwardController, WalkForwardError,
};

// ─── Fakes ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Summary {
    days: usize,
    net: f64,
}

/// Returns `fast_window = 5 + call number`, plus a tail of worse candidates.
#[derive(Default)]
struct ScriptedOptimizer {
    calls: RefCell<Vec<(usize, usize)>>,
    empty: bool,
    candidates: usize,
    cancel_after_first: Option<&'static AtomicBool>,
}

impl Optimizer for ScriptedOptimizer {
    fn optimize(&self, request: &OptimizationRequest<'_>) -> anyhow::Result<Vec<RankedParameters>> {
        let mut calls = self.calls.borrow_mut();
        calls.push((request.window.start_index, request.window.end_index));
        if let Some(flag) = self.cancel_after_first {
            flag.store(true, Ordering::Relaxed);
        }
        if self.empty {
            return Ok(vec![]);
        }
        let call = calls.len() as i64;
        let n = self.candidates.max(1);
        Ok((0..n as i64)
            .map(|rank| RankedParameters {
                parameters: params(5 + call + rank * 100),
                objective_value: 2.0 - rank as f64 * 0.1,
            })
            .collect())
    }
}

/// One PnL row per session of the test window, worth the window's start index.
struct ScriptedBacktester {
    calendar: TradingCalendar,
    calls: RefCell<Vec<(usize, usize, ParameterSet)>>,
    fail: bool,
    aggregated_days: RefCell<Option<usize>>,
}

impl ScriptedBacktester {
    fn new(calendar: &TradingCalendar) -> Self {
        Self {
            calendar: calendar.clone(),
            calls: RefCell::new(vec![]),
            fail: false,
            aggregated_days: RefCell::new(None),
        }
    }
}

impl Backtester for ScriptedBacktester {
    type Statistics = Summary;

    fn run_backtest(
        &self,
        request: &BacktestRequest<'_>,
    ) -> anyhow::Result<BacktestOutcome<Summary>> {
        let w = request.window;
        self.calls
            .borrow_mut()
            .push((w.start_index, w.end_index, request.parameters.clone()));
        if self.fail {
            return Err(anyhow!("engine down"));
        }
        let daily_pnl: Vec<DailyPnl> = (w.start_index..=w.end_index)
            .map(|i| pnl(self.calendar.dates()[i], w.start_index as f64))
            .collect();
        let statistics = Summary {
            days: daily_pnl.len(),
            net: daily_pnl.iter().map(|p| p.net_pnl).sum(),
        };
        Ok(BacktestOutcome {
            daily_pnl,
            statistics,
        })
    }

    fn aggregate_statistics(
        &self,
        daily_pnl: &[DailyPnl],
        _market: &MarketConfig,
    ) -> anyhow::Result<Summary> {
        *self.aggregated_days.borrow_mut() = Some(daily_pnl.len());
        Ok(Summary {
            days: daily_pnl.len(),
            net: daily_pnl.iter().map(|p| p.net_pnl).sum(),
        })
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, day).unwrap()
}

fn params(fast: i64) -> ParameterSet {
    let mut p = ParameterSet::new();
    p.insert("fast_window".into(), json!(fast));
    p
}

fn pnl(date: NaiveDate, net: f64) -> DailyPnl {
    DailyPnl {
        date,
        trade_count: 1,
        turnover: 0.0,
        commission: 0.0,
        slippage: 0.0,
        total_pnl: net,
        net_pnl: net,
    }
}

/// Sessions 2025-05-12 ..= 2025-05-16.
fn five_day_calendar() -> TradingCalendar {
    TradingCalendar::from_dates(
        "RBL9",
        Exchange::Shfe,
        SessionHours::default(),
        (12..=16).map(d),
    )
    .unwrap()
}

fn config(train: usize, test: usize, mode: &str, start: &str, end: &str) -> WalkForwardConfig {
    WalkForwardConfig::from_toml_str(&format!(
        r#"
strategy = "DoubleMaStrategy"
objective = "sharpe_ratio"
start_date = "{start}"
end_date = "{end}"
keep_top_n = 2

[calendar]
instrument = "RBL9"
exchange = "SHFE"

[windows]
train_sessions = {train}
test_sessions = {test}
mode = "{mode}"

[[parameters]]
name = "fast_window"
start = 5.0
end = 20.0
step = 5.0
"#
    ))
    .unwrap()
}

// ─── Scenarios ───────────────────────────────────────────────────────

#[test]
fn bdd_scenario_rolling_windows_over_five_sessions() {
    // GIVEN a 5-session calendar and train=2 / test=1 rolling windows
    let calendar = five_day_calendar();
    let config = config(2, 1, "rolling", "2025-05-12", "2025-05-16");
    let optimizer = ScriptedOptimizer::default();
    let backtester = ScriptedBacktester::new(&calendar);

    // WHEN the controller runs
    let result = WalkForwardController::new(&config, &calendar, &optimizer, &backtester)
        .run()
        .expect("run should succeed");

    // THEN windows alternate Train[0,1] Test[2,2] Train[1,2] Test[3,3] Train[2,3] Test[4,4]
    let spans: Vec<_> = result
        .windows
        .iter()
        .map(|r| (r.window.phase, r.window.start_index, r.window.end_index))
        .collect();
    assert_eq!(
        spans,
        vec![
            (Phase::Train, 0, 1),
            (Phase::Test, 2, 2),
            (Phase::Train, 1, 2),
            (Phase::Test, 3, 3),
            (Phase::Train, 2, 3),
            (Phase::Test, 4, 4),
        ]
    );
    assert_eq!(*optimizer.calls.borrow(), vec![(0, 1), (1, 2), (2, 3)]);

    // AND each test window uses the parameters of the train window before it
    let tests = backtester.calls.borrow();
    assert_eq!(tests.len(), 3);
    for (i, (_, _, p)) in tests.iter().enumerate() {
        assert_eq!(*p, params(6 + i as i64));
    }
    assert_eq!(result.final_parameters, Some(params(8)));

    // AND test PnL is stitched in order and summarized once
    let dates: Vec<_> = result.daily_pnl.iter().map(|p| p.date).collect();
    assert_eq!(dates, vec![d(14), d(15), d(16)]);
    assert_eq!(*backtester.aggregated_days.borrow(), Some(3));
    assert_eq!(result.statistics, Summary { days: 3, net: 2.0 + 3.0 + 4.0 });
    assert_eq!(result.run_id, config.run_id());
}

#[test]
fn bdd_scenario_empty_optimizer_result_aborts_before_testing() {
    // GIVEN an optimizer that finds nothing viable
    let calendar = five_day_calendar();
    let config = config(2, 1, "rolling", "2025-05-12", "2025-05-16");
    let optimizer = ScriptedOptimizer {
        empty: true,
        ..Default::default()
    };
    let backtester = ScriptedBacktester::new(&calendar);

    // WHEN the controller runs
    let err = WalkForwardController::new(&config, &calendar, &optimizer, &backtester)
        .run()
        .unwrap_err();

    // THEN the run fails with NoViableParameters for the first train window
    assert!(matches!(
        err,
        WalkForwardError::NoViableParameters { start, end } if start == d(12) && end == d(13)
    ));
    // AND no test window was executed
    assert!(backtester.calls.borrow().is_empty());
    assert!(backtester.aggregated_days.borrow().is_none());
}

#[test]
fn bdd_scenario_adjacent_windows_do_not_reuse_tested_sessions() {
    // GIVEN adjacent train placement over 6 sessions
    let calendar = TradingCalendar::from_dates(
        "RBL9",
        Exchange::Shfe,
        SessionHours::default(),
        [12, 13, 14, 15, 16, 19].map(d),
    )
    .unwrap();
    let config = config(2, 1, "adjacent", "2025-05-12", "2025-05-19");
    let optimizer = ScriptedOptimizer::default();
    let backtester = ScriptedBacktester::new(&calendar);

    // WHEN the controller runs
    let result = WalkForwardController::new(&config, &calendar, &optimizer, &backtester)
        .run()
        .unwrap();

    // THEN train windows start right after the previous test window
    assert_eq!(*optimizer.calls.borrow(), vec![(0, 1), (3, 4)]);
    assert_eq!(result.test_windows().count(), 2);
    let dates: Vec<_> = result.daily_pnl.iter().map(|p| p.date).collect();
    assert_eq!(dates, vec![d(14), d(19)]);
}

#[test]
fn bdd_scenario_start_before_calendar_is_rejected() {
    let calendar = five_day_calendar();
    let config = config(2, 1, "rolling", "2025-05-09", "2025-05-16");
    let optimizer = ScriptedOptimizer::default();
    let backtester = ScriptedBacktester::new(&calendar);

    let err = WalkForwardController::new(&config, &calendar, &optimizer, &backtester)
        .run()
        .unwrap_err();

    assert!(matches!(
        err,
        WalkForwardError::StartBeforeCalendar { start, first } if start == d(9) && first == d(12)
    ));
    assert!(optimizer.calls.borrow().is_empty());
}

#[test]
fn bdd_scenario_start_after_calendar_is_out_of_range() {
    let calendar = five_day_calendar();
    let config = config(2, 1, "rolling", "2025-05-20", "2025-05-30");
    let optimizer = ScriptedOptimizer::default();
    let backtester = ScriptedBacktester::new(&calendar);

    let err = WalkForwardController::new(&config, &calendar, &optimizer, &backtester)
        .run()
        .unwrap_err();

    assert!(matches!(
        err,
        WalkForwardError::Calendar(CalendarError::DateOutOfRange { .. })
    ));
}

#[test]
fn bdd_scenario_last_test_window_is_clipped() {
    // GIVEN a test window longer than what is left of the calendar
    let calendar = five_day_calendar();
    let config = config(2, 5, "rolling", "2025-05-12", "2025-05-16");
    let optimizer = ScriptedOptimizer::default();
    let backtester = ScriptedBacktester::new(&calendar);

    // WHEN the controller runs
    let result = WalkForwardController::new(&config, &calendar, &optimizer, &backtester)
        .run()
        .unwrap();

    // THEN the only test window covers the remaining sessions and ends the run
    assert_eq!(result.windows.len(), 2);
    let test = &result.windows[1];
    assert_eq!((test.window.start_index, test.window.end_index), (2, 4));
    assert!(test.window.truncated);
    assert_eq!(test.pnl_days, 3);
    assert_eq!(test.statistics, Some(Summary { days: 3, net: 6.0 }));
}

#[test]
fn bdd_scenario_cancel_flag_stops_between_windows() {
    // GIVEN an optimizer that raises the cancel flag during the first train window
    static CANCEL: AtomicBool = AtomicBool::new(false);
    let calendar = five_day_calendar();
    let config = config(2, 1, "rolling", "2025-05-12", "2025-05-16");
    let optimizer = ScriptedOptimizer {
        cancel_after_first: Some(&CANCEL),
        ..Default::default()
    };
    let backtester = ScriptedBacktester::new(&calendar);

    // WHEN the controller runs with that flag
    let err = WalkForwardController::new(&config, &calendar, &optimizer, &backtester)
        .run_with_cancel(Some(&CANCEL))
        .unwrap_err();

    // THEN it stops before the first test window
    assert!(matches!(
        err,
        WalkForwardError::Cancelled {
            completed_windows: 1
        }
    ));
    assert!(backtester.calls.borrow().is_empty());
}

#[test]
fn bdd_scenario_backtester_failure_propagates() {
    let calendar = five_day_calendar();
    let config = config(2, 1, "rolling", "2025-05-12", "2025-05-16");
    let optimizer = ScriptedOptimizer::default();
    let mut backtester = ScriptedBacktester::new(&calendar);
    backtester.fail = true;

    let err = WalkForwardController::new(&config, &calendar, &optimizer, &backtester)
        .run()
        .unwrap_err();

    assert!(matches!(err, WalkForwardError::Collaborator(_)));
    assert_eq!(err.to_string(), "engine down");
    assert_eq!(optimizer.calls.borrow().len(), 1);
}

#[test]
fn bdd_scenario_train_records_keep_top_candidates() {
    // GIVEN an optimizer returning 5 candidates and keep_top_n = 2
    let calendar = five_day_calendar();
    let config = config(2, 1, "rolling", "2025-05-12", "2025-05-16");
    let optimizer = ScriptedOptimizer {
        candidates: 5,
        ..Default::default()
    };
    let backtester = ScriptedBacktester::new(&calendar);

    // WHEN the controller runs
    let result = WalkForwardController::new(&config, &calendar, &optimizer, &backtester)
        .run()
        .unwrap();

    // THEN each train record keeps the best two, best first
    for record in result.train_windows() {
        assert_eq!(record.candidates.len(), 2);
        assert_eq!(record.candidates[0].parameters, record.parameters);
        assert_eq!(record.objective_value, Some(2.0));
        assert!(record.statistics.is_none());
    }
    for record in result.test_windows() {
        assert!(record.candidates.is_empty());
        assert_eq!(record.pnl_days, 1);
    }
}

#[test]
fn bdd_scenario_artifacts_round_trip() {
    // GIVEN a completed run
    let calendar = five_day_calendar();
    let config = config(2, 1, "rolling", "2025-05-12", "2025-05-16");
    let optimizer = ScriptedOptimizer::default();
    let backtester = ScriptedBacktester::new(&calendar);
    let result = WalkForwardController::new(&config, &calendar, &optimizer, &backtester)
        .run()
        .unwrap();

    // WHEN its artifacts are saved and loaded back
    let dir = tempfile::tempdir().unwrap();
    let run_dir = save_artifacts(&result, dir.path()).unwrap();
    let loaded = load_artifacts::<Summary>(&run_dir).unwrap();

    // THEN the report matches and the CSVs are present
    assert_eq!(loaded.run_id, result.run_id);
    assert_eq!(loaded.daily_pnl, result.daily_pnl);
    assert_eq!(loaded.statistics, result.statistics);
    assert_eq!(loaded.windows.len(), result.windows.len());
    assert_eq!(loaded.windows[1].window, result.windows[1].window);

    let pnl_csv = std::fs::read_to_string(run_dir.join("daily_pnl.csv")).unwrap();
    assert_eq!(pnl_csv.lines().count(), 4);
    let windows_csv = std::fs::read_to_string(run_dir.join("windows.csv")).unwrap();
    assert_eq!(windows_csv.lines().count(), 7);
    assert!(windows_csv.contains("test,2,2,2025-05-14,2025-05-14,2025-05-13T21:00:00+08:00"));
}

#[test]
fn bdd_scenario_calendar_for_another_instrument_is_rejected() {
    // GIVEN a config naming RBL9.SHFE but a calendar built from IL9.DCE
    let calendar = TradingCalendar::from_dates(
        "IL9",
        Exchange::Dce,
        SessionHours::default(),
        (12..=16).map(d),
    )
    .unwrap();
    let config = config(2, 1, "rolling", "2025-05-12", "2025-05-16");
    let optimizer = ScriptedOptimizer::default();
    let backtester = ScriptedBacktester::new(&calendar);

    // WHEN the controller runs
    let err = WalkForwardController::new(&config, &calendar, &optimizer, &backtester)
        .run()
        .unwrap_err();

    // THEN it refuses before any window is executed
    assert!(matches!(
        err,
        WalkForwardError::CalendarMismatch { ref expected, ref actual }
            if expected == "RBL9.SHFE" && actual == "IL9.DCE"
    ));
    assert!(optimizer.calls.borrow().is_empty());
}

#[test]
fn bdd_scenario_oversized_parameter_grid_still_runs() {
    // GIVEN a parameter space whose grid size overflows usize
    let calendar = five_day_calendar();
    let mut config = config(2, 1, "rolling", "2025-05-12", "2025-05-16");
    let huge = |name: &str| ParameterRange {
        name: name.to_string(),
        start: 0.0,
        end: 1_000_000.0,
        step: 0.000_001,
    };
    config.parameters = ParameterSpace(vec![huge("fast_window"), huge("slow_window")]);
    assert!(config.validate().is_ok());
    assert_eq!(config.parameters.grid_size(), None);
    let optimizer = ScriptedOptimizer::default();
    let backtester = ScriptedBacktester::new(&calendar);

    // WHEN the controller runs
    let result = WalkForwardController::new(&config, &calendar, &optimizer, &backtester).run();

    // THEN the grid is left to the optimizer and the run completes
    assert_eq!(result.unwrap().test_windows().count(), 3);
}
