//! Optimizer and backtester seams.
//!
//! The walk-forward controller never evaluates a strategy itself. It hands each
//! train window to an `Optimizer` and each test window to a `Backtester`, and
//! only sequences the calls and stitches the results.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::{MarketConfig, ParameterSpace};
use crate::window::Window;

/// Named strategy parameters. Ordered so that logs and hashes are stable.
pub type ParameterSet = BTreeMap<String, serde_json::Value>;

/// One optimizer candidate and the objective value it scored on the train window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedParameters {
    pub parameters: ParameterSet,
    pub objective_value: f64,
}

/// One day of out-of-sample profit and loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPnl {
    pub date: NaiveDate,
    pub trade_count: u32,
    pub turnover: f64,
    pub commission: f64,
    pub slippage: f64,
    pub total_pnl: f64,
    pub net_pnl: f64,
}

/// Everything an optimizer needs to search one train window.
#[derive(Debug, Clone, Copy)]
pub struct OptimizationRequest<'a> {
    pub strategy: &'a str,
    pub parameter_space: &'a ParameterSpace,
    pub objective: &'a str,
    pub window: &'a Window,
    pub market: &'a MarketConfig,
}

/// Everything a backtester needs to evaluate one test window.
#[derive(Debug, Clone, Copy)]
pub struct BacktestRequest<'a> {
    pub strategy: &'a str,
    pub parameters: &'a ParameterSet,
    pub window: &'a Window,
    pub market: &'a MarketConfig,
}

/// Daily PnL and summary statistics of one backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestOutcome<S> {
    pub daily_pnl: Vec<DailyPnl>,
    pub statistics: S,
}

/// Ranks parameter sets on a train window.
pub trait Optimizer {
    /// Candidates ordered best first. An empty list means nothing was viable.
    fn optimize(&self, request: &OptimizationRequest<'_>) -> anyhow::Result<Vec<RankedParameters>>;
}

/// Evaluates fixed parameters on a test window and summarizes stitched PnL.
pub trait Backtester {
    /// Summary statistics produced per test window and for the whole run.
    type Statistics: fmt::Debug;

    fn run_backtest(
        &self,
        request: &BacktestRequest<'_>,
    ) -> anyhow::Result<BacktestOutcome<Self::Statistics>>;

    /// Statistics over the concatenated out-of-sample daily PnL.
    fn aggregate_statistics(
        &self,
        daily_pnl: &[DailyPnl],
        market: &MarketConfig,
    ) -> anyhow::Result<Self::Statistics>;
}
