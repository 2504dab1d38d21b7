//! WalkLab Runner — walk-forward orchestration on top of `walklab-core`.
//!
//! This crate provides:
//! - `WalkForwardConfig`: TOML-loadable run configuration with a content hash
//! - `WindowSchedule`: session-counted alternating train/test windows
//! - `Optimizer` / `Backtester`: the seams strategy evaluation plugs into
//! - `WalkForwardController`: sequences the windows and stitches test PnL
//! - Artifact export (JSON report, daily PnL and schedule CSVs)

pub mod collaborator;
pub mod config;
pub mod export;
pub mod walk_forward;
pub mod window;

pub use collaborator::{
    BacktestOutcome, BacktestRequest, Backtester, DailyPnl, OptimizationRequest, Optimizer,
    ParameterSet, RankedParameters,
};
pub use config::{
    CalendarConfig, ConfigError, MarketConfig, ParameterRange, ParameterSpace, RunId,
    WalkForwardConfig, WindowConfig, WindowMode,
};
pub use export::{
    export_daily_pnl_csv, export_report_json, export_schedule_csv, import_report_json,
    load_artifacts, save_artifacts,
};
pub use walk_forward::{
    WalkForwardController, WalkForwardError, WalkForwardResult, WindowRecord, SCHEMA_VERSION,
};
pub use window::{Phase, Window, WindowSchedule};
