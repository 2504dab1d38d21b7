//! Serializable walk-forward configuration.
//!
//! Everything a run needs is carried by `WalkForwardConfig` and handed to the
//! controller explicitly. Loaded from TOML.

use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use walklab_core::{Exchange, SessionHours};

/// Unique identifier for a walk-forward run (content-addressable hash).
pub type RunId = String;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete configuration of one walk-forward run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalkForwardConfig {
    /// Strategy identity, passed through to the collaborators.
    pub strategy: String,
    /// Objective the optimizer ranks by (higher is better), e.g. "sharpe_ratio".
    pub objective: String,
    /// First date of the requested range (inclusive).
    pub start_date: NaiveDate,
    /// Last date of the requested range (inclusive).
    pub end_date: NaiveDate,
    /// Number of optimizer candidates kept per train window for the audit trail.
    #[serde(default = "default_keep_top_n")]
    pub keep_top_n: usize,
    #[serde(default)]
    pub calendar: CalendarConfig,
    pub windows: WindowConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub parameters: ParameterSpace,
}

fn default_keep_top_n() -> usize {
    20
}

impl WalkForwardConfig {
    /// Load and validate a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.strategy.trim().is_empty() {
            return Err(ConfigError::Invalid("strategy must not be empty".into()));
        }
        if self.objective.trim().is_empty() {
            return Err(ConfigError::Invalid("objective must not be empty".into()));
        }
        if self.start_date > self.end_date {
            return Err(ConfigError::Invalid(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if self.calendar.instrument.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "calendar.instrument must not be empty".into(),
            ));
        }
        if self.calendar.start > self.calendar.end {
            return Err(ConfigError::Invalid(format!(
                "calendar.start {} is after calendar.end {}",
                self.calendar.start, self.calendar.end
            )));
        }
        self.windows.validate()?;
        self.parameters.validate()?;
        Ok(())
    }

    /// Deterministic hash of this configuration.
    ///
    /// Two runs with identical configs share a RunId, which tags logs and
    /// artifact directories.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).expect("WalkForwardConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

/// Reference instrument whose daily bars define the trading calendar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarConfig {
    pub instrument: String,
    pub exchange: Exchange,
    /// Range of the one-time daily bar query.
    #[serde(default = "default_calendar_start")]
    pub start: NaiveDate,
    #[serde(default = "default_calendar_end")]
    pub end: NaiveDate,
    #[serde(default = "default_night_open")]
    pub night_open: NaiveTime,
    #[serde(default = "default_day_close")]
    pub day_close: NaiveTime,
}

fn default_calendar_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default()
}

fn default_calendar_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2100, 12, 31).unwrap_or_default()
}

fn default_night_open() -> NaiveTime {
    SessionHours::default().night_open
}

fn default_day_close() -> NaiveTime {
    SessionHours::default().day_close
}

impl CalendarConfig {
    pub fn hours(&self) -> SessionHours {
        SessionHours {
            night_open: self.night_open,
            day_close: self.day_close,
        }
    }
}

impl Default for CalendarConfig {
    /// Rebar continuous index on SHFE, the usual market-wide reference.
    fn default() -> Self {
        Self {
            instrument: "RBL9".to_string(),
            exchange: Exchange::Shfe,
            start: default_calendar_start(),
            end: default_calendar_end(),
            night_open: default_night_open(),
            day_close: default_day_close(),
        }
    }
}

/// Where each train window starts relative to the preceding test window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    /// The next train window ends right before the next test window, so it
    /// reaches back `train_sessions` sessions into already-tested data.
    #[default]
    Rolling,
    /// The next train window starts right after the previous test window.
    Adjacent,
}

/// Window lengths in trading sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowConfig {
    pub train_sessions: usize,
    pub test_sessions: usize,
    #[serde(default)]
    pub mode: WindowMode,
}

impl WindowConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.train_sessions == 0 {
            return Err(ConfigError::Invalid("windows.train_sessions must be > 0".into()));
        }
        if self.test_sessions == 0 {
            return Err(ConfigError::Invalid("windows.test_sessions must be > 0".into()));
        }
        Ok(())
    }
}

/// Market settings passed through unmodified to the collaborators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MarketConfig {
    pub commission_rate: f64,
    pub slippage: f64,
    pub contract_size: f64,
    pub price_tick: f64,
    pub capital: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            commission_rate: 0.0002,
            slippage: 1.0,
            contract_size: 10.0,
            price_tick: 1.0,
            capital: 15_000.0,
        }
    }
}

/// One optimizer parameter swept from `start` to `end` by `step`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterRange {
    pub name: String,
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl ParameterRange {
    /// Number of grid points in this range, or `None` if it does not fit in
    /// a `usize`.
    pub fn point_count(&self) -> Option<usize> {
        let steps = ((self.end - self.start) / self.step + 1e-9).floor();
        if !steps.is_finite() || steps < 0.0 || steps >= usize::MAX as f64 {
            return None;
        }
        (steps as usize).checked_add(1)
    }
}

/// Search space handed to the optimizer. Its meaning belongs to the optimizer;
/// here it is only checked for well-formed ranges.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ParameterSpace(pub Vec<ParameterRange>);

impl ParameterSpace {
    pub fn ranges(&self) -> &[ParameterRange] {
        &self.0
    }

    /// Number of parameter combinations in the full grid, or `None` when the
    /// count overflows.
    pub fn grid_size(&self) -> Option<usize> {
        self.0
            .iter()
            .try_fold(1usize, |acc, range| acc.checked_mul(range.point_count()?))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for range in &self.0 {
            if range.name.trim().is_empty() {
                return Err(ConfigError::Invalid("parameter name must not be empty".into()));
            }
            if !seen.insert(range.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "parameter '{}' is defined twice",
                    range.name
                )));
            }
            if !(range.start.is_finite() && range.end.is_finite() && range.step.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "parameter '{}' has a non-finite bound",
                    range.name
                )));
            }
            if range.step <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "parameter '{}' step must be > 0",
                    range.name
                )));
            }
            if range.end < range.start {
                return Err(ConfigError::Invalid(format!(
                    "parameter '{}' end {} is below start {}",
                    range.name, range.end, range.start
                )));
            }
        }
        Ok(())
    }
}
