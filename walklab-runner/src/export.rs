//! Artifact export: JSON report, daily PnL CSV and window schedule CSV.
//!
//! The JSON report carries a `schema_version`. Unknown versions are rejected on
//! load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::collaborator::DailyPnl;
use crate::walk_forward::{WalkForwardResult, SCHEMA_VERSION};
use crate::window::Window;

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `WalkForwardResult` to pretty JSON.
pub fn export_report_json<S: Serialize>(result: &WalkForwardResult<S>) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize WalkForwardResult to JSON")
}

/// Deserialize a `WalkForwardResult` from JSON, rejecting unknown schema versions.
pub fn import_report_json<S: DeserializeOwned>(json: &str) -> Result<WalkForwardResult<S>> {
    let result: WalkForwardResult<S> =
        serde_json::from_str(json).context("failed to deserialize WalkForwardResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export stitched out-of-sample PnL, one row per day.
///
/// Columns: date, trade_count, turnover, commission, slippage, total_pnl,
/// net_pnl, cumulative_pnl
pub fn export_daily_pnl_csv(daily_pnl: &[DailyPnl]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "trade_count",
        "turnover",
        "commission",
        "slippage",
        "total_pnl",
        "net_pnl",
        "cumulative_pnl",
    ])?;

    let mut cumulative = 0.0;
    for p in daily_pnl {
        cumulative += p.net_pnl;
        wtr.write_record([
            &p.date.to_string(),
            &p.trade_count.to_string(),
            &format!("{:.2}", p.turnover),
            &format!("{:.2}", p.commission),
            &format!("{:.2}", p.slippage),
            &format!("{:.2}", p.total_pnl),
            &format!("{:.2}", p.net_pnl),
            &format!("{:.2}", cumulative),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export a window schedule.
///
/// Columns: phase, start_index, end_index, start_date, end_date, open, close,
/// sessions, truncated
pub fn export_schedule_csv<'w>(windows: impl IntoIterator<Item = &'w Window>) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "phase",
        "start_index",
        "end_index",
        "start_date",
        "end_date",
        "open",
        "close",
        "sessions",
        "truncated",
    ])?;

    for w in windows {
        wtr.write_record([
            &w.phase.to_string(),
            &w.start_index.to_string(),
            &w.end_index.to_string(),
            &w.start_date.to_string(),
            &w.end_date.to_string(),
            &w.open.to_rfc3339(),
            &w.close.to_rfc3339(),
            &w.session_count().to_string(),
            &w.truncated.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a walk-forward run.
///
/// Creates `{strategy}_{run id prefix}/` under `output_dir` containing
/// `report.json`, `daily_pnl.csv` and `windows.csv`. Returns the created
/// directory.
pub fn save_artifacts<S: Serialize>(
    result: &WalkForwardResult<S>,
    output_dir: &Path,
) -> Result<PathBuf> {
    let prefix = result.run_id.get(..12).unwrap_or(&result.run_id);
    let run_dir = output_dir.join(format!("{}_{}", result.strategy, prefix));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("report.json"), export_report_json(result)?)?;
    std::fs::write(
        run_dir.join("daily_pnl.csv"),
        export_daily_pnl_csv(&result.daily_pnl)?,
    )?;
    std::fs::write(
        run_dir.join("windows.csv"),
        export_schedule_csv(result.windows.iter().map(|r| &r.window))?,
    )?;

    Ok(run_dir)
}

/// Load a `WalkForwardResult` from an artifact directory's report.json.
pub fn load_artifacts<S: DeserializeOwned>(dir: &Path) -> Result<WalkForwardResult<S>> {
    let report_path = dir.join("report.json");
    let json = std::fs::read_to_string(&report_path)
        .with_context(|| format!("failed to read {}", report_path.display()))?;
    import_report_json(&json)
}
