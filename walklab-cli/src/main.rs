//! WalkLab CLI — trading calendar, walk-forward planning and vendor import.
//!
//! Commands:
//! - `calendar` — build the trading calendar from a daily bar CSV and summarize it
//! - `plan` — print the train/test schedule a walk-forward config would run
//! - `import` — normalize a directory of vendor text exports into bar CSVs

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use walklab_core::data::write_bars_csv;
use walklab_core::{
    CsvDailyBarSource, Exchange, Interval, SessionHours, TradingCalendar, VendorImportOptions,
    VendorImporter,
};
use walklab_runner::{export_schedule_csv, WalkForwardConfig, Window, WindowSchedule};

#[derive(Parser)]
#[command(
    name = "walklab",
    about = "WalkLab CLI — trading-calendar-aware walk-forward tooling"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the trading calendar from a daily bar CSV and print a summary.
    Calendar {
        /// Canonical bar CSV holding the reference instrument's daily bars.
        #[arg(long)]
        bars: PathBuf,

        /// Reference instrument symbol.
        #[arg(long, default_value = "RBL9")]
        instrument: String,

        /// Reference instrument exchange.
        #[arg(long, default_value = "SHFE")]
        exchange: Exchange,

        /// First date to include (YYYY-MM-DD).
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last date to include (YYYY-MM-DD).
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Print the train/test schedule of a walk-forward config.
    Plan {
        /// Path to a walk-forward TOML config.
        #[arg(long)]
        config: PathBuf,

        /// Canonical bar CSV holding the calendar instrument's daily bars.
        #[arg(long)]
        bars: PathBuf,

        /// Also write the schedule as CSV.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Normalize vendor text exports (`<market code>#<symbol>.txt`) into bar CSVs.
    Import {
        /// Directory of vendor files.
        #[arg(long)]
        dir: PathBuf,

        /// Bar interval of the files: 1m, 5m, 15m, 30m, 1h or d.
        #[arg(long, default_value = "5m")]
        interval: Interval,

        /// Text encoding of the files.
        #[arg(long, default_value = "gb2312")]
        encoding: String,

        /// Daily bar CSV used to build the calendar (required below daily).
        #[arg(long)]
        calendar_bars: Option<PathBuf>,

        /// Calendar reference instrument.
        #[arg(long, default_value = "RBL9")]
        instrument: String,

        /// Calendar reference exchange.
        #[arg(long, default_value = "SHFE")]
        exchange: Exchange,

        /// Output directory for bar CSVs.
        #[arg(long)]
        out: PathBuf,

        /// Import files one at a time instead of in parallel.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Calendar {
            bars,
            instrument,
            exchange,
            start,
            end,
        } => run_calendar(&bars, &instrument, exchange, start, end),
        Commands::Plan { config, bars, out } => run_plan(&config, &bars, out.as_deref()),
        Commands::Import {
            dir,
            interval,
            encoding,
            calendar_bars,
            instrument,
            exchange,
            out,
            sequential,
        } => {
            let options = VendorImportOptions {
                interval,
                encoding,
                parallel: !sequential,
            };
            let calendar_source = calendar_bars.map(|path| (path, instrument, exchange));
            run_import(&dir, options, calendar_source, &out)
        }
    }
}

/// Logs go to stderr so command output can be piped. `RUST_LOG` overrides the
/// default `info` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_calendar(
    bars: &Path,
    instrument: &str,
    exchange: Exchange,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    hours: SessionHours,
) -> Result<TradingCalendar> {
    let source = CsvDailyBarSource::new(bars);
    let start = start.unwrap_or(NaiveDate::MIN);
    let end = end.unwrap_or(NaiveDate::MAX);
    TradingCalendar::load(&source, instrument, exchange, start, end, hours)
        .with_context(|| format!("failed to build calendar from {}", bars.display()))
}

fn run_calendar(
    bars: &Path,
    instrument: &str,
    exchange: Exchange,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<()> {
    let calendar = load_calendar(bars, instrument, exchange, start, end, SessionHours::default())?;

    println!(
        "{}.{}: {} sessions, {} to {}",
        calendar.instrument(),
        calendar.exchange(),
        calendar.len(),
        calendar.first_date(),
        calendar.last_date()
    );
    for index in [0, calendar.last_index()] {
        println!(
            "  session {:>5}  {}  open {}  close {}",
            index,
            calendar.dates()[index],
            calendar.session_open(index)?.to_rfc3339(),
            calendar.session_close(index)?.to_rfc3339()
        );
    }
    Ok(())
}

fn run_plan(config_path: &Path, bars: &Path, out: Option<&Path>) -> Result<()> {
    let config = WalkForwardConfig::from_file(config_path)?;
    let cal = &config.calendar;
    let calendar = load_calendar(
        bars,
        &cal.instrument,
        cal.exchange,
        Some(cal.start),
        Some(cal.end),
        cal.hours(),
    )?;

    let windows: Vec<Window> =
        WindowSchedule::new(&calendar, &config.windows, config.start_date, config.end_date)?
            .collect();

    println!(
        "{} [{}] {} to {}: {} windows (train {} / test {} sessions, {:?})",
        config.strategy,
        &config.run_id()[..12],
        config.start_date,
        config.end_date,
        windows.len(),
        config.windows.train_sessions,
        config.windows.test_sessions,
        config.windows.mode
    );
    for w in &windows {
        println!(
            "  {:<5} [{:>5}, {:>5}]  {}  {}{}",
            w.phase,
            w.start_index,
            w.end_index,
            w.open.to_rfc3339(),
            w.close.to_rfc3339(),
            if w.truncated { "  (truncated)" } else { "" }
        );
    }

    if let Some(out) = out {
        let csv = export_schedule_csv(&windows)?;
        std::fs::write(out, csv).with_context(|| format!("failed to write {}", out.display()))?;
        println!("Schedule written to: {}", out.display());
    }
    Ok(())
}

fn run_import(
    dir: &Path,
    options: VendorImportOptions,
    calendar_source: Option<(PathBuf, String, Exchange)>,
    out: &Path,
) -> Result<()> {
    let calendar = calendar_source
        .map(|(bars, instrument, exchange)| {
            load_calendar(&bars, &instrument, exchange, None, None, SessionHours::default())
        })
        .transpose()?;
    if calendar.is_none() && !options.interval.is_daily() {
        bail!(
            "--calendar-bars is required to import {} bars",
            options.interval
        );
    }

    let importer = VendorImporter::new(options, calendar.as_ref())?;
    let results = importer.import_dir(dir)?;
    let total = results.len();
    let mut failed = 0;

    for (path, result) in results {
        match result {
            Ok(file) => {
                let target = out.join(file.output_file_name());
                write_bars_csv(&target, &file.bars)?;
                println!(
                    "{} -> {} ({} bars, {} skipped)",
                    path.display(),
                    target.display(),
                    file.bars.len(),
                    file.skipped_rows
                );
            }
            Err(e) => {
                failed += 1;
                eprintln!("Error for {}: {e}", path.display());
            }
        }
    }

    info!(files = total, failed, "import finished");
    if failed > 0 {
        bail!("{failed} of {total} files failed to import");
    }
    Ok(())
}
