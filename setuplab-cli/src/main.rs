//! SetupLab CLI: backtest and geometry-sweep commands.
//!
//! Commands:
//! - `backtest`: evaluate setups once against their session bars
//! - `sweep`: grid-search geometry and trade management per setup family
//!
//! Setups are read from a JSON array of rows, bars from a CSV directory laid
//! out as `<bars>/<second|minute>/<YYYY-MM-DD>.csv`. Reports are written as
//! pretty JSON to `--output` or stdout.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use setuplab_runner::{
    intake_rows, run_backtest, run_sweep, BacktestSummary, CsvBarSource, IntakeReport,
    OptimizerProfile, Resolution, RunnerConfig, SetupFamily, SetupRow, SweepReport,
};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "setuplab",
    about = "SetupLab CLI: setup outcome backtests and geometry sweeps"
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// JSON file holding an array of setup rows.
    #[arg(long)]
    setups: PathBuf,

    /// Bar directory with `second/` and `minute/` CSV sessions.
    #[arg(long)]
    bars: PathBuf,

    /// TOML run config. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Optimizer profile JSON (geometry, trade management, pauses).
    #[arg(long)]
    profile: Option<PathBuf>,

    /// First session date to include (YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last session date to include (YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Bar resolution: auto, second, or minute.
    #[arg(long, value_parser = parse_resolution)]
    resolution: Option<Resolution>,

    /// Where to write the JSON report. Stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every admitted setup once and summarize the results.
    Backtest {
        #[command(flatten)]
        input: InputArgs,

        /// Include one row per evaluated setup in the report.
        #[arg(long, default_value_t = false)]
        include_rows: bool,
    },
    /// Search geometry and trade management for each setup family.
    Sweep {
        #[command(flatten)]
        input: InputArgs,

        /// Three values per geometry axis and breakeven always on.
        #[arg(long, default_value_t = false)]
        fast: bool,

        /// Families to sweep, comma separated. All when omitted.
        #[arg(long, value_delimiter = ',')]
        families: Vec<SetupFamily>,

        /// Evaluate candidates on one thread.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Write the profile with improved families applied to this path.
        #[arg(long)]
        write_profile: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Backtest {
            input,
            include_rows,
        } => run_backtest_cmd(&input, include_rows),
        Commands::Sweep {
            input,
            fast,
            families,
            sequential,
            write_profile,
        } => run_sweep_cmd(&input, fast, families, sequential, write_profile.as_deref()),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Logs go to stderr so a JSON report on stdout stays clean.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .init();
}

fn parse_resolution(s: &str) -> Result<Resolution, String> {
    match s {
        "auto" => Ok(Resolution::Auto),
        "second" => Ok(Resolution::Second),
        "minute" => Ok(Resolution::Minute),
        other => Err(format!("invalid resolution '{other}'. Valid: auto, second, minute")),
    }
}

/// Config, profile, and admitted setups for one invocation.
struct Prepared {
    config: RunnerConfig,
    profile: Option<OptimizerProfile>,
    intake: IntakeReport,
}

fn prepare(input: &InputArgs) -> Result<Prepared> {
    let mut config = match &input.config {
        Some(path) => RunnerConfig::from_file(path)?,
        None => RunnerConfig::default(),
    };
    if input.from.is_some() {
        config.filter.from = input.from;
    }
    if input.to.is_some() {
        config.filter.to = input.to;
    }
    if let Some(resolution) = input.resolution {
        config.backtest.resolution = resolution;
    }

    let profile = input
        .profile
        .as_deref()
        .map(OptimizerProfile::from_file)
        .transpose()?;
    if let Some(profile) = &profile {
        profile.configure(&mut config);
    }
    config.validate()?;

    let rows = read_rows(&input.setups)?;
    let intake = intake_rows(&rows, &config.filter);
    info!(
        rows = rows.len(),
        admitted = intake.setups.len(),
        malformed = intake.malformed,
        "setups loaded"
    );
    Ok(Prepared {
        config,
        profile,
        intake,
    })
}

fn read_rows(path: &Path) -> Result<Vec<SetupRow>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading setups from {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing setups in {}", path.display()))
}

fn run_backtest_cmd(input: &InputArgs, include_rows: bool) -> Result<()> {
    let Prepared {
        mut config,
        profile,
        intake,
    } = prepare(input)?;
    config.backtest.include_rows = include_rows;

    let source = CsvBarSource::new(&input.bars);
    let summary = run_backtest(&intake, &source, &config, profile.as_ref());

    write_report(&summary, input.output.as_deref())?;
    if input.output.is_some() {
        print_backtest_summary(&summary);
    }
    Ok(())
}

fn run_sweep_cmd(
    input: &InputArgs,
    fast: bool,
    families: Vec<SetupFamily>,
    sequential: bool,
    write_profile: Option<&Path>,
) -> Result<()> {
    let Prepared {
        mut config,
        profile,
        intake,
    } = prepare(input)?;
    config.sweep.fast_mode |= fast;
    config.sweep.parallel &= !sequential;
    if !families.is_empty() {
        config.sweep.families = families;
    }

    let source = CsvBarSource::new(&input.bars);
    let report = run_sweep(&intake, &source, &config, None);

    write_report(&report, input.output.as_deref())?;
    if input.output.is_some() {
        print_sweep_summary(&report);
    }

    if let Some(path) = write_profile {
        let mut profile = profile.unwrap_or_default();
        for note in profile.apply_sweep(&report, Utc::now()) {
            info!("{note}");
        }
        let json = serde_json::to_string_pretty(&profile)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing profile to {}", path.display()))?;
        info!(path = %path.display(), "profile written");
    }
    Ok(())
}

fn write_report<T: Serialize>(report: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json)
                .with_context(|| format!("writing report to {}", path.display()))?;
            println!("Report saved to: {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn print_backtest_summary(summary: &BacktestSummary) {
    let p = &summary.profitability;
    println!();
    println!("=== Backtest Summary ===");
    println!(
        "Setups:         {} ({} evaluated, {} skipped)",
        summary.setup_count, summary.evaluated_setup_count, summary.skipped_setup_count
    );
    println!("Triggered:      {}", p.triggered_count);
    println!("Resolved:       {}", p.resolved_count);
    println!("T1 Win Rate:    {:.2}%", summary.metrics.t1_win_rate_pct);
    println!("T2 Win Rate:    {:.2}%", summary.metrics.t2_win_rate_pct);
    println!("Expectancy:     {:.4}R", p.expectancy_r);
    println!("Cumulative:     {:.4}R", p.cumulative_realized_r);
    println!("Ambiguous Bars: {}", summary.ambiguous_bar_count);
    for note in &summary.notes {
        println!("NOTE: {note}");
    }
    println!();
}

fn print_sweep_summary(report: &SweepReport) {
    println!();
    println!("=== Sweep Summary ===");
    println!("{:<16} {:>8} {:>10} {:>10} {:>9}", "Family", "Setups", "Best", "Baseline", "Delta");
    println!("{}", "-".repeat(57));
    for (family, result) in &report.families {
        match result {
            Some(r) => println!(
                "{:<16} {:>8} {:>10.2} {:>10.2} {:>+9.2}",
                family.as_str(),
                r.setup_count,
                r.best.metrics.objective_conservative,
                r.baseline.metrics.objective_conservative,
                r.delta.objective_conservative
            ),
            None => println!("{:<16} {:>8}", family.as_str(), "-"),
        }
    }
    for note in &report.notes {
        println!("NOTE: {note}");
    }
    println!();
}
