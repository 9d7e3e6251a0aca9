//! SetupLab Runner: intake, bar loading, metrics, geometry sweep, backtests.
//!
//! This crate builds on `setuplab-core` to provide:
//! - Setup intake from loosely typed rows with skip accounting
//! - Session bar loading with second-to-minute fallback
//! - Win rates, Wilson bounds, and naive/conservative objective scores
//! - Candidate grids per setup family and the ranked geometry sweep
//! - Backtest summaries and the optimizer profile a sweep writes back to

pub mod backtest;
pub mod bar_store;
pub mod config;
pub mod grid;
pub mod intake;
pub mod metrics;
pub mod profile;
pub mod stats;
pub mod sweep;

#[cfg(test)]
mod test_support;

pub use backtest::{
    run_backtest, summarize_backtest, BacktestSummary, DateRange, Profitability,
    SetupTypeProfitability,
};
pub use bar_store::{
    load_sessions, BarResolution, BarSource, BarSourceError, CsvBarSource, InMemoryBarSource,
    Resolution, ResolutionUsed, SessionBars,
};
pub use config::{BacktestSettings, ConfigError, RunnerConfig, SweepSettings};
pub use grid::{candidate_grid, CandidateConfig, SetupFamily};
pub use intake::{filter_setups, intake_rows, IntakeReport, SetupFilter, SetupRow, SkipReason};
pub use metrics::{FamilyMetrics, ObjectiveWeights};
pub use profile::{OptimizerProfile, ProfileError, TimeBucket};
pub use stats::WilsonInterval;
pub use sweep::{
    run_sweep, sweep_families, EvaluatedCandidate, FamilySweepResult, SweepDelta, SweepReport,
};
