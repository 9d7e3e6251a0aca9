//! Geometry sweep: grid search per setup family.
//!
//! For every requested family with enough admitted setups, each candidate in
//! the family's grid is applied to every setup, the setups are classified
//! against their session bars, and the outcomes are aggregated into
//! `FamilyMetrics`. Candidates are ranked by the conservative score; the
//! winner is compared against the baseline candidate.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use setuplab_core::{
    apply_geometry, evaluate_setup, round_dp, EvaluatedOutcome, EvaluationOptions, SetupCandidate,
    TradeManagement,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tracing::{debug, info};

use crate::bar_store::{load_sessions, BarSource, ResolutionUsed, SessionBars};
use crate::config::RunnerConfig;
use crate::grid::{candidate_grid, CandidateConfig, SetupFamily};
use crate::intake::IntakeReport;
use crate::metrics::FamilyMetrics;

/// Ranked candidates kept per family in the report.
pub const TOP_CANDIDATES: usize = 10;

/// One grid candidate and the metrics it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedCandidate {
    pub config: CandidateConfig,
    pub metrics: FamilyMetrics,
}

/// Best minus baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepDelta {
    pub objective_conservative: f64,
    pub expectancy_r: f64,
    pub t1_win_rate_pct: f64,
    pub t2_win_rate_pct: f64,
    pub failure_rate_pct: f64,
}

impl SweepDelta {
    pub fn between(best: &FamilyMetrics, baseline: &FamilyMetrics) -> Self {
        Self {
            objective_conservative: round_dp(
                best.objective_conservative - baseline.objective_conservative,
                2,
            ),
            expectancy_r: round_dp(best.expectancy_r - baseline.expectancy_r, 4),
            t1_win_rate_pct: round_dp(best.t1_win_rate_pct - baseline.t1_win_rate_pct, 2),
            t2_win_rate_pct: round_dp(best.t2_win_rate_pct - baseline.t2_win_rate_pct, 2),
            failure_rate_pct: round_dp(best.failure_rate_pct - baseline.failure_rate_pct, 2),
        }
    }
}

/// Sweep outcome for one family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySweepResult {
    pub family: SetupFamily,
    pub setup_count: usize,
    pub candidates_evaluated: usize,
    pub best: EvaluatedCandidate,
    pub baseline: EvaluatedCandidate,
    /// Best strictly beats the baseline on the conservative score.
    pub improved: bool,
    pub delta: SweepDelta,
    pub top_candidates: Vec<EvaluatedCandidate>,
}

impl FamilySweepResult {
    /// Build from candidates already in rank order. `None` when empty.
    pub fn from_ranked(
        family: SetupFamily,
        setup_count: usize,
        ranked: Vec<EvaluatedCandidate>,
    ) -> Option<Self> {
        let best = ranked.first()?.clone();
        let baseline = ranked
            .iter()
            .find(|c| c.config.is_baseline())
            .unwrap_or(&best)
            .clone();
        let improved = best.metrics.objective_conservative > baseline.metrics.objective_conservative;
        let delta = SweepDelta::between(&best.metrics, &baseline.metrics);
        let candidates_evaluated = ranked.len();
        let mut top_candidates = ranked;
        top_candidates.truncate(TOP_CANDIDATES);
        Some(Self {
            family,
            setup_count,
            candidates_evaluated,
            best,
            baseline,
            improved,
            delta,
            top_candidates,
        })
    }
}

/// Complete sweep output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub config_hash: String,
    pub dataset_hash: String,
    pub setup_count: usize,
    pub skipped_setup_count: usize,
    pub missing_bar_sessions: Vec<NaiveDate>,
    pub resolution_used: ResolutionUsed,
    /// Every family appears; `None` when not requested or skipped.
    pub families: BTreeMap<SetupFamily, Option<FamilySweepResult>>,
    pub cancelled: bool,
    pub notes: Vec<String>,
}

impl SweepReport {
    pub fn improved_families(&self) -> impl Iterator<Item = &FamilySweepResult> {
        self.families
            .values()
            .flatten()
            .filter(|result| result.improved)
    }
}

// ─── Candidate evaluation ───────────────────────────────────────────

/// A setup as it would trade under `candidate`: rescaled geometry and the
/// candidate's trade management.
pub fn to_candidate_setup(setup: &SetupCandidate, candidate: &CandidateConfig) -> SetupCandidate {
    let mut adjusted = apply_geometry(setup, candidate.geometry);
    adjusted.trade_management = Some(TradeManagement::new(
        candidate.partial_at_t1_pct,
        candidate.move_stop_to_breakeven,
    ));
    adjusted
}

/// Metrics for one candidate over a family's setups.
pub fn evaluate_candidate(
    candidate: &CandidateConfig,
    setups: &[&SetupCandidate],
    bars: &SessionBars,
    config: &RunnerConfig,
) -> FamilyMetrics {
    let outcomes: Vec<EvaluatedOutcome> = setups
        .iter()
        .map(|setup| {
            let adjusted = to_candidate_setup(setup, candidate);
            evaluate_setup(
                &adjusted,
                bars.session(setup.session_date),
                &config.execution,
                EvaluationOptions::default(),
            )
            .outcome
        })
        .collect();
    FamilyMetrics::compute(&outcomes, &config.objective_weights)
}

/// Conservative score desc, expectancy lower bound desc, triggered desc,
/// then label asc so equal candidates always come out in the same order.
pub fn rank_candidates(candidates: &mut [EvaluatedCandidate]) {
    candidates.sort_by(|a, b| {
        let (ma, mb) = (&a.metrics, &b.metrics);
        mb.objective_conservative
            .total_cmp(&ma.objective_conservative)
            .then_with(|| mb.expectancy_lower_bound_r.total_cmp(&ma.expectancy_lower_bound_r))
            .then_with(|| mb.triggered.cmp(&ma.triggered))
            .then_with(|| a.config.label.cmp(&b.config.label))
    });
}

fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(AtomicOrdering::Relaxed))
}

struct Cancelled;

fn sweep_family(
    family: SetupFamily,
    setups: &[&SetupCandidate],
    bars: &SessionBars,
    config: &RunnerConfig,
    cancel: Option<&AtomicBool>,
) -> Result<Option<FamilySweepResult>, Cancelled> {
    let grid = candidate_grid(family, config.baseline_partial(), config.sweep.fast_mode);
    info!(
        family = %family,
        setups = setups.len(),
        candidates = grid.len(),
        parallel = config.sweep.parallel,
        "sweeping family"
    );

    let evaluate = |candidate: &CandidateConfig| -> Option<EvaluatedCandidate> {
        if is_cancelled(cancel) {
            return None;
        }
        let metrics = evaluate_candidate(candidate, setups, bars, config);
        debug!(
            family = %family,
            label = %candidate.label,
            conservative = metrics.objective_conservative,
            triggered = metrics.triggered,
            "candidate evaluated"
        );
        Some(EvaluatedCandidate {
            config: candidate.clone(),
            metrics,
        })
    };

    let evaluated: Option<Vec<EvaluatedCandidate>> = if config.sweep.parallel {
        grid.par_iter().map(evaluate).collect()
    } else {
        grid.iter().map(evaluate).collect()
    };
    let mut evaluated = evaluated.ok_or(Cancelled)?;
    rank_candidates(&mut evaluated);

    let result = FamilySweepResult::from_ranked(family, setups.len(), evaluated);
    if let Some(r) = &result {
        info!(
            family = %family,
            best = %r.best.config.label,
            improved = r.improved,
            delta = r.delta.objective_conservative,
            "family swept"
        );
    }
    Ok(result)
}

// ─── Entry points ───────────────────────────────────────────────────

/// Sweep every requested family over pre-loaded bars. No I/O.
///
/// Setups on sessions without bars are skipped and counted. The cancel flag
/// is checked before each family and before each candidate; a cancelled
/// sweep returns what it finished with `cancelled` set.
pub fn sweep_families(
    setups: &[SetupCandidate],
    bars: &SessionBars,
    config: &RunnerConfig,
    cancel: Option<&AtomicBool>,
) -> SweepReport {
    let mut report = SweepReport {
        config_hash: config.config_hash(),
        dataset_hash: bars.fingerprint_with(setups),
        setup_count: setups.len(),
        missing_bar_sessions: bars.missing_sessions.clone(),
        resolution_used: bars.resolution_used,
        families: SetupFamily::ALL.iter().map(|&f| (f, None)).collect(),
        ..Default::default()
    };

    for family in SetupFamily::ALL {
        if !config.sweep.families.contains(&family) {
            continue;
        }
        if is_cancelled(cancel) {
            report.cancelled = true;
            break;
        }

        let family_setups: Vec<&SetupCandidate> = setups
            .iter()
            .filter(|s| s.setup_type == family.as_str())
            .collect();
        let min = config.sweep.min_family_samples;
        if family_setups.len() < min {
            info!(family = %family, setups = family_setups.len(), min, "family below sample minimum");
            report.notes.push(format!(
                "Skipped {family}: {} setups, need at least {min}.",
                family_setups.len()
            ));
            continue;
        }

        let (with_bars, without_bars): (Vec<&SetupCandidate>, Vec<&SetupCandidate>) = family_setups
            .into_iter()
            .partition(|s| bars.has_session(s.session_date));
        report.skipped_setup_count += without_bars.len();
        if with_bars.is_empty() {
            report
                .notes
                .push(format!("Skipped {family}: no bars for any of its sessions."));
            continue;
        }

        match sweep_family(family, &with_bars, bars, config, cancel) {
            Ok(result) => {
                report.families.insert(family, result);
            }
            Err(Cancelled) => {
                report.cancelled = true;
                break;
            }
        }
    }

    if report.skipped_setup_count > 0 {
        report.notes.push(format!(
            "Skipped {} setups on sessions without bars.",
            report.skipped_setup_count
        ));
    }
    if report.cancelled {
        report.notes.push("Sweep cancelled before all families finished.".into());
    }
    report
}

/// Load bars for the admitted setups and sweep them.
pub fn run_sweep(
    intake: &IntakeReport,
    source: &dyn BarSource,
    config: &RunnerConfig,
    cancel: Option<&AtomicBool>,
) -> SweepReport {
    let bars = load_sessions(
        source,
        intake.setups.iter().map(|s| s.session_date),
        config.backtest.resolution,
        config.backtest.max_concurrent_fetches,
    );
    let mut report = sweep_families(&intake.setups, &bars, config, cancel);

    let mut notes = intake.notes.clone();
    if !bars.missing_sessions.is_empty() {
        notes.push(format!(
            "No historical bars were returned for {} session dates.",
            bars.missing_sessions.len()
        ));
    }
    if !bars.fallback_sessions.is_empty() {
        notes.push(format!(
            "Second bars unavailable for {} sessions; used minute bars fallback.",
            bars.fallback_sessions.len()
        ));
    }
    notes.append(&mut report.notes);
    report.notes = notes;
    report
}
