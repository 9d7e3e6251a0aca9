//! Backtest summary: every admitted setup evaluated once against its session.
//!
//! An optional [`OptimizerProfile`] supplies per-setup geometry and the trade
//! management used by setups that carry none of their own. Setups on sessions
//! without bars are skipped and counted, never fatal.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use setuplab_core::{
    apply_geometry, evaluate_setup, round_dp, EvaluationOptions, ExecutionModel, SetupCandidate,
    SetupEvaluation,
};
use std::collections::BTreeMap;
use tracing::info;

use crate::bar_store::{load_sessions, BarSource, Resolution, ResolutionUsed, SessionBars};
use crate::config::RunnerConfig;
use crate::intake::IntakeReport;
use crate::metrics::FamilyMetrics;
use crate::profile::OptimizerProfile;
use crate::stats::{mean, median, pct};

/// Requested window, or the span of the admitted setups when unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupTypeProfitability {
    pub key: String,
    pub trade_count: usize,
    pub average_realized_r: f64,
    pub cumulative_realized_r: f64,
}

/// Realized-R statistics over triggered setups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profitability {
    pub triggered_count: usize,
    pub resolved_count: usize,
    pub with_realized_r_count: usize,
    pub average_realized_r: f64,
    pub median_realized_r: f64,
    pub cumulative_realized_r: f64,
    pub expectancy_r: f64,
    pub positive_realized_rate_pct: f64,
    /// Trade count desc, then key asc.
    pub by_setup_type: Vec<SetupTypeProfitability>,
}

impl Profitability {
    pub fn from_evaluations(evaluations: &[SetupEvaluation]) -> Self {
        let triggered: Vec<&SetupEvaluation> = evaluations
            .iter()
            .filter(|e| e.outcome.is_triggered())
            .collect();
        if triggered.is_empty() {
            return Self::default();
        }

        let resolved_count = triggered.iter().filter(|e| e.outcome.is_resolved()).count();
        let realized: Vec<(&str, f64)> = triggered
            .iter()
            .filter_map(|e| {
                e.outcome
                    .realized_r
                    .filter(|r| r.is_finite())
                    .map(|r| (e.setup_type.as_str(), r))
            })
            .collect();
        let values: Vec<f64> = realized.iter().map(|(_, r)| *r).collect();
        let cumulative: f64 = values.iter().sum();
        let average = mean(&values);
        let positive = values.iter().filter(|r| **r > 0.0).count();

        let mut per_type: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
        for (setup_type, r) in &realized {
            let key = if setup_type.is_empty() { "unknown" } else { setup_type };
            let entry = per_type.entry(key).or_default();
            entry.0 += 1;
            entry.1 += r;
        }
        let mut by_setup_type: Vec<SetupTypeProfitability> = per_type
            .into_iter()
            .map(|(key, (count, sum))| SetupTypeProfitability {
                key: key.to_string(),
                trade_count: count,
                average_realized_r: round_dp(sum / count as f64, 4),
                cumulative_realized_r: round_dp(sum, 4),
            })
            .collect();
        // BTreeMap order already gives key asc within equal counts.
        by_setup_type.sort_by(|a, b| b.trade_count.cmp(&a.trade_count));

        Self {
            triggered_count: triggered.len(),
            resolved_count,
            with_realized_r_count: values.len(),
            average_realized_r: round_dp(average, 4),
            median_realized_r: round_dp(median(&values), 4),
            cumulative_realized_r: round_dp(cumulative, 4),
            expectancy_r: round_dp(average, 4),
            positive_realized_rate_pct: pct(positive, values.len()),
            by_setup_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub config_hash: String,
    pub dataset_hash: String,
    pub date_range: DateRange,
    pub setup_count: usize,
    pub evaluated_setup_count: usize,
    pub skipped_setup_count: usize,
    pub geometry_adjusted_count: usize,
    pub ambiguous_bar_count: u64,
    pub missing_target2_count: usize,
    pub missing_bar_sessions: Vec<NaiveDate>,
    pub requested_resolution: Resolution,
    pub resolution_used: ResolutionUsed,
    pub resolution_fallback_sessions: Vec<NaiveDate>,
    pub execution_model: ExecutionModel,
    pub profitability: Profitability,
    /// Win rates and scores over every evaluated setup.
    pub metrics: FamilyMetrics,
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<SetupEvaluation>>,
}

/// Setups as they trade under `profile`, and how many had their geometry
/// changed.
pub fn apply_profile(
    setups: &[SetupCandidate],
    profile: &OptimizerProfile,
) -> (Vec<SetupCandidate>, usize) {
    let mut adjusted_count = 0;
    let adjusted = setups
        .iter()
        .map(|setup| {
            let mut adjusted = match profile.geometry_for(setup) {
                Some((_, adjustment)) => apply_geometry(setup, adjustment),
                None => setup.clone(),
            };
            if adjusted.stop_price != setup.stop_price
                || adjusted.target1_price != setup.target1_price
                || adjusted.target2_price != setup.target2_price
            {
                adjusted_count += 1;
            }
            if adjusted.trade_management.is_none() {
                adjusted.trade_management = Some(profile.trade_management_for(setup));
            }
            adjusted
        })
        .collect();
    (adjusted, adjusted_count)
}

fn date_range(intake: &IntakeReport, config: &RunnerConfig) -> DateRange {
    let dates = || intake.setups.iter().map(|s| s.session_date);
    DateRange {
        from: config.filter.from.or_else(|| dates().min()),
        to: config.filter.to.or_else(|| dates().max()),
    }
}

/// Evaluate admitted setups against pre-loaded bars. No I/O.
pub fn summarize_backtest(
    intake: &IntakeReport,
    bars: &SessionBars,
    config: &RunnerConfig,
    profile: Option<&OptimizerProfile>,
) -> BacktestSummary {
    let mut notes = intake.notes.clone();
    if intake.setups.is_empty() {
        notes.push("No backtestable setups found for the requested date range.".into());
    }

    let (setups, geometry_adjusted_count) = match profile {
        Some(profile) => apply_profile(&intake.setups, profile),
        None => (intake.setups.clone(), 0),
    };
    if geometry_adjusted_count > 0 {
        notes.push(format!(
            "Applied profile geometry to {geometry_adjusted_count} setups."
        ));
    }

    let options = EvaluationOptions {
        respect_persisted_trigger: config.backtest.respect_persisted_trigger,
    };
    let mut skipped_setup_count = 0;
    let mut evaluations = Vec::with_capacity(setups.len());
    for (original, setup) in intake.setups.iter().zip(&setups) {
        let session = bars.session(setup.session_date);
        if session.is_empty() {
            skipped_setup_count += 1;
            continue;
        }
        let mut evaluation = evaluate_setup(setup, session, &config.execution, options);
        // Synthesized targets do not count as present.
        evaluation.missing_target2 = original.target2_price.is_none();
        evaluations.push(evaluation);
    }

    let ambiguous_bar_count = evaluations
        .iter()
        .map(|e| u64::from(e.ambiguity_count))
        .sum();
    let missing_target2_count = evaluations.iter().filter(|e| e.missing_target2).count();

    if missing_target2_count > 0 {
        notes.push(format!(
            "Target2 missing for {missing_target2_count} setups in backtest source."
        ));
    }
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

    let profitability = Profitability::from_evaluations(&evaluations);
    let metrics = FamilyMetrics::compute(
        evaluations.iter().map(|e| &e.outcome),
        &config.objective_weights,
    );
    info!(
        setups = setups.len(),
        evaluated = evaluations.len(),
        skipped = skipped_setup_count,
        triggered = profitability.triggered_count,
        expectancy_r = profitability.expectancy_r,
        "backtest complete"
    );

    BacktestSummary {
        config_hash: config.config_hash(),
        dataset_hash: bars.fingerprint_with(&setups),
        date_range: date_range(intake, config),
        setup_count: setups.len(),
        evaluated_setup_count: evaluations.len(),
        skipped_setup_count,
        geometry_adjusted_count,
        ambiguous_bar_count,
        missing_target2_count,
        missing_bar_sessions: bars.missing_sessions.clone(),
        requested_resolution: config.backtest.resolution,
        resolution_used: bars.resolution_used,
        resolution_fallback_sessions: bars.fallback_sessions.clone(),
        execution_model: config.execution,
        profitability,
        metrics,
        notes,
        rows: config.backtest.include_rows.then_some(evaluations),
    }
}

/// Load bars for the admitted setups and summarize them.
pub fn run_backtest(
    intake: &IntakeReport,
    source: &dyn BarSource,
    config: &RunnerConfig,
    profile: Option<&OptimizerProfile>,
) -> BacktestSummary {
    let bars = load_sessions(
        source,
        intake.setups.iter().map(|s| s.session_date),
        config.backtest.resolution,
        config.backtest.max_concurrent_fetches,
    );
    summarize_backtest(intake, &bars, config, profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar_store::InMemoryBarSource;
    use crate::bar_store::BarResolution;
    use crate::test_support::{losing_bars, session, setup, winning_bars};
    use setuplab_core::{GeometryAdjustment, TradeManagement};

    fn intake(setups: Vec<SetupCandidate>) -> IntakeReport {
        IntakeReport {
            setups,
            ..Default::default()
        }
    }

    fn source() -> InMemoryBarSource {
        InMemoryBarSource::new()
            .with_session(session(1), BarResolution::Minute, winning_bars(1))
            .with_session(session(4), BarResolution::Minute, losing_bars(4))
    }

    #[test]
    fn empty_intake_yields_zeroed_summary() {
        let summary = run_backtest(&intake(vec![]), &source(), &RunnerConfig::default(), None);
        assert_eq!(summary.setup_count, 0);
        assert_eq!(summary.profitability, Profitability::default());
        assert_eq!(summary.metrics.t1_win_rate_pct, 0.0);
        assert!(summary
            .notes
            .iter()
            .any(|n| n.starts_with("No backtestable setups")));
        assert!(summary.rows.is_none());
    }

    #[test]
    fn setups_without_bars_are_skipped_and_noted() {
        let setups = vec![
            setup("win", "trend_pullback", 1),
            setup("loss", "fade_at_wall", 4),
            setup("gap", "fade_at_wall", 5),
        ];
        let summary = run_backtest(&intake(setups), &source(), &RunnerConfig::default(), None);
        assert_eq!(summary.setup_count, 3);
        assert_eq!(summary.evaluated_setup_count, 2);
        assert_eq!(summary.skipped_setup_count, 1);
        assert_eq!(summary.missing_bar_sessions, vec![session(5)]);
        assert_eq!(summary.resolution_used, ResolutionUsed::Minute);
        assert_eq!(summary.resolution_fallback_sessions.len(), 2);
        assert!(summary
            .notes
            .contains(&"No historical bars were returned for 1 session dates.".to_string()));
        assert_eq!(summary.date_range.from, Some(session(1)));
        assert_eq!(summary.date_range.to, Some(session(5)));
    }

    #[test]
    fn profitability_groups_by_setup_type() {
        let setups = vec![
            setup("a", "trend_pullback", 1),
            setup("b", "fade_at_wall", 4),
            setup("c", "fade_at_wall", 4),
        ];
        let summary = run_backtest(&intake(setups), &source(), &RunnerConfig::default(), None);
        let p = &summary.profitability;
        assert_eq!(p.triggered_count, 3);
        assert_eq!(p.resolved_count, 3);
        assert_eq!(p.with_realized_r_count, 3);
        assert_eq!(p.expectancy_r, p.average_realized_r);
        assert!((p.positive_realized_rate_pct - 33.33).abs() < 1e-9);
        let keys: Vec<_> = p.by_setup_type.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, ["fade_at_wall", "trend_pullback"]);
        assert_eq!(p.by_setup_type[0].trade_count, 2);
        assert!(p.by_setup_type[0].cumulative_realized_r < 0.0);
        assert!(p.by_setup_type[1].cumulative_realized_r > 0.0);
    }

    #[test]
    fn rows_are_attached_on_request() {
        let mut config = RunnerConfig::default();
        config.backtest.include_rows = true;
        let summary = run_backtest(&intake(vec![setup("a", "trend_pullback", 1)]), &source(), &config, None);
        let rows = summary.rows.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].setup_id, "a");
    }

    #[test]
    fn profile_geometry_and_management_are_applied() {
        let mut profile = OptimizerProfile::default();
        profile
            .geometry
            .insert("trend_pullback".into(), GeometryAdjustment::new(1.2, 1.0, 1.0));
        let mut own = setup("own", "fade_at_wall", 1);
        own.trade_management = Some(TradeManagement::new(1.0, false));
        let setups = [setup("a", "trend_pullback", 1), own];

        let (adjusted, count) = apply_profile(&setups, &profile);
        assert_eq!(count, 1);
        assert!(adjusted[0].stop_price < setups[0].stop_price);
        assert_eq!(adjusted[0].risk_anchor_stop, Some(98.0));
        assert_eq!(adjusted[0].trade_management, Some(profile.trade_management));
        assert_eq!(adjusted[1].trade_management, Some(TradeManagement::new(1.0, false)));
    }

    #[test]
    fn synthesized_target2_still_counts_as_missing() {
        let mut profile = OptimizerProfile::default();
        profile
            .geometry
            .insert("trend_pullback".into(), GeometryAdjustment::new(1.0, 1.1, 1.0));
        let mut bare = setup("a", "trend_pullback", 1);
        bare.target2_price = None;

        let summary = run_backtest(&intake(vec![bare]), &source(), &RunnerConfig::default(), Some(&profile));
        assert_eq!(summary.geometry_adjusted_count, 1);
        assert_eq!(summary.missing_target2_count, 1);
        assert!(summary
            .notes
            .contains(&"Target2 missing for 1 setups in backtest source.".to_string()));
    }

    #[test]
    fn intake_notes_lead() {
        let report = IntakeReport {
            setups: vec![setup("a", "trend_pullback", 1)],
            malformed: 2,
            notes: vec!["Skipped 2 malformed setup rows.".into()],
            ..Default::default()
        };
        let summary = run_backtest(&report, &source(), &RunnerConfig::default(), None);
        assert_eq!(summary.notes[0], "Skipped 2 malformed setup rows.");
    }
}
