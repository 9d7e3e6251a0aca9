//! Family metrics: outcome counts, rates, expectancy, and objective scores.
//!
//! Every metric is a pure function of a batch of evaluated outcomes for one
//! (family, configuration) pair. No dependency on bar loading or the sweep.

use serde::{Deserialize, Serialize};
use setuplab_core::{round_dp, EvaluatedOutcome, FinalOutcome};

use crate::stats::{mean, mean_lower_bound, pct, wilson_interval, WilsonInterval};

/// Weights of the objective score. Rates enter in percent, expectancy in R.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveWeights {
    pub t1: f64,
    pub t2: f64,
    pub failure_penalty: f64,
    pub expectancy_r: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            t1: 0.62,
            t2: 0.38,
            failure_penalty: 0.5,
            expectancy_r: 14.0,
        }
    }
}

/// Aggregate metrics for one batch of outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyMetrics {
    pub opportunities: usize,
    pub triggered: usize,
    pub resolved: usize,
    pub t1_wins: usize,
    pub t2_wins: usize,
    pub stops: usize,
    pub t1_win_rate_pct: f64,
    pub t2_win_rate_pct: f64,
    pub failure_rate_pct: f64,
    pub expectancy_r: f64,
    pub expectancy_lower_bound_r: f64,
    pub positive_realized_rate_pct: f64,
    pub t1_confidence: WilsonInterval,
    pub t2_confidence: WilsonInterval,
    pub failure_confidence: WilsonInterval,
    pub objective_naive: f64,
    pub objective_conservative: f64,
}

impl FamilyMetrics {
    /// Aggregate a batch of outcomes.
    pub fn compute<'a, I>(outcomes: I, weights: &ObjectiveWeights) -> Self
    where
        I: IntoIterator<Item = &'a EvaluatedOutcome>,
    {
        let mut opportunities = 0;
        let mut triggered = 0;
        let mut resolved = 0;
        let mut t1_wins = 0;
        let mut t2_wins = 0;
        let mut stops = 0;
        let mut realized = Vec::new();

        for outcome in outcomes {
            opportunities += 1;
            if !outcome.is_triggered() {
                continue;
            }
            triggered += 1;
            if let Some(r) = outcome.realized_r.filter(|r| r.is_finite()) {
                realized.push(r);
            }
            let Some(final_outcome) = outcome.final_outcome else {
                continue;
            };
            resolved += 1;
            match final_outcome {
                FinalOutcome::T2BeforeStop => {
                    t1_wins += 1;
                    t2_wins += 1;
                }
                FinalOutcome::T1BeforeStop => t1_wins += 1,
                FinalOutcome::StopBeforeT1 => stops += 1,
                FinalOutcome::ExpiredUnresolved => {}
            }
        }

        let positive = realized.iter().filter(|r| **r > 0.0).count();
        let mut metrics = Self {
            opportunities,
            triggered,
            resolved,
            t1_wins,
            t2_wins,
            stops,
            t1_win_rate_pct: pct(t1_wins, resolved),
            t2_win_rate_pct: pct(t2_wins, resolved),
            failure_rate_pct: pct(stops, resolved),
            expectancy_r: round_dp(mean(&realized), 4),
            expectancy_lower_bound_r: round_dp(mean_lower_bound(&realized), 4),
            positive_realized_rate_pct: pct(positive, realized.len()),
            t1_confidence: wilson_interval(t1_wins, resolved),
            t2_confidence: wilson_interval(t2_wins, resolved),
            failure_confidence: wilson_interval(stops, resolved),
            objective_naive: 0.0,
            objective_conservative: 0.0,
        };
        metrics.objective_naive = naive_score(&metrics, weights);
        metrics.objective_conservative = conservative_score(&metrics, weights);
        metrics
    }
}

// ─── Objective scores ───────────────────────────────────────────────

/// Point-estimate objective.
pub fn naive_score(m: &FamilyMetrics, w: &ObjectiveWeights) -> f64 {
    round_dp(
        m.t1_win_rate_pct * w.t1 + m.t2_win_rate_pct * w.t2
            - m.failure_rate_pct * w.failure_penalty
            + m.expectancy_r * w.expectancy_r,
        2,
    )
}

/// Objective at the pessimistic end of every interval: Wilson lower bounds
/// for win rates, Wilson upper bound for the failure rate, and the mean
/// lower bound for expectancy. With nothing resolved only expectancy counts.
pub fn conservative_score(m: &FamilyMetrics, w: &ObjectiveWeights) -> f64 {
    if m.resolved == 0 {
        return round_dp(m.expectancy_lower_bound_r * w.expectancy_r, 2);
    }
    round_dp(
        m.t1_confidence.lower_pct * w.t1 + m.t2_confidence.lower_pct * w.t2
            - m.failure_confidence.upper_pct * w.failure_penalty
            + m.expectancy_lower_bound_r * w.expectancy_r,
        2,
    )
}
