//! Property tests for the metrics aggregator and candidate grid.
//!
//! 1. Rates stay within [0, 100] and the t2 rate never exceeds the t1 rate
//! 2. Wilson bounds bracket the point estimate
//! 3. The conservative score never beats the naive score
//! 4. Every grid starts with a single baseline and has unique labels

use chrono::DateTime;
use proptest::prelude::*;
use setuplab_core::{EvaluatedOutcome, FinalOutcome};
use setuplab_runner::{candidate_grid, FamilyMetrics, ObjectiveWeights, SetupFamily};
use std::collections::BTreeSet;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_final() -> impl Strategy<Value = Option<FinalOutcome>> {
    prop_oneof![
        Just(None),
        Just(Some(FinalOutcome::T2BeforeStop)),
        Just(Some(FinalOutcome::T1BeforeStop)),
        Just(Some(FinalOutcome::StopBeforeT1)),
        Just(Some(FinalOutcome::ExpiredUnresolved)),
    ]
}

fn arb_outcome() -> impl Strategy<Value = EvaluatedOutcome> {
    (any::<bool>(), arb_final(), -1.5..3.0_f64).prop_map(|(triggered, final_outcome, r)| {
        let at = DateTime::from_timestamp(1_709_303_400, 0);
        if !triggered {
            return EvaluatedOutcome::default();
        }
        EvaluatedOutcome {
            triggered_at: at,
            resolved_at: final_outcome.and(at),
            final_outcome,
            realized_r: final_outcome.map(|_| r),
            ..Default::default()
        }
    })
}

fn arb_family() -> impl Strategy<Value = SetupFamily> {
    prop::sample::select(SetupFamily::ALL.to_vec())
}

// ── Properties ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn rates_are_bounded(outcomes in prop::collection::vec(arb_outcome(), 0..60)) {
        let m = FamilyMetrics::compute(&outcomes, &ObjectiveWeights::default());
        for rate in [m.t1_win_rate_pct, m.t2_win_rate_pct, m.failure_rate_pct, m.positive_realized_rate_pct] {
            prop_assert!((0.0..=100.0).contains(&rate), "rate {rate} out of range");
        }
        prop_assert!(m.t2_win_rate_pct <= m.t1_win_rate_pct);
        prop_assert!(m.resolved <= m.triggered && m.triggered <= m.opportunities);
        prop_assert!(!m.objective_naive.is_nan() && !m.objective_conservative.is_nan());
    }

    #[test]
    fn wilson_bounds_bracket_point(outcomes in prop::collection::vec(arb_outcome(), 0..60)) {
        let m = FamilyMetrics::compute(&outcomes, &ObjectiveWeights::default());
        for ci in [m.t1_confidence, m.t2_confidence, m.failure_confidence] {
            prop_assert!(ci.lower_pct >= 0.0 && ci.upper_pct <= 100.0);
            prop_assert!(ci.lower_pct <= ci.point_pct + 1e-9);
            prop_assert!(ci.point_pct <= ci.upper_pct + 1e-9);
        }
    }

    #[test]
    fn conservative_never_beats_naive(outcomes in prop::collection::vec(arb_outcome(), 0..60)) {
        let m = FamilyMetrics::compute(&outcomes, &ObjectiveWeights::default());
        // Each score is rounded to cents on its own.
        prop_assert!(
            m.objective_conservative <= m.objective_naive + 0.011,
            "conservative {} > naive {}",
            m.objective_conservative,
            m.objective_naive
        );
    }

    #[test]
    fn grids_have_one_baseline_and_unique_labels(
        family in arb_family(),
        partial in 0.0..1.0_f64,
        fast in any::<bool>(),
    ) {
        let grid = candidate_grid(family, partial, fast);
        prop_assert!(grid[0].is_baseline());
        prop_assert_eq!(grid.iter().filter(|c| c.is_baseline()).count(), 1);
        let labels: BTreeSet<_> = grid.iter().map(|c| c.label.as_str()).collect();
        prop_assert_eq!(labels.len(), grid.len());
    }
}
