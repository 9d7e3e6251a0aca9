//! Bar-path outcome classifier.
//!
//! Walks a session's bars in order and decides, for one setup, whether and
//! where it triggered and which of stop, target 1, and target 2 was reached
//! first. Each bar is expanded into a four-point path by a [`PathPolicy`];
//! every segment of that path gets three checks: the point it starts at, the
//! levels it crosses, and the point it ends at.

use std::ops::ControlFlow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{round_dp, PriceBar, SetupCandidate, SetupEvaluation};
use crate::engine::realized_r::{realized_r, TradeLegs};
use crate::engine::state::EvalState;
use crate::execution::trigger::{
    at_or_beyond_stop, at_or_beyond_target, crosses_stop, crosses_target, entry_trigger_price,
};
use crate::execution::{
    CloseDirection, EffectiveLevels, ExecutionModel, PathPolicy, ResolvedExecution,
};

/// Per-call switches for the classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationOptions {
    /// Start already triggered at the setup's persisted `triggered_at`,
    /// filled at the entry midpoint. Off by default: backtests re-derive the
    /// trigger from bars.
    pub respect_persisted_trigger: bool,
}

/// Classify a setup against sorted bars using the close-direction path.
pub fn evaluate_setup(
    setup: &SetupCandidate,
    bars: &[PriceBar],
    model: &ExecutionModel,
    options: EvaluationOptions,
) -> SetupEvaluation {
    evaluate_setup_with_policy(setup, bars, model, options, &CloseDirection)
}

/// Classify a setup against sorted bars using an explicit path policy.
pub fn evaluate_setup_with_policy<P: PathPolicy + ?Sized>(
    setup: &SetupCandidate,
    bars: &[PriceBar],
    model: &ExecutionModel,
    options: EvaluationOptions,
    policy: &P,
) -> SetupEvaluation {
    let execution = model.resolve_for(setup);
    let walk = Walk {
        setup,
        execution,
        levels: execution.effective_levels(setup),
        zone: setup.entry_zone(),
        policy,
    };

    let initial = match setup.triggered_at {
        Some(at) if options.respect_persisted_trigger => {
            EvalState::pre_triggered(at, round_dp(setup.entry_mid(), 2))
        }
        _ => EvalState::default(),
    };
    let first_seen_ms = setup.first_seen_at.map(|at| at.timestamp_millis());

    let flow = bars
        .iter()
        .filter(|bar| first_seen_ms.map_or(true, |ms| bar.timestamp >= ms))
        .filter(|bar| !bar.is_void())
        .try_fold(initial, |state, bar| {
            let state = walk.observe(state, bar);
            if state.is_resolved() {
                ControlFlow::Break(state)
            } else {
                ControlFlow::Continue(state)
            }
        });
    let mut state = match flow {
        ControlFlow::Break(state) | ControlFlow::Continue(state) => state,
    };
    state.expire();

    let realized = walk.realized_r(&state);
    let ambiguity_count = state.ambiguity_count;
    SetupEvaluation {
        setup_id: setup.id.clone(),
        session_date: setup.session_date,
        setup_type: setup.setup_type.clone(),
        direction: setup.direction,
        regime: setup.regime.clone(),
        tier: setup.tier.clone(),
        outcome: state.into_outcome(realized),
        ambiguity_count,
        missing_target2: setup.target2_price.is_none(),
    }
}

/// Fixed inputs for one setup's scan.
struct Walk<'a, P: ?Sized> {
    setup: &'a SetupCandidate,
    execution: ResolvedExecution,
    levels: EffectiveLevels,
    zone: (f64, f64),
    policy: &'a P,
}

impl<P: PathPolicy + ?Sized> Walk<'_, P> {
    fn observe(&self, mut state: EvalState, bar: &PriceBar) -> EvalState {
        let Some(at) = bar.time() else {
            return state;
        };
        state.last_observed = Some((at, bar.close));

        let path = self.policy.path(bar);
        let mut ambiguity_checked = false;
        for segment in path.windows(2) {
            let (mut start, end) = (segment[0], segment[1]);

            if !state.is_triggered() {
                let Some(trigger) = entry_trigger_price(start, end, self.zone.0, self.zone.1)
                else {
                    continue;
                };
                let fill = self.execution.entry_fill(trigger, self.setup.direction);
                state.mark_triggered(at, fill);
                start = trigger;
            }

            if !ambiguity_checked {
                ambiguity_checked = true;
                if bar.covers(self.active_stop(&state)) && bar.covers(self.levels.target1) {
                    state.ambiguity_count += 1;
                }
            }

            self.check_point(&mut state, start, at);
            if state.is_resolved() {
                break;
            }
            self.check_segment(&mut state, start, end, at);
            if state.is_resolved() {
                break;
            }
            self.check_point(&mut state, end, at);
            if state.is_resolved() {
                break;
            }
        }
        state
    }

    /// Initial stop, or the entry fill once target 1 is in and breakeven is on.
    fn active_stop(&self, state: &EvalState) -> f64 {
        if state.t1_hit() && self.execution.move_stop_to_breakeven {
            state
                .entry_fill
                .unwrap_or_else(|| round_dp(self.setup.entry_mid(), 2))
        } else {
            self.levels.stop
        }
    }

    // Ties go to the stop, then target 2, then target 1.
    fn check_point(&self, state: &mut EvalState, price: f64, at: DateTime<Utc>) {
        let direction = self.setup.direction;
        if at_or_beyond_stop(price, self.active_stop(state), direction) {
            state.mark_stop(at);
        } else if self
            .levels
            .target2
            .is_some_and(|t2| at_or_beyond_target(price, t2, direction))
        {
            state.mark_t2(at);
        } else if at_or_beyond_target(price, self.levels.target1, direction) {
            state.mark_t1(at);
        }
    }

    fn check_segment(&self, state: &mut EvalState, start: f64, end: f64, at: DateTime<Utc>) {
        let direction = self.setup.direction;
        if !state.t1_hit() && crosses_target(start, end, self.levels.target1, direction) {
            state.mark_t1(at);
        }
        if let Some(t2) = self.levels.target2 {
            if crosses_target(start, end, t2, direction) {
                state.mark_t2(at);
            }
        }
        if crosses_stop(start, end, self.active_stop(state), direction) {
            state.mark_stop(at);
        }
    }

    fn realized_r(&self, state: &EvalState) -> Option<f64> {
        let outcome = state.final_outcome?;
        let entry_fill = state.entry_fill?;
        let legs = TradeLegs {
            direction: self.setup.direction,
            entry_fill,
            risk_stop: self.setup.risk_stop(),
            target1: self.setup.target1_price,
            target2: self.setup.target2_price,
            partial_at_t1: self.execution.partial_at_t1,
            move_stop_to_breakeven: self.execution.move_stop_to_breakeven,
            commission_r: self.execution.commission_r,
            stop_hit: state.stop_hit(),
            last_close: state.last_close(),
        };
        Some(realized_r(outcome, &legs))
    }
}
