//! Evaluation state threaded through the bar scan.
//!
//! Every transition is set-once: after a final outcome is recorded, further
//! marks are ignored, so the first resolution always wins.

use chrono::{DateTime, Utc};

use crate::domain::{EvaluatedOutcome, FinalOutcome};

/// Mutable record folded over a setup's bars.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalState {
    pub triggered_at: Option<DateTime<Utc>>,
    pub t1_hit_at: Option<DateTime<Utc>>,
    pub t2_hit_at: Option<DateTime<Utc>>,
    pub stop_hit_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub final_outcome: Option<FinalOutcome>,
    pub entry_fill: Option<f64>,
    /// Timestamp and close of the last bar that passed the filters.
    pub last_observed: Option<(DateTime<Utc>, f64)>,
    pub ambiguity_count: u32,
}

impl EvalState {
    /// State for a setup whose trigger was persisted before the scan.
    pub fn pre_triggered(at: DateTime<Utc>, entry_fill: f64) -> Self {
        Self {
            triggered_at: Some(at),
            entry_fill: Some(entry_fill),
            ..Self::default()
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered_at.is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.final_outcome.is_some()
    }

    pub fn t1_hit(&self) -> bool {
        self.t1_hit_at.is_some()
    }

    pub fn stop_hit(&self) -> bool {
        self.stop_hit_at.is_some()
    }

    pub fn mark_triggered(&mut self, at: DateTime<Utc>, entry_fill: f64) {
        if self.is_triggered() {
            return;
        }
        self.triggered_at = Some(at);
        self.entry_fill = Some(entry_fill);
    }

    pub fn mark_t1(&mut self, at: DateTime<Utc>) {
        if self.is_resolved() {
            return;
        }
        self.t1_hit_at.get_or_insert(at);
    }

    /// Target 2 implies target 1 and finalizes the setup.
    pub fn mark_t2(&mut self, at: DateTime<Utc>) {
        if self.is_resolved() {
            return;
        }
        self.t1_hit_at.get_or_insert(at);
        self.t2_hit_at.get_or_insert(at);
        self.resolve(at, FinalOutcome::T2BeforeStop);
    }

    pub fn mark_stop(&mut self, at: DateTime<Utc>) {
        if self.is_resolved() {
            return;
        }
        self.stop_hit_at.get_or_insert(at);
        let outcome = if self.t1_hit() {
            FinalOutcome::T1BeforeStop
        } else {
            FinalOutcome::StopBeforeT1
        };
        self.resolve(at, outcome);
    }

    /// Close out a triggered setup that ran out of bars.
    pub fn expire(&mut self) {
        if !self.is_triggered() || self.is_resolved() {
            return;
        }
        let outcome = if self.t1_hit() {
            FinalOutcome::T1BeforeStop
        } else {
            FinalOutcome::ExpiredUnresolved
        };
        let at = self
            .last_observed
            .map(|(at, _)| at)
            .or(self.triggered_at);
        self.final_outcome = Some(outcome);
        self.resolved_at = at;
    }

    fn resolve(&mut self, at: DateTime<Utc>, outcome: FinalOutcome) {
        self.final_outcome = Some(outcome);
        self.resolved_at = Some(at);
    }

    pub fn last_close(&self) -> Option<f64> {
        self.last_observed.map(|(_, close)| close)
    }

    pub fn into_outcome(self, realized_r: Option<f64>) -> EvaluatedOutcome {
        EvaluatedOutcome {
            triggered_at: self.triggered_at,
            t1_hit_at: self.t1_hit_at,
            t2_hit_at: self.t2_hit_at,
            stop_hit_at: self.stop_hit_at,
            resolved_at: self.resolved_at,
            final_outcome: self.final_outcome,
            realized_r,
            entry_fill_price: self.entry_fill,
        }
    }
}
