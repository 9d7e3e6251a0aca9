//! Evaluated outcomes produced by the bar-path classifier.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::setup::Direction;

/// How a triggered setup finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalOutcome {
    /// Target 1 was reached first; the runner was stopped or the data ran out.
    T1BeforeStop,
    /// Target 2 was reached before the stop.
    T2BeforeStop,
    /// The stop was hit before target 1.
    StopBeforeT1,
    /// Triggered, but no level was reached before the data ran out.
    ExpiredUnresolved,
}

impl FinalOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::T1BeforeStop => "t1_before_stop",
            Self::T2BeforeStop => "t2_before_stop",
            Self::StopBeforeT1 => "stop_before_t1",
            Self::ExpiredUnresolved => "expired_unresolved",
        }
    }

    /// Target 1 counts as won for both T1 and T2 outcomes.
    pub fn is_t1_win(self) -> bool {
        matches!(self, Self::T1BeforeStop | Self::T2BeforeStop)
    }
}

impl fmt::Display for FinalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle timestamps and realized result of one setup.
///
/// `final_outcome.is_some() == triggered_at.is_some()` always holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedOutcome {
    pub triggered_at: Option<DateTime<Utc>>,
    pub t1_hit_at: Option<DateTime<Utc>>,
    pub t2_hit_at: Option<DateTime<Utc>>,
    pub stop_hit_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub final_outcome: Option<FinalOutcome>,
    pub realized_r: Option<f64>,
    pub entry_fill_price: Option<f64>,
}

impl EvaluatedOutcome {
    pub fn is_triggered(&self) -> bool {
        self.triggered_at.is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.is_triggered() && self.final_outcome.is_some()
    }
}

/// Classifier output for one setup: identity, outcome, and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupEvaluation {
    pub setup_id: String,
    pub session_date: NaiveDate,
    pub setup_type: String,
    pub direction: Direction,
    pub regime: Option<String>,
    pub tier: Option<String>,
    #[serde(flatten)]
    pub outcome: EvaluatedOutcome,
    /// Bars after trigger whose range covered both the active stop and target 1.
    pub ambiguity_count: u32,
    pub missing_target2: bool,
}
