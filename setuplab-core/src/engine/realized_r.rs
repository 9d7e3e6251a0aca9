//! Realized R: the result of a triggered setup as a multiple of initial risk.

use crate::domain::{round_dp, Direction, FinalOutcome};

/// Floor on the risk unit so near-zero stops cannot blow up R.
pub const MIN_RISK_UNIT: f64 = 0.25;

/// Inputs needed to price an outcome in R.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeLegs {
    pub direction: Direction,
    pub entry_fill: f64,
    /// Stop that defines 1R.
    pub risk_stop: f64,
    pub target1: f64,
    pub target2: Option<f64>,
    pub partial_at_t1: f64,
    pub move_stop_to_breakeven: bool,
    pub commission_r: f64,
    pub stop_hit: bool,
    /// Close of the last observed bar, used to mark open legs.
    pub last_close: Option<f64>,
}

impl TradeLegs {
    pub fn risk_unit(&self) -> f64 {
        (self.entry_fill - self.risk_stop).abs().max(MIN_RISK_UNIT)
    }

    fn target_r(&self, target: f64) -> f64 {
        (target - self.entry_fill).abs() / self.risk_unit()
    }

    /// Signed move from entry to the last close, in R.
    fn mark_to_close_r(&self) -> f64 {
        let mark = self.last_close.unwrap_or(self.entry_fill);
        (mark - self.entry_fill) * self.direction.sign() / self.risk_unit()
    }
}

/// Realized R for a final outcome, rounded to 4 decimals.
pub fn realized_r(outcome: FinalOutcome, legs: &TradeLegs) -> f64 {
    let partial = legs.partial_at_t1;
    let runner_weight = 1.0 - partial;
    let t1_r = legs.target_r(legs.target1);
    let c = legs.commission_r;

    let r = match outcome {
        FinalOutcome::T2BeforeStop => {
            let t2_r = legs.target2.map_or(t1_r, |t2| legs.target_r(t2));
            partial * t1_r + runner_weight * t2_r - c
        }
        FinalOutcome::T1BeforeStop => {
            let runner = if legs.stop_hit {
                if legs.move_stop_to_breakeven {
                    0.0
                } else {
                    -1.0
                }
            } else {
                legs.mark_to_close_r()
            };
            partial * t1_r + runner_weight * runner - c
        }
        FinalOutcome::StopBeforeT1 => -1.0 - c,
        FinalOutcome::ExpiredUnresolved => legs.mark_to_close_r() - c,
    };
    round_dp(r, 4)
}
