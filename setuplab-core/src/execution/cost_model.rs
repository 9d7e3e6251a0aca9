//! Execution friction and trade management for realized-R accounting.
//!
//! All slippage is expressed in price points and always applied against the
//! trader: entries fill worse, targets must travel further, and the initial
//! stop is pulled toward the entry so it triggers earlier.

use serde::{Deserialize, Serialize};

use crate::domain::{round_dp, Direction, SetupCandidate};

/// Partial fraction used when the model is disabled and the setup has no override.
pub const DISABLED_PARTIAL_AT_T1: f64 = 0.5;

/// Run-level execution model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionModel {
    pub enabled: bool,
    pub entry_slip_points: f64,
    pub target_slip_points: f64,
    pub stop_slip_points: f64,
    pub commission_per_trade_r: f64,
    pub partial_at_t1_pct: f64,
    pub move_stop_to_breakeven_after_t1: bool,
}

impl Default for ExecutionModel {
    fn default() -> Self {
        Self {
            enabled: true,
            entry_slip_points: 0.2,
            target_slip_points: 0.25,
            stop_slip_points: 0.15,
            commission_per_trade_r: 0.04,
            partial_at_t1_pct: 0.5,
            move_stop_to_breakeven_after_t1: true,
        }
    }
}

impl ExecutionModel {
    /// No friction. Trade management still follows per-setup overrides.
    pub fn frictionless() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Clamp every field into its valid range. Non-finite values fall back to
    /// the default for that field.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let non_negative = |value: f64, fallback: f64| {
            if value.is_finite() {
                value.max(0.0)
            } else {
                fallback
            }
        };
        Self {
            enabled: self.enabled,
            entry_slip_points: non_negative(self.entry_slip_points, defaults.entry_slip_points),
            target_slip_points: non_negative(self.target_slip_points, defaults.target_slip_points),
            stop_slip_points: non_negative(self.stop_slip_points, defaults.stop_slip_points),
            commission_per_trade_r: non_negative(
                self.commission_per_trade_r,
                defaults.commission_per_trade_r,
            ),
            partial_at_t1_pct: if self.partial_at_t1_pct.is_finite() {
                self.partial_at_t1_pct.clamp(0.0, 1.0)
            } else {
                defaults.partial_at_t1_pct
            },
            move_stop_to_breakeven_after_t1: self.move_stop_to_breakeven_after_t1,
        }
    }

    /// Friction and management settings in effect for one setup.
    ///
    /// A setup's `TradeManagement` replaces the partial and breakeven fields
    /// whether or not the model is enabled.
    pub fn resolve_for(&self, setup: &SetupCandidate) -> ResolvedExecution {
        let model = self.sanitized();
        let (base_partial, base_breakeven) = if model.enabled {
            (model.partial_at_t1_pct, model.move_stop_to_breakeven_after_t1)
        } else {
            (DISABLED_PARTIAL_AT_T1, true)
        };
        let (partial_at_t1, move_stop_to_breakeven) = match setup.trade_management {
            Some(tm) if tm.partial_at_t1_pct.is_finite() => {
                (tm.partial_at_t1_pct.clamp(0.0, 1.0), tm.move_stop_to_breakeven)
            }
            _ => (base_partial, base_breakeven),
        };

        if model.enabled {
            ResolvedExecution {
                entry_slip: model.entry_slip_points,
                target_slip: model.target_slip_points,
                stop_slip: model.stop_slip_points,
                commission_r: model.commission_per_trade_r,
                partial_at_t1,
                move_stop_to_breakeven,
            }
        } else {
            ResolvedExecution {
                entry_slip: 0.0,
                target_slip: 0.0,
                stop_slip: 0.0,
                commission_r: 0.0,
                partial_at_t1,
                move_stop_to_breakeven,
            }
        }
    }
}

/// Per-setup execution settings after applying overrides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedExecution {
    pub entry_slip: f64,
    pub target_slip: f64,
    pub stop_slip: f64,
    pub commission_r: f64,
    pub partial_at_t1: f64,
    pub move_stop_to_breakeven: bool,
}

impl ResolvedExecution {
    /// Entry fill for a trigger price, rounded to cents.
    pub fn entry_fill(&self, trigger_price: f64, direction: Direction) -> f64 {
        round_dp(trigger_price + direction.sign() * self.entry_slip, 2)
    }

    /// Friction-adjusted levels the classifier tests price against.
    pub fn effective_levels(&self, setup: &SetupCandidate) -> EffectiveLevels {
        let sign = setup.direction.sign();
        EffectiveLevels {
            stop: setup.stop_price + sign * self.stop_slip,
            target1: setup.target1_price + sign * self.target_slip,
            target2: setup.target2_price.map(|t2| t2 + sign * self.target_slip),
        }
    }
}

/// Stop and targets after slippage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveLevels {
    pub stop: f64,
    pub target1: f64,
    pub target2: Option<f64>,
}
