//! Geometry adjuster: rescale a setup's stop and target distances around the
//! entry midpoint.
//!
//! Distances are measured from the entry midpoint, scaled, floored so that
//! degenerate setups keep a tradeable shape, and converted back into prices on
//! the side implied by the setup's direction.

use serde::{Deserialize, Serialize};

use crate::domain::{round_dp, SetupCandidate};

/// Inclusive `(min, max)` bounds for the stop scale.
pub const STOP_SCALE_BOUNDS: (f64, f64) = (0.5, 2.0);
/// Inclusive `(min, max)` bounds for the target 1 scale.
pub const TARGET1_SCALE_BOUNDS: (f64, f64) = (0.5, 2.0);
/// Inclusive `(min, max)` bounds for the target 2 scale.
pub const TARGET2_SCALE_BOUNDS: (f64, f64) = (0.5, 2.5);

const MIN_STOP_DISTANCE: f64 = 0.25;
const MIN_TARGET1_DISTANCE: f64 = 0.25;
const MIN_TARGET2_DISTANCE: f64 = 0.3;
const TARGET2_OVER_TARGET1_GAP: f64 = 0.1;
const SYNTHETIC_TARGET2_MULTIPLE: f64 = 1.8;
const IDENTITY_TOLERANCE: f64 = 1e-4;

/// Floor on the recomputed risk distance when a stop is rebuilt from its base.
const MIN_RECOMPUTED_RISK: f64 = 0.35;

/// Multiplicative scales applied to stop, target 1, and target 2 distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryAdjustment {
    pub stop_scale: f64,
    pub target1_scale: f64,
    pub target2_scale: f64,
}

impl Default for GeometryAdjustment {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl GeometryAdjustment {
    pub const IDENTITY: Self = Self {
        stop_scale: 1.0,
        target1_scale: 1.0,
        target2_scale: 1.0,
    };

    pub fn new(stop_scale: f64, target1_scale: f64, target2_scale: f64) -> Self {
        Self {
            stop_scale,
            target1_scale,
            target2_scale,
        }
    }

    /// Scales forced into their bounds; non-finite scales become 1.0.
    pub fn clamped(self) -> Self {
        Self {
            stop_scale: clamp_scale(self.stop_scale, STOP_SCALE_BOUNDS),
            target1_scale: clamp_scale(self.target1_scale, TARGET1_SCALE_BOUNDS),
            target2_scale: clamp_scale(self.target2_scale, TARGET2_SCALE_BOUNDS),
        }
    }

    /// True when every clamped scale is within tolerance of 1.0.
    pub fn is_identity(&self) -> bool {
        let clamped = self.clamped();
        [
            clamped.stop_scale,
            clamped.target1_scale,
            clamped.target2_scale,
        ]
        .iter()
        .all(|scale| (scale - 1.0).abs() <= IDENTITY_TOLERANCE)
    }
}

fn clamp_scale(scale: f64, (min, max): (f64, f64)) -> f64 {
    if scale.is_finite() {
        scale.clamp(min, max)
    } else {
        1.0
    }
}

/// Return a copy of `setup` with stop and targets rescaled.
///
/// An identity adjustment returns the setup unchanged. Otherwise the result
/// always carries a target 2 (synthesized from target 1 when absent), and
/// `risk_anchor_stop` keeps the stop that defined 1R before the first rescale.
pub fn apply_geometry(setup: &SetupCandidate, adjustment: GeometryAdjustment) -> SetupCandidate {
    if adjustment.is_identity() {
        return setup.clone();
    }
    let adj = adjustment.clamped();
    let mid = setup.entry_mid();
    let sign = setup.direction.sign();

    let stop_distance = (mid - setup.stop_price).abs().max(MIN_STOP_DISTANCE);
    let t1_distance = (setup.target1_price - mid).abs().max(MIN_TARGET1_DISTANCE);
    let t2_distance = match setup.target2_price {
        Some(t2) => (t2 - mid).abs().max(MIN_TARGET2_DISTANCE),
        None => t1_distance * SYNTHETIC_TARGET2_MULTIPLE,
    };

    let scaled_stop = (stop_distance * adj.stop_scale).max(MIN_STOP_DISTANCE);
    let scaled_t1 = (t1_distance * adj.target1_scale).max(MIN_TARGET1_DISTANCE);
    let scaled_t2 = (t2_distance * adj.target2_scale).max(scaled_t1 + TARGET2_OVER_TARGET1_GAP);

    SetupCandidate {
        stop_price: round_dp(mid - sign * scaled_stop, 4),
        target1_price: round_dp(mid + sign * scaled_t1, 4),
        target2_price: Some(round_dp(mid + sign * scaled_t2, 4)),
        risk_anchor_stop: Some(setup.risk_stop()),
        ..setup.clone()
    }
}

/// Versioned record of how a persisted stop was derived.
///
/// Detectors that rescale stops at detection time record the unscaled base
/// here. A record missing either field is treated as absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StopContext {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub base_stop: Option<f64>,
}

impl StopContext {
    pub fn new(version: u32, base_stop: f64) -> Self {
        Self {
            version: Some(version),
            base_stop: Some(base_stop),
        }
    }

    fn complete_base(&self) -> Option<f64> {
        match (self.version, self.base_stop) {
            (Some(_), Some(base)) if base.is_finite() => Some(base),
            _ => None,
        }
    }
}

/// Stop price for `stop_scale`, rebuilt from the recorded base stop.
///
/// Without a complete context the persisted stop is returned as-is, so a stop
/// that was already scaled at detection time is never scaled twice.
pub fn recompute_stop(
    setup: &SetupCandidate,
    context: Option<&StopContext>,
    stop_scale: f64,
) -> f64 {
    let Some(base_stop) = context.and_then(StopContext::complete_base) else {
        return setup.stop_price;
    };
    let mid = setup.entry_mid();
    let scale = clamp_scale(stop_scale, STOP_SCALE_BOUNDS);
    let risk = (mid - base_stop).abs().max(MIN_RECOMPUTED_RISK);
    let scaled = (risk * scale).max(MIN_RECOMPUTED_RISK);
    round_dp(mid - setup.direction.sign() * scaled, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::setup::fixtures::{bearish_setup, bullish_setup};

    #[test]
    fn identity_returns_input_unchanged() {
        let setup = bullish_setup();
        let adjusted = apply_geometry(&setup, GeometryAdjustment::new(1.00005, 0.99995, 1.0));
        assert_eq!(adjusted, setup);
        assert!(adjusted.risk_anchor_stop.is_none());
    }

    #[test]
    fn non_finite_scales_act_as_identity() {
        let setup = bullish_setup();
        let adj = GeometryAdjustment::new(f64::NAN, f64::INFINITY, 1.0);
        assert!(adj.is_identity());
        assert_eq!(apply_geometry(&setup, adj), setup);
    }

    #[test]
    fn scales_are_clamped_into_bounds() {
        let adj = GeometryAdjustment::new(0.1, 9.0, 3.0).clamped();
        assert_eq!(adj.stop_scale, 0.5);
        assert_eq!(adj.target1_scale, 2.0);
        assert_eq!(adj.target2_scale, 2.5);
    }

    #[test]
    fn bullish_distances_scale_around_mid() {
        // mid 100.5, stop distance 2.5, t1 distance 2.5, t2 distance 4.5
        let adjusted = apply_geometry(&bullish_setup(), GeometryAdjustment::new(1.2, 0.8, 1.1));
        assert_eq!(adjusted.stop_price, 97.5);
        assert_eq!(adjusted.target1_price, 102.5);
        assert_eq!(adjusted.target2_price, Some(105.45));
        assert_eq!(adjusted.risk_anchor_stop, Some(98.0));
    }

    #[test]
    fn bearish_prices_mirror() {
        // mid 100.5, stop distance 2.5, t1 distance 2.5, t2 distance 4.5
        let adjusted = apply_geometry(&bearish_setup(), GeometryAdjustment::new(0.8, 1.2, 1.0));
        assert_eq!(adjusted.stop_price, 102.5);
        assert_eq!(adjusted.target1_price, 97.5);
        assert_eq!(adjusted.target2_price, Some(96.0));
    }

    #[test]
    fn missing_target2_is_synthesized() {
        let mut setup = bullish_setup();
        setup.target2_price = None;
        let adjusted = apply_geometry(&setup, GeometryAdjustment::new(1.0, 1.0, 1.1));
        // t2 base = 2.5 * 1.8 = 4.5, scaled 4.95
        assert_eq!(adjusted.target2_price, Some(105.45));
    }

    #[test]
    fn target2_stays_beyond_target1() {
        let mut setup = bullish_setup();
        setup.target2_price = Some(103.0);
        let adjusted = apply_geometry(&setup, GeometryAdjustment::new(1.0, 2.0, 0.5));
        // scaled t1 = 5.0, t2 floored at 5.1
        assert_eq!(adjusted.target1_price, 105.5);
        assert_eq!(adjusted.target2_price, Some(105.6));
    }

    #[test]
    fn tiny_distances_are_floored() {
        let mut setup = bullish_setup();
        setup.stop_price = 100.45;
        setup.target1_price = 100.55;
        let adjusted = apply_geometry(&setup, GeometryAdjustment::new(0.5, 0.5, 1.0));
        assert_eq!(adjusted.stop_price, 100.25);
        assert_eq!(adjusted.target1_price, 100.75);
    }

    #[test]
    fn repeated_adjustment_keeps_first_anchor() {
        let once = apply_geometry(&bullish_setup(), GeometryAdjustment::new(1.2, 1.0, 1.0));
        let twice = apply_geometry(&once, GeometryAdjustment::new(0.9, 1.0, 1.0));
        assert_eq!(twice.risk_anchor_stop, Some(98.0));
    }

    #[test]
    fn recompute_without_context_keeps_persisted_stop() {
        let setup = bullish_setup();
        assert_eq!(recompute_stop(&setup, None, 1.5), 98.0);
        let partial = StopContext {
            version: None,
            base_stop: Some(97.0),
        };
        assert_eq!(recompute_stop(&setup, Some(&partial), 1.5), 98.0);
    }

    #[test]
    fn recompute_scales_from_base_stop() {
        let setup = bullish_setup();
        let context = StopContext::new(2, 99.5);
        // risk 1.0 * 1.5 = 1.5 below mid 100.5
        assert_eq!(recompute_stop(&setup, Some(&context), 1.5), 99.0);
        let bearish = bearish_setup();
        let context = StopContext::new(2, 100.6);
        // risk floored at 0.35
        assert_eq!(recompute_stop(&bearish, Some(&context), 1.0), 100.85);
    }
}
