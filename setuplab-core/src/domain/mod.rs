//! Domain types for setup evaluation.

pub mod bar;
pub mod outcome;
pub mod setup;

pub use bar::PriceBar;
pub use outcome::{EvaluatedOutcome, FinalOutcome, SetupEvaluation};
pub use setup::{Direction, GateStatus, SetupCandidate, TradeManagement};

/// Round to a fixed number of decimal places.
///
/// Prices are reported at 2 places, R multiples and geometry at 4, so results
/// are reproducible across platforms.
pub fn round_dp(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_dp_rounds_half_away_from_zero() {
        assert_eq!(round_dp(1.23456, 4), 1.2346);
        assert_eq!(round_dp(-0.125, 2), -0.13);
        assert_eq!(round_dp(2.0, 2), 2.0);
    }
}
