//! Path policies: resolve the order in which a bar visited its extremes.
//!
//! A bar only reports open, high, low, and close. Whether the high or the low
//! came first decides whether a stop or a target was touched first, so every
//! bar is expanded into a four-point path and walked segment by segment.

use crate::domain::PriceBar;

/// Sequence of prices a bar is assumed to have traded through.
pub type BarPath = [f64; 4];

/// Determines the intrabar price path for a bar.
pub trait PathPolicy: Send + Sync {
    fn path(&self, bar: &PriceBar) -> BarPath;

    /// Name of this policy (for logging/debugging)
    fn name(&self) -> &str;
}

/// Close-direction heuristic: up bars go O → L → H → C, down bars O → H → L → C.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloseDirection;

impl PathPolicy for CloseDirection {
    fn path(&self, bar: &PriceBar) -> BarPath {
        bar_path(bar)
    }

    fn name(&self) -> &str {
        "CloseDirection"
    }
}

/// Same extreme first on every bar, regardless of the close. Pairing a
/// low-first and a high-first run brackets the close-direction heuristic.
#[derive(Debug, Clone, Copy)]
pub struct FixedOrder {
    pub low_first: bool,
}

impl PathPolicy for FixedOrder {
    fn path(&self, bar: &PriceBar) -> BarPath {
        if self.low_first {
            [bar.open, bar.low, bar.high, bar.close]
        } else {
            [bar.open, bar.high, bar.low, bar.close]
        }
    }

    fn name(&self) -> &str {
        "FixedOrder"
    }
}

/// The close-direction path for a bar.
pub fn bar_path(bar: &PriceBar) -> BarPath {
    if bar.close >= bar.open {
        [bar.open, bar.low, bar.high, bar.close]
    } else {
        [bar.open, bar.high, bar.low, bar.close]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_bar_visits_low_first() {
        let bar = PriceBar::new(0, 100.0, 102.0, 99.0, 101.0);
        assert_eq!(bar_path(&bar), [100.0, 99.0, 102.0, 101.0]);
    }

    #[test]
    fn down_bar_visits_high_first() {
        let bar = PriceBar::new(0, 101.0, 102.0, 99.0, 100.0);
        assert_eq!(bar_path(&bar), [101.0, 102.0, 99.0, 100.0]);
    }

    #[test]
    fn doji_counts_as_up_bar() {
        let bar = PriceBar::new(0, 100.0, 101.0, 99.0, 100.0);
        assert_eq!(bar_path(&bar)[1], 99.0);
    }

    #[test]
    fn fixed_order_ignores_close() {
        let bar = PriceBar::new(0, 100.0, 102.0, 99.0, 101.0);
        let high_first = FixedOrder { low_first: false };
        assert_eq!(high_first.path(&bar), [100.0, 102.0, 99.0, 101.0]);
        assert_eq!(high_first.name(), "FixedOrder");
        assert_eq!(CloseDirection.path(&bar), bar_path(&bar));
    }
}
