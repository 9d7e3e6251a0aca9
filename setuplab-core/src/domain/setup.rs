//! SetupCandidate: a proposed directional trade with entry zone, stop, and targets.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    /// +1 for bullish, -1 for bearish.
    pub fn sign(self) -> f64 {
        match self {
            Self::Bullish => 1.0,
            Self::Bearish => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bullish" => Ok(Self::Bullish),
            "bearish" => Ok(Self::Bearish),
            other => Err(format!("invalid direction '{other}'")),
        }
    }
}

/// Upstream gate decision recorded on the setup when it was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Eligible,
    Blocked,
}

/// Per-setup trade-management override.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeManagement {
    /// Fraction of the position closed at target 1, in `[0, 1]`.
    pub partial_at_t1_pct: f64,
    /// Move the stop to the entry fill once target 1 is hit.
    pub move_stop_to_breakeven: bool,
}

impl TradeManagement {
    pub fn new(partial_at_t1_pct: f64, move_stop_to_breakeven: bool) -> Self {
        Self {
            partial_at_t1_pct: partial_at_t1_pct.clamp(0.0, 1.0),
            move_stop_to_breakeven,
        }
    }
}

/// A setup to be evaluated against a session's bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupCandidate {
    pub id: String,
    pub session_date: NaiveDate,
    pub setup_type: String,
    pub direction: Direction,
    #[serde(default)]
    pub regime: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub gate_status: Option<GateStatus>,
    pub entry_low: f64,
    pub entry_high: f64,
    pub stop_price: f64,
    pub target1_price: f64,
    #[serde(default)]
    pub target2_price: Option<f64>,
    #[serde(default)]
    pub first_seen_at: Option<DateTime<Utc>>,
    /// Trigger time persisted by the live tracker. Ignored unless the
    /// evaluation explicitly asks to respect it.
    #[serde(default)]
    pub triggered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trade_management: Option<TradeManagement>,
    /// Persisted stop that defines 1R once the geometry has been rescaled.
    #[serde(default)]
    pub risk_anchor_stop: Option<f64>,
}

impl SetupCandidate {
    /// Midpoint of the entry zone.
    pub fn entry_mid(&self) -> f64 {
        (self.entry_low + self.entry_high) / 2.0
    }

    /// Entry zone as `(low, high)` regardless of the order it was recorded in.
    pub fn entry_zone(&self) -> (f64, f64) {
        (
            self.entry_low.min(self.entry_high),
            self.entry_low.max(self.entry_high),
        )
    }

    /// Stop used as the 1R reference for realized R.
    pub fn risk_stop(&self) -> f64 {
        self.risk_anchor_stop.unwrap_or(self.stop_price)
    }

    /// `setup_type|regime`, the key used by paused-combo lists.
    pub fn combo_key(&self) -> Option<String> {
        self.regime
            .as_deref()
            .map(|regime| format!("{}|{}", self.setup_type, regime))
    }

    /// True when every price field is finite.
    pub fn has_finite_prices(&self) -> bool {
        self.entry_low.is_finite()
            && self.entry_high.is_finite()
            && self.stop_price.is_finite()
            && self.target1_price.is_finite()
            && self.target2_price.map_or(true, f64::is_finite)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn direction_sign_and_parse() {
        assert_eq!(Direction::Bullish.sign(), 1.0);
        assert_eq!(Direction::Bearish.sign(), -1.0);
        assert_eq!("bearish".parse::<Direction>().unwrap(), Direction::Bearish);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn entry_zone_normalizes_order() {
        let mut setup = bullish_setup();
        setup.entry_low = 101.0;
        setup.entry_high = 100.0;
        assert_eq!(setup.entry_zone(), (100.0, 101.0));
        assert_eq!(setup.entry_mid(), 100.5);
    }

    #[test]
    fn risk_stop_prefers_anchor() {
        let mut setup = bullish_setup();
        assert_eq!(setup.risk_stop(), 98.0);
        setup.risk_anchor_stop = Some(97.5);
        assert_eq!(setup.risk_stop(), 97.5);
    }

    #[test]
    fn combo_key_requires_regime() {
        let mut setup = bullish_setup();
        assert_eq!(setup.combo_key().as_deref(), Some("trend_pullback|trending"));
        setup.regime = None;
        assert!(setup.combo_key().is_none());
    }

    #[test]
    fn trade_management_clamps_partial() {
        assert_eq!(TradeManagement::new(1.4, true).partial_at_t1_pct, 1.0);
        assert_eq!(TradeManagement::new(-0.2, false).partial_at_t1_pct, 0.0);
    }

    #[test]
    fn setup_deserializes_with_optional_fields_absent() {
        let json = r#"{
            "id": "a",
            "session_date": "2024-03-01",
            "setup_type": "orb_breakout",
            "direction": "bullish",
            "entry_low": 1.0,
            "entry_high": 2.0,
            "stop_price": 0.5,
            "target1_price": 3.0
        }"#;
        let setup: SetupCandidate = serde_json::from_str(json).unwrap();
        assert!(setup.target2_price.is_none());
        assert!(setup.trade_management.is_none());
        assert!(setup.has_finite_prices());
    }
}
