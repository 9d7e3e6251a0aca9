//! Shared fixtures for unit tests.

use chrono::{NaiveDate, TimeZone, Utc};
use setuplab_core::{Direction, PriceBar, SetupCandidate};

pub fn session(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

/// Bullish setup on 2024-03-`day`: zone 100..101, stop 98, targets 103/105.
pub fn setup(id: &str, setup_type: &str, day: u32) -> SetupCandidate {
    SetupCandidate {
        id: id.into(),
        session_date: session(day),
        setup_type: setup_type.into(),
        direction: Direction::Bullish,
        regime: None,
        tier: None,
        gate_status: None,
        entry_low: 100.0,
        entry_high: 101.0,
        stop_price: 98.0,
        target1_price: 103.0,
        target2_price: Some(105.0),
        first_seen_at: None,
        triggered_at: None,
        trade_management: None,
        risk_anchor_stop: None,
    }
}

/// Epoch milliseconds for `hour:minute` UTC on 2024-03-`day`.
pub fn ts(day: u32, hour: u32, minute: u32) -> i64 {
    Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0)
        .unwrap()
        .timestamp_millis()
}

/// Session that triggers in the zone, then rallies through both targets.
pub fn winning_bars(day: u32) -> Vec<PriceBar> {
    vec![
        PriceBar::new(ts(day, 14, 30), 102.0, 102.0, 100.5, 100.8),
        PriceBar::new(ts(day, 14, 31), 100.8, 103.5, 100.6, 103.2),
        PriceBar::new(ts(day, 14, 32), 103.2, 105.5, 103.0, 105.2),
    ]
}

/// Session that triggers in the zone, then falls through the stop.
pub fn losing_bars(day: u32) -> Vec<PriceBar> {
    vec![
        PriceBar::new(ts(day, 14, 30), 102.0, 102.0, 100.5, 100.8),
        PriceBar::new(ts(day, 14, 31), 100.8, 101.0, 97.5, 97.8),
    ]
}
