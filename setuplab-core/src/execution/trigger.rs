//! Trigger and crossing detection on a single path segment.
//!
//! A segment runs from `start` to `end`. A level counts as crossed when the
//! segment leaves the level's losing side and reaches or passes it.

use crate::domain::Direction;

/// Price at which a segment enters the entry zone, if it does.
///
/// A start inside the zone triggers at the start. Otherwise the trigger is
/// the boundary crossed first: `zone_low` from below, `zone_high` from above.
pub fn entry_trigger_price(start: f64, end: f64, zone_low: f64, zone_high: f64) -> Option<f64> {
    if start >= zone_low && start <= zone_high {
        return Some(start);
    }
    if start == end {
        return None;
    }
    if start < zone_low && end >= zone_low {
        return Some(zone_low);
    }
    if start > zone_high && end <= zone_high {
        return Some(zone_high);
    }
    None
}

/// True when a segment moving in the trade's favour reaches `target`.
pub fn crosses_target(start: f64, end: f64, target: f64, direction: Direction) -> bool {
    match direction {
        Direction::Bullish => end > start && target > start && target <= end,
        Direction::Bearish => end < start && target < start && target >= end,
    }
}

/// True when a segment moving against the trade reaches `stop`.
pub fn crosses_stop(start: f64, end: f64, stop: f64, direction: Direction) -> bool {
    match direction {
        Direction::Bullish => end < start && start > stop && end <= stop,
        Direction::Bearish => end > start && start < stop && end >= stop,
    }
}

/// True when a single price is at or beyond `target`.
pub fn at_or_beyond_target(price: f64, target: f64, direction: Direction) -> bool {
    match direction {
        Direction::Bullish => price >= target,
        Direction::Bearish => price <= target,
    }
}

/// True when a single price is at or beyond `stop`.
pub fn at_or_beyond_stop(price: f64, stop: f64, direction: Direction) -> bool {
    match direction {
        Direction::Bullish => price <= stop,
        Direction::Bearish => price >= stop,
    }
}
