//! Setup intake: loose rows in, typed and filtered candidates out.
//!
//! Rows arrive from exports where prices may be numbers or numeric strings
//! and any field may be missing. Conversion never fails the batch:
//! 1. Rows without an id, a session date, a direction, or a finite entry
//!    zone, stop, and target 1 are counted as malformed and dropped
//! 2. Trade management is kept only when both of its fields are valid
//! 3. The `SetupFilter` drops gate-blocked, hidden-tier, paused-type, and
//!    paused-combo setups, each with its own counter and note

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use setuplab_core::{Direction, GateStatus, SetupCandidate, TradeManagement};
use std::collections::BTreeSet;

/// Tier value that marks a setup as not shown to traders.
pub const HIDDEN_TIER: &str = "hidden";

/// A number that may have been exported as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseNumber {
    Number(f64),
    Text(String),
}

impl LooseNumber {
    pub fn to_finite(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

fn finite(value: &Option<LooseNumber>) -> Option<f64> {
    value.as_ref().and_then(LooseNumber::to_finite)
}

/// One setup as exported, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupRow {
    #[serde(alias = "engine_setup_id")]
    pub id: Option<String>,
    pub session_date: Option<String>,
    pub setup_type: Option<String>,
    pub direction: Option<String>,
    pub regime: Option<String>,
    pub tier: Option<String>,
    pub gate_status: Option<String>,
    #[serde(alias = "entry_zone_low")]
    pub entry_low: Option<LooseNumber>,
    #[serde(alias = "entry_zone_high")]
    pub entry_high: Option<LooseNumber>,
    pub stop_price: Option<LooseNumber>,
    #[serde(alias = "target_1_price")]
    pub target1_price: Option<LooseNumber>,
    #[serde(alias = "target_2_price")]
    pub target2_price: Option<LooseNumber>,
    pub first_seen_at: Option<String>,
    pub triggered_at: Option<String>,
    pub trade_management: Option<serde_json::Value>,
}

fn parse_timestamp(value: &Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Both fields must be present and well-typed; anything else means no override.
fn parse_trade_management(value: &serde_json::Value) -> Option<TradeManagement> {
    let object = value.as_object()?;
    let partial = match object.get("partial_at_t1_pct")? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|p| p.is_finite())?;
    let breakeven = object.get("move_stop_to_breakeven")?.as_bool()?;
    Some(TradeManagement::new(partial, breakeven))
}

impl SetupRow {
    /// Typed candidate, or `None` when a required field is missing or invalid.
    pub fn to_candidate(&self) -> Option<SetupCandidate> {
        let id = non_empty(&self.id)?;
        let session_date = NaiveDate::parse_from_str(non_empty(&self.session_date)?, "%Y-%m-%d").ok()?;
        let direction: Direction = non_empty(&self.direction)?.parse().ok()?;
        let gate_status = match non_empty(&self.gate_status) {
            Some("blocked") => Some(GateStatus::Blocked),
            Some("eligible") => Some(GateStatus::Eligible),
            _ => None,
        };

        let candidate = SetupCandidate {
            id: id.to_string(),
            session_date,
            setup_type: non_empty(&self.setup_type).unwrap_or("unknown").to_string(),
            direction,
            regime: non_empty(&self.regime).map(str::to_string),
            tier: non_empty(&self.tier).map(str::to_string),
            gate_status,
            entry_low: finite(&self.entry_low)?,
            entry_high: finite(&self.entry_high)?,
            stop_price: finite(&self.stop_price)?,
            target1_price: finite(&self.target1_price)?,
            target2_price: finite(&self.target2_price),
            first_seen_at: parse_timestamp(&self.first_seen_at),
            triggered_at: parse_timestamp(&self.triggered_at),
            trade_management: self.trade_management.as_ref().and_then(parse_trade_management),
            risk_anchor_stop: None,
        };
        Some(candidate)
    }
}

/// Which setups take part in a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupFilter {
    pub include_blocked: bool,
    pub include_hidden_tiers: bool,
    pub include_paused: bool,
    pub paused_setup_types: BTreeSet<String>,
    /// `setup_type|regime` keys.
    pub paused_combos: BTreeSet<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Why a well-formed setup was left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OutsideRange,
    Blocked,
    HiddenTier,
    PausedSetupType,
    PausedCombo,
}

impl SetupFilter {
    pub fn check(&self, setup: &SetupCandidate) -> Result<(), SkipReason> {
        if self.from.is_some_and(|from| setup.session_date < from)
            || self.to.is_some_and(|to| setup.session_date > to)
        {
            return Err(SkipReason::OutsideRange);
        }
        if !self.include_blocked && setup.gate_status == Some(GateStatus::Blocked) {
            return Err(SkipReason::Blocked);
        }
        if !self.include_hidden_tiers && setup.tier.as_deref() == Some(HIDDEN_TIER) {
            return Err(SkipReason::HiddenTier);
        }
        if self.include_paused {
            return Ok(());
        }
        if self.paused_setup_types.contains(&setup.setup_type) {
            return Err(SkipReason::PausedSetupType);
        }
        if setup
            .combo_key()
            .is_some_and(|key| self.paused_combos.contains(&key))
        {
            return Err(SkipReason::PausedCombo);
        }
        Ok(())
    }
}

/// Setups admitted for a run plus what was dropped on the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntakeReport {
    pub setups: Vec<SetupCandidate>,
    pub malformed: usize,
    pub outside_range: usize,
    pub blocked: usize,
    pub hidden: usize,
    pub paused_setup_type: usize,
    pub paused_combo: usize,
    pub notes: Vec<String>,
}

impl IntakeReport {
    fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::OutsideRange => self.outside_range += 1,
            SkipReason::Blocked => self.blocked += 1,
            SkipReason::HiddenTier => self.hidden += 1,
            SkipReason::PausedSetupType => self.paused_setup_type += 1,
            SkipReason::PausedCombo => self.paused_combo += 1,
        }
    }

    fn write_notes(&mut self) {
        let counted = [
            (self.malformed, "malformed setup rows"),
            (self.blocked, "gate-blocked setups (non-actionable)"),
            (self.hidden, "hidden-tier setups (non-actionable)"),
            (self.paused_setup_type, "paused-setup-type setups via optimizer profile"),
            (self.paused_combo, "paused setup/regime combo setups via optimizer profile"),
        ];
        for (count, what) in counted {
            if count > 0 {
                self.notes.push(format!("Skipped {count} {what}."));
            }
        }
    }
}

/// Apply `filter` to already-typed setups.
pub fn filter_setups<I>(setups: I, filter: &SetupFilter) -> IntakeReport
where
    I: IntoIterator<Item = SetupCandidate>,
{
    let mut report = IntakeReport::default();
    for setup in setups {
        if !setup.has_finite_prices() {
            report.malformed += 1;
            continue;
        }
        match filter.check(&setup) {
            Ok(()) => report.setups.push(setup),
            Err(reason) => report.record(reason),
        }
    }
    report.write_notes();
    report
}

/// Convert loose rows and apply `filter`.
pub fn intake_rows(rows: &[SetupRow], filter: &SetupFilter) -> IntakeReport {
    let candidates: Vec<SetupCandidate> = rows.iter().filter_map(SetupRow::to_candidate).collect();
    let malformed = rows.len() - candidates.len();
    let mut report = filter_setups(candidates, filter);
    if malformed > 0 {
        report.malformed += malformed;
        report.notes.clear();
        report.write_notes();
    }
    report
}
