//! Optimizer profile: the persisted tuning a backtest runs under.
//!
//! Holds per-key geometry, trade management, paused setup types and combos,
//! and the objective weights. A sweep writes its improved families back with
//! [`OptimizerProfile::apply_sweep`].
//!
//! Geometry keys are looked up most specific first:
//! `type|regime|bucket`, `type|regime`, `type|bucket`, `type`. A missing
//! regime is spelled `unknown`.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};
use setuplab_core::{GeometryAdjustment, SetupCandidate, TradeManagement};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::RunnerConfig;
use crate::intake::SetupFilter;
use crate::metrics::ObjectiveWeights;
use crate::sweep::SweepReport;

/// 09:30 in minutes after midnight.
const SESSION_OPEN_MINUTE_ET: i64 = 9 * 60 + 30;
const OPENING_BUCKET_END: i64 = 90;
const MIDDAY_BUCKET_END: i64 = 240;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profile JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Part of the session a setup was first seen in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    Opening,
    Midday,
    Late,
}

impl TimeBucket {
    /// Up to 90 minutes after the New York open is `opening`, up to 240 is
    /// `midday`, later is `late`. Unknown times count as `midday`.
    pub fn for_first_seen(first_seen_at: Option<DateTime<Utc>>) -> Self {
        let Some(at) = first_seen_at else {
            return Self::Midday;
        };
        let et = at.with_timezone(&New_York);
        let minute_of_day = i64::from(et.hour() * 60 + et.minute());
        let since_open = (minute_of_day - SESSION_OPEN_MINUTE_ET).max(0);
        if since_open <= OPENING_BUCKET_END {
            Self::Opening
        } else if since_open <= MIDDAY_BUCKET_END {
            Self::Midday
        } else {
            Self::Late
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Midday => "midday",
            Self::Late => "late",
        }
    }
}

/// Lookup keys for a setup, most specific first.
pub fn geometry_keys(setup: &SetupCandidate) -> [String; 4] {
    let kind = &setup.setup_type;
    let regime = setup.regime.as_deref().unwrap_or("unknown");
    let bucket = TimeBucket::for_first_seen(setup.first_seen_at).as_str();
    [
        format!("{kind}|{regime}|{bucket}"),
        format!("{kind}|{regime}"),
        format!("{kind}|{bucket}"),
        kind.clone(),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerProfile {
    /// Applied to setups whose type has no entry below and no override of
    /// their own.
    pub trade_management: TradeManagement,
    pub trade_management_by_setup_type: BTreeMap<String, TradeManagement>,
    pub geometry: BTreeMap<String, GeometryAdjustment>,
    pub paused_setup_types: BTreeSet<String>,
    /// `setup_type|regime` keys.
    pub paused_combos: BTreeSet<String>,
    pub objective_weights: ObjectiveWeights,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for OptimizerProfile {
    fn default() -> Self {
        Self {
            trade_management: TradeManagement::new(0.65, true),
            trade_management_by_setup_type: BTreeMap::new(),
            geometry: BTreeMap::new(),
            paused_setup_types: BTreeSet::new(),
            paused_combos: BTreeSet::new(),
            objective_weights: ObjectiveWeights::default(),
            updated_at: None,
        }
    }
}

impl OptimizerProfile {
    pub fn from_file(path: &Path) -> Result<Self, ProfileError> {
        let content = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ProfileError> {
        Ok(serde_json::from_str(content)?)
    }

    /// First matching geometry entry and the key it was found under.
    pub fn geometry_for(&self, setup: &SetupCandidate) -> Option<(String, GeometryAdjustment)> {
        geometry_keys(setup)
            .into_iter()
            .find_map(|key| self.geometry.get(&key).map(|adj| (key.clone(), *adj)))
    }

    pub fn trade_management_for(&self, setup: &SetupCandidate) -> TradeManagement {
        self.trade_management_by_setup_type
            .get(&setup.setup_type)
            .copied()
            .unwrap_or(self.trade_management)
    }

    /// `base` with this profile's paused types and combos added.
    pub fn setup_filter(&self, base: &SetupFilter) -> SetupFilter {
        let mut filter = base.clone();
        filter
            .paused_setup_types
            .extend(self.paused_setup_types.iter().cloned());
        filter.paused_combos.extend(self.paused_combos.iter().cloned());
        filter
    }

    /// Fold the profile into a run config: filter, objective weights, and
    /// the sweep's baseline partial when the config leaves it unset.
    pub fn configure(&self, config: &mut RunnerConfig) {
        config.filter = self.setup_filter(&config.filter);
        config.objective_weights = self.objective_weights;
        config
            .sweep
            .baseline_partial
            .get_or_insert(self.trade_management.partial_at_t1_pct);
    }

    /// Write each improved family's winning geometry and trade management
    /// into the profile. Returns one note per family updated.
    pub fn apply_sweep(&mut self, report: &SweepReport, at: DateTime<Utc>) -> Vec<String> {
        let mut notes = Vec::new();
        for result in report.improved_families() {
            let key = result.family.as_str().to_string();
            let best = &result.best.config;
            self.geometry.insert(key.clone(), best.geometry);
            self.trade_management_by_setup_type.insert(
                key.clone(),
                TradeManagement::new(best.partial_at_t1_pct, best.move_stop_to_breakeven),
            );
            notes.push(format!(
                "Updated {key} to {} (conservative score {:+}).",
                best.label, result.delta.objective_conservative
            ));
        }
        if !notes.is_empty() {
            self.updated_at = Some(at);
        }
        notes
    }
}
