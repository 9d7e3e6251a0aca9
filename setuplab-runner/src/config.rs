//! Serializable run configuration.
//!
//! One `RunnerConfig` is built per invocation (from TOML or `Default`) and
//! passed by reference to the backtest and the sweep. Nothing in the library
//! reads environment variables.
//!
//! ```toml
//! [execution]
//! enabled = true
//! entry_slip_points = 0.2
//!
//! [objective_weights]
//! expectancy_r = 14.0
//!
//! [sweep]
//! min_family_samples = 8
//! families = ["fade_at_wall", "trend_pullback"]
//!
//! [backtest]
//! resolution = "auto"
//!
//! [filter]
//! paused_setup_types = ["orb_breakout"]
//! ```

use serde::{Deserialize, Serialize};
use setuplab_core::ExecutionModel;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::bar_store::Resolution;
use crate::grid::SetupFamily;
use crate::intake::SetupFilter;
use crate::metrics::ObjectiveWeights;

/// Content hash of a configuration.
pub type ConfigHash = String;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Sweep behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    /// Families with fewer admitted setups than this are skipped.
    pub min_family_samples: usize,
    /// Collapse every axis to three values and breakeven to `true`.
    pub fast_mode: bool,
    /// Evaluate grid candidates on the rayon pool.
    pub parallel: bool,
    pub families: Vec<SetupFamily>,
    /// Partial used by the baseline candidate. `None` takes it from
    /// `[execution]`.
    pub baseline_partial: Option<f64>,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            min_family_samples: 8,
            fast_mode: false,
            parallel: true,
            families: SetupFamily::ALL.to_vec(),
            baseline_partial: None,
        }
    }
}

/// Backtest behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    pub resolution: Resolution,
    /// Attach one row per evaluated setup to the summary.
    pub include_rows: bool,
    /// Use each setup's recorded trigger time instead of detecting one.
    pub respect_persisted_trigger: bool,
    /// Size of the bar fetch pool; 1 loads sessions sequentially.
    pub max_concurrent_fetches: usize,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::Auto,
            include_rows: false,
            respect_persisted_trigger: false,
            max_concurrent_fetches: 1,
        }
    }
}

/// Complete configuration for a backtest or sweep run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub execution: ExecutionModel,
    pub objective_weights: ObjectiveWeights,
    pub sweep: SweepSettings,
    pub backtest: BacktestSettings,
    pub filter: SetupFilter,
}

impl RunnerConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.execution;
        let slips = [
            ("execution.entry_slip_points", e.entry_slip_points),
            ("execution.target_slip_points", e.target_slip_points),
            ("execution.stop_slip_points", e.stop_slip_points),
            ("execution.commission_per_trade_r", e.commission_per_trade_r),
        ];
        for (name, value) in slips {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        check_fraction("execution.partial_at_t1_pct", e.partial_at_t1_pct)?;
        if let Some(partial) = self.sweep.baseline_partial {
            check_fraction("sweep.baseline_partial", partial)?;
        }

        let w = &self.objective_weights;
        if ![w.t1, w.t2, w.failure_penalty, w.expectancy_r]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(ConfigError::Invalid(
                "objective_weights must all be finite".into(),
            ));
        }

        if self.sweep.min_family_samples == 0 {
            return Err(ConfigError::Invalid(
                "sweep.min_family_samples must be at least 1".into(),
            ));
        }
        if self.backtest.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid(
                "backtest.max_concurrent_fetches must be at least 1".into(),
            ));
        }
        if let (Some(from), Some(to)) = (self.filter.from, self.filter.to) {
            if from > to {
                return Err(ConfigError::Invalid(format!(
                    "filter.from ({from}) is after filter.to ({to})"
                )));
            }
        }
        Ok(())
    }

    /// Baseline partial for the sweep grid.
    pub fn baseline_partial(&self) -> f64 {
        self.sweep
            .baseline_partial
            .unwrap_or(self.execution.partial_at_t1_pct)
    }

    /// Deterministic BLAKE3 hash of the full configuration.
    ///
    /// Two runs with identical configs get the same hash, so reports can be
    /// matched to the settings that produced them.
    pub fn config_hash(&self) -> ConfigHash {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

fn check_fraction(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        let config = RunnerConfig::from_toml("").unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.sweep.min_family_samples, 8);
        assert!(config.execution.enabled);
        assert_eq!(config.baseline_partial(), 0.5);
    }

    #[test]
    fn sections_override_defaults() {
        let config = RunnerConfig::from_toml(
            r#"
            [execution]
            enabled = false
            commission_per_trade_r = 0.1

            [objective_weights]
            expectancy_r = 20.0

            [sweep]
            fast_mode = true
            families = ["trend_pullback"]
            baseline_partial = 0.65

            [backtest]
            resolution = "minute"
            max_concurrent_fetches = 4

            [filter]
            paused_combos = ["orb_breakout|compression"]
            from = "2024-03-01"
            "#,
        )
        .unwrap();
        assert!(!config.execution.enabled);
        assert_eq!(config.execution.entry_slip_points, 0.2);
        assert_eq!(config.objective_weights.expectancy_r, 20.0);
        assert_eq!(config.objective_weights.t1, 0.62);
        assert_eq!(config.sweep.families, vec![SetupFamily::TrendPullback]);
        assert_eq!(config.baseline_partial(), 0.65);
        assert_eq!(config.backtest.resolution, Resolution::Minute);
        assert!(config.filter.paused_combos.contains("orb_breakout|compression"));
        assert!(config.filter.from.is_some());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let negative = RunnerConfig::from_toml("[execution]\nstop_slip_points = -0.1\n");
        assert!(matches!(negative, Err(ConfigError::Invalid(_))));

        let partial = RunnerConfig::from_toml("[sweep]\nbaseline_partial = 1.5\n");
        assert!(matches!(partial, Err(ConfigError::Invalid(_))));

        let samples = RunnerConfig::from_toml("[sweep]\nmin_family_samples = 0\n");
        assert!(matches!(samples, Err(ConfigError::Invalid(_))));

        let family = RunnerConfig::from_toml("[sweep]\nfamilies = [\"scalp\"]\n");
        assert!(matches!(family, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RunnerConfig::from_file(Path::new("/nonexistent/setuplab.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn config_hash_is_deterministic_and_sensitive() {
        let a = RunnerConfig::default();
        let mut b = RunnerConfig::default();
        assert_eq!(a.config_hash(), b.config_hash());
        b.sweep.fast_mode = true;
        assert_ne!(a.config_hash(), b.config_hash());
    }
}
