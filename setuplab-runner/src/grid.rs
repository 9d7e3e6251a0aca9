//! Candidate grid: the configuration space searched for each setup family.
//!
//! Trend families (pullbacks and opening-range breakouts) run further, so
//! their grid searches narrower first targets and lets target 2 tighten.
//! Mean-reversion families search a wider stop instead.

use serde::{Deserialize, Serialize};
use setuplab_core::{round_dp, GeometryAdjustment};
use std::fmt;
use std::str::FromStr;

/// Setup families the sweep knows how to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupFamily {
    FadeAtWall,
    MeanReversion,
    TrendPullback,
    OrbBreakout,
}

impl SetupFamily {
    pub const ALL: [SetupFamily; 4] = [
        SetupFamily::FadeAtWall,
        SetupFamily::MeanReversion,
        SetupFamily::TrendPullback,
        SetupFamily::OrbBreakout,
    ];

    /// The `setup_type` tag carried by setups of this family.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FadeAtWall => "fade_at_wall",
            Self::MeanReversion => "mean_reversion",
            Self::TrendPullback => "trend_pullback",
            Self::OrbBreakout => "orb_breakout",
        }
    }

    pub fn is_trend(self) -> bool {
        matches!(self, Self::TrendPullback | Self::OrbBreakout)
    }
}

impl fmt::Display for SetupFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SetupFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|family| family.as_str() == s)
            .ok_or_else(|| format!("unknown setup family '{s}'"))
    }
}

/// One point in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub geometry: GeometryAdjustment,
    pub partial_at_t1_pct: f64,
    pub move_stop_to_breakeven: bool,
    pub label: String,
}

pub const BASELINE_LABEL_PREFIX: &str = "baseline|";

impl CandidateConfig {
    pub fn is_baseline(&self) -> bool {
        self.label.starts_with(BASELINE_LABEL_PREFIX)
    }
}

/// Axis values for one family.
#[derive(Debug, Clone, PartialEq)]
pub struct GridAxes {
    pub stop_scales: Vec<f64>,
    pub target1_scales: Vec<f64>,
    pub target2_scales: Vec<f64>,
    pub partials: Vec<f64>,
    pub breakeven: Vec<bool>,
}

impl GridAxes {
    pub fn for_family(family: SetupFamily, baseline_partial: f64, fast_mode: bool) -> Self {
        const NARROW: [f64; 3] = [0.95, 1.0, 1.05];
        let trend = family.is_trend();
        let (stop, t1, t2): (&[f64], &[f64], &[f64]) = if fast_mode {
            (&NARROW, &NARROW, &NARROW)
        } else if trend {
            (&[0.95, 1.0, 1.05], &[0.9, 1.0, 1.1], &[0.85, 0.95, 1.0, 1.05])
        } else {
            (&[0.9, 1.0, 1.1], &[0.95, 1.0, 1.05], &[0.9, 1.0, 1.1])
        };

        let baseline = round_dp(baseline_partial, 2);
        let mut partials = if trend {
            vec![0.5, 0.6, baseline, 0.7]
        } else {
            vec![0.6, baseline, 0.75]
        };
        partials.sort_by(f64::total_cmp);
        partials.dedup();

        Self {
            stop_scales: stop.to_vec(),
            target1_scales: t1.to_vec(),
            target2_scales: t2.to_vec(),
            partials,
            breakeven: if fast_mode { vec![true] } else { vec![true, false] },
        }
    }

    /// Number of cartesian entries, excluding the baseline.
    pub fn size(&self) -> usize {
        self.stop_scales.len()
            * self.target1_scales.len()
            * self.target2_scales.len()
            * self.partials.len()
            * self.breakeven.len()
    }
}

/// Baseline entry followed by the full cartesian grid for a family.
pub fn candidate_grid(
    family: SetupFamily,
    baseline_partial: f64,
    fast_mode: bool,
) -> Vec<CandidateConfig> {
    let axes = GridAxes::for_family(family, baseline_partial, fast_mode);
    let baseline = round_dp(baseline_partial, 2);

    let mut configs = Vec::with_capacity(axes.size() + 1);
    configs.push(CandidateConfig {
        geometry: GeometryAdjustment::IDENTITY,
        partial_at_t1_pct: baseline,
        move_stop_to_breakeven: true,
        label: format!("{BASELINE_LABEL_PREFIX}partial={baseline}|be=true"),
    });

    for &stop in &axes.stop_scales {
        for &t1 in &axes.target1_scales {
            for &t2 in &axes.target2_scales {
                for &partial in &axes.partials {
                    for &be in &axes.breakeven {
                        configs.push(CandidateConfig {
                            geometry: GeometryAdjustment::new(stop, t1, t2),
                            partial_at_t1_pct: partial,
                            move_stop_to_breakeven: be,
                            label: format!(
                                "stop={stop}|t1={t1}|t2={t2}|partial={partial}|be={be}"
                            ),
                        });
                    }
                }
            }
        }
    }
    configs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_parses_from_setup_type() {
        assert_eq!("orb_breakout".parse::<SetupFamily>().unwrap(), SetupFamily::OrbBreakout);
        assert!("breakout".parse::<SetupFamily>().is_err());
        assert!(SetupFamily::TrendPullback.is_trend());
        assert!(!SetupFamily::FadeAtWall.is_trend());
    }

    #[test]
    fn baseline_comes_first() {
        let grid = candidate_grid(SetupFamily::FadeAtWall, 0.65, false);
        assert!(grid[0].is_baseline());
        assert_eq!(grid[0].label, "baseline|partial=0.65|be=true");
        assert_eq!(grid[0].geometry, GeometryAdjustment::IDENTITY);
        assert_eq!(grid.iter().filter(|c| c.is_baseline()).count(), 1);
    }

    #[test]
    fn trend_grid_size() {
        // 3 stop * 3 t1 * 4 t2 * 4 partials * 2 breakeven + baseline
        let grid = candidate_grid(SetupFamily::TrendPullback, 0.65, false);
        assert_eq!(grid.len(), 3 * 3 * 4 * 4 * 2 + 1);
    }

    #[test]
    fn partials_are_deduplicated_and_sorted() {
        let axes = GridAxes::for_family(SetupFamily::MeanReversion, 0.6, false);
        assert_eq!(axes.partials, vec![0.6, 0.75]);
        let axes = GridAxes::for_family(SetupFamily::OrbBreakout, 0.654, false);
        assert_eq!(axes.partials, vec![0.5, 0.6, 0.65, 0.7]);
    }

    #[test]
    fn fast_mode_collapses_axes() {
        let axes = GridAxes::for_family(SetupFamily::TrendPullback, 0.5, true);
        assert_eq!(axes.stop_scales, vec![0.95, 1.0, 1.05]);
        assert_eq!(axes.target2_scales, vec![0.95, 1.0, 1.05]);
        assert_eq!(axes.breakeven, vec![true]);
        // partials 0.5, 0.6, 0.7
        assert_eq!(candidate_grid(SetupFamily::TrendPullback, 0.5, true).len(), 27 * 3 + 1);
    }

    #[test]
    fn labels_are_unique_and_formatted() {
        let grid = candidate_grid(SetupFamily::MeanReversion, 0.5, false);
        let mut labels: Vec<_> = grid.iter().map(|c| c.label.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), grid.len());
        assert!(grid.iter().any(|c| c.label == "stop=0.9|t1=1|t2=1.1|partial=0.75|be=false"));
    }
}
