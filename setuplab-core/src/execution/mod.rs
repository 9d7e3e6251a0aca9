//! Execution model: how a setup's levels are tested against bars.
//!
//! Key concepts:
//! - **Path policies**: the assumed intrabar order of open, high, low, close
//! - **Triggers**: where a path segment enters the entry zone
//! - **Cost model**: point slippage and per-trade commission in R

pub mod cost_model;
pub mod path_policy;
pub mod trigger;

pub use cost_model::{EffectiveLevels, ExecutionModel, ResolvedExecution};
pub use path_policy::{bar_path, BarPath, CloseDirection, FixedOrder, PathPolicy};
pub use trigger::entry_trigger_price;
