//! Setup evaluation engine: bar scan, state record, realized R.
//!
//! For one setup and one session of bars the engine:
//!
//! 1. Skips bars before the setup was first seen and bars with non-finite prices
//! 2. Expands each bar into an intrabar path and scans it for the entry trigger
//! 3. After trigger, checks stop and targets on every point and segment
//! 4. Closes out unresolved trades at the last observed bar and prices the result in R

pub mod classifier;
pub mod realized_r;
pub mod state;

pub use classifier::{evaluate_setup, evaluate_setup_with_policy, EvaluationOptions};
pub use realized_r::{realized_r, TradeLegs, MIN_RISK_UNIT};
pub use state::EvalState;
