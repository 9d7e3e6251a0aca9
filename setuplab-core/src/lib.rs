//! SetupLab Core: setup geometry, bar-path outcome classification, realized R.
//!
//! This crate holds the pure, allocation-light part of the evaluator:
//! - Domain types (setups, bars, evaluated outcomes)
//! - Geometry adjuster that rescales stop and target distances
//! - Execution model with point slippage and per-trade commission in R
//! - Bar-path classifier folded over an explicit evaluation state
//!
//! Nothing here performs I/O or holds global state; every function is safe to
//! call from many threads at once.

pub mod domain;
pub mod engine;
pub mod execution;
pub mod geometry;

pub use domain::{
    round_dp, Direction, EvaluatedOutcome, FinalOutcome, GateStatus, PriceBar, SetupCandidate,
    SetupEvaluation, TradeManagement,
};
pub use engine::{evaluate_setup, EvaluationOptions};
pub use execution::ExecutionModel;
pub use geometry::{apply_geometry, recompute_stop, GeometryAdjustment, StopContext};
