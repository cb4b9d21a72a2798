//! ETF rotation strategy.
//!
//! Contains the core logic for:
//! - Scoring candidates by volume-blended momentum over volatility
//! - Selecting capped, score-relative target weights
//! - Planning sell-then-buy rebalances toward those weights
//! - Running a full rebalance cycle against a broker

mod allocator;
mod cycle;
mod rebalancer;
mod scorer;
mod types;

pub use allocator::{select_targets, Allocator};
pub use cycle::{CyclePhase, CycleReport, RebalanceTrigger, RejectedOrder, RotationCycle};
pub use rebalancer::{
    invalid_prices, plan, plan_buys, plan_sells, rebalance, RebalancePlan, SkippedTrade,
};
pub use scorer::{score, RejectReason, ScoreEngine};
pub use types::{InstrumentSnapshot, ScoredCandidate, TargetAllocation};
