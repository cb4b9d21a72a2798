//! # ETF Rotation
//!
//! Momentum/volatility ETF rotation: rank a universe of funds, hold a capped
//! slice of the best ones and rebalance toward them sell-first.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `error`: Library error types
//! - `indicators`: Rate of change, volatility and rolling bar history
//! - `strategy`: Scoring, target selection, rebalancing and the cycle driver
//! - `broker`: Execution seam and the simulated broker
//! - `backtest`: Historical backtesting and parameter optimization
//! - `utils`: Shared utilities and decimal arithmetic

pub mod backtest;
pub mod broker;
pub mod config;
pub mod error;
pub mod indicators;
pub mod strategy;
pub mod utils;

pub use config::Config;
