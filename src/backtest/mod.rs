//! Backtesting module for evaluating and tuning the rotation strategy.
//!
//! This module provides:
//! - Daily bar loading from CSV
//! - A day-by-day simulation engine driving the rebalance cycle
//! - Parameter sweep for optimization
//! - Performance metrics calculation
//!
//! # Example
//!
//! ```rust,ignore
//! use etf_rotation::backtest::{BacktestConfig, BacktestEngine, CsvBarLoader};
//!
//! let loader = CsvBarLoader::new("data/etf_daily.csv")?;
//! let mut engine = BacktestEngine::new(loader, Config::default(), BacktestConfig::default())?;
//!
//! let result = engine.run(start, end)?;
//! println!("Return: {:.2}%", result.metrics.total_return_pct);
//! ```

mod data;
mod engine;
mod metrics;
mod runner;

pub use data::{Bar, CsvBarLoader, DailyBars, DataLoader, DATE_FORMAT};
pub use engine::{BacktestEngine, BacktestResult, RankReport, StepResult};
pub use metrics::{BacktestMetrics, EquityPoint, TradeActivity, TRADING_DAYS_PER_YEAR};
pub use runner::{ParameterSpace, SweepResults, SweepRunner};

use serde::{Deserialize, Serialize};

/// Run-level options that are not strategy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Whether to return every daily equity point in the result.
    /// Metrics are computed from the full curve either way.
    pub record_equity_curve: bool,

    /// Restrict trading to these symbols. `None` trades every symbol in
    /// the data except the benchmark.
    pub universe: Option<Vec<String>>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            record_equity_curve: true,
            universe: None,
        }
    }
}

impl BacktestConfig {
    /// Whether `symbol` may be scored and traded.
    pub fn is_tradable(&self, symbol: &str, benchmark: Option<&str>) -> bool {
        if benchmark == Some(symbol) {
            return false;
        }
        match &self.universe {
            Some(universe) => universe.iter().any(|s| s == symbol),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benchmark_never_tradable() {
        let config = BacktestConfig::default();

        assert!(!config.is_tradable("510300", Some("510300")));
        assert!(config.is_tradable("512760", Some("510300")));
        assert!(config.is_tradable("510300", None));
    }

    #[test]
    fn test_universe_restricts_symbols() {
        let config = BacktestConfig {
            universe: Some(vec!["159915".to_string()]),
            ..BacktestConfig::default()
        };

        assert!(config.is_tradable("159915", None));
        assert!(!config.is_tradable("512760", None));
    }
}
