//! Parameter sweep runner for backtesting optimization.
//!
//! Runs one backtest per parameter combination, several at a time.

use crate::backtest::{BacktestConfig, BacktestEngine, BacktestResult, DataLoader};
use crate::config::Config;
use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Defines the parameter space to explore during optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpace {
    // Indicator lookbacks
    pub short_period: Vec<usize>,
    pub long_period: Vec<usize>,

    // Scoring
    pub volume_weight: Vec<Decimal>,

    // Allocation
    pub max_candidates: Vec<usize>,
    pub per_instrument_cap: Vec<Decimal>,

    // Schedule
    pub rebalance_days: Vec<u32>,
}

impl Default for ParameterSpace {
    fn default() -> Self {
        Self {
            short_period: vec![5, 10, 20],
            long_period: vec![20, 30, 60],
            volume_weight: vec![dec!(0), dec!(0.3), dec!(0.5)],
            max_candidates: vec![3, 5],
            per_instrument_cap: vec![dec!(0.2), dec!(0.3)],
            rebalance_days: vec![5, 10, 20],
        }
    }
}

impl ParameterSpace {
    /// Create a minimal parameter space for quick testing.
    pub fn minimal() -> Self {
        Self {
            short_period: vec![10],
            long_period: vec![30],
            volume_weight: vec![dec!(0.3)],
            max_candidates: vec![5],
            per_instrument_cap: vec![dec!(0.2)],
            rebalance_days: vec![5],
        }
    }

    /// Count total number of combinations.
    pub fn combination_count(&self) -> usize {
        self.short_period.len()
            * self.long_period.len()
            * self.volume_weight.len()
            * self.max_candidates.len()
            * self.per_instrument_cap.len()
            * self.rebalance_days.len()
    }

    /// Generate all config combinations. Invalid combinations are kept and
    /// fail when their engine is constructed.
    pub fn generate_configs(&self, base_config: &Config) -> Vec<Config> {
        let mut configs = Vec::with_capacity(self.combination_count());

        for &short_period in &self.short_period {
            for &long_period in &self.long_period {
                for &volume_weight in &self.volume_weight {
                    for &max_candidates in &self.max_candidates {
                        for &per_instrument_cap in &self.per_instrument_cap {
                            for &rebalance_days in &self.rebalance_days {
                                let mut config = base_config.clone();

                                config.indicators.short_period = short_period;
                                config.indicators.long_period = long_period;
                                config.scoring.volume_weight = volume_weight;
                                config.allocation.max_candidates = max_candidates;
                                config.allocation.per_instrument_cap = per_instrument_cap;
                                config.schedule.rebalance_days = rebalance_days;

                                configs.push(config);
                            }
                        }
                    }
                }
            }
        }

        configs
    }

    /// Describe a config's parameter values.
    pub fn describe_config(config: &Config) -> String {
        format!(
            "roc={}/{} volw={:.2} top={} cap={:.0}% every={}d",
            config.indicators.short_period,
            config.indicators.long_period,
            config.scoring.volume_weight,
            config.allocation.max_candidates,
            config.allocation.per_instrument_cap * dec!(100),
            config.schedule.rebalance_days,
        )
    }
}

/// Results from a parameter sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResults {
    /// All successful run results
    pub runs: Vec<(Config, BacktestResult)>,

    /// Best config by Sharpe ratio
    pub best_by_sharpe: Option<usize>,

    /// Best config by total return
    pub best_by_return: Option<usize>,

    /// Best config by Calmar ratio (return/drawdown)
    pub best_by_calmar: Option<usize>,

    /// Total combinations tested
    pub total_combinations: usize,

    pub successful_runs: usize,

    /// Runs that errored, including invalid parameter combinations
    pub failed_runs: usize,
}

impl SweepResults {
    pub fn best_sharpe(&self) -> Option<&(Config, BacktestResult)> {
        self.best_by_sharpe.and_then(|i| self.runs.get(i))
    }

    pub fn best_return(&self) -> Option<&(Config, BacktestResult)> {
        self.best_by_return.and_then(|i| self.runs.get(i))
    }

    pub fn best_calmar(&self) -> Option<&(Config, BacktestResult)> {
        self.best_by_calmar.and_then(|i| self.runs.get(i))
    }

    /// Export results to CSV.
    pub fn to_csv(&self, path: &str) -> Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(path)?;

        writeln!(
            file,
            "short_period,long_period,volume_weight,max_candidates,per_instrument_cap,rebalance_days,total_return_pct,annualized_return,sharpe_ratio,sortino_ratio,calmar_ratio,max_dd_pct,excess_return_pct,trades,commission"
        )?;

        for (config, result) in &self.runs {
            let m = &result.metrics;
            writeln!(
                file,
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
                config.indicators.short_period,
                config.indicators.long_period,
                config.scoring.volume_weight,
                config.allocation.max_candidates,
                config.allocation.per_instrument_cap,
                config.schedule.rebalance_days,
                m.total_return_pct,
                m.annualized_return,
                m.sharpe_ratio,
                m.sortino_ratio,
                m.calmar_ratio,
                m.max_drawdown * dec!(100),
                m.excess_return_pct.map(|e| e.to_string()).unwrap_or_default(),
                m.total_trades,
                m.total_commission,
            )?;
        }

        Ok(())
    }

    /// Generate a summary comparison table.
    pub fn summary(&self) -> String {
        let rule = "═".repeat(63);
        let mut s = format!(
            "{rule}\nPARAMETER SWEEP RESULTS\n{rule}\nTotal: {} | Successful: {} | Failed: {}\n",
            self.total_combinations, self.successful_runs, self.failed_runs
        );

        let leaders = [
            ("SHARPE RATIO", self.best_sharpe()),
            ("RETURN", self.best_return()),
            ("CALMAR RATIO", self.best_calmar()),
        ];
        for (label, best) in leaders {
            let Some((config, result)) = best else {
                continue;
            };
            let m = &result.metrics;
            let excess = m
                .excess_return_pct
                .map(|e| format!("{:+.2}%", e))
                .unwrap_or_else(|| "n/a".to_string());

            s.push_str(&format!(
                "\nBEST BY {label}:\n  Config: {}\n  Sharpe: {:.3} | Calmar: {:.3} | Return: {:.2}% | Excess: {} | MaxDD: {:.2}%\n",
                ParameterSpace::describe_config(config),
                m.sharpe_ratio,
                m.calmar_ratio,
                m.total_return_pct,
                excess,
                m.max_drawdown * dec!(100),
            ));
        }

        s.push_str(&rule);
        s.push('\n');
        s
    }
}

/// Parameter sweep runner for parallel backtesting.
pub struct SweepRunner {
    parameter_space: ParameterSpace,
    base_config: Config,
    backtest_config: BacktestConfig,
    parallelism: usize,
}

impl SweepRunner {
    pub fn new(
        parameter_space: ParameterSpace,
        base_config: Config,
        backtest_config: BacktestConfig,
        parallelism: usize,
    ) -> Self {
        Self {
            parameter_space,
            base_config,
            backtest_config,
            parallelism: parallelism.max(1),
        }
    }

    /// Run the parameter sweep. Each backtest runs on the blocking pool,
    /// at most `parallelism` at a time.
    pub async fn run<D: DataLoader + Clone + 'static>(
        &self,
        data_loader: D,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SweepResults> {
        let configs = self.parameter_space.generate_configs(&self.base_config);
        let total_combinations = configs.len();

        info!(
            "Starting parameter sweep with {} combinations, parallelism={}",
            total_combinations, self.parallelism
        );

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let data_loader = Arc::new(data_loader);

        let mut handles = Vec::with_capacity(configs.len());

        for (i, config) in configs.into_iter().enumerate() {
            let sem = semaphore.clone();
            let loader = data_loader.clone();
            let bt_config = self.backtest_config.clone();

            let handle = tokio::spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return None;
                };

                tokio::task::spawn_blocking(move || {
                    run_single(i, total_combinations, (*loader).clone(), config, bt_config, start, end)
                })
                .await
                .unwrap_or_else(|e| {
                    warn!("[{}/{}] Backtest panicked: {}", i + 1, total_combinations, e);
                    None
                })
            });

            handles.push(handle);
        }

        let mut runs = Vec::new();
        let mut failed_runs = 0;

        for handle in handles {
            match handle.await {
                Ok(Some(run)) => runs.push(run),
                Ok(None) => failed_runs += 1,
                Err(e) => {
                    warn!("Task panicked: {}", e);
                    failed_runs += 1;
                }
            }
        }

        let best_by_sharpe = best_by(&runs, |r| r.metrics.sharpe_ratio);
        let best_by_return = best_by(&runs, |r| r.metrics.total_return_pct);
        let best_by_calmar = best_by(&runs, |r| r.metrics.calmar_ratio);

        info!(
            successful = runs.len(),
            failed = failed_runs,
            "Parameter sweep complete"
        );

        Ok(SweepResults {
            successful_runs: runs.len(),
            runs,
            best_by_sharpe,
            best_by_return,
            best_by_calmar,
            total_combinations,
            failed_runs,
        })
    }
}

fn run_single<D: DataLoader>(
    i: usize,
    total: usize,
    loader: D,
    config: Config,
    bt_config: BacktestConfig,
    start: NaiveDate,
    end: NaiveDate,
) -> Option<(Config, BacktestResult)> {
    info!("[{}/{}] Testing: {}", i + 1, total, ParameterSpace::describe_config(&config));

    let mut engine = match BacktestEngine::new(loader, config.clone(), bt_config) {
        Ok(engine) => engine,
        Err(e) => {
            warn!("[{}/{}] Invalid parameters: {}", i + 1, total, e);
            return None;
        }
    };

    match engine.run(start, end) {
        Ok(result) => {
            info!(
                "[{}/{}] Complete: Sharpe={:.3} Return={:.2}%",
                i + 1,
                total,
                result.metrics.sharpe_ratio,
                result.metrics.total_return_pct
            );
            Some((config, result))
        }
        Err(e) => {
            warn!("[{}/{}] Failed: {:#}", i + 1, total, e);
            None
        }
    }
}

fn best_by<F>(runs: &[(Config, BacktestResult)], key: F) -> Option<usize>
where
    F: Fn(&BacktestResult) -> Decimal,
{
    runs.iter()
        .enumerate()
        .max_by_key(|(_, (_, result))| key(result))
        .map(|(i, _)| i)
}
