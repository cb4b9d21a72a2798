//! Backtesting simulation engine.
//!
//! Replays daily bars through the rotation cycle against a simulated broker.

use crate::backtest::metrics::{BacktestMetrics, EquityPoint, TradeActivity};
use crate::backtest::{BacktestConfig, DailyBars, DataLoader, DATE_FORMAT};
use crate::broker::{Broker, SimulatedBroker};
use crate::config::Config;
use crate::error::ConfigError;
use crate::indicators::PriceHistory;
use crate::strategy::{
    CycleReport, InstrumentSnapshot, RebalanceTrigger, RotationCycle, ScoredCandidate,
    TargetAllocation,
};
use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Result of a single simulated day.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub date: NaiveDate,
    pub cash: Decimal,
    pub holdings_value: Decimal,
    pub total_equity: Decimal,
    pub position_count: usize,
    pub rebalanced: bool,
}

/// Complete result of a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub config: Config,
    pub metrics: BacktestMetrics,
    pub equity_curve: Vec<EquityPoint>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days_processed: usize,
    pub final_holdings: BTreeMap<String, u64>,
}

impl BacktestResult {
    /// Export equity curve to CSV.
    pub fn equity_to_csv(&self, path: &str) -> Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "date,cash,holdings_value,total_equity,drawdown,positions")?;

        for point in &self.equity_curve {
            writeln!(
                file,
                "{},{},{},{},{},{}",
                point.date.format(DATE_FORMAT),
                point.cash,
                point.holdings_value,
                point.total_equity,
                point.drawdown,
                point.position_count,
            )?;
        }

        Ok(())
    }

    /// Get a summary string.
    pub fn summary(&self) -> String {
        let holdings = if self.final_holdings.is_empty() {
            "cash".to_string()
        } else {
            self.final_holdings
                .iter()
                .map(|(id, shares)| format!("{id}x{shares}"))
                .collect::<Vec<_>>()
                .join(", ")
        };

        format!(
            "{}\n\nBacktest Period: {} to {}\nDays: {}\nFinal Holdings: {}",
            self.metrics.summary(),
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT),
            self.days_processed,
            holdings,
        )
    }
}

/// Scores and target weights as of one date, without trading.
#[derive(Debug, Clone)]
pub struct RankReport {
    pub date: NaiveDate,
    pub snapshots: Vec<InstrumentSnapshot>,
    pub candidates: Vec<ScoredCandidate>,
    pub targets: TargetAllocation,
}

/// The backtesting simulation engine.
pub struct BacktestEngine<D: DataLoader> {
    data_loader: D,
    config: Config,
    backtest_config: BacktestConfig,
    broker: SimulatedBroker,
    cycle: RotationCycle,
    trigger: RebalanceTrigger,
    histories: BTreeMap<String, PriceHistory>,

    // Tracking for metrics
    equity_curve: Vec<EquityPoint>,
    peak_equity: Decimal,
    activity: TradeActivity,
}

impl<D: DataLoader> BacktestEngine<D> {
    /// Create a new backtest engine. The whole configuration is validated here.
    pub fn new(
        data_loader: D,
        config: Config,
        backtest_config: BacktestConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let broker = SimulatedBroker::from_config(&config.broker);
        let cycle = RotationCycle::from_config(&config)?;
        let trigger = RebalanceTrigger::new(config.schedule.rebalance_days)?;
        let peak_equity = config.broker.initial_capital;

        Ok(Self {
            data_loader,
            config,
            backtest_config,
            broker,
            cycle,
            trigger,
            histories: BTreeMap::new(),
            equity_curve: Vec::new(),
            peak_equity,
            activity: TradeActivity::default(),
        })
    }

    /// Run the backtest over every trading day in `[start, end]`.
    pub fn run(&mut self, start: NaiveDate, end: NaiveDate) -> Result<BacktestResult> {
        info!(
            "Starting backtest from {} to {}",
            start.format(DATE_FORMAT),
            end.format(DATE_FORMAT)
        );

        let days = self.data_loader.load_bars(start, end)?;
        if days.is_empty() {
            anyhow::bail!("No data available for the specified date range");
        }

        info!("Loaded {} trading days", days.len());

        self.reset();

        for (i, day) in days.iter().enumerate() {
            let step = self.step(day);

            self.equity_curve.push(EquityPoint::new(
                step.date,
                step.cash,
                step.holdings_value,
                step.position_count,
                self.peak_equity.max(step.total_equity),
            ));

            if step.total_equity > self.peak_equity {
                self.peak_equity = step.total_equity;
            }

            if i % 100 == 0 {
                debug!(
                    "Progress: {}/{} ({:.1}%), Equity: ¥{:.2}",
                    i,
                    days.len(),
                    (i as f64 / days.len() as f64) * 100.0,
                    step.total_equity
                );
            }
        }

        let benchmark_return = self.benchmark_return(&days);
        let metrics = BacktestMetrics::calculate(
            &self.equity_curve,
            self.broker.initial_capital(),
            &self.activity,
            benchmark_return,
        );

        info!(
            final_equity = %self.broker.total_value(),
            rebalances = self.activity.rebalances,
            trades = self.activity.total_trades,
            "Backtest complete"
        );

        Ok(BacktestResult {
            config: self.config.clone(),
            metrics,
            equity_curve: if self.backtest_config.record_equity_curve {
                self.equity_curve.clone()
            } else {
                Vec::new()
            },
            start,
            end,
            days_processed: days.len(),
            final_holdings: self.broker.portfolio().holdings,
        })
    }

    /// Replay history through `date` and report the ranking a cycle would
    /// act on that day. Nothing is traded.
    pub fn rank(&mut self, date: NaiveDate) -> Result<RankReport> {
        let earliest = self
            .data_loader
            .available_range()
            .map(|(first, _)| first)
            .ok_or_else(|| anyhow::anyhow!("No data loaded"))?;

        let days = self.data_loader.load_bars(earliest, date)?;
        let Some(last) = days.last() else {
            anyhow::bail!("No data on or before {}", date.format(DATE_FORMAT));
        };

        self.reset();
        for day in &days {
            self.record_bars(day);
        }

        let snapshots = self.snapshots(last);
        let candidates = self.cycle.scorer().score(&snapshots);
        let targets = self.cycle.allocator().select_targets(&candidates);

        Ok(RankReport {
            date: last.date,
            snapshots,
            candidates,
            targets,
        })
    }

    fn reset(&mut self) {
        self.broker.reset();
        self.trigger.reset();
        self.histories.clear();
        self.equity_curve.clear();
        self.peak_equity = self.broker.initial_capital();
        self.activity = TradeActivity::default();
    }

    /// Process a single trading day.
    fn step(&mut self, day: &DailyBars) -> StepResult {
        self.record_bars(day);
        self.broker.update_prices(day.closes());

        let rebalanced = self.trigger.on_bar();
        if rebalanced {
            let snapshots = self.snapshots(day);
            let report = self.cycle.run(&snapshots, &mut self.broker);
            self.record_activity(day.date, &report);
        }

        let portfolio = self.broker.portfolio();
        StepResult {
            date: day.date,
            cash: portfolio.cash,
            holdings_value: portfolio.total_value - portfolio.cash,
            total_equity: portfolio.total_value,
            position_count: portfolio.position_count(),
            rebalanced,
        }
    }

    fn record_bars(&mut self, day: &DailyBars) {
        for bar in &day.bars {
            let indicators = &self.config.indicators;
            self.histories
                .entry(bar.symbol.clone())
                .or_insert_with(|| PriceHistory::new(indicators))
                .push(bar.close, bar.volume);
        }
    }

    /// Indicator snapshots for tradable symbols with a bar on `day`, plus
    /// held symbols without one. A suspended holding keeps its last
    /// snapshot so it is not dropped from the targets; the broker has no
    /// quote for it, so the cycle skips it instead of trading.
    fn snapshots(&self, day: &DailyBars) -> Vec<InstrumentSnapshot> {
        let benchmark = self.config.broker.benchmark.as_deref();
        let holdings = self.broker.portfolio().holdings;

        let mut symbols: BTreeSet<&str> = day.bars.iter().map(|bar| bar.symbol.as_str()).collect();
        symbols.extend(holdings.keys().map(String::as_str));

        symbols
            .into_iter()
            .filter(|symbol| self.backtest_config.is_tradable(symbol, benchmark))
            .filter_map(|symbol| {
                self.histories
                    .get(symbol)
                    .map(|h| h.snapshot(symbol, &self.config.indicators))
            })
            .collect()
    }

    fn record_activity(&mut self, date: NaiveDate, report: &CycleReport) {
        let sells = report.sells_filled() as u64;
        let buys = report.buys_filled() as u64;

        self.activity.rebalances += 1;
        self.activity.sells += sells;
        self.activity.buys += buys;
        self.activity.total_trades += sells + buys;
        self.activity.rejected_orders += report.rejected.len() as u64;
        self.activity.skipped_instruments += report.skipped.len() as u64;
        self.activity.total_commission += report.commission();

        debug!(
            date = %date.format(DATE_FORMAT),
            targets = report.targets.len(),
            sells,
            buys,
            "Rebalanced"
        );
    }

    /// Buy-and-hold return of the benchmark over the loaded days, percent.
    fn benchmark_return(&self, days: &[DailyBars]) -> Option<Decimal> {
        let symbol = self.config.broker.benchmark.as_deref()?;
        let mut closes = days
            .iter()
            .filter_map(|d| d.get(symbol))
            .map(|b| b.close)
            .filter(|c| *c > Decimal::ZERO);

        let first = closes.next()?;
        let last = closes.last().unwrap_or(first);
        Some((last / first - Decimal::ONE) * dec!(100))
    }

    /// Get the current equity curve.
    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn broker(&self) -> &SimulatedBroker {
        &self.broker
    }

    pub fn activity(&self) -> &TradeActivity {
        &self.activity
    }
}
