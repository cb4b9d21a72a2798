//! Performance metrics calculation for backtesting.
//!
//! Provides Sharpe ratio, Sortino ratio, drawdown analysis, and more.

use crate::utils::decimal::{from_f64, safe_div, to_f64};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Daily bars per year used to annualize return statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// A point on the equity curve, recorded once per trading day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub cash: Decimal,
    pub holdings_value: Decimal,
    pub total_equity: Decimal,
    pub drawdown: Decimal,
    pub position_count: usize,
}

impl EquityPoint {
    pub fn new(
        date: NaiveDate,
        cash: Decimal,
        holdings_value: Decimal,
        position_count: usize,
        peak_equity: Decimal,
    ) -> Self {
        let total_equity = cash + holdings_value;
        let drawdown = if peak_equity > Decimal::ZERO {
            (peak_equity - total_equity) / peak_equity
        } else {
            Decimal::ZERO
        };

        Self {
            date,
            cash,
            holdings_value,
            total_equity,
            drawdown,
            position_count,
        }
    }
}

/// Trading activity accumulated by the engine over a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeActivity {
    pub total_commission: Decimal,
    pub total_trades: u64,
    pub buys: u64,
    pub sells: u64,
    pub rejected_orders: u64,
    pub skipped_instruments: u64,
    pub rebalances: u64,
}

/// Backtest performance metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    // Returns
    /// Final equity minus initial capital
    pub total_return: Decimal,
    pub total_return_pct: Decimal,
    /// Compounded annual growth, percent
    pub annualized_return: Decimal,

    // Risk
    /// Maximum peak-to-trough drawdown as a fraction
    pub max_drawdown: Decimal,
    /// Calendar days from the drawdown's first day to its deepest point or recovery
    pub max_drawdown_duration_days: i64,
    /// Annualized volatility of daily returns
    pub volatility: Decimal,

    // Risk-adjusted
    /// Sharpe ratio (zero risk-free rate)
    pub sharpe_ratio: Decimal,
    /// Sortino ratio (downside deviation only)
    pub sortino_ratio: Decimal,
    /// Annualized return / max drawdown
    pub calmar_ratio: Decimal,

    // Benchmark
    /// Buy-and-hold return of the benchmark, percent
    pub benchmark_return_pct: Option<Decimal>,
    /// Strategy return minus benchmark return, percentage points
    pub excess_return_pct: Option<Decimal>,

    // Activity
    pub total_commission: Decimal,
    pub total_trades: u64,
    pub rebalances: u64,
    pub rejected_orders: u64,

    // Time
    pub trading_days: usize,
    pub duration_days: i64,
}

impl BacktestMetrics {
    /// Calculate metrics from the equity curve and trading activity.
    pub fn calculate(
        equity_curve: &[EquityPoint],
        initial_capital: Decimal,
        activity: &TradeActivity,
        benchmark_return_pct: Option<Decimal>,
    ) -> Self {
        let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) else {
            return Self::empty();
        };

        let duration_days = (last.date - first.date).num_days();
        let duration_years = duration_days as f64 / 365.0;

        // Returns
        let total_return = last.total_equity - initial_capital;
        let total_return_pct = safe_div(total_return, initial_capital) * dec!(100);

        let annualized_return = if duration_years > 0.0 {
            let factor = 1.0 + to_f64(total_return_pct) / 100.0;
            if factor > 0.0 {
                from_f64((factor.powf(1.0 / duration_years) - 1.0) * 100.0)
            } else {
                dec!(-100)
            }
        } else {
            Decimal::ZERO
        };

        // Drawdown
        let (max_drawdown, max_drawdown_duration_days) = calculate_max_drawdown(equity_curve);

        let returns = calculate_period_returns(equity_curve);
        let volatility = calculate_volatility(&returns);
        let sharpe_ratio = calculate_sharpe(&returns);
        let sortino_ratio = calculate_sortino(&returns);
        let calmar_ratio = if max_drawdown > Decimal::ZERO {
            annualized_return / (max_drawdown * dec!(100))
        } else {
            Decimal::ZERO
        };

        Self {
            total_return,
            total_return_pct,
            annualized_return,
            max_drawdown,
            max_drawdown_duration_days,
            volatility,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            benchmark_return_pct,
            excess_return_pct: benchmark_return_pct.map(|b| total_return_pct - b),
            total_commission: activity.total_commission,
            total_trades: activity.total_trades,
            rebalances: activity.rebalances,
            rejected_orders: activity.rejected_orders,
            trading_days: equity_curve.len(),
            duration_days,
        }
    }

    /// Metrics for a run with no data.
    pub fn empty() -> Self {
        Self {
            total_return: Decimal::ZERO,
            total_return_pct: Decimal::ZERO,
            annualized_return: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            max_drawdown_duration_days: 0,
            volatility: Decimal::ZERO,
            sharpe_ratio: Decimal::ZERO,
            sortino_ratio: Decimal::ZERO,
            calmar_ratio: Decimal::ZERO,
            benchmark_return_pct: None,
            excess_return_pct: None,
            total_commission: Decimal::ZERO,
            total_trades: 0,
            rebalances: 0,
            rejected_orders: 0,
            trading_days: 0,
            duration_days: 0,
        }
    }

    /// Format metrics as a summary string.
    pub fn summary(&self) -> String {
        let benchmark = match (self.benchmark_return_pct, self.excess_return_pct) {
            (Some(bench), Some(excess)) => format!(
                "\nBENCHMARK\n  Benchmark Return:  {:.2}%\n  Excess Return:     {:.2}%\n",
                bench, excess
            ),
            _ => String::new(),
        };

        format!(
            r#"═══════════════════════════════════════════════
BACKTEST RESULTS ({} trading days, {} calendar days)
═══════════════════════════════════════════════
RETURNS
  Total Return:      ¥{:.2} ({:.2}%)
  Annualized:        {:.2}%

RISK
  Max Drawdown:      {:.2}% ({} days)
  Volatility:        {:.2}%

RISK-ADJUSTED
  Sharpe Ratio:      {:.3}
  Sortino Ratio:     {:.3}
  Calmar Ratio:      {:.3}
{}
ACTIVITY
  Rebalances:        {}
  Total Trades:      {}
  Rejected Orders:   {}
  Commission:        ¥{:.2}
═══════════════════════════════════════════════"#,
            self.trading_days,
            self.duration_days,
            self.total_return,
            self.total_return_pct,
            self.annualized_return,
            self.max_drawdown * dec!(100),
            self.max_drawdown_duration_days,
            self.volatility * dec!(100),
            self.sharpe_ratio,
            self.sortino_ratio,
            self.calmar_ratio,
            benchmark,
            self.rebalances,
            self.total_trades,
            self.rejected_orders,
            self.total_commission,
        )
    }
}

/// Day-over-day returns of the equity curve.
fn calculate_period_returns(equity_curve: &[EquityPoint]) -> Vec<Decimal> {
    equity_curve
        .windows(2)
        .map(|w| safe_div(w[1].total_equity - w[0].total_equity, w[0].total_equity))
        .collect()
}

/// Maximum drawdown and the longest time spent in that drawdown, in days.
fn calculate_max_drawdown(equity_curve: &[EquityPoint]) -> (Decimal, i64) {
    let Some(first) = equity_curve.first() else {
        return (Decimal::ZERO, 0);
    };

    let mut peak = first.total_equity;
    let mut peak_date = first.date;
    let mut max_dd = Decimal::ZERO;
    let mut max_dd_peak: Option<NaiveDate> = None;
    let mut max_dd_duration: i64 = 0;

    for point in equity_curve {
        if point.total_equity >= peak {
            peak = point.total_equity;
            peak_date = point.date;
            max_dd_peak = None;
            continue;
        }

        let dd = safe_div(peak - point.total_equity, peak);
        if dd > max_dd {
            max_dd = dd;
            max_dd_peak = Some(peak_date);
        }

        // still underwater since the peak that produced the max drawdown
        if let Some(start) = max_dd_peak {
            max_dd_duration = max_dd_duration.max((point.date - start).num_days());
        }
    }

    (max_dd, max_dd_duration)
}

fn mean_and_std(returns: &[f64]) -> (f64, f64) {
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

fn as_f64(returns: &[Decimal]) -> Vec<f64> {
    returns.iter().copied().map(to_f64).collect()
}

/// Annualized standard deviation of daily returns.
fn calculate_volatility(returns: &[Decimal]) -> Decimal {
    if returns.len() < 2 {
        return Decimal::ZERO;
    }

    let (_, std_dev) = mean_and_std(&as_f64(returns));
    from_f64(std_dev * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Sharpe ratio with a zero risk-free rate.
fn calculate_sharpe(returns: &[Decimal]) -> Decimal {
    if returns.is_empty() {
        return Decimal::ZERO;
    }

    let (mean, std_dev) = mean_and_std(&as_f64(returns));
    if std_dev < 1e-10 {
        return Decimal::ZERO;
    }

    from_f64(mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Sortino ratio (downside deviation only), capped at 100.
fn calculate_sortino(returns: &[Decimal]) -> Decimal {
    if returns.is_empty() {
        return Decimal::ZERO;
    }

    let returns = as_f64(returns);
    let (mean, _) = mean_and_std(&returns);

    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return if mean > 0.0 { dec!(100) } else { Decimal::ZERO };
    }

    let downside_variance = downside.iter().map(|r| r.powi(2)).sum::<f64>() / downside.len() as f64;
    let downside_deviation = downside_variance.sqrt();
    if downside_deviation < 1e-10 {
        return dec!(100);
    }

    from_f64(mean / downside_deviation * TRADING_DAYS_PER_YEAR.sqrt()).min(dec!(100))
}
