//! Rolling indicators that turn a bar history into an [`InstrumentSnapshot`].
//!
//! Every function returns `None` rather than failing when the history is too
//! short or a divisor is zero, so early bars simply make an instrument
//! ineligible.

use crate::config::IndicatorConfig;
use crate::strategy::InstrumentSnapshot;
use rust_decimal::{Decimal, MathematicalOps};
use std::collections::VecDeque;

/// Rate of change of the last value against the value `period` bars earlier.
pub fn rate_of_change(series: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || series.len() < period + 1 {
        return None;
    }
    let current = series[series.len() - 1];
    let base = series[series.len() - 1 - period];
    if base == Decimal::ZERO {
        return None;
    }
    Some((current - base) / base)
}

/// Population standard deviation of the last `period` values.
pub fn std_dev(series: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || series.len() < period {
        return None;
    }
    let window = &series[series.len() - period..];
    let n = Decimal::from(period);
    let mean = window.iter().copied().sum::<Decimal>() / n;
    let variance = window
        .iter()
        .map(|x| {
            let d = *x - mean;
            d * d
        })
        .sum::<Decimal>()
        / n;
    variance.sqrt()
}

/// Standard deviation over `period` bars divided by the latest value.
pub fn normalized_volatility(closes: &[Decimal], period: usize) -> Option<Decimal> {
    let last = *closes.last()?;
    if last == Decimal::ZERO {
        return None;
    }
    std_dev(closes, period).map(|sd| sd / last)
}

/// Bounded close/volume history for one instrument.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    closes: VecDeque<Decimal>,
    volumes: VecDeque<Decimal>,
    capacity: usize,
}

impl PriceHistory {
    /// Keep enough bars for the given lookbacks (ROC needs `long + 1`).
    pub fn new(config: &IndicatorConfig) -> Self {
        let capacity = config.long_period.max(config.short_period) + 1;
        Self {
            closes: VecDeque::with_capacity(capacity),
            volumes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, close: Decimal, volume: Decimal) {
        if self.closes.len() == self.capacity {
            self.closes.pop_front();
            self.volumes.pop_front();
        }
        self.closes.push_back(close);
        self.volumes.push_back(volume);
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn last_close(&self) -> Option<Decimal> {
        self.closes.back().copied()
    }

    /// Compute today's indicator snapshot.
    pub fn snapshot(&self, id: &str, config: &IndicatorConfig) -> InstrumentSnapshot {
        let closes: Vec<Decimal> = self.closes.iter().copied().collect();
        let volumes: Vec<Decimal> = self.volumes.iter().copied().collect();

        InstrumentSnapshot {
            id: id.to_string(),
            short_momentum: rate_of_change(&closes, config.short_period),
            long_momentum: rate_of_change(&closes, config.long_period),
            volatility: normalized_volatility(&closes, config.long_period),
            volume_change: rate_of_change(&volumes, config.short_period),
        }
    }
}
