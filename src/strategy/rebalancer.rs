//! Converts target weights into a sell-then-buy instruction sequence.

use super::types::TargetAllocation;
use crate::broker::{Portfolio, TradeInstruction};
use crate::utils::decimal::floor_shares;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// A targeted instrument that received no instruction this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTrade {
    pub id: String,
    /// The offending price, `None` if no price was available at all
    pub price: Option<Decimal>,
}

/// Instructions for one rebalance, already split by phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebalancePlan {
    pub sells: Vec<TradeInstruction>,
    pub buys: Vec<TradeInstruction>,
    pub skipped: Vec<SkippedTrade>,
}

impl RebalancePlan {
    /// All sells followed by all buys.
    pub fn instructions(&self) -> Vec<TradeInstruction> {
        self.sells.iter().chain(self.buys.iter()).cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sells.is_empty() && self.buys.is_empty()
    }
}

/// Instructions moving `portfolio` to `targets`: every SELL, then every BUY.
///
/// Both legs are sized from the same `portfolio.total_value`. Callers that
/// need post-sell sizing run [`plan_sells`], apply them, and call
/// [`plan_buys`] with the refreshed portfolio.
pub fn rebalance(
    targets: &TargetAllocation,
    portfolio: &Portfolio,
    prices: &HashMap<String, Decimal>,
) -> Vec<TradeInstruction> {
    plan(targets, portfolio, prices).instructions()
}

/// Same as [`rebalance`], keeping the phases and skipped instruments apart.
pub fn plan(
    targets: &TargetAllocation,
    portfolio: &Portfolio,
    prices: &HashMap<String, Decimal>,
) -> RebalancePlan {
    RebalancePlan {
        sells: plan_sells(targets, portfolio, prices),
        buys: plan_buys(targets, portfolio, prices),
        skipped: invalid_prices(targets, prices),
    }
}

/// Sell phase: reduce over-weight holdings and close untargeted ones.
///
/// Closing an untargeted holding needs no price. A targeted holding
/// without a valid price is left untouched.
pub fn plan_sells(
    targets: &TargetAllocation,
    portfolio: &Portfolio,
    prices: &HashMap<String, Decimal>,
) -> Vec<TradeInstruction> {
    let mut sells = Vec::new();

    for (id, &held) in &portfolio.holdings {
        if held == 0 {
            continue;
        }

        let target = match targets.get(id) {
            None => 0,
            Some(&weight) => match valid_price(prices, id)
                .and_then(|price| target_shares(id, portfolio, weight, price))
            {
                Some(target) => target,
                None => continue,
            },
        };

        if target < held {
            debug!(%id, held, target, "Reducing position");
            sells.push(TradeInstruction::sell(id.clone(), held - target));
        }
    }

    sells
}

/// Buy phase: raise every targeted instrument to its target share count.
pub fn plan_buys(
    targets: &TargetAllocation,
    portfolio: &Portfolio,
    prices: &HashMap<String, Decimal>,
) -> Vec<TradeInstruction> {
    let mut buys = Vec::new();

    for (id, &weight) in targets {
        let Some(target) = valid_price(prices, id)
            .and_then(|price| target_shares(id, portfolio, weight, price))
        else {
            continue;
        };
        let held = portfolio.shares(id);

        if target > held {
            debug!(%id, held, target, %weight, "Increasing position");
            buys.push(TradeInstruction::buy(id.clone(), target - held));
        }
    }

    buys
}

/// Targeted instruments whose price is missing or not positive.
pub fn invalid_prices(
    targets: &TargetAllocation,
    prices: &HashMap<String, Decimal>,
) -> Vec<SkippedTrade> {
    targets
        .keys()
        .filter(|id| valid_price(prices, id).is_none())
        .map(|id| {
            let price = prices.get(id).copied();
            warn!(%id, ?price, "Invalid price, skipping instrument this cycle");
            SkippedTrade {
                id: id.clone(),
                price,
            }
        })
        .collect()
}

/// Floored share target, `None` when the price is too small to size against.
fn target_shares(id: &str, portfolio: &Portfolio, weight: Decimal, price: Decimal) -> Option<u64> {
    let notional = portfolio.total_value * weight;
    let target = floor_shares(notional, price);
    if target.is_none() {
        warn!(%id, %price, %notional, "Share count out of range, skipping instrument this cycle");
    }
    target
}

fn valid_price(prices: &HashMap<String, Decimal>, id: &str) -> Option<Decimal> {
    prices.get(id).copied().filter(|p| *p > Decimal::ZERO)
}
