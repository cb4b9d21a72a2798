//! Portfolio and order types shared by the core and any broker.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A single order to move the portfolio toward its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeInstruction {
    pub id: String,
    pub side: Side,
    /// Always positive
    pub shares: u64,
}

impl TradeInstruction {
    pub fn buy(id: impl Into<String>, shares: u64) -> Self {
        Self {
            id: id.into(),
            side: Side::Buy,
            shares,
        }
    }

    pub fn sell(id: impl Into<String>, shares: u64) -> Self {
        Self {
            id: id.into(),
            side: Side::Sell,
            shares,
        }
    }
}

impl fmt::Display for TradeInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.side, self.id, self.shares)
    }
}

/// Read-only view of the account as seen by the allocator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    /// Instrument id -> held shares
    pub holdings: BTreeMap<String, u64>,
    /// Mark-to-market value (cash + holdings at current price)
    pub total_value: Decimal,
    /// Uninvested cash
    pub cash: Decimal,
}

impl Portfolio {
    /// An all-cash portfolio.
    pub fn with_cash(cash: Decimal) -> Self {
        Self {
            holdings: BTreeMap::new(),
            total_value: cash,
            cash,
        }
    }

    /// Shares held for an instrument (0 if none).
    pub fn shares(&self, id: &str) -> u64 {
        self.holdings.get(id).copied().unwrap_or(0)
    }

    /// Number of instruments with a non-zero position.
    pub fn position_count(&self) -> usize {
        self.holdings.values().filter(|&&shares| shares > 0).count()
    }
}

/// Execution report for an accepted instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub instruction: TradeInstruction,
    /// Price after slippage
    pub price: Decimal,
    pub commission: Decimal,
    /// Signed cash movement (negative for buys)
    pub cash_delta: Decimal,
}
