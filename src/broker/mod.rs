//! Execution seam between the rotation core and whatever fills its orders.
//!
//! The core never mutates a [`Portfolio`] itself; it emits
//! [`TradeInstruction`]s and a [`Broker`] applies them one at a time.

mod simulated;
mod types;

pub use simulated::SimulatedBroker;
pub use types::{Fill, Portfolio, Side, TradeInstruction};

use crate::error::BrokerError;
use rust_decimal::Decimal;

/// Anything that can apply trade instructions against a portfolio.
#[cfg_attr(test, mockall::automock)]
pub trait Broker {
    /// Current holdings, cash and mark-to-market value.
    fn portfolio(&self) -> Portfolio;

    /// Price the instrument can trade at now, if it is quoted.
    fn price(&self, id: &str) -> Option<Decimal>;

    /// Apply one instruction atomically.
    fn execute(&mut self, instruction: &TradeInstruction) -> Result<Fill, BrokerError>;
}
