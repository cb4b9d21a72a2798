//! Simulated broker for backtesting and paper trading.

use super::types::{Fill, Portfolio, Side, TradeInstruction};
use super::Broker;
use crate::config::BrokerConfig;
use crate::error::BrokerError;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Fills instructions at the latest close, adjusted for slippage and commission.
#[derive(Debug, Clone)]
pub struct SimulatedBroker {
    initial_capital: Decimal,
    cash: Decimal,
    holdings: BTreeMap<String, u64>,
    /// Last known close per instrument
    prices: HashMap<String, Decimal>,
    /// Instruments priced by the latest update; only these can trade
    quoted: HashSet<String>,
    commission_rate: Decimal,
    slippage: Decimal,
    total_commission: Decimal,
    order_count: u64,
}

impl SimulatedBroker {
    /// Create a new simulated broker with starting cash.
    pub fn new(initial_capital: Decimal, commission_rate: Decimal, slippage: Decimal) -> Self {
        Self {
            initial_capital,
            cash: initial_capital,
            holdings: BTreeMap::new(),
            prices: HashMap::new(),
            quoted: HashSet::new(),
            commission_rate,
            slippage,
            total_commission: Decimal::ZERO,
            order_count: 0,
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(config.initial_capital, config.commission_rate, config.slippage)
    }

    /// Merge the latest closes. Instruments missing from `prices` keep
    /// their previous mark but have no tradable price until quoted again.
    pub fn update_prices(&mut self, prices: HashMap<String, Decimal>) {
        self.quoted = prices.keys().cloned().collect();
        self.prices.extend(prices);
    }

    /// Last known close, whether or not the instrument traded today.
    pub fn mark(&self, id: &str) -> Option<Decimal> {
        self.prices.get(id).copied()
    }

    /// Reset all state for a new run.
    pub fn reset(&mut self) {
        self.cash = self.initial_capital;
        self.holdings.clear();
        self.prices.clear();
        self.quoted.clear();
        self.total_commission = Decimal::ZERO;
        self.order_count = 0;
    }

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    /// Commission paid since the last reset.
    pub fn total_commission(&self) -> Decimal {
        self.total_commission
    }

    /// Accepted orders since the last reset.
    pub fn order_count(&self) -> u64 {
        self.order_count
    }

    /// Cash plus every position marked at its last known close.
    pub fn total_value(&self) -> Decimal {
        let positions: Decimal = self
            .holdings
            .iter()
            .map(|(id, &shares)| {
                let price = self.prices.get(id).copied().unwrap_or(Decimal::ZERO);
                price * Decimal::from(shares)
            })
            .sum();
        self.cash + positions
    }
}

impl Broker for SimulatedBroker {
    fn portfolio(&self) -> Portfolio {
        Portfolio {
            holdings: self.holdings.clone(),
            total_value: self.total_value(),
            cash: self.cash,
        }
    }

    fn price(&self, id: &str) -> Option<Decimal> {
        if self.quoted.contains(id) {
            self.mark(id)
        } else {
            None
        }
    }

    fn execute(&mut self, instruction: &TradeInstruction) -> Result<Fill, BrokerError> {
        let id = &instruction.id;
        let price = self
            .price(id)
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| BrokerError::NoPrice(id.clone()))?;
        let shares = Decimal::from(instruction.shares);

        let fill = match instruction.side {
            Side::Buy => {
                let fill_price = price * (Decimal::ONE + self.slippage);
                let notional = fill_price * shares;
                let commission = notional * self.commission_rate;
                let required = notional + commission;
                if required > self.cash {
                    return Err(BrokerError::InsufficientCash {
                        id: id.clone(),
                        required,
                        available: self.cash,
                    });
                }

                self.cash -= required;
                *self.holdings.entry(id.clone()).or_insert(0) += instruction.shares;

                Fill {
                    instruction: instruction.clone(),
                    price: fill_price,
                    commission,
                    cash_delta: -required,
                }
            }
            Side::Sell => {
                let held = self.holdings.get(id).copied().unwrap_or(0);
                if instruction.shares > held {
                    return Err(BrokerError::InsufficientHoldings {
                        id: id.clone(),
                        requested: instruction.shares,
                        held,
                    });
                }

                let fill_price = price * (Decimal::ONE - self.slippage);
                let notional = fill_price * shares;
                let commission = notional * self.commission_rate;
                let proceeds = notional - commission;

                self.cash += proceeds;
                let remaining = held - instruction.shares;
                if remaining == 0 {
                    self.holdings.remove(id);
                } else {
                    self.holdings.insert(id.clone(), remaining);
                }

                Fill {
                    instruction: instruction.clone(),
                    price: fill_price,
                    commission,
                    cash_delta: proceeds,
                }
            }
        };

        self.total_commission += fill.commission;
        self.order_count += 1;

        debug!(
            %instruction,
            price = %fill.price,
            commission = %fill.commission,
            cash = %self.cash,
            "Simulated fill"
        );

        Ok(fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn frictionless(cash: Decimal) -> SimulatedBroker {
        SimulatedBroker::new(cash, Decimal::ZERO, Decimal::ZERO)
    }

    fn prices(entries: &[(&str, Decimal)]) -> HashMap<String, Decimal> {
        entries.iter().map(|(id, p)| (id.to_string(), *p)).collect()
    }

    #[test]
    fn test_buy_updates_cash_and_holdings() {
        let mut broker = frictionless(dec!(10000));
        broker.update_prices(prices(&[("510300", dec!(4))]));

        let fill = broker.execute(&TradeInstruction::buy("510300", 500)).unwrap();

        assert_eq!(fill.price, dec!(4));
        assert_eq!(fill.cash_delta, dec!(-2000));
        assert_eq!(broker.cash(), dec!(8000));
        assert_eq!(broker.portfolio().shares("510300"), 500);
        assert_eq!(broker.total_value(), dec!(10000));
    }

    #[test]
    fn test_sell_closes_position() {
        let mut broker = frictionless(dec!(10000));
        broker.update_prices(prices(&[("510300", dec!(4))]));
        broker.execute(&TradeInstruction::buy("510300", 500)).unwrap();

        broker.execute(&TradeInstruction::sell("510300", 500)).unwrap();

        assert_eq!(broker.cash(), dec!(10000));
        assert!(broker.portfolio().holdings.is_empty());
        assert_eq!(broker.order_count(), 2);
    }

    #[test]
    fn test_commission_and_slippage_charged() {
        let mut broker = SimulatedBroker::new(dec!(10000), dec!(0.001), dec!(0.01));
        broker.update_prices(prices(&[("512760", dec!(1))]));

        let fill = broker.execute(&TradeInstruction::buy("512760", 1000)).unwrap();

        // 1000 x 1.01 = 1010 notional, 1.01 commission
        assert_eq!(fill.price, dec!(1.01));
        assert_eq!(fill.commission, dec!(1.01));
        assert_eq!(broker.cash(), dec!(10000) - dec!(1011.01));
        assert_eq!(broker.total_commission(), dec!(1.01));
    }

    #[test]
    fn test_insufficient_cash_rejected() {
        let mut broker = frictionless(dec!(100));
        broker.update_prices(prices(&[("510500", dec!(6))]));

        let result = broker.execute(&TradeInstruction::buy("510500", 20));

        assert!(matches!(result, Err(BrokerError::InsufficientCash { .. })));
        assert_eq!(broker.cash(), dec!(100));
        assert_eq!(broker.order_count(), 0);
    }

    #[test]
    fn test_oversell_rejected() {
        let mut broker = frictionless(dec!(1000));
        broker.update_prices(prices(&[("510500", dec!(6))]));
        broker.execute(&TradeInstruction::buy("510500", 10)).unwrap();

        let result = broker.execute(&TradeInstruction::sell("510500", 11));

        assert_eq!(
            result,
            Err(BrokerError::InsufficientHoldings {
                id: "510500".to_string(),
                requested: 11,
                held: 10,
            })
        );
    }

    #[test]
    fn test_missing_or_zero_price_rejected() {
        let mut broker = frictionless(dec!(1000));
        assert_eq!(
            broker.execute(&TradeInstruction::buy("159915", 1)),
            Err(BrokerError::NoPrice("159915".to_string()))
        );

        broker.update_prices(prices(&[("159915", Decimal::ZERO)]));
        assert!(broker.execute(&TradeInstruction::buy("159915", 1)).is_err());
    }

    #[test]
    fn test_stale_price_kept_for_mark_to_market() {
        let mut broker = frictionless(dec!(1000));
        broker.update_prices(prices(&[("A", dec!(10)), ("B", dec!(5))]));
        broker.execute(&TradeInstruction::buy("A", 10)).unwrap();

        // A has no bar today; its last close still marks the position
        broker.update_prices(prices(&[("B", dec!(6))]));
        assert_eq!(broker.total_value(), dec!(1000));
        assert_eq!(broker.mark("A"), Some(dec!(10)));
    }

    #[test]
    fn test_unquoted_instrument_cannot_trade() {
        let mut broker = frictionless(dec!(1000));
        broker.update_prices(prices(&[("A", dec!(10))]));
        broker.execute(&TradeInstruction::buy("A", 10)).unwrap();

        broker.update_prices(prices(&[("B", dec!(5))]));

        assert_eq!(broker.price("A"), None);
        assert_eq!(
            broker.execute(&TradeInstruction::sell("A", 10)),
            Err(BrokerError::NoPrice("A".to_string()))
        );
        assert_eq!(broker.portfolio().shares("A"), 10);

        broker.update_prices(prices(&[("A", dec!(11))]));
        assert_eq!(broker.price("A"), Some(dec!(11)));
    }

    #[test]
    fn test_reset() {
        let mut broker = frictionless(dec!(1000));
        broker.update_prices(prices(&[("A", dec!(10))]));
        broker.execute(&TradeInstruction::buy("A", 10)).unwrap();

        broker.reset();

        assert_eq!(broker.cash(), dec!(1000));
        assert!(broker.portfolio().holdings.is_empty());
        assert_eq!(broker.price("A"), None);
        assert_eq!(broker.mark("A"), None);
    }
}
