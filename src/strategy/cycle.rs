//! One rebalance cycle: score, select, sell, refresh, buy.

use super::allocator::Allocator;
use super::rebalancer::{invalid_prices, plan_buys, plan_sells, SkippedTrade};
use super::scorer::ScoreEngine;
use super::types::{InstrumentSnapshot, ScoredCandidate, TargetAllocation};
use crate::broker::{Broker, Fill, Portfolio, Side, TradeInstruction};
use crate::config::{AllocationConfig, BuyBasis, Config, ScoringConfig};
use crate::error::{BrokerError, ConfigError};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Fires once every `interval` bars.
#[derive(Debug, Clone)]
pub struct RebalanceTrigger {
    interval: u32,
    bars_seen: u64,
}

impl RebalanceTrigger {
    pub fn new(interval: u32) -> Result<Self, ConfigError> {
        if interval == 0 {
            return Err(ConfigError::ZeroRebalanceDays);
        }
        Ok(Self {
            interval,
            bars_seen: 0,
        })
    }

    /// Count a bar; true when a rebalance is due on it.
    pub fn on_bar(&mut self) -> bool {
        self.bars_seen += 1;
        self.bars_seen % u64::from(self.interval) == 0
    }

    pub fn bars_seen(&self) -> u64 {
        self.bars_seen
    }

    pub fn reset(&mut self) {
        self.bars_seen = 0;
    }
}

/// Where a cycle currently is. Rests in `Idle` between triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Scoring,
    TargetSelection,
    SellExecution,
    ValueRefresh,
    BuyExecution,
}

/// An instruction the broker refused.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedOrder {
    pub instruction: TradeInstruction,
    pub error: BrokerError,
}

/// Everything decided and executed during one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub candidates: Vec<ScoredCandidate>,
    pub targets: TargetAllocation,
    pub fills: Vec<Fill>,
    pub rejected: Vec<RejectedOrder>,
    pub skipped: Vec<SkippedTrade>,
    pub portfolio_before: Portfolio,
    pub portfolio_after: Portfolio,
}

impl CycleReport {
    pub fn sells_filled(&self) -> usize {
        self.fills
            .iter()
            .filter(|f| f.instruction.side == Side::Sell)
            .count()
    }

    pub fn buys_filled(&self) -> usize {
        self.fills
            .iter()
            .filter(|f| f.instruction.side == Side::Buy)
            .count()
    }

    pub fn commission(&self) -> Decimal {
        self.fills.iter().map(|f| f.commission).sum()
    }
}

/// Drives the score → allocate → sell → refresh → buy sequence against a broker.
#[derive(Debug, Clone)]
pub struct RotationCycle {
    scorer: ScoreEngine,
    allocator: Allocator,
    phase: CyclePhase,
}

impl RotationCycle {
    pub fn new(scoring: ScoringConfig, allocation: AllocationConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            scorer: ScoreEngine::new(scoring)?,
            allocator: Allocator::new(allocation)?,
            phase: CyclePhase::Idle,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(config.scoring.clone(), config.allocation.clone())
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn scorer(&self) -> &ScoreEngine {
        &self.scorer
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    /// Run one full cycle. Per-instrument problems (bad prices, rejected
    /// orders) are recorded in the report and never abort the cycle.
    #[instrument(skip_all, fields(snapshots = snapshots.len()))]
    pub fn run<B: Broker + ?Sized>(
        &mut self,
        snapshots: &[InstrumentSnapshot],
        broker: &mut B,
    ) -> CycleReport {
        let mut report = CycleReport::default();

        self.enter(CyclePhase::Scoring);
        report.candidates = self.scorer.score(snapshots);

        self.enter(CyclePhase::TargetSelection);
        report.targets = self.allocator.select_targets(&report.candidates);
        if !report.targets.is_empty() {
            info!(
                targets = ?report.targets,
                "Selected {} of {} eligible instruments",
                report.targets.len(),
                report.candidates.len()
            );
        }

        self.enter(CyclePhase::SellExecution);
        let before = broker.portfolio();
        let prices = collect_prices(&*broker, &report.targets, &before);
        report.skipped = invalid_prices(&report.targets, &prices);
        for sell in plan_sells(&report.targets, &before, &prices) {
            execute(broker, sell, &mut report);
        }

        self.enter(CyclePhase::ValueRefresh);
        let mut refreshed = broker.portfolio();
        if self.allocator.config().buy_basis == BuyBasis::PreSell {
            refreshed.total_value = before.total_value;
        }
        debug!(
            pre_sell = %before.total_value,
            buy_basis = %refreshed.total_value,
            cash = %refreshed.cash,
            "Portfolio refreshed after sells"
        );

        self.enter(CyclePhase::BuyExecution);
        for buy in plan_buys(&report.targets, &refreshed, &prices) {
            execute(broker, buy, &mut report);
        }

        report.portfolio_before = before;
        report.portfolio_after = broker.portfolio();
        self.enter(CyclePhase::Idle);

        info!(
            sells = report.sells_filled(),
            buys = report.buys_filled(),
            rejected = report.rejected.len(),
            skipped = report.skipped.len(),
            total_value = %report.portfolio_after.total_value,
            "Rebalance cycle complete"
        );

        report
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!(from = ?self.phase, to = ?phase, "Cycle phase");
        self.phase = phase;
    }
}

fn collect_prices<B: Broker + ?Sized>(
    broker: &B,
    targets: &TargetAllocation,
    portfolio: &Portfolio,
) -> HashMap<String, Decimal> {
    targets
        .keys()
        .chain(portfolio.holdings.keys())
        .filter_map(|id| broker.price(id).map(|p| (id.clone(), p)))
        .collect()
}

fn execute<B: Broker + ?Sized>(
    broker: &mut B,
    instruction: TradeInstruction,
    report: &mut CycleReport,
) {
    match broker.execute(&instruction) {
        Ok(fill) => {
            info!(%instruction, price = %fill.price, "Order filled");
            report.fills.push(fill);
        }
        Err(error) => {
            warn!(%instruction, %error, "Order rejected");
            report.rejected.push(RejectedOrder { instruction, error });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MockBroker, SimulatedBroker};
    use mockall::Sequence;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn cycle(buy_basis: BuyBasis) -> RotationCycle {
        let allocation = AllocationConfig {
            buy_basis,
            ..AllocationConfig::default()
        };
        RotationCycle::new(ScoringConfig::default(), allocation).unwrap()
    }

    fn rising(id: &str) -> InstrumentSnapshot {
        InstrumentSnapshot::new(id, dec!(0.05), dec!(0.08), dec!(0.02), dec!(0.1))
    }

    fn falling(id: &str) -> InstrumentSnapshot {
        InstrumentSnapshot::new(id, dec!(-0.05), dec!(-0.08), dec!(0.02), dec!(0.1))
    }

    fn held(holdings: &[(&str, u64)], cash: Decimal, total_value: Decimal) -> Portfolio {
        Portfolio {
            holdings: holdings
                .iter()
                .map(|(id, s)| (id.to_string(), *s))
                .collect::<BTreeMap<_, _>>(),
            total_value,
            cash,
        }
    }

    fn fill_for(instruction: &TradeInstruction) -> Fill {
        Fill {
            instruction: instruction.clone(),
            price: dec!(10),
            commission: Decimal::ZERO,
            cash_delta: Decimal::ZERO,
        }
    }

    fn mock_broker(after_sell_value: Decimal, expected_buy: u64) -> MockBroker {
        let mut broker = MockBroker::new();
        let mut seq = Sequence::new();

        broker.expect_price().returning(|id| match id {
            "OLD" => Some(dec!(10)),
            "NEW" => Some(dec!(20)),
            _ => None,
        });

        // before sells, after sells, after buys
        let mut snapshots = vec![
            held(&[("OLD", 100)], dec!(9000), dec!(10000)),
            held(&[], after_sell_value, after_sell_value),
            held(&[("NEW", expected_buy)], dec!(8000), after_sell_value),
        ]
        .into_iter();
        broker
            .expect_portfolio()
            .times(3)
            .returning(move || snapshots.next().unwrap_or_default());

        broker
            .expect_execute()
            .withf(|ins| *ins == TradeInstruction::sell("OLD", 100))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|ins| Ok(fill_for(ins)));
        broker
            .expect_execute()
            .withf(move |ins| *ins == TradeInstruction::buy("NEW", expected_buy))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|ins| Ok(fill_for(ins)));

        broker
    }

    #[test]
    fn test_trigger_fires_every_interval() {
        let mut trigger = RebalanceTrigger::new(5).unwrap();
        let fired: Vec<u64> = (1..=12u64).filter(|_| trigger.on_bar()).collect();

        assert_eq!(fired, vec![5, 10]);
        assert!(RebalanceTrigger::new(0).is_err());
    }

    #[test]
    fn test_sells_applied_before_buys_post_sell_basis() {
        let mut broker = mock_broker(dec!(9990), 99);
        let mut cycle = cycle(BuyBasis::PostSell);

        let report = cycle.run(&[falling("OLD"), rising("NEW")], &mut broker);

        assert_eq!(report.sells_filled(), 1);
        assert_eq!(report.buys_filled(), 1);
        assert_eq!(report.targets.get("NEW"), Some(&dec!(0.2)));
        assert_eq!(cycle.phase(), CyclePhase::Idle);
    }

    #[test]
    fn test_pre_sell_basis_sizes_buys_from_original_value() {
        // 10000 * 0.2 / 20 = 100 even though only 9990 remains after the sell
        let mut broker = mock_broker(dec!(9990), 100);
        let mut cycle = cycle(BuyBasis::PreSell);

        let report = cycle.run(&[falling("OLD"), rising("NEW")], &mut broker);

        assert_eq!(report.buys_filled(), 1);
        assert_eq!(report.portfolio_before.total_value, dec!(10000));
    }

    #[test]
    fn test_rejected_sell_does_not_abort_cycle() {
        let mut broker = MockBroker::new();
        broker.expect_price().returning(|id| match id {
            "NEW" => Some(dec!(20)),
            _ => None,
        });
        broker
            .expect_portfolio()
            .return_const(held(&[("OLD", 100)], dec!(9000), dec!(10000)));
        broker
            .expect_execute()
            .withf(|ins| ins.side == Side::Sell)
            .times(1)
            .returning(|ins| Err(BrokerError::NoPrice(ins.id.clone())));
        broker
            .expect_execute()
            .withf(|ins| ins.side == Side::Buy)
            .times(1)
            .returning(|ins| Ok(fill_for(ins)));

        let report = cycle(BuyBasis::PostSell).run(&[rising("NEW")], &mut broker);

        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].instruction, TradeInstruction::sell("OLD", 100));
        assert_eq!(report.buys_filled(), 1);
    }

    #[test]
    fn test_no_candidates_liquidates_to_cash() {
        let mut broker = SimulatedBroker::new(dec!(10000), Decimal::ZERO, Decimal::ZERO);
        broker.update_prices(HashMap::from([
            ("A".to_string(), dec!(10)),
            ("B".to_string(), dec!(5)),
        ]));
        broker.execute(&TradeInstruction::buy("A", 100)).unwrap();
        broker.execute(&TradeInstruction::buy("B", 100)).unwrap();

        let report = cycle(BuyBasis::PostSell).run(
            &[InstrumentSnapshot::undefined("A"), falling("B")],
            &mut broker,
        );

        assert!(report.targets.is_empty());
        assert_eq!(report.sells_filled(), 2);
        assert_eq!(report.buys_filled(), 0);
        assert!(broker.portfolio().holdings.is_empty());
        assert_eq!(broker.cash(), dec!(10000));
    }

    #[test]
    fn test_simulated_round_trip_reaches_targets() {
        let mut broker = SimulatedBroker::new(dec!(20000), Decimal::ZERO, Decimal::ZERO);
        broker.update_prices(HashMap::from([
            ("510300".to_string(), dec!(4)),
            ("512760".to_string(), dec!(1)),
        ]));
        let snapshots = vec![
            InstrumentSnapshot::new("510300", dec!(0.04), dec!(0.06), dec!(0.02), dec!(0.0)),
            InstrumentSnapshot::new("512760", dec!(0.02), dec!(0.06), dec!(0.02), dec!(0.0)),
        ];
        let mut cycle = cycle(BuyBasis::PostSell);

        let first = cycle.run(&snapshots, &mut broker);

        // 510300 scores 1.4 (cap 0.2), 512760 scores 0.7 (0.1)
        assert_eq!(broker.portfolio().shares("510300"), 1000);
        assert_eq!(broker.portfolio().shares("512760"), 2000);
        assert_eq!(first.buys_filled(), 2);

        let second = cycle.run(&snapshots, &mut broker);
        assert!(second.fills.is_empty());
        assert!(second.rejected.is_empty());
    }

    #[test]
    fn test_invalid_price_reported_as_skipped() {
        let mut broker = SimulatedBroker::new(dec!(10000), Decimal::ZERO, Decimal::ZERO);
        broker.update_prices(HashMap::from([("A".to_string(), Decimal::ZERO)]));

        let report = cycle(BuyBasis::PostSell).run(&[rising("A")], &mut broker);

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].id, "A");
        assert!(report.fills.is_empty());
    }
}
