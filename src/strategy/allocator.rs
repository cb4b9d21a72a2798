//! Target weight selection for the top-ranked candidates.

use super::types::{ScoredCandidate, TargetAllocation};
use crate::config::{AllocationConfig, Weighting};
use crate::error::ConfigError;
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Turns a ranking into capped target weights.
#[derive(Debug, Clone)]
pub struct Allocator {
    config: AllocationConfig,
}

impl Allocator {
    /// Create an allocator, rejecting invalid configuration up front.
    pub fn new(config: AllocationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// See [`select_targets`].
    pub fn select_targets(&self, candidates: &[ScoredCandidate]) -> TargetAllocation {
        select_targets(candidates, &self.config)
    }
}

/// Compute target weights from candidates sorted best first.
///
/// The top `max_candidates` are considered. The highest score receives
/// `per_instrument_cap`; every other candidate receives
/// `score / highest * per_instrument_cap`, or the full cap under
/// [`Weighting::Equal`]. Nothing is allocated when the best score is not
/// positive, and candidates whose weight would be zero or negative are left
/// out of the map.
pub fn select_targets(
    candidates: &[ScoredCandidate],
    config: &AllocationConfig,
) -> TargetAllocation {
    let mut targets = TargetAllocation::new();

    let selected = &candidates[..candidates.len().min(config.max_candidates)];
    let Some(highest) = selected.first().map(|c| c.score) else {
        info!("No eligible candidates, targeting all cash");
        return targets;
    };

    if highest <= Decimal::ZERO {
        info!(%highest, "Best score is not positive, targeting all cash");
        return targets;
    }

    let cap = config.per_instrument_cap;
    for candidate in selected {
        let weight = match config.weighting {
            Weighting::Equal if candidate.score > Decimal::ZERO => cap,
            Weighting::Equal => Decimal::ZERO,
            Weighting::ScoreProportional if candidate.score == highest => cap,
            Weighting::ScoreProportional => candidate.score / highest * cap,
        };

        if weight <= Decimal::ZERO {
            debug!(id = %candidate.id, score = %candidate.score, "Non-positive weight dropped");
            continue;
        }

        targets.insert(candidate.id.clone(), weight.min(cap));
    }

    debug!(
        selected = selected.len(),
        allocated = targets.len(),
        total_weight = %targets.values().copied().sum::<Decimal>(),
        "Target weights computed"
    );

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuyBasis;
    use rust_decimal_macros::dec;

    fn config(max_candidates: usize, cap: Decimal) -> AllocationConfig {
        AllocationConfig {
            max_candidates,
            per_instrument_cap: cap,
            buy_basis: BuyBasis::PostSell,
            weighting: Weighting::ScoreProportional,
        }
    }

    fn equal(max_candidates: usize, cap: Decimal) -> AllocationConfig {
        AllocationConfig {
            weighting: Weighting::Equal,
            ..config(max_candidates, cap)
        }
    }

    fn cand(id: &str, score: Decimal) -> ScoredCandidate {
        ScoredCandidate::new(id, score)
    }

    #[test]
    fn test_single_candidate_gets_full_cap() {
        let targets = select_targets(&[cand("A", dec!(10.0))], &config(5, dec!(0.2)));

        assert_eq!(targets.len(), 1);
        assert_eq!(targets["A"], dec!(0.2));
    }

    #[test]
    fn test_weights_relative_to_highest() {
        let targets = select_targets(
            &[cand("A", dec!(10.0)), cand("B", dec!(5.0))],
            &config(5, dec!(0.2)),
        );

        assert_eq!(targets["A"], dec!(0.2));
        assert_eq!(targets["B"], dec!(0.1));
    }

    #[test]
    fn test_empty_candidates_hold_cash() {
        assert!(select_targets(&[], &config(5, dec!(0.2))).is_empty());
    }

    #[test]
    fn test_non_positive_best_score_holds_cash() {
        let candidates = [cand("A", Decimal::ZERO), cand("B", dec!(-1))];
        assert!(select_targets(&candidates, &config(5, dec!(0.2))).is_empty());
    }

    #[test]
    fn test_negative_scores_are_clamped_out() {
        let candidates = [cand("A", dec!(4)), cand("B", Decimal::ZERO), cand("C", dec!(-2))];

        let targets = select_targets(&candidates, &config(5, dec!(0.2)));

        assert_eq!(targets.len(), 1);
        assert!(targets.contains_key("A"));
    }

    #[test]
    fn test_only_top_n_selected() {
        let candidates = [
            cand("A", dec!(8)),
            cand("B", dec!(6)),
            cand("C", dec!(4)),
            cand("D", dec!(2)),
        ];

        let targets = select_targets(&candidates, &config(2, dec!(0.5)));

        assert_eq!(targets.len(), 2);
        assert_eq!(targets["A"], dec!(0.5));
        assert_eq!(targets["B"], dec!(0.375));
        assert!(!targets.contains_key("C"));
    }

    #[test]
    fn test_tied_leaders_both_get_cap() {
        let candidates = [cand("A", dec!(3)), cand("B", dec!(3)), cand("C", dec!(1.5))];

        let targets = select_targets(&candidates, &config(5, dec!(0.2)));

        assert_eq!(targets["A"], dec!(0.2));
        assert_eq!(targets["B"], dec!(0.2));
        assert_eq!(targets["C"], dec!(0.1));
    }

    #[test]
    fn test_weights_bounded_by_cap_and_count() {
        let cfg = config(5, dec!(0.2));
        let candidates: Vec<ScoredCandidate> = (1..=8)
            .rev()
            .map(|i| cand(&format!("E{i}"), Decimal::from(i) * dec!(0.7)))
            .collect();

        let targets = select_targets(&candidates, &cfg);
        let total: Decimal = targets.values().copied().sum();

        assert!(targets.len() <= 5);
        assert!(total <= dec!(0.2) * Decimal::from(5));
        assert!(targets
            .values()
            .all(|w| *w > Decimal::ZERO && *w <= dec!(0.2)));
    }

    #[test]
    fn test_equal_weighting_splits_evenly() {
        let candidates = [
            cand("A", dec!(9)),
            cand("B", dec!(3)),
            cand("C", dec!(1)),
            cand("D", dec!(0.5)),
        ];

        let targets = select_targets(&candidates, &equal(3, dec!(0.3)));

        assert_eq!(targets.len(), 3);
        assert!(targets.values().all(|w| *w == dec!(0.3)));
        assert!(!targets.contains_key("D"));
    }

    #[test]
    fn test_equal_weighting_drops_non_positive() {
        let candidates = [cand("A", dec!(2)), cand("B", Decimal::ZERO), cand("C", dec!(-1))];

        let targets = select_targets(&candidates, &equal(3, dec!(0.25)));

        assert_eq!(targets.len(), 1);
        assert_eq!(targets["A"], dec!(0.25));
        assert!(select_targets(&[cand("A", dec!(-1))], &equal(3, dec!(0.25))).is_empty());
    }

    #[test]
    fn test_allocator_validates_config() {
        assert!(Allocator::new(config(6, dec!(0.2))).is_err());
        assert!(Allocator::new(config(0, dec!(0.2))).is_err());

        let allocator = Allocator::new(config(5, dec!(0.2))).unwrap();
        assert_eq!(allocator.select_targets(&[cand("A", dec!(1))])["A"], dec!(0.2));
    }
}
