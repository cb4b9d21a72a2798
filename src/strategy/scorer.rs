//! Momentum/volatility scoring of rotation candidates.

use super::types::{InstrumentSnapshot, ScoredCandidate};
use crate::config::ScoringConfig;
use crate::error::ConfigError;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use tracing::{debug, trace};

/// Reasons for excluding an instrument from this cycle's ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// At least one indicator is undefined
    InsufficientHistory,
    /// Short and long momentum are both negative
    Declining,
    /// Volatility above the configured ceiling
    TooVolatile,
    /// Score <= 0 while positive scores are required
    NonPositiveScore,
    /// Score does not fit in a `Decimal`
    Overflow,
}

/// Ranks instrument snapshots by risk-adjusted blended momentum.
#[derive(Debug, Clone)]
pub struct ScoreEngine {
    config: ScoringConfig,
}

impl ScoreEngine {
    /// Create a score engine, rejecting invalid configuration up front.
    pub fn new(config: ScoringConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score and rank one cycle's snapshots. See [`score`].
    pub fn score(&self, snapshots: &[InstrumentSnapshot]) -> Vec<ScoredCandidate> {
        score(snapshots, &self.config)
    }
}

/// Score eligible snapshots and sort them best first.
///
/// `score = ((1 - w) * short_momentum + w * volume_change) / volatility`,
/// with `epsilon` standing in for a non-positive volatility. Ties are broken
/// by id ascending. Never fails; empty input yields an empty ranking.
pub fn score(snapshots: &[InstrumentSnapshot], config: &ScoringConfig) -> Vec<ScoredCandidate> {
    let mut rejected_history = 0usize;
    let mut rejected_declining = 0usize;
    let mut rejected_volatile = 0usize;
    let mut rejected_non_positive = 0usize;
    let mut rejected_overflow = 0usize;

    let mut candidates: Vec<ScoredCandidate> = snapshots
        .iter()
        .filter_map(|snapshot| match score_one(snapshot, config) {
            Ok(score) => Some(ScoredCandidate::new(snapshot.id.clone(), score)),
            Err(reason) => {
                match reason {
                    RejectReason::InsufficientHistory => rejected_history += 1,
                    RejectReason::Declining => rejected_declining += 1,
                    RejectReason::TooVolatile => rejected_volatile += 1,
                    RejectReason::NonPositiveScore => rejected_non_positive += 1,
                    RejectReason::Overflow => rejected_overflow += 1,
                }
                trace!(id = %snapshot.id, ?reason, "Instrument excluded");
                None
            }
        })
        .collect();

    candidates.sort_by(rank_order);

    debug!(
        total = snapshots.len(),
        eligible = candidates.len(),
        rejected_history,
        rejected_declining,
        rejected_volatile,
        rejected_non_positive,
        rejected_overflow,
        "Scoring complete"
    );

    candidates
}

/// Score descending, then id ascending.
fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id))
}

fn score_one(
    snapshot: &InstrumentSnapshot,
    config: &ScoringConfig,
) -> Result<Decimal, RejectReason> {
    let (Some(short), Some(long), Some(volatility), Some(volume_change)) = (
        snapshot.short_momentum,
        snapshot.long_momentum,
        snapshot.volatility,
        snapshot.volume_change,
    ) else {
        return Err(RejectReason::InsufficientHistory);
    };

    if short < Decimal::ZERO && long < Decimal::ZERO {
        return Err(RejectReason::Declining);
    }

    if let Some(max) = config.max_volatility {
        if volatility > max {
            return Err(RejectReason::TooVolatile);
        }
    }

    let price_weight = Decimal::ONE - config.volume_weight;
    let denom = if volatility > Decimal::ZERO {
        volatility
    } else {
        config.epsilon
    };
    let score = price_weight
        .checked_mul(short)
        .zip(config.volume_weight.checked_mul(volume_change))
        .and_then(|(price_part, volume_part)| price_part.checked_add(volume_part))
        .and_then(|weighted_momentum| weighted_momentum.checked_div(denom))
        .ok_or(RejectReason::Overflow)?;

    if config.require_positive_score && score <= Decimal::ZERO {
        return Err(RejectReason::NonPositiveScore);
    }

    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn lenient() -> ScoringConfig {
        ScoringConfig {
            volume_weight: dec!(0.3),
            epsilon: dec!(0.0001),
            require_positive_score: false,
            max_volatility: None,
        }
    }

    fn snap(id: &str, short: Decimal, long: Decimal, vol: Decimal, volchg: Decimal) -> InstrumentSnapshot {
        InstrumentSnapshot::new(id, short, long, vol, volchg)
    }

    #[test]
    fn test_declining_excluded_and_score_formula() {
        let snapshots = vec![
            snap("X", dec!(0.10), dec!(0.08), dec!(0.02), dec!(0.05)),
            snap("Y", dec!(-0.05), dec!(-0.03), dec!(0.01), dec!(0.0)),
        ];

        let ranked = score(&snapshots, &lenient());

        // (0.7 * 0.10 + 0.3 * 0.05) / 0.02 = 0.085 / 0.02
        assert_eq!(ranked, vec![ScoredCandidate::new("X", dec!(4.25))]);
    }

    #[test]
    fn test_single_negative_momentum_still_eligible() {
        let snapshots = vec![
            snap("A", dec!(-0.02), dec!(0.05), dec!(0.02), dec!(0.0)),
            snap("B", dec!(0.02), dec!(-0.05), dec!(0.02), dec!(0.0)),
        ];

        let ranked = score(&snapshots, &lenient());

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, "B");
        assert!(ranked[1].score < Decimal::ZERO);
    }

    #[test]
    fn test_undefined_fields_are_ineligible() {
        let mut missing_volume = snap("A", dec!(0.1), dec!(0.1), dec!(0.02), dec!(0.1));
        missing_volume.volume_change = None;
        let snapshots = vec![
            missing_volume,
            InstrumentSnapshot::undefined("B"),
            snap("C", dec!(0.1), dec!(0.1), dec!(0.02), dec!(0.1)),
        ];

        let ranked = score(&snapshots, &lenient());

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "C");
    }

    #[test]
    fn test_zero_volatility_uses_epsilon() {
        let snapshots = vec![snap("A", dec!(0.01), dec!(0.01), Decimal::ZERO, dec!(0.01))];

        let ranked = score(&snapshots, &lenient());

        assert_eq!(ranked[0].score, dec!(0.01) / dec!(0.0001));
    }

    #[test]
    fn test_sorted_descending_with_id_tiebreak() {
        let snapshots = vec![
            snap("C", dec!(0.02), dec!(0.01), dec!(0.01), dec!(0.02)),
            snap("B", dec!(0.05), dec!(0.01), dec!(0.01), dec!(0.05)),
            snap("A", dec!(0.02), dec!(0.01), dec!(0.01), dec!(0.02)),
            snap("D", dec!(0.01), dec!(0.01), dec!(0.01), dec!(0.01)),
        ];

        let ranked = score(&snapshots, &lenient());
        let ids: Vec<&str> = ranked.iter().map(|c| c.id.as_str()).collect();

        assert_eq!(ids, vec!["B", "A", "C", "D"]);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_strict_mode_drops_non_positive_scores() {
        let mut config = lenient();
        config.require_positive_score = true;
        let snapshots = vec![
            snap("A", dec!(0.05), dec!(0.01), dec!(0.02), dec!(0.0)),
            snap("B", dec!(-0.05), dec!(0.01), dec!(0.02), dec!(0.0)),
            snap("C", Decimal::ZERO, dec!(0.01), dec!(0.02), Decimal::ZERO),
        ];

        let ranked = score(&snapshots, &config);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "A");
    }

    #[test]
    fn test_volume_weight_extremes() {
        let snapshots = vec![snap("A", dec!(0.10), dec!(0.1), dec!(0.1), dec!(0.30))];

        let mut config = lenient();
        config.volume_weight = Decimal::ZERO;
        assert_eq!(score(&snapshots, &config)[0].score, dec!(1));

        config.volume_weight = Decimal::ONE;
        assert_eq!(score(&snapshots, &config)[0].score, dec!(3));
    }

    #[test]
    fn test_max_volatility_ceiling() {
        let mut config = lenient();
        config.max_volatility = Some(dec!(0.3));
        let snapshots = vec![
            snap("CALM", dec!(0.1), dec!(0.1), dec!(0.2), dec!(0.1)),
            snap("WILD", dec!(0.5), dec!(0.5), dec!(0.4), dec!(0.5)),
        ];

        let ranked = score(&snapshots, &config);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "CALM");
    }

    #[test]
    fn test_overflowing_score_is_excluded() {
        let snapshots = vec![
            snap("HUGE", Decimal::MAX, dec!(1), dec!(0.02), dec!(0)),
            snap("OK", dec!(0.1), dec!(0.1), dec!(0.02), dec!(0.1)),
        ];

        let ranked = score(&snapshots, &lenient());

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "OK");
        assert_eq!(score_one(&snapshots[0], &lenient()), Err(RejectReason::Overflow));
    }

    #[test]
    fn test_empty_input() {
        assert!(score(&[], &lenient()).is_empty());
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let mut config = lenient();
        config.volume_weight = dec!(1.5);
        assert!(ScoreEngine::new(config).is_err());

        let engine = ScoreEngine::new(lenient()).unwrap();
        let snapshots = vec![snap("A", dec!(0.1), dec!(0.1), dec!(0.1), dec!(0.1))];
        assert_eq!(engine.score(&snapshots).len(), 1);
    }
}
