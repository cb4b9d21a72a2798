//! Value types flowing through a rotation cycle.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Indicator values for one instrument on one rebalance date.
///
/// `None` means the indicator is undefined (not enough history).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSnapshot {
    pub id: String,
    /// Rate of change of close over the short lookback
    pub short_momentum: Option<Decimal>,
    /// Rate of change of close over the long lookback
    pub long_momentum: Option<Decimal>,
    /// Population std dev of close over the long lookback, divided by close
    pub volatility: Option<Decimal>,
    /// Rate of change of volume over the short lookback
    pub volume_change: Option<Decimal>,
}

impl InstrumentSnapshot {
    /// Snapshot with every indicator defined.
    pub fn new(
        id: impl Into<String>,
        short_momentum: Decimal,
        long_momentum: Decimal,
        volatility: Decimal,
        volume_change: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            short_momentum: Some(short_momentum),
            long_momentum: Some(long_momentum),
            volatility: Some(volatility),
            volume_change: Some(volume_change),
        }
    }

    /// Snapshot with no indicator defined yet.
    pub fn undefined(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            short_momentum: None,
            long_momentum: None,
            volatility: None,
            volume_change: None,
        }
    }
}

/// An eligible instrument and its ranking score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub id: String,
    pub score: Decimal,
}

impl ScoredCandidate {
    pub fn new(id: impl Into<String>, score: Decimal) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Instrument id -> target weight. Absent ids have weight zero.
pub type TargetAllocation = BTreeMap<String, Decimal>;
