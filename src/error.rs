//! Error types for the rotation core.

use rust_decimal::Decimal;
use thiserror::Error;

/// Invalid configuration. Raised at construction time, never mid-cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("volume_weight must be within [0, 1], got {0}")]
    VolumeWeightOutOfRange(Decimal),

    #[error("epsilon must be positive, got {0}")]
    NonPositiveEpsilon(Decimal),

    #[error("max_volatility must be positive when set, got {0}")]
    NonPositiveMaxVolatility(Decimal),

    #[error("max_candidates must be at least 1")]
    ZeroMaxCandidates,

    #[error("per_instrument_cap must be within (0, 1], got {0}")]
    CapOutOfRange(Decimal),

    /// `per_instrument_cap * max_candidates` would allow leverage.
    #[error("per_instrument_cap {cap} x max_candidates {max_candidates} exceeds 1.0")]
    LeveragedAllocation { cap: Decimal, max_candidates: usize },

    #[error("rebalance_days must be at least 1")]
    ZeroRebalanceDays,

    #[error("lookback periods must satisfy 1 <= short ({short}) <= long ({long})")]
    InvalidLookback { short: usize, long: usize },

    #[error("{field} must not be negative, got {value}")]
    NegativeCost { field: &'static str, value: Decimal },

    #[error("initial_capital must be positive, got {0}")]
    NonPositiveCapital(Decimal),
}

/// Order rejected by a broker. Contained to the one instruction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrokerError {
    #[error("no valid price for {0}")]
    NoPrice(String),

    #[error("insufficient cash for {id}: need {required}, have {available}")]
    InsufficientCash {
        id: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("insufficient holdings for {id}: sell {requested}, hold {held}")]
    InsufficientHoldings { id: String, requested: u64, held: u64 },
}
