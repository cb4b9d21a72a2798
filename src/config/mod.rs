//! Configuration management for the ETF rotation strategy.
//!
//! Loads settings from environment variables and config files.

use crate::error::ConfigError;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Candidate scoring parameters
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Target weight and rebalancing parameters
    #[serde(default)]
    pub allocation: AllocationConfig,
    /// Indicator lookback windows
    #[serde(default)]
    pub indicators: IndicatorConfig,
    /// Rebalance trigger
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Simulated broker costs and capital
    #[serde(default)]
    pub broker: BrokerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight of volume change in the blended momentum (0.0-1.0).
    /// Price momentum gets `1 - volume_weight`.
    #[serde(default = "default_volume_weight")]
    pub volume_weight: Decimal,
    /// Substitute denominator when volatility is zero
    #[serde(default = "default_epsilon")]
    pub epsilon: Decimal,
    /// Drop candidates whose score is <= 0 (hold cash instead)
    #[serde(default = "default_require_positive_score")]
    pub require_positive_score: bool,
    /// Optional absolute volatility ceiling; instruments above it are skipped
    #[serde(default)]
    pub max_volatility: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Maximum number of concurrently held instruments
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Weight ceiling for a single instrument (0.0-1.0).
    /// The top-scored candidate always receives exactly this weight.
    #[serde(default = "default_per_instrument_cap")]
    pub per_instrument_cap: Decimal,
    /// Portfolio value used to size the buy leg
    #[serde(default)]
    pub buy_basis: BuyBasis,
    /// How weights are spread over the selected candidates
    #[serde(default)]
    pub weighting: Weighting,
}

/// Weighting scheme for the selected candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Highest score gets the cap, the rest scale by `score / highest`
    #[default]
    ScoreProportional,
    /// Every selected candidate with a positive score gets the cap.
    /// With `cap = 1 / max_candidates` this is a fully invested equal split.
    Equal,
}

/// Which portfolio value sizes the buy phase of a rebalance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyBasis {
    /// Reuse the value observed before any sell was applied
    PreSell,
    /// Re-read the value from the broker after all sells were applied
    #[default]
    PostSell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// Short momentum / volume-change lookback in bars
    #[serde(default = "default_short_period")]
    pub short_period: usize,
    /// Long momentum / volatility lookback in bars
    #[serde(default = "default_long_period")]
    pub long_period: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Run a rebalance cycle every N bars
    #[serde(default = "default_rebalance_days")]
    pub rebalance_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Starting cash for simulations
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,
    /// Commission charged on traded notional
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,
    /// Fractional price slippage applied against the trader
    #[serde(default = "default_slippage")]
    pub slippage: Decimal,
    /// Benchmark symbol tracked but never traded
    #[serde(default = "default_benchmark")]
    pub benchmark: Option<String>,
}

// Default value functions
fn default_volume_weight() -> Decimal {
    Decimal::new(3, 1) // 0.3
}

fn default_epsilon() -> Decimal {
    Decimal::new(1, 4) // 0.0001
}

fn default_require_positive_score() -> bool {
    true
}

fn default_max_candidates() -> usize {
    5
}

fn default_per_instrument_cap() -> Decimal {
    Decimal::new(20, 2) // 0.20
}

fn default_short_period() -> usize {
    10
}

fn default_long_period() -> usize {
    30
}

fn default_rebalance_days() -> u32 {
    5
}

fn default_initial_capital() -> Decimal {
    Decimal::new(20_000, 0)
}

fn default_commission_rate() -> Decimal {
    Decimal::new(5, 5) // 0.00005
}

fn default_slippage() -> Decimal {
    Decimal::new(1, 4) // 0.0001
}

fn default_benchmark() -> Option<String> {
    Some("510300".to_string()) // CSI 300 ETF
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("ETF"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring.validate()?;
        self.allocation.validate()?;
        self.indicators.validate()?;
        self.schedule.validate()?;
        self.broker.validate()
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.volume_weight < Decimal::ZERO || self.volume_weight > Decimal::ONE {
            return Err(ConfigError::VolumeWeightOutOfRange(self.volume_weight));
        }
        if self.epsilon <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveEpsilon(self.epsilon));
        }
        if let Some(max) = self.max_volatility {
            if max <= Decimal::ZERO {
                return Err(ConfigError::NonPositiveMaxVolatility(max));
            }
        }
        Ok(())
    }
}

impl AllocationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_candidates == 0 {
            return Err(ConfigError::ZeroMaxCandidates);
        }
        if self.per_instrument_cap <= Decimal::ZERO || self.per_instrument_cap > Decimal::ONE {
            return Err(ConfigError::CapOutOfRange(self.per_instrument_cap));
        }
        if self.per_instrument_cap * Decimal::from(self.max_candidates) > Decimal::ONE {
            return Err(ConfigError::LeveragedAllocation {
                cap: self.per_instrument_cap,
                max_candidates: self.max_candidates,
            });
        }
        Ok(())
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.short_period == 0 || self.short_period > self.long_period {
            return Err(ConfigError::InvalidLookback {
                short: self.short_period,
                long: self.long_period,
            });
        }
        Ok(())
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rebalance_days == 0 {
            return Err(ConfigError::ZeroRebalanceDays);
        }
        Ok(())
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_capital <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveCapital(self.initial_capital));
        }
        if self.commission_rate < Decimal::ZERO {
            return Err(ConfigError::NegativeCost {
                field: "commission_rate",
                value: self.commission_rate,
            });
        }
        if self.slippage < Decimal::ZERO {
            return Err(ConfigError::NegativeCost {
                field: "slippage",
                value: self.slippage,
            });
        }
        Ok(())
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            volume_weight: default_volume_weight(),
            epsilon: default_epsilon(),
            require_positive_score: default_require_positive_score(),
            max_volatility: None,
        }
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_candidates: default_max_candidates(),
            per_instrument_cap: default_per_instrument_cap(),
            buy_basis: BuyBasis::default(),
            weighting: Weighting::default(),
        }
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            short_period: default_short_period(),
            long_period: default_long_period(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            rebalance_days: default_rebalance_days(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            commission_rate: default_commission_rate(),
            slippage: default_slippage(),
            benchmark: default_benchmark(),
        }
    }
}
