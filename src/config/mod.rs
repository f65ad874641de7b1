//! Configuration management for the magnet risk engine.
//!
//! The calculators take their config structs by value at construction time.
//! Loading from environment variables and config files happens only in the
//! application layer via [`Config::load`].

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::decimal::is_valid_pct;

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error(
        "leverage bounds must satisfy 0 < min ({min}) <= max ({max}) <= high_tension_max ({high_tension_max})"
    )]
    LeverageBounds {
        min: Decimal,
        max: Decimal,
        high_tension_max: Decimal,
    },

    #[error("reduction bounds must satisfy 0 <= min ({min}) <= max ({max}) <= 1")]
    ReductionBounds { min: Decimal, max: Decimal },

    #[error("{field} = {value} is out of range, expected {expected}")]
    OutOfRange {
        field: &'static str,
        value: Decimal,
        expected: &'static str,
    },
}

impl ConfigError {
    fn out_of_range(field: &'static str, value: Decimal, expected: &'static str) -> Self {
        Self::OutOfRange {
            field,
            value,
            expected,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Magnet-aware leverage formula
    #[serde(default)]
    pub leverage: LeverageConfig,
    /// Survival fuse thresholds
    #[serde(default)]
    pub fuse: FuseConfig,
    /// Position sizing limits
    #[serde(default)]
    pub sizing: SizingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageConfig {
    /// Floor for every computed leverage
    #[serde(default = "default_min_leverage")]
    pub min_leverage: Decimal,
    /// Ceiling before the high-tension override
    #[serde(default = "default_max_leverage")]
    pub max_leverage: Decimal,
    /// Absolute ceiling, reachable only through the high-tension override
    #[serde(default = "default_high_tension_max")]
    pub high_tension_max: Decimal,
    /// Conflict + volatility must stay below this for the override
    #[serde(default = "default_high_tension_threshold")]
    pub high_tension_threshold: Decimal,
    /// Minimum magnet strength (0-100) for the override
    #[serde(default = "default_min_magnet_strength")]
    pub min_magnet_strength: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuseConfig {
    /// Volatility pressure above which the fuse trips
    #[serde(default = "default_max_volatility")]
    pub max_volatility: Decimal,
    /// Account drawdown (in %) above which the fuse trips
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
    /// Conflict index above which the fuse trips
    #[serde(default = "default_max_conflict_index")]
    pub max_conflict_index: Decimal,
    /// Liquidity score (0-100) below which the fuse trips
    #[serde(default = "default_min_liquidity_score")]
    pub min_liquidity_score: Decimal,
    /// Lower bound of the mandated position reduction (0.0-1.0)
    #[serde(default = "default_reduction_pct_min")]
    pub reduction_pct_min: Decimal,
    /// Upper bound of the mandated position reduction (0.0-1.0)
    #[serde(default = "default_reduction_pct_max")]
    pub reduction_pct_max: Decimal,
    /// Leverage mandated after a trip
    #[serde(default = "default_fuse_leverage")]
    pub fuse_leverage: Decimal,
    /// Seconds from a trip until the fuse enters cooldown
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    /// Seconds new trades are halted after a trip
    #[serde(default = "default_halt_duration_seconds")]
    pub halt_duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Equity risked per trade, in %
    #[serde(default = "default_risk_per_trade_pct")]
    pub risk_per_trade_pct: Decimal,
    /// Global cap on a single position, in % of equity
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: Decimal,
    /// Cap on all open positions together, in % of equity
    #[serde(default = "default_max_total_exposure_pct")]
    pub max_total_exposure_pct: Decimal,
    #[serde(default = "default_tier1_max_pct")]
    pub tier1_max_pct: Decimal,
    #[serde(default = "default_tier2_max_pct")]
    pub tier2_max_pct: Decimal,
    #[serde(default = "default_tier3_max_pct")]
    pub tier3_max_pct: Decimal,
    /// Also applied to unrecognized tiers
    #[serde(default = "default_tier4_max_pct")]
    pub tier4_max_pct: Decimal,
}

// Default value functions
fn default_min_leverage() -> Decimal {
    dec!(1.0)
}

fn default_max_leverage() -> Decimal {
    dec!(2.5)
}

fn default_high_tension_max() -> Decimal {
    dec!(3.0)
}

fn default_high_tension_threshold() -> Decimal {
    dec!(0.15)
}

fn default_min_magnet_strength() -> Decimal {
    dec!(60.0)
}

fn default_max_volatility() -> Decimal {
    dec!(2.0)
}

fn default_max_drawdown_pct() -> Decimal {
    dec!(5.0)
}

fn default_max_conflict_index() -> Decimal {
    dec!(0.8)
}

fn default_min_liquidity_score() -> Decimal {
    dec!(30)
}

fn default_reduction_pct_min() -> Decimal {
    dec!(0.3)
}

fn default_reduction_pct_max() -> Decimal {
    dec!(0.7)
}

fn default_fuse_leverage() -> Decimal {
    dec!(1.0)
}

fn default_cooldown_seconds() -> u64 {
    300 // 5 minutes
}

fn default_halt_duration_seconds() -> u64 {
    180 // 3 minutes
}

fn default_risk_per_trade_pct() -> Decimal {
    dec!(1.0)
}

fn default_max_position_pct() -> Decimal {
    dec!(20.0)
}

fn default_max_total_exposure_pct() -> Decimal {
    dec!(50.0)
}

fn default_tier1_max_pct() -> Decimal {
    dec!(15.0)
}

fn default_tier2_max_pct() -> Decimal {
    dec!(10.0)
}

fn default_tier3_max_pct() -> Decimal {
    dec!(5.0)
}

fn default_tier4_max_pct() -> Decimal {
    dec!(2.0)
}

impl Config {
    /// Load configuration from environment variables and config files.
    ///
    /// Environment variables use the `MAGNET` prefix and `__` as separator,
    /// e.g. `MAGNET__FUSE__MAX_DRAWDOWN_PCT=4.0`.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("MAGNET"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Validate every component configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.leverage.validate()?;
        self.fuse.validate()?;
        self.sizing.validate()
    }
}

impl LeverageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_leverage <= Decimal::ZERO
            || self.min_leverage > self.max_leverage
            || self.max_leverage > self.high_tension_max
        {
            return Err(ConfigError::LeverageBounds {
                min: self.min_leverage,
                max: self.max_leverage,
                high_tension_max: self.high_tension_max,
            });
        }

        if self.high_tension_threshold < Decimal::ZERO {
            return Err(ConfigError::out_of_range(
                "high_tension_threshold",
                self.high_tension_threshold,
                ">= 0",
            ));
        }

        if self.min_magnet_strength < Decimal::ZERO || self.min_magnet_strength > dec!(100) {
            return Err(ConfigError::out_of_range(
                "min_magnet_strength",
                self.min_magnet_strength,
                "0..=100",
            ));
        }

        Ok(())
    }
}

/// Upper bound for fuse cooldown and halt durations.
const MAX_DURATION_SECONDS: u64 = 7 * 24 * 60 * 60;

impl FuseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            ("max_volatility", self.max_volatility),
            ("max_drawdown_pct", self.max_drawdown_pct),
            ("max_conflict_index", self.max_conflict_index),
            ("fuse_leverage", self.fuse_leverage),
        ];
        for (field, value) in thresholds {
            if value <= Decimal::ZERO {
                return Err(ConfigError::out_of_range(field, value, "> 0"));
            }
        }

        if self.min_liquidity_score < Decimal::ZERO || self.min_liquidity_score > dec!(100) {
            return Err(ConfigError::out_of_range(
                "min_liquidity_score",
                self.min_liquidity_score,
                "0..=100",
            ));
        }

        let durations = [
            ("cooldown_seconds", self.cooldown_seconds),
            ("halt_duration_seconds", self.halt_duration_seconds),
        ];
        for (field, value) in durations {
            if value > MAX_DURATION_SECONDS {
                return Err(ConfigError::out_of_range(
                    field,
                    Decimal::from(value),
                    "<= 604800 (one week)",
                ));
            }
        }

        if self.reduction_pct_min < Decimal::ZERO
            || self.reduction_pct_min > self.reduction_pct_max
            || self.reduction_pct_max > Decimal::ONE
        {
            return Err(ConfigError::ReductionBounds {
                min: self.reduction_pct_min,
                max: self.reduction_pct_max,
            });
        }

        Ok(())
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("risk_per_trade_pct", self.risk_per_trade_pct),
            ("max_position_pct", self.max_position_pct),
            ("max_total_exposure_pct", self.max_total_exposure_pct),
        ];
        for (field, value) in limits {
            if !is_valid_pct(value) {
                return Err(ConfigError::out_of_range(field, value, "0 < pct <= 100"));
            }
        }

        let tiers = [
            ("tier1_max_pct", self.tier1_max_pct),
            ("tier2_max_pct", self.tier2_max_pct),
            ("tier3_max_pct", self.tier3_max_pct),
            ("tier4_max_pct", self.tier4_max_pct),
        ];
        for (field, value) in tiers {
            if value < Decimal::ZERO || value > dec!(100) {
                return Err(ConfigError::out_of_range(field, value, "0 <= pct <= 100"));
            }
        }

        Ok(())
    }
}

impl Default for LeverageConfig {
    fn default() -> Self {
        Self {
            min_leverage: default_min_leverage(),
            max_leverage: default_max_leverage(),
            high_tension_max: default_high_tension_max(),
            high_tension_threshold: default_high_tension_threshold(),
            min_magnet_strength: default_min_magnet_strength(),
        }
    }
}

impl Default for FuseConfig {
    fn default() -> Self {
        Self {
            max_volatility: default_max_volatility(),
            max_drawdown_pct: default_max_drawdown_pct(),
            max_conflict_index: default_max_conflict_index(),
            min_liquidity_score: default_min_liquidity_score(),
            reduction_pct_min: default_reduction_pct_min(),
            reduction_pct_max: default_reduction_pct_max(),
            fuse_leverage: default_fuse_leverage(),
            cooldown_seconds: default_cooldown_seconds(),
            halt_duration_seconds: default_halt_duration_seconds(),
        }
    }
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            risk_per_trade_pct: default_risk_per_trade_pct(),
            max_position_pct: default_max_position_pct(),
            max_total_exposure_pct: default_max_total_exposure_pct(),
            tier1_max_pct: default_tier1_max_pct(),
            tier2_max_pct: default_tier2_max_pct(),
            tier3_max_pct: default_tier3_max_pct(),
            tier4_max_pct: default_tier4_max_pct(),
        }
    }
}
