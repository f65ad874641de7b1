//! Backtesting module for validating the risk protocol on historical data.
//!
//! This module provides:
//! - Historical bar loading (CSV import)
//! - Bar-by-bar simulation through the fuse, leverage and sizing pipeline
//! - Performance metrics calculation
//!
//! # Example
//!
//! ```rust,ignore
//! use magnet_risk_engine::backtest::{BacktestConfig, BacktestEngine, CsvBarLoader};
//! use magnet_risk_engine::Config;
//!
//! let loader = CsvBarLoader::new("data/btc_1h.csv")?;
//! let engine = BacktestEngine::new(loader, Config::default(), BacktestConfig::default());
//!
//! let result = engine.run(start, end)?;
//! println!("Return: {:.2}%", result.metrics.total_return_pct);
//! ```

mod data;
mod engine;
mod metrics;

pub use data::{BarRecord, CsvBarLoader, DataError, DataLoader};
pub use engine::{BacktestEngine, BacktestResult};
pub use metrics::{drawdown_pct, BacktestMetrics, EquityPoint, TradeRecord};

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Configuration for a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Initial capital for the backtest
    pub initial_equity: Decimal,

    /// Probability that a trade reaches its magnet before its stop
    pub win_rate: f64,

    /// Stop distance (in %) for bars without an explicit stop price
    pub default_stop_pct: Decimal,

    /// Seed for the outcome simulation
    pub seed: u64,

    /// Act as the operator and re-arm the fuse once it reaches cooldown
    pub operator_reset_on_cooldown: bool,

    /// Fraction of equity reported as available margin
    pub margin_fraction: Decimal,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_equity: dec!(430000),
            win_rate: 0.65,
            default_stop_pct: dec!(0.5),
            seed: 42,
            operator_reset_on_cooldown: true,
            margin_fraction: dec!(0.9),
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.initial_equity > Decimal::ZERO,
            "initial_equity must be positive"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.win_rate),
            "win_rate must be between 0 and 1"
        );
        anyhow::ensure!(
            self.default_stop_pct > Decimal::ZERO && self.default_stop_pct < dec!(100),
            "default_stop_pct must be between 0 and 100"
        );
        Ok(())
    }
}
