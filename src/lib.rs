//! # Magnet Risk Engine
//!
//! Survival-first risk and leverage engine for magnet-based trading.
//!
//! ## Architecture
//!
//! - `magnet`: Magnet facts and the trade inputs derived from them
//! - `risk`: Survival fuse, leverage formula, position sizing and the
//!   orchestrator chaining them
//! - `config`: Configuration management and validation
//! - `clock`: Time sources for the stateful fuse
//! - `backtest`: Historical validation harness
//! - `utils`: Shared utilities and decimal arithmetic

pub mod backtest;
pub mod clock;
pub mod config;
pub mod magnet;
pub mod risk;
pub mod utils;

pub use config::{Config, ConfigError};
