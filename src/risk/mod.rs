//! Survival-first risk management.
//!
//! Three calculators jointly decide how much capital may be put at risk:
//! - Survival fuse (circuit breaker halting new risk)
//! - Magnet-aware leverage
//! - Tiered position sizing
//!
//! Call order per candidate is fuse, then leverage, then sizing; see
//! [`RiskOrchestrator`].

mod fuse;
mod leverage;
mod orchestrator;
mod sizing;

pub use fuse::{
    FuseAction, FuseAlert, FuseCheckResult, FuseState, FuseStatus, FuseTrigger,
    MarketConditions, SharedFuse, SurvivalFuse, TriggerEvent,
};
pub use leverage::{LeverageComponents, LeverageEngine, LeverageResult, LeverageSignal};
pub use orchestrator::{RiskOrchestrator, TradeCandidate, TradeDecision};
pub use sizing::{AccountState, PositionSizer, SizingResult};
