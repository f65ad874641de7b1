//! Risk orchestration - the per-candidate decision pipeline.
//!
//! For every trade candidate the orchestrator runs, in order:
//! 1. SurvivalFuse (halt if not armed)
//! 2. LeverageEngine
//! 3. PositionSizer
//!
//! It never submits orders; the execution engine acts on the returned
//! [`TradeDecision`].

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ConfigError};
use crate::magnet::{MagnetState, TradeSetup};

use super::{
    AccountState, FuseCheckResult, LeverageEngine, LeverageResult, MarketConditions,
    PositionSizer, SizingResult, SurvivalFuse,
};

/// A trade idea towards the primary magnet.
#[derive(Debug, Clone)]
pub struct TradeCandidate {
    /// Entry is `magnet.current_price`, target is `magnet.primary_magnet_price`
    pub magnet: MagnetState,
    pub conditions: MarketConditions,
    pub stop_price: Decimal,
    pub magnet_tier: u8,
}

/// Verdict for one candidate.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TradeDecision {
    /// Submit `trade` with `sizing.position_size`
    Approved {
        trade: TradeSetup,
        leverage: LeverageResult,
        sizing: SizingResult,
    },
    /// The fuse is not armed; carry out `fuse.actions` if any
    Halted { fuse: FuseCheckResult },
    /// Sizing produced nothing safe to trade
    Rejected {
        trade: TradeSetup,
        leverage: LeverageResult,
        sizing: SizingResult,
    },
}

impl TradeDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, TradeDecision::Approved { .. })
    }
}

/// Owns the fuse of one account plus the stateless calculators.
pub struct RiskOrchestrator<C: Clock = SystemClock> {
    fuse: SurvivalFuse<C>,
    leverage_engine: LeverageEngine,
    sizer: PositionSizer,
}

impl RiskOrchestrator<SystemClock> {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RiskOrchestrator<C> {
    pub fn with_clock(config: &Config, clock: C) -> Result<Self, ConfigError> {
        Ok(Self {
            fuse: SurvivalFuse::with_clock(config.fuse.clone(), clock)?,
            leverage_engine: LeverageEngine::new(config.leverage.clone())?,
            sizer: PositionSizer::new(config.sizing.clone())?,
        })
    }

    pub fn fuse(&self) -> &SurvivalFuse<C> {
        &self.fuse
    }

    pub fn fuse_mut(&mut self) -> &mut SurvivalFuse<C> {
        &mut self.fuse
    }

    /// Run the fuse, leverage and sizing checks for `candidate`.
    pub fn evaluate(&mut self, candidate: &TradeCandidate, account: &AccountState) -> TradeDecision {
        let fuse_check = self.fuse.check_triggers(&candidate.conditions);
        if !self.fuse.can_open_new_trades() {
            debug!(state = %fuse_check.current_state, "Candidate halted by survival fuse");
            return TradeDecision::Halted { fuse: fuse_check };
        }

        let leverage = self.leverage_engine.calculate_leverage(&candidate.magnet);
        let trade = TradeSetup {
            entry_price: candidate.magnet.current_price,
            stop_price: candidate.stop_price,
            magnet_price: candidate.magnet.primary_magnet_price,
            magnet_tier: candidate.magnet_tier,
            leverage: leverage.leverage,
        };
        let sizing = self.sizer.calculate_position_size(account, &trade);

        if sizing.safe_to_trade {
            info!(
                entry = %trade.entry_price,
                target = %trade.magnet_price,
                leverage = %trade.leverage,
                size = %sizing.position_size,
                rr = %sizing.risk_reward_ratio.round_dp(2),
                "Trade approved"
            );
            TradeDecision::Approved {
                trade,
                leverage,
                sizing,
            }
        } else {
            debug!(
                exposure_exceeded = sizing.exposure_exceeded,
                size = %sizing.position_size,
                "Trade rejected by position sizer"
            );
            TradeDecision::Rejected {
                trade,
                leverage,
                sizing,
            }
        }
    }
}
