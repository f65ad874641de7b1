//! Tiered position sizing.
//!
//! Sizes a trade from the risk budget (`risk_per_trade_pct` of equity),
//! the stop distance and the leverage, then caps it by magnet tier, by the
//! global single-position limit and by total account exposure.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ConfigError, SizingConfig};
use crate::magnet::{MagnetTier, TradeSetup};
use crate::utils::decimal::{as_percent, pct_distance, percent_of, safe_div};

/// Account snapshot supplied by the portfolio tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub equity: Decimal,
    pub available_margin: Decimal,
    pub open_positions_value: Decimal,
    #[serde(default)]
    pub unrealized_pnl: Decimal,
    #[serde(default)]
    pub daily_pnl: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SizingResult {
    /// Final position size in quote currency
    pub position_size: Decimal,
    /// Position size in % of equity
    pub position_pct: Decimal,
    /// Size implied by the risk budget, before caps
    pub base_position: Decimal,
    pub tier_limit_pct: Decimal,
    /// |entry - stop| / entry
    pub stop_distance_pct: Decimal,
    /// |magnet - entry| / entry
    pub reward_distance_pct: Decimal,
    pub risk_amount: Decimal,
    pub actual_risk: Decimal,
    pub actual_risk_pct: Decimal,
    pub potential_reward: Decimal,
    pub risk_reward_ratio: Decimal,
    pub exposure_exceeded: bool,
    pub safe_to_trade: bool,
}

/// Stateless position sizer.
#[derive(Debug, Clone, Default)]
pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Position cap for a tier, in % of equity.
    pub fn tier_limit_pct(&self, tier: MagnetTier) -> Decimal {
        match tier {
            MagnetTier::Tier1 => self.config.tier1_max_pct,
            MagnetTier::Tier2 => self.config.tier2_max_pct,
            MagnetTier::Tier3 => self.config.tier3_max_pct,
            MagnetTier::Tier4 => self.config.tier4_max_pct,
        }
    }

    /// Size `trade` for `account`.
    ///
    /// Degenerate inputs (no stop distance, non-positive equity) yield a zero
    /// size that is not safe to trade.
    pub fn calculate_position_size(&self, account: &AccountState, trade: &TradeSetup) -> SizingResult {
        let cfg = &self.config;

        let stop_distance_pct = pct_distance(trade.stop_price, trade.entry_price);
        if stop_distance_pct == Decimal::ZERO {
            debug!(entry = %trade.entry_price, stop = %trade.stop_price, "No stop distance, refusing to size");
            return SizingResult::default();
        }

        let equity = account.equity;
        let risk_amount = percent_of(equity, cfg.risk_per_trade_pct);
        // Saturates for vanishing stop distances so the caps below still bind.
        let base_position = safe_div(risk_amount.saturating_mul(trade.leverage), stop_distance_pct);

        let tier_limit_pct = self.tier_limit_pct(trade.tier());
        let tier_max = percent_of(equity, tier_limit_pct);
        let global_max = percent_of(equity, cfg.max_position_pct);

        let mut final_size = base_position
            .min(tier_max)
            .min(global_max)
            .max(Decimal::ZERO);

        let max_exposure = percent_of(equity, cfg.max_total_exposure_pct);
        let total_exposure = account.open_positions_value.saturating_add(final_size);
        let exposure_exceeded = total_exposure > max_exposure;
        if exposure_exceeded {
            final_size = max_exposure
                .saturating_sub(account.open_positions_value)
                .max(Decimal::ZERO);
            warn!(
                open = %account.open_positions_value,
                %max_exposure,
                clamped = %final_size,
                "Position clamped by total exposure limit"
            );
        }

        let actual_risk = safe_div(final_size.saturating_mul(stop_distance_pct), trade.leverage);
        let actual_risk_pct = as_percent(actual_risk, equity);
        let reward_distance_pct = pct_distance(trade.magnet_price, trade.entry_price);
        let potential_reward = safe_div(final_size.saturating_mul(reward_distance_pct), trade.leverage);
        let risk_reward_ratio = safe_div(potential_reward, actual_risk);

        let safe_to_trade = !exposure_exceeded && final_size > Decimal::ZERO;

        debug!(
            tier = %trade.tier(),
            %base_position,
            %tier_max,
            %global_max,
            position_size = %final_size,
            %risk_reward_ratio,
            safe_to_trade,
            "Position sized"
        );

        SizingResult {
            position_size: final_size,
            position_pct: as_percent(final_size, equity),
            base_position,
            tier_limit_pct,
            stop_distance_pct,
            reward_distance_pct,
            risk_amount,
            actual_risk,
            actual_risk_pct,
            potential_reward,
            risk_reward_ratio,
            exposure_exceeded,
            safe_to_trade,
        }
    }
}
