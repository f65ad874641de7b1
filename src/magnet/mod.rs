//! Magnet facts supplied by the external magnet detector.
//!
//! A magnet is a price level expected to attract price action. These types
//! carry no behavior beyond conversion into the inputs of the leverage
//! engine and the position sizer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of a detected magnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagnetType {
    Structural,
    Liquidity,
    Orderflow,
    Volume,
    Timeframe,
}

/// Magnet quality ranking, `Tier1` strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum MagnetTier {
    Tier1,
    Tier2,
    Tier3,
    Tier4,
}

impl MagnetTier {
    /// Numeric rank (1-4).
    pub fn rank(self) -> u8 {
        match self {
            MagnetTier::Tier1 => 1,
            MagnetTier::Tier2 => 2,
            MagnetTier::Tier3 => 3,
            MagnetTier::Tier4 => 4,
        }
    }
}

impl From<u8> for MagnetTier {
    /// Unrecognized ranks fall back to the weakest tier.
    fn from(rank: u8) -> Self {
        match rank {
            1 => MagnetTier::Tier1,
            2 => MagnetTier::Tier2,
            3 => MagnetTier::Tier3,
            _ => MagnetTier::Tier4,
        }
    }
}

impl From<MagnetTier> for u8 {
    fn from(tier: MagnetTier) -> Self {
        tier.rank()
    }
}

impl fmt::Display for MagnetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.rank())
    }
}

/// A detected magnet level. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Magnet {
    pub level: Decimal,
    pub magnet_type: MagnetType,
    /// Strength score (0-100)
    pub strength: Decimal,
    /// Competition from other magnets (>= 0)
    pub conflict: Decimal,
    /// Distance from price in ATR units
    pub distance_atr: Decimal,
    pub volatility_pressure: Decimal,
    pub tier: MagnetTier,
    /// Timeframe label, e.g. "4h"
    pub timeframe: String,
    pub detected_at: DateTime<Utc>,
}

/// Input of the leverage engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnetState {
    pub primary_magnet_price: Decimal,
    pub current_price: Decimal,
    /// Strength score (0-100)
    pub magnet_strength: Decimal,
    pub conflict_index: Decimal,
    pub volatility_pressure: Decimal,
    /// Average true range; zero is tolerated
    pub atr: Decimal,
}

impl MagnetState {
    /// Build the leverage input for `magnet` at the current market.
    pub fn from_magnet(magnet: &Magnet, current_price: Decimal, atr: Decimal) -> Self {
        Self {
            primary_magnet_price: magnet.level,
            current_price,
            magnet_strength: magnet.strength,
            conflict_index: magnet.conflict,
            volatility_pressure: magnet.volatility_pressure,
            atr,
        }
    }
}

/// A candidate trade towards a magnet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSetup {
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    /// Target price (the magnet level)
    pub magnet_price: Decimal,
    /// Raw tier rank; anything outside 1-3 is sized as tier 4
    pub magnet_tier: u8,
    /// Leverage from the leverage engine
    pub leverage: Decimal,
}

impl TradeSetup {
    /// Build a setup targeting `magnet` from `entry_price` with the given stop.
    pub fn from_magnet(
        magnet: &Magnet,
        entry_price: Decimal,
        stop_price: Decimal,
        leverage: Decimal,
    ) -> Self {
        Self {
            entry_price,
            stop_price,
            magnet_price: magnet.level,
            magnet_tier: magnet.tier.rank(),
            leverage,
        }
    }

    /// Tier used for position caps.
    pub fn tier(&self) -> MagnetTier {
        MagnetTier::from(self.magnet_tier)
    }

    /// +1 for a long towards a higher magnet, -1 otherwise.
    pub fn direction(&self) -> Decimal {
        if self.magnet_price > self.entry_price {
            Decimal::ONE
        } else {
            Decimal::NEGATIVE_ONE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_magnet() -> Magnet {
        Magnet {
            level: dec!(44000),
            magnet_type: MagnetType::Liquidity,
            strength: dec!(85),
            conflict: dec!(0.05),
            distance_atr: dec!(4),
            volatility_pressure: dec!(0.05),
            tier: MagnetTier::Tier1,
            timeframe: "4h".to_string(),
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_unknown_tier_falls_back_to_tier4() {
        assert_eq!(MagnetTier::from(1), MagnetTier::Tier1);
        assert_eq!(MagnetTier::from(3), MagnetTier::Tier3);
        assert_eq!(MagnetTier::from(0), MagnetTier::Tier4);
        assert_eq!(MagnetTier::from(9), MagnetTier::Tier4);
    }

    #[test]
    fn test_state_from_magnet() {
        let magnet = sample_magnet();
        let state = MagnetState::from_magnet(&magnet, dec!(43000), dec!(250));
        assert_eq!(state.primary_magnet_price, dec!(44000));
        assert_eq!(state.magnet_strength, dec!(85));
        assert_eq!(state.conflict_index, dec!(0.05));
        assert_eq!(state.atr, dec!(250));
    }

    #[test]
    fn test_trade_setup_from_magnet() {
        let magnet = sample_magnet();
        let setup = TradeSetup::from_magnet(&magnet, dec!(43200), dec!(42800), dec!(2));
        assert_eq!(setup.magnet_tier, 1);
        assert_eq!(setup.tier(), MagnetTier::Tier1);
        assert_eq!(setup.direction(), Decimal::ONE);
    }

    #[test]
    fn test_tier_serializes_as_rank() {
        let json = serde_json::to_string(&MagnetTier::Tier2).unwrap();
        assert_eq!(json, "2");
        let tier: MagnetTier = serde_json::from_str("7").unwrap();
        assert_eq!(tier, MagnetTier::Tier4);
    }
}
