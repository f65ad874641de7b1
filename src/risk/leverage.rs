//! Magnet-aware leverage formula.
//!
//! `L = (D × S) / (1 + C + V)` where
//! - `D` is the distance to the primary magnet in ATR units,
//! - `S` is the magnet strength normalized to 0-1,
//! - `C` is the conflict index,
//! - `V` is the volatility pressure.
//!
//! The result is clamped to the configured bounds. Strong magnets in calm
//! markets get a 1.2x boost up to `high_tension_max`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::config::{ConfigError, LeverageConfig};
use crate::magnet::MagnetState;
use crate::utils::decimal::safe_div;

/// Boost applied to high-tension setups.
const HIGH_TENSION_BOOST: Decimal = dec!(1.2);

/// Distance (in ATR) beyond which the magnet is considered far.
const FAR_DISTANCE_ATR: Decimal = dec!(3);
const STRONG_MAGNET: Decimal = dec!(0.75);
const HIGH_CONFLICT: Decimal = dec!(0.5);
const HIGH_VOLATILITY: Decimal = dec!(1.5);

/// Human-readable observations about a leverage calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeverageSignal {
    FarFromMagnet,
    StrongMagnet,
    HighConflict,
    HighVolatility,
    PerfectSetup,
}

impl fmt::Display for LeverageSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LeverageSignal::FarFromMagnet => "High tension (far from magnet)",
            LeverageSignal::StrongMagnet => "Strong magnet",
            LeverageSignal::HighConflict => "High conflict",
            LeverageSignal::HighVolatility => "High volatility",
            LeverageSignal::PerfectSetup => "PERFECT SETUP",
        };
        f.write_str(text)
    }
}

/// Normalized formula inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeverageComponents {
    /// Distance to magnet in ATR units
    pub distance: Decimal,
    /// Strength normalized to 0-1
    pub strength: Decimal,
    pub conflict: Decimal,
    pub volatility: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeverageResult {
    /// Bounded leverage multiplier
    pub leverage: Decimal,
    pub components: LeverageComponents,
    /// Formula output before clamping
    pub raw_leverage: Decimal,
    pub is_high_tension: bool,
    pub signals: Vec<LeverageSignal>,
    pub reasoning: String,
}

/// Stateless leverage calculator.
#[derive(Debug, Clone, Default)]
pub struct LeverageEngine {
    config: LeverageConfig,
}

impl LeverageEngine {
    /// Create an engine, rejecting inconsistent bounds.
    pub fn new(config: LeverageConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LeverageConfig {
        &self.config
    }

    /// Distance between price and magnet in ATR units (0 when ATR <= 0).
    pub fn calculate_distance(&self, state: &MagnetState) -> Decimal {
        if state.atr <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        safe_div(
            state.current_price.saturating_sub(state.primary_magnet_price).abs(),
            state.atr,
        )
    }

    /// Calculate bounded leverage for the given magnet state.
    pub fn calculate_leverage(&self, state: &MagnetState) -> LeverageResult {
        let cfg = &self.config;

        let distance = self.calculate_distance(state);
        let strength = state.magnet_strength / dec!(100);
        let conflict = state.conflict_index;
        let volatility = state.volatility_pressure;

        let friction = conflict.saturating_add(volatility);
        let raw_leverage = safe_div(
            distance.saturating_mul(strength),
            Decimal::ONE.saturating_add(friction),
        );

        let mut leverage = raw_leverage.clamp(cfg.min_leverage, cfg.max_leverage);

        // Without a usable ATR there is no tension to measure.
        let is_high_tension = state.atr > Decimal::ZERO
            && friction < cfg.high_tension_threshold
            && state.magnet_strength >= cfg.min_magnet_strength;

        if is_high_tension {
            leverage = (leverage * HIGH_TENSION_BOOST).min(cfg.high_tension_max);
        }

        let signals = Self::signals(distance, strength, conflict, volatility, is_high_tension);
        let reasoning = Self::reasoning(&signals);

        debug!(
            %distance,
            %strength,
            %conflict,
            %volatility,
            %raw_leverage,
            %leverage,
            is_high_tension,
            "Leverage calculated"
        );

        LeverageResult {
            leverage,
            components: LeverageComponents {
                distance,
                strength,
                conflict,
                volatility,
            },
            raw_leverage,
            is_high_tension,
            signals,
            reasoning,
        }
    }

    fn signals(
        distance: Decimal,
        strength: Decimal,
        conflict: Decimal,
        volatility: Decimal,
        is_high_tension: bool,
    ) -> Vec<LeverageSignal> {
        let checks = [
            (distance > FAR_DISTANCE_ATR, LeverageSignal::FarFromMagnet),
            (strength > STRONG_MAGNET, LeverageSignal::StrongMagnet),
            (conflict > HIGH_CONFLICT, LeverageSignal::HighConflict),
            (volatility > HIGH_VOLATILITY, LeverageSignal::HighVolatility),
            (is_high_tension, LeverageSignal::PerfectSetup),
        ];

        checks
            .into_iter()
            .filter_map(|(hit, signal)| hit.then_some(signal))
            .collect()
    }

    fn reasoning(signals: &[LeverageSignal]) -> String {
        if signals.is_empty() {
            return "Normal conditions".to_string();
        }
        signals
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(
        magnet: Decimal,
        price: Decimal,
        strength: Decimal,
        conflict: Decimal,
        volatility: Decimal,
        atr: Decimal,
    ) -> MagnetState {
        MagnetState {
            primary_magnet_price: magnet,
            current_price: price,
            magnet_strength: strength,
            conflict_index: conflict,
            volatility_pressure: volatility,
            atr,
        }
    }

    #[test]
    fn test_perfect_setup_high_tension() {
        let engine = LeverageEngine::default();
        let s = state(dec!(44000), dec!(43000), dec!(85), dec!(0.05), dec!(0.05), dec!(250));

        let result = engine.calculate_leverage(&s);

        // raw = 4 * 0.85 / 1.1 ≈ 3.09 -> clamp 2.5 -> boost 3.0
        assert!(result.is_high_tension);
        assert!(result.leverage >= dec!(2.0));
        assert_eq!(result.leverage, dec!(3.0));
        assert_eq!(
            result.reasoning,
            "High tension (far from magnet) | Strong magnet | PERFECT SETUP"
        );
    }

    #[test]
    fn test_far_from_magnet_tag() {
        let engine = LeverageEngine::default();
        let s = state(dec!(44000), dec!(43000), dec!(70), dec!(0.2), dec!(0.3), dec!(250));

        let result = engine.calculate_leverage(&s);

        assert_eq!(result.signals, vec![LeverageSignal::FarFromMagnet]);
        assert_eq!(result.reasoning, "High tension (far from magnet)");
    }

    #[test]
    fn test_multiple_signals_joined_in_order() {
        let engine = LeverageEngine::default();
        let s = state(dec!(45000), dec!(43000), dec!(40), dec!(0.6), dec!(1.6), dec!(250));

        let result = engine.calculate_leverage(&s);

        assert_eq!(
            result.reasoning,
            "High tension (far from magnet) | High conflict | High volatility"
        );
    }

    #[test]
    fn test_tiny_atr_saturates_to_max_then_boosts() {
        let engine = LeverageEngine::default();
        let s = state(
            dec!(44000),
            dec!(43000),
            dec!(85),
            dec!(0.05),
            dec!(0.05),
            dec!(0.0000000000000000000000000001),
        );

        let result = engine.calculate_leverage(&s);

        assert_eq!(result.components.distance, Decimal::MAX);
        assert!(result.is_high_tension);
        assert_eq!(result.leverage, dec!(3.0));
    }

    #[test]
    fn test_tiny_atr_without_tension_caps_at_max_leverage() {
        let engine = LeverageEngine::default();
        let s = state(
            dec!(44000),
            dec!(43000),
            dec!(85),
            dec!(0.5),
            dec!(0.5),
            dec!(0.0000000000000000000000000001),
        );

        let result = engine.calculate_leverage(&s);

        assert!(!result.is_high_tension);
        assert_eq!(result.leverage, dec!(2.5));
    }

    #[test]
    fn test_price_on_magnet_still_boosted_when_calm() {
        let engine = LeverageEngine::default();
        let s = state(dec!(44000), dec!(44000), dec!(85), dec!(0.05), dec!(0.05), dec!(250));

        let result = engine.calculate_leverage(&s);

        assert_eq!(result.components.distance, Decimal::ZERO);
        assert!(result.is_high_tension);
        assert_eq!(result.leverage, dec!(1.2));
    }

    #[test]
    fn test_friction_above_threshold_blocks_boost() {
        let engine = LeverageEngine::default();
        let s = state(dec!(44000), dec!(43000), dec!(85), dec!(0.1), dec!(0.2), dec!(250));

        let result = engine.calculate_leverage(&s);

        assert!(!result.is_high_tension);
        assert_eq!(result.leverage, dec!(2.5));
        assert!(!result.reasoning.contains("PERFECT SETUP"));
    }

    #[test]
    fn test_high_conflict_reduces_leverage() {
        let engine = LeverageEngine::default();
        let s = state(dec!(44000), dec!(43800), dec!(60), dec!(0.8), dec!(0.3), dec!(250));

        let result = engine.calculate_leverage(&s);

        assert!(result.leverage < dec!(2.0));
        assert!(result.reasoning.contains("High conflict"));
    }

    #[test]
    fn test_high_volatility_reduces_leverage() {
        let engine = LeverageEngine::default();
        let s = state(dec!(44000), dec!(43500), dec!(70), dec!(0.2), dec!(1.8), dec!(250));

        let result = engine.calculate_leverage(&s);

        assert!(result.leverage < dec!(2.0));
        assert!(result.reasoning.contains("High volatility"));
    }

    #[test]
    fn test_close_to_magnet_floors_leverage() {
        let engine = LeverageEngine::default();
        let s = state(dec!(43100), dec!(43080), dec!(80), dec!(0.2), dec!(0.4), dec!(250));

        let result = engine.calculate_leverage(&s);

        assert!(result.components.distance < dec!(0.5));
        assert_eq!(result.leverage, dec!(1.0));
        assert_eq!(result.reasoning, "Strong magnet");
    }

    #[test]
    fn test_normal_conditions_reasoning() {
        let engine = LeverageEngine::default();
        let s = state(dec!(43500), dec!(43000), dec!(70), dec!(0.3), dec!(1.0), dec!(250));

        let result = engine.calculate_leverage(&s);

        assert!(result.signals.is_empty());
        assert_eq!(result.reasoning, "Normal conditions");
    }

    #[test]
    fn test_zero_atr_yields_min_leverage() {
        let engine = LeverageEngine::default();
        let s = state(dec!(44000), dec!(43000), dec!(85), dec!(0.05), dec!(0.05), Decimal::ZERO);

        let result = engine.calculate_leverage(&s);

        assert_eq!(result.components.distance, Decimal::ZERO);
        assert_eq!(result.raw_leverage, Decimal::ZERO);
        assert_eq!(result.leverage, dec!(1.0));
        assert!(!result.is_high_tension);
    }

    #[test]
    fn test_negative_atr_treated_as_zero() {
        let engine = LeverageEngine::default();
        let s = state(dec!(44000), dec!(43000), dec!(70), dec!(0.2), dec!(0.3), dec!(-5));

        assert_eq!(engine.calculate_leverage(&s).leverage, dec!(1.0));
    }

    #[test]
    fn test_distance_calculation() {
        let engine = LeverageEngine::default();
        let s = state(dec!(44000), dec!(43000), dec!(70), dec!(0.2), dec!(0.3), dec!(250));

        assert_eq!(engine.calculate_distance(&s), dec!(4));
    }

    #[test]
    fn test_leverage_stays_within_bounds() {
        let engine = LeverageEngine::default();
        let cases = [
            state(dec!(50000), dec!(43000), dec!(100), Decimal::ZERO, Decimal::ZERO, dec!(250)),
            state(dec!(43000), dec!(43000), Decimal::ZERO, dec!(10), dec!(10), dec!(250)),
            state(dec!(60000), dec!(43000), dec!(100), dec!(0.01), Decimal::ZERO, dec!(1)),
            state(dec!(44000), dec!(43000), dec!(40), dec!(0.2), dec!(0.3), dec!(250)),
        ];

        for s in cases {
            let result = engine.calculate_leverage(&s);
            assert!(result.leverage >= dec!(1.0), "{:?}", result);
            assert!(result.leverage <= dec!(3.0), "{:?}", result);
        }
    }

    #[test]
    fn test_weak_magnet_reduces_leverage() {
        let engine = LeverageEngine::default();
        let s = state(dec!(44000), dec!(43000), dec!(40), dec!(0.2), dec!(0.3), dec!(250));

        let result = engine.calculate_leverage(&s);

        assert!(result.components.strength < dec!(0.5));
        assert!(result.leverage < dec!(2.0));
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let config = LeverageConfig {
            min_leverage: dec!(2.6),
            ..Default::default()
        };
        assert!(LeverageEngine::new(config).is_err());
    }
}
