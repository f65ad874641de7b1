//! End-to-end checks of the fuse -> leverage -> sizing pipeline.

use chrono::Utc;
use magnet_risk_engine::config::{Config, SizingConfig};
use magnet_risk_engine::magnet::{Magnet, MagnetState, MagnetTier, MagnetType, TradeSetup};
use magnet_risk_engine::risk::{
    AccountState, FuseState, FuseTrigger, LeverageEngine, MarketConditions, PositionSizer,
    RiskOrchestrator, SurvivalFuse, TradeCandidate, TradeDecision,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn normal_conditions() -> MarketConditions {
    MarketConditions {
        volatility_pressure: dec!(1.0),
        account_drawdown_pct: dec!(2.0),
        conflict_index: dec!(0.4),
        primary_magnet_strength: dec!(80),
        secondary_magnet_strength: dec!(40),
        trend_aligned: true,
        liquidity_score: dec!(70),
    }
}

fn magnet(tier: MagnetTier) -> Magnet {
    Magnet {
        level: dec!(44000),
        magnet_type: MagnetType::Structural,
        strength: dec!(85),
        conflict: dec!(0.05),
        distance_atr: dec!(4),
        volatility_pressure: dec!(0.05),
        tier,
        timeframe: "1h".to_string(),
        detected_at: Utc::now(),
    }
}

#[test]
fn perfect_setup_flows_through_all_calculators() {
    let mut fuse = SurvivalFuse::default();
    let engine = LeverageEngine::default();
    let sizer = PositionSizer::default();
    let magnet = magnet(MagnetTier::Tier1);

    let check = fuse.check_triggers(&normal_conditions());
    assert!(!check.triggered);
    assert!(fuse.can_open_new_trades());

    let leverage = engine.calculate_leverage(&MagnetState::from_magnet(&magnet, dec!(43000), dec!(250)));
    assert!(leverage.is_high_tension);
    assert!(leverage.leverage >= dec!(2.0));

    let trade = TradeSetup::from_magnet(&magnet, dec!(43200), dec!(42800), leverage.leverage);
    let account = AccountState {
        equity: dec!(100000),
        available_margin: dec!(90000),
        ..Default::default()
    };
    let sizing = sizer.calculate_position_size(&account, &trade);

    assert!(sizing.safe_to_trade);
    assert!(sizing.position_pct <= dec!(15));
    assert!(sizing.risk_reward_ratio > dec!(1.0));
}

#[test]
fn leverage_bounded_over_input_grid() {
    let engine = LeverageEngine::default();
    let prices = [dec!(40000), dec!(43000), dec!(43990), dec!(44000), dec!(52000)];
    let strengths = [Decimal::ZERO, dec!(59.9), dec!(60), dec!(100)];
    let frictions = [Decimal::ZERO, dec!(0.05), dec!(0.5), dec!(5)];
    let atrs = [Decimal::ZERO, dec!(1), dec!(250)];

    for price in prices {
        for strength in strengths {
            for friction in frictions {
                for atr in atrs {
                    let state = MagnetState {
                        primary_magnet_price: dec!(44000),
                        current_price: price,
                        magnet_strength: strength,
                        conflict_index: friction,
                        volatility_pressure: friction,
                        atr,
                    };
                    let result = engine.calculate_leverage(&state);
                    assert!(result.leverage >= dec!(1.0), "{:?}", state);
                    assert!(result.leverage <= dec!(3.0), "{:?}", state);
                    if atr == Decimal::ZERO {
                        assert_eq!(result.leverage, dec!(1.0));
                    }
                }
            }
        }
    }
}

#[test]
fn exposure_never_exceeds_limit() {
    let sizer = PositionSizer::new(SizingConfig::default()).unwrap();
    let equity = dec!(100000);

    for open in [Decimal::ZERO, dec!(20000), dec!(45000), dec!(49999), dec!(70000)] {
        for tier in 1..=5u8 {
            let trade = TradeSetup {
                entry_price: dec!(43200),
                stop_price: dec!(42800),
                magnet_price: dec!(44000),
                magnet_tier: tier,
                leverage: dec!(2.0),
            };
            let account = AccountState {
                equity,
                available_margin: equity,
                open_positions_value: open,
                ..Default::default()
            };
            let sizing = sizer.calculate_position_size(&account, &trade);

            assert!(sizing.position_size >= Decimal::ZERO);
            if open <= dec!(50000) {
                assert!((open + sizing.position_size) / equity <= dec!(0.5));
            } else {
                assert_eq!(sizing.position_size, Decimal::ZERO);
            }
        }
    }
}

#[test]
fn drawdown_breach_halts_until_manual_reset() {
    let mut orchestrator = RiskOrchestrator::new(&Config::default()).unwrap();
    let mut candidate = TradeCandidate {
        magnet: MagnetState::from_magnet(&magnet(MagnetTier::Tier2), dec!(43000), dec!(250)),
        conditions: MarketConditions {
            account_drawdown_pct: dec!(6.0),
            ..normal_conditions()
        },
        stop_price: dec!(42800),
        magnet_tier: 2,
    };
    let account = AccountState {
        equity: dec!(100000),
        available_margin: dec!(90000),
        ..Default::default()
    };

    match orchestrator.evaluate(&candidate, &account) {
        TradeDecision::Halted { fuse } => {
            assert!(fuse.triggered);
            assert!(fuse.triggers.contains(&FuseTrigger::DrawdownBreach));
        }
        other => panic!("expected halt, got {:?}", other),
    }

    candidate.conditions = normal_conditions();
    assert!(!orchestrator.evaluate(&candidate, &account).is_approved());
    assert_eq!(orchestrator.fuse().state(), FuseState::Triggered);

    orchestrator.fuse_mut().manual_reset();
    match orchestrator.evaluate(&candidate, &account) {
        TradeDecision::Approved { sizing, .. } => assert!(sizing.position_pct <= dec!(10)),
        other => panic!("expected approval, got {:?}", other),
    }

    candidate.conditions.volatility_pressure = dec!(2.5);
    match orchestrator.evaluate(&candidate, &account) {
        TradeDecision::Halted { fuse } => {
            assert!(fuse.triggered);
            assert!(fuse.triggers.contains(&FuseTrigger::VolatilitySpike));
        }
        other => panic!("expected halt, got {:?}", other),
    }
    assert_eq!(orchestrator.fuse().trigger_history().len(), 2);
}
