//! Backtesting simulation engine.
//!
//! Replays historical bars through the risk pipeline. Each bar with a magnet
//! becomes a trade candidate; approved trades are resolved immediately as
//! either reaching the magnet or the stop.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backtest::metrics::{drawdown_pct, BacktestMetrics, EquityPoint, TradeRecord};
use crate::backtest::{BacktestConfig, BarRecord, DataLoader};
use crate::clock::SimulatedClock;
use crate::config::Config;
use crate::magnet::MagnetState;
use crate::risk::{
    AccountState, FuseState, MarketConditions, RiskOrchestrator, TradeCandidate, TradeDecision,
};
use crate::utils::decimal::{percent_of, safe_div};

// Signal defaults for bars that leave a column empty.
const DEFAULT_STRENGTH: Decimal = dec!(70);
const DEFAULT_CONFLICT: Decimal = dec!(0.3);
const DEFAULT_VOLATILITY: Decimal = dec!(1.0);
const DEFAULT_SECONDARY_STRENGTH: Decimal = dec!(40);
const DEFAULT_LIQUIDITY: Decimal = dec!(70);
const DEFAULT_TIER: u8 = 1;

/// Complete result of a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub config: Config,
    pub backtest_config: BacktestConfig,
    pub metrics: BacktestMetrics,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub bars_processed: usize,
}

impl BacktestResult {
    /// Export equity curve to CSV.
    pub fn equity_to_csv(&self, path: &str) -> Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path))?;
        writeln!(file, "timestamp,equity,drawdown_pct")?;

        for point in &self.equity_curve {
            writeln!(
                file,
                "{},{},{}",
                point.timestamp.to_rfc3339(),
                point.equity,
                point.drawdown_pct,
            )?;
        }

        Ok(())
    }

    /// Export simulated trades to CSV.
    pub fn trades_to_csv(&self, path: &str) -> Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path))?;
        writeln!(file, "timestamp,entry_price,exit_price,position_size,leverage,pnl,tier,hit_magnet")?;

        for trade in &self.trades {
            writeln!(
                file,
                "{},{},{},{},{},{},{},{}",
                trade.timestamp.to_rfc3339(),
                trade.entry_price,
                trade.exit_price,
                trade.position_size,
                trade.leverage,
                trade.pnl,
                trade.tier,
                trade.hit_magnet,
            )?;
        }

        Ok(())
    }

    /// Get a summary string.
    pub fn summary(&self) -> String {
        format!(
            "{}\n\nBacktest Period: {} to {}\nBars: {}",
            self.metrics.summary(),
            self.start_time.format("%Y-%m-%d"),
            self.end_time.format("%Y-%m-%d"),
            self.bars_processed,
        )
    }
}

/// The backtesting simulation engine.
pub struct BacktestEngine<D: DataLoader> {
    data_loader: D,
    config: Config,
    backtest_config: BacktestConfig,
}

impl<D: DataLoader> BacktestEngine<D> {
    pub fn new(data_loader: D, config: Config, backtest_config: BacktestConfig) -> Self {
        Self {
            data_loader,
            config,
            backtest_config,
        }
    }

    /// Run the simulation over `[start, end]`.
    pub fn run(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<BacktestResult> {
        self.backtest_config.validate()?;

        let bars = self.data_loader.load_bars(start, end);
        let clock = SimulatedClock::new(bars.first().map(|b| b.timestamp).unwrap_or(start));
        let mut orchestrator = RiskOrchestrator::with_clock(&self.config, clock.clone())
            .context("Invalid risk configuration")?;
        let mut rng = StdRng::seed_from_u64(self.backtest_config.seed);

        let initial_equity = self.backtest_config.initial_equity;
        let mut equity = initial_equity;
        let mut peak_equity = initial_equity;
        let mut equity_curve = vec![EquityPoint::new(start, equity, peak_equity)];
        let mut trades = Vec::new();
        let mut halted_bars = 0;

        info!(bars = bars.len(), %initial_equity, "Starting backtest");

        for bar in &bars {
            clock.set(bar.timestamp);

            if self.backtest_config.operator_reset_on_cooldown {
                let fuse = orchestrator.fuse_mut();
                fuse.time_until_reset();
                if fuse.state() == FuseState::Cooldown {
                    fuse.manual_reset();
                }
            }

            if let Some(candidate) = self.candidate(bar, drawdown_pct(peak_equity, equity)) {
                let account = AccountState {
                    equity,
                    available_margin: equity * self.backtest_config.margin_fraction,
                    ..Default::default()
                };

                match orchestrator.evaluate(&candidate, &account) {
                    TradeDecision::Approved { trade, sizing, .. } => {
                        let hit_magnet = rng.gen_bool(self.backtest_config.win_rate);
                        let exit_price = if hit_magnet {
                            trade.magnet_price
                        } else {
                            trade.stop_price
                        };
                        let price_change = safe_div(exit_price - trade.entry_price, trade.entry_price);
                        let pnl = sizing.position_size * price_change * trade.direction();
                        equity += pnl;

                        debug!(
                            timestamp = %bar.timestamp,
                            %exit_price,
                            %pnl,
                            hit_magnet,
                            "Simulated trade"
                        );

                        trades.push(TradeRecord {
                            timestamp: bar.timestamp,
                            entry_price: trade.entry_price,
                            exit_price,
                            position_size: sizing.position_size,
                            leverage: trade.leverage,
                            pnl,
                            tier: trade.magnet_tier,
                            hit_magnet,
                        });
                    }
                    TradeDecision::Halted { .. } => halted_bars += 1,
                    TradeDecision::Rejected { .. } => {}
                }
            }

            peak_equity = peak_equity.max(equity);
            equity_curve.push(EquityPoint::new(bar.timestamp, equity, peak_equity));
        }

        let fuse_trips = orchestrator.fuse().trigger_history().len();
        let metrics = BacktestMetrics::calculate(
            initial_equity,
            &equity_curve,
            &trades,
            fuse_trips,
            halted_bars,
        );

        info!(
            trades = metrics.total_trades,
            final_equity = %metrics.final_equity,
            fuse_trips,
            "Backtest complete"
        );

        Ok(BacktestResult {
            config: self.config.clone(),
            backtest_config: self.backtest_config.clone(),
            metrics,
            equity_curve,
            trades,
            start_time: start,
            end_time: end,
            bars_processed: bars.len(),
        })
    }

    /// Build a candidate from a bar; `None` when the bar has no magnet.
    fn candidate(&self, bar: &BarRecord, account_drawdown_pct: Decimal) -> Option<TradeCandidate> {
        let magnet_price = bar.magnet_price?;
        let strength = bar.magnet_strength.unwrap_or(DEFAULT_STRENGTH);
        let conflict = bar.conflict_index.unwrap_or(DEFAULT_CONFLICT);
        let volatility = bar.volatility_pressure.unwrap_or(DEFAULT_VOLATILITY);

        // Default stop sits on the far side of entry from the magnet.
        let stop_offset = percent_of(bar.close, self.backtest_config.default_stop_pct);
        let default_stop = if magnet_price >= bar.close {
            bar.close - stop_offset
        } else {
            bar.close + stop_offset
        };

        Some(TradeCandidate {
            magnet: MagnetState {
                primary_magnet_price: magnet_price,
                current_price: bar.close,
                magnet_strength: strength,
                conflict_index: conflict,
                volatility_pressure: volatility,
                atr: bar.atr,
            },
            conditions: MarketConditions {
                volatility_pressure: volatility,
                account_drawdown_pct,
                conflict_index: conflict,
                primary_magnet_strength: strength,
                secondary_magnet_strength: bar
                    .secondary_strength
                    .unwrap_or(DEFAULT_SECONDARY_STRENGTH),
                trend_aligned: bar.trend_aligned.unwrap_or(true),
                liquidity_score: bar.liquidity_score.unwrap_or(DEFAULT_LIQUIDITY),
            },
            stop_price: bar.stop_price.unwrap_or(default_stop),
            magnet_tier: bar.magnet_tier.unwrap_or(DEFAULT_TIER),
        })
    }
}
