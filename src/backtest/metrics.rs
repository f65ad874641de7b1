//! Performance metrics calculation for backtesting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::utils::decimal::{as_percent, safe_div};

/// A point on the equity curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
    /// Drawdown from the running peak, in %
    pub drawdown_pct: Decimal,
}

impl EquityPoint {
    pub fn new(timestamp: DateTime<Utc>, equity: Decimal, peak_equity: Decimal) -> Self {
        Self {
            timestamp,
            equity,
            drawdown_pct: drawdown_pct(peak_equity, equity),
        }
    }
}

/// A simulated round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub position_size: Decimal,
    pub leverage: Decimal,
    pub pnl: Decimal,
    pub tier: u8,
    pub hit_magnet: bool,
}

/// Backtest performance metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub initial_equity: Decimal,
    pub final_equity: Decimal,
    pub total_return_pct: Decimal,
    pub total_trades: usize,
    /// Winning trades / total (0.0-1.0)
    pub win_rate: Decimal,
    /// Gross profit / gross loss; `None` without losing trades
    pub profit_factor: Option<Decimal>,
    pub max_drawdown_pct: Decimal,
    pub avg_leverage: Decimal,
    /// Number of times the survival fuse tripped
    pub fuse_trips: usize,
    /// Bars skipped because the fuse was not armed
    pub halted_bars: usize,
}

impl BacktestMetrics {
    pub fn calculate(
        initial_equity: Decimal,
        equity_curve: &[EquityPoint],
        trades: &[TradeRecord],
        fuse_trips: usize,
        halted_bars: usize,
    ) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_equity);

        let total_return_pct = as_percent(final_equity - initial_equity, initial_equity);
        let max_drawdown_pct = max_drawdown_pct(initial_equity, equity_curve);

        if trades.is_empty() {
            return Self {
                initial_equity,
                final_equity,
                total_return_pct,
                total_trades: 0,
                win_rate: Decimal::ZERO,
                profit_factor: None,
                max_drawdown_pct,
                avg_leverage: Decimal::ZERO,
                fuse_trips,
                halted_bars,
            };
        }

        let count = Decimal::from(trades.len());
        let winners = trades.iter().filter(|t| t.pnl > Decimal::ZERO).count();
        let gross_profit: Decimal = trades
            .iter()
            .filter(|t| t.pnl > Decimal::ZERO)
            .map(|t| t.pnl)
            .sum();
        let gross_loss: Decimal = trades
            .iter()
            .filter(|t| t.pnl <= Decimal::ZERO)
            .map(|t| t.pnl)
            .sum::<Decimal>()
            .abs();

        let profit_factor = if gross_loss > Decimal::ZERO {
            Some(gross_profit / gross_loss)
        } else {
            None
        };

        let avg_leverage = trades.iter().map(|t| t.leverage).sum::<Decimal>() / count;

        Self {
            initial_equity,
            final_equity,
            total_return_pct,
            total_trades: trades.len(),
            win_rate: Decimal::from(winners) / count,
            profit_factor,
            max_drawdown_pct,
            avg_leverage,
            fuse_trips,
            halted_bars,
        }
    }

    /// Format metrics as a summary string.
    pub fn summary(&self) -> String {
        let profit_factor = self
            .profit_factor
            .map(|pf| format!("{:.2}", pf))
            .unwrap_or_else(|| "inf".to_string());

        format!(
            r#"═══════════════════════════════════════════════
BACKTEST RESULTS
═══════════════════════════════════════════════
RETURNS
  Initial Equity:    ${:.2}
  Final Equity:      ${:.2}
  Total Return:      {:.2}%

RISK
  Max Drawdown:      {:.2}%
  Avg Leverage:      {:.2}x
  Fuse Trips:        {}
  Halted Bars:       {}

ACTIVITY
  Total Trades:      {}
  Win Rate:          {:.1}%
  Profit Factor:     {}
═══════════════════════════════════════════════"#,
            self.initial_equity,
            self.final_equity,
            self.total_return_pct,
            self.max_drawdown_pct,
            self.avg_leverage,
            self.fuse_trips,
            self.halted_bars,
            self.total_trades,
            self.win_rate * dec!(100),
            profit_factor,
        )
    }
}

/// Drawdown of `equity` from `peak`, in %.
pub fn drawdown_pct(peak: Decimal, equity: Decimal) -> Decimal {
    if peak <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    safe_div(peak.saturating_sub(equity), peak)
        .saturating_mul(dec!(100))
        .max(Decimal::ZERO)
}

/// Maximum drawdown over the curve, in %.
fn max_drawdown_pct(initial_equity: Decimal, equity_curve: &[EquityPoint]) -> Decimal {
    let mut peak = initial_equity;
    let mut max_dd = Decimal::ZERO;

    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        }
        max_dd = max_dd.max(drawdown_pct(peak, point.equity));
    }

    max_dd
}
