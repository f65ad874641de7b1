//! Survival fuse - circuit breaker for new risk-taking.
//!
//! State machine:
//! - `Active` (armed) -> `Triggered` when any trigger condition breaches
//! - `Triggered` -> `Cooldown` once `cooldown_seconds` have elapsed
//! - `Triggered` / `Cooldown` -> `Active` only through [`SurvivalFuse::manual_reset`]
//!
//! The fuse is not internally synchronized. Own it from a single task, or
//! share it through [`SharedFuse`].

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, FuseConfig};

/// Fuse lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuseState {
    Active,
    Triggered,
    Cooldown,
}

impl FuseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FuseState::Active => "active",
            FuseState::Triggered => "triggered",
            FuseState::Cooldown => "cooldown",
        }
    }
}

impl fmt::Display for FuseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition that trips the fuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuseTrigger {
    VolatilitySpike,
    DrawdownBreach,
    MagnetConflict,
    TrendFlip,
    LiquidityDry,
}

impl FuseTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FuseTrigger::VolatilitySpike => "volatility_spike",
            FuseTrigger::DrawdownBreach => "drawdown_breach",
            FuseTrigger::MagnetConflict => "magnet_conflict",
            FuseTrigger::TrendFlip => "trend_flip",
            FuseTrigger::LiquidityDry => "liquidity_dry",
        }
    }
}

impl fmt::Display for FuseTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market and account snapshot evaluated by the fuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConditions {
    pub volatility_pressure: Decimal,
    /// Drawdown from peak equity, in %
    pub account_drawdown_pct: Decimal,
    pub conflict_index: Decimal,
    pub primary_magnet_strength: Decimal,
    pub secondary_magnet_strength: Decimal,
    pub trend_aligned: bool,
    /// Liquidity score (0-100)
    pub liquidity_score: Decimal,
}

/// De-risking directive for the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FuseAction {
    /// Reduce open positions by a fraction in `[min_pct, max_pct]` (0.0-1.0)
    ReducePosition { min_pct: Decimal, max_pct: Decimal },
    CutLeverage { to: Decimal },
    HaltNewTrades { seconds: u64 },
    RecalculateMagnets,
    ResetBias,
}

impl fmt::Display for FuseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuseAction::ReducePosition { min_pct, max_pct } => write!(
                f,
                "Reduce position by {}-{}%",
                (*min_pct * Decimal::ONE_HUNDRED).normalize(),
                (*max_pct * Decimal::ONE_HUNDRED).normalize()
            ),
            FuseAction::CutLeverage { to } => write!(f, "Cut leverage to {:.1}x", to),
            FuseAction::HaltNewTrades { seconds } => write!(f, "Halt new trades for {}s", seconds),
            FuseAction::RecalculateMagnets => f.write_str("Recalculate magnet hierarchy"),
            FuseAction::ResetBias => f.write_str("Reset directional bias to neutral"),
        }
    }
}

/// One recorded trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerEvent {
    pub timestamp: DateTime<Utc>,
    pub triggers: Vec<FuseTrigger>,
}

/// Outcome of [`SurvivalFuse::check_triggers`].
#[derive(Debug, Clone, Serialize)]
pub struct FuseCheckResult {
    pub timestamp: DateTime<Utc>,
    /// True only when this call tripped the fuse
    pub triggered: bool,
    pub current_state: FuseState,
    /// Every breached condition, also while already tripped
    pub triggers: Vec<FuseTrigger>,
    /// Mandatory actions, non-empty only when `triggered`
    pub actions: Vec<FuseAction>,
}

/// Serializable snapshot of the fuse.
#[derive(Debug, Clone, Serialize)]
pub struct FuseStatus {
    pub state: FuseState,
    pub triggered_at: Option<DateTime<Utc>>,
    pub seconds_until_reset: i64,
    pub total_trips: usize,
    pub last_triggers: Vec<FuseTrigger>,
}

/// Structured alert logged when the fuse trips.
#[derive(Debug, Clone, Serialize)]
pub struct FuseAlert {
    pub alert_id: String,
    pub timestamp: DateTime<Utc>,
    pub triggers: Vec<FuseTrigger>,
    pub actions: Vec<String>,
    pub conditions: MarketConditions,
}

impl FuseAlert {
    fn new(
        timestamp: DateTime<Utc>,
        triggers: &[FuseTrigger],
        actions: &[FuseAction],
        conditions: &MarketConditions,
    ) -> Self {
        Self {
            alert_id: format!(
                "fuse-{}-{}",
                timestamp.timestamp(),
                timestamp.timestamp_subsec_nanos()
            ),
            timestamp,
            triggers: triggers.to_vec(),
            actions: actions.iter().map(ToString::to_string).collect(),
            conditions: conditions.clone(),
        }
    }

    /// Emit as structured log for workflow parsing.
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        error!(target: "risk_alert", "RISK_ALERT: {}", json);
    }
}

/// Circuit breaker owned per trading account.
#[derive(Debug)]
pub struct SurvivalFuse<C: Clock = SystemClock> {
    config: FuseConfig,
    clock: C,
    state: FuseState,
    triggered_at: Option<DateTime<Utc>>,
    trigger_history: Vec<TriggerEvent>,
}

impl SurvivalFuse<SystemClock> {
    /// Create an armed fuse using the wall clock.
    pub fn new(config: FuseConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for SurvivalFuse<SystemClock> {
    fn default() -> Self {
        Self {
            config: FuseConfig::default(),
            clock: SystemClock,
            state: FuseState::Active,
            triggered_at: None,
            trigger_history: Vec::new(),
        }
    }
}

impl<C: Clock> SurvivalFuse<C> {
    /// Create an armed fuse with a custom time source.
    pub fn with_clock(config: FuseConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            state: FuseState::Active,
            triggered_at: None,
            trigger_history: Vec::new(),
        })
    }

    pub fn config(&self) -> &FuseConfig {
        &self.config
    }

    pub fn state(&self) -> FuseState {
        self.state
    }

    pub fn triggered_at(&self) -> Option<DateTime<Utc>> {
        self.triggered_at
    }

    /// All trips since creation, oldest first.
    pub fn trigger_history(&self) -> &[TriggerEvent] {
        &self.trigger_history
    }

    /// New risk may only be opened while armed.
    pub fn can_open_new_trades(&self) -> bool {
        self.state == FuseState::Active
    }

    /// Breached conditions for `conditions`, without touching state.
    pub fn evaluate(&self, conditions: &MarketConditions) -> Vec<FuseTrigger> {
        let cfg = &self.config;
        let checks = [
            (
                conditions.volatility_pressure > cfg.max_volatility,
                FuseTrigger::VolatilitySpike,
            ),
            (
                conditions.account_drawdown_pct > cfg.max_drawdown_pct,
                FuseTrigger::DrawdownBreach,
            ),
            (
                conditions.conflict_index > cfg.max_conflict_index,
                FuseTrigger::MagnetConflict,
            ),
            (
                conditions.secondary_magnet_strength > conditions.primary_magnet_strength,
                FuseTrigger::MagnetConflict,
            ),
            (!conditions.trend_aligned, FuseTrigger::TrendFlip),
            (
                conditions.liquidity_score < cfg.min_liquidity_score,
                FuseTrigger::LiquidityDry,
            ),
        ];

        let mut triggers = Vec::new();
        for (breached, trigger) in checks {
            if breached && !triggers.contains(&trigger) {
                triggers.push(trigger);
            }
        }
        triggers
    }

    /// Directives issued on every trip.
    pub fn mandatory_actions(&self) -> Vec<FuseAction> {
        vec![
            FuseAction::ReducePosition {
                min_pct: self.config.reduction_pct_min,
                max_pct: self.config.reduction_pct_max,
            },
            FuseAction::CutLeverage {
                to: self.config.fuse_leverage,
            },
            FuseAction::HaltNewTrades {
                seconds: self.config.halt_duration_seconds,
            },
            FuseAction::RecalculateMagnets,
            FuseAction::ResetBias,
        ]
    }

    /// Evaluate conditions and trip the fuse if armed and any condition breaches.
    ///
    /// The cooldown clock is advanced first, exactly as `time_until_reset()`
    /// does, so an expired `Triggered` fuse is reported as `Cooldown`. It is
    /// never re-armed here.
    pub fn check_triggers(&mut self, conditions: &MarketConditions) -> FuseCheckResult {
        let now = self.clock.now();
        self.advance(now);

        let triggers = self.evaluate(conditions);
        let should_trigger = !triggers.is_empty() && self.state == FuseState::Active;

        let actions = if should_trigger {
            self.state = FuseState::Triggered;
            self.triggered_at = Some(now);
            self.trigger_history.push(TriggerEvent {
                timestamp: now,
                triggers: triggers.clone(),
            });

            let actions = self.mandatory_actions();
            error!(
                triggers = ?triggers,
                drawdown_pct = %conditions.account_drawdown_pct,
                volatility = %conditions.volatility_pressure,
                "🚨 Survival fuse triggered - halting new risk"
            );
            FuseAlert::new(now, &triggers, &actions, conditions).emit();
            actions
        } else {
            if !triggers.is_empty() {
                debug!(state = %self.state, triggers = ?triggers, "Fuse already tripped, still in breach");
            }
            Vec::new()
        };

        FuseCheckResult {
            timestamp: now,
            triggered: should_trigger,
            current_state: self.state,
            triggers,
            actions,
        }
    }

    /// Time left before a tripped fuse enters cooldown.
    ///
    /// Moves `Triggered` to `Cooldown` once the remaining time reaches zero.
    /// Zero in any other state.
    pub fn time_until_reset(&mut self) -> Duration {
        let now = self.clock.now();
        self.advance(now)
    }

    /// Re-arm the fuse. History is kept.
    pub fn manual_reset(&mut self) {
        let previous = self.state;
        self.state = FuseState::Active;
        self.triggered_at = None;
        info!(%previous, trips = self.trigger_history.len(), "Survival fuse manually reset");
    }

    pub fn status(&mut self) -> FuseStatus {
        let remaining = self.time_until_reset();
        FuseStatus {
            state: self.state,
            triggered_at: self.triggered_at,
            seconds_until_reset: remaining.num_seconds(),
            total_trips: self.trigger_history.len(),
            last_triggers: self
                .trigger_history
                .last()
                .map(|event| event.triggers.clone())
                .unwrap_or_default(),
        }
    }

    fn advance(&mut self, now: DateTime<Utc>) -> Duration {
        let triggered_at = match (self.state, self.triggered_at) {
            (FuseState::Triggered, Some(at)) => at,
            _ => return Duration::zero(),
        };

        let cooldown = Duration::seconds(self.config.cooldown_seconds as i64);
        let remaining = (cooldown - (now - triggered_at)).max(Duration::zero());

        if remaining == Duration::zero() {
            self.state = FuseState::Cooldown;
            info!(%triggered_at, "Survival fuse entered cooldown, awaiting manual reset");
        }

        remaining
    }
}

/// Fuse handle shared across tasks of one account.
///
/// Every operation holds the lock for the whole check-then-mutate sequence,
/// so concurrent callers cannot both observe `Active` and trip twice.
pub struct SharedFuse<C: Clock = SystemClock> {
    inner: Arc<Mutex<SurvivalFuse<C>>>,
}

impl<C: Clock> Clone for SharedFuse<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock> SharedFuse<C> {
    pub fn new(fuse: SurvivalFuse<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(fuse)),
        }
    }

    pub async fn check_triggers(&self, conditions: &MarketConditions) -> FuseCheckResult {
        self.inner.lock().await.check_triggers(conditions)
    }

    pub async fn can_open_new_trades(&self) -> bool {
        self.inner.lock().await.can_open_new_trades()
    }

    pub async fn manual_reset(&self) {
        self.inner.lock().await.manual_reset();
    }

    pub async fn status(&self) -> FuseStatus {
        self.inner.lock().await.status()
    }

    /// Exclusive access for multi-step operations.
    pub async fn lock(&self) -> MutexGuard<'_, SurvivalFuse<C>> {
        self.inner.lock().await
    }
}
