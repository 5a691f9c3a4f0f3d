//! Risk manager.
//!
//! Stands between the strategy engine and the execution layer: every
//! TRADE signal passes the daily-loss latch, the consecutive-loss
//! circuit breaker, and the exposure cap before it is sized. Halt
//! conditions are durable `RiskState` flags consulted every cycle, not
//! errors — they clear only on calendar-day rollover or a manual reset.

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::{AuditLogger, RecordType};
use crate::types::{RiskDecision, RiskLevel, RiskState, TradeSignal};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Fraction of balance allocated per trade.
    pub capital_pct_per_trade: Decimal,
    /// Hard position cap in asset units.
    pub max_position_abs: Decimal,
    /// Open exposure cap as a fraction of balance.
    pub max_exposure_pct: Decimal,
    /// Daily loss (relative to the day-start balance) that halts trading.
    pub max_daily_loss_pct: Decimal,
    /// Consecutive losses that trip the circuit breaker.
    pub circuit_breaker_threshold: u32,
    /// Notional/balance fraction below which a position is LOW risk.
    pub level_low_pct: Decimal,
    /// Notional/balance fraction below which a position is MEDIUM risk.
    pub level_medium_pct: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            capital_pct_per_trade: dec!(0.05),
            max_position_abs: dec!(0.05),
            max_exposure_pct: dec!(0.30),
            max_daily_loss_pct: dec!(0.05),
            circuit_breaker_threshold: 3,
            level_low_pct: dec!(0.02),
            level_medium_pct: dec!(0.05),
        }
    }
}

impl From<&crate::config::RiskConfig> for RiskConfig {
    fn from(cfg: &crate::config::RiskConfig) -> Self {
        Self {
            capital_pct_per_trade: cfg.capital_pct_per_trade,
            max_position_abs: cfg.max_position_abs,
            max_exposure_pct: cfg.max_exposure_pct,
            max_daily_loss_pct: cfg.max_daily_loss_pct,
            circuit_breaker_threshold: cfg.circuit_breaker_threshold,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Risk manager
// ---------------------------------------------------------------------------

pub struct RiskManager {
    config: RiskConfig,
    audit: Arc<AuditLogger>,
}

impl RiskManager {
    pub fn new(config: RiskConfig, audit: Arc<AuditLogger>) -> Self {
        Self { config, audit }
    }

    /// Access the risk configuration.
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Assess one cycle's signal against the current risk state.
    ///
    /// Rolls the trading day and updates the daily-loss latch before
    /// running the veto chain. The same (signal, state) inputs always
    /// produce the same decision.
    pub fn assess(&self, signal: &TradeSignal, state: &mut RiskState) -> Result<RiskDecision> {
        state.roll_day(Utc::now().date_naive());
        self.update_daily_loss_latch(state);

        let (quantity, notional) = self.propose_size(signal, state);

        let decision = if state.daily_loss_limit_hit {
            RiskDecision::reject("daily loss limit reached", RiskLevel::High)
        } else if state.consecutive_losses >= self.config.circuit_breaker_threshold {
            RiskDecision::reject("circuit breaker engaged", RiskLevel::High)
        } else if state.open_exposure + notional > self.config.max_exposure_pct * state.balance {
            RiskDecision::reject("exposure limit", RiskLevel::High)
        } else if !signal.is_trade() {
            RiskDecision::reject("no signal", RiskLevel::Low)
        } else {
            let buy_price = signal.buy_price.unwrap_or_default();
            RiskDecision {
                approved: true,
                reason: format!("approved {quantity:.6} units at {buy_price:.2}"),
                position_size: quantity,
                notional,
                risk_level: self.bucket(notional, state.balance),
                timestamp: Utc::now(),
            }
        };

        if decision.approved {
            state.trades_approved += 1;
            info!(
                size = %decision.position_size,
                notional = %decision.notional,
                risk_level = %decision.risk_level,
                "Trade approved"
            );
        } else {
            state.trades_rejected += 1;
            info!(reason = %decision.reason, "Trade rejected");
        }

        self.audit.append(RecordType::RiskDecision, &decision)?;
        Ok(decision)
    }

    /// Latch the daily loss limit once losses for the day cross it.
    /// Stays set until `RiskState::roll_day` observes a new calendar day.
    fn update_daily_loss_latch(&self, state: &mut RiskState) {
        if state.daily_loss_limit_hit || state.day_start_balance <= Decimal::ZERO {
            return;
        }
        let ratio = state.daily_pnl / state.day_start_balance;
        if ratio <= -self.config.max_daily_loss_pct {
            state.daily_loss_limit_hit = true;
            warn!(
                daily_pnl = %state.daily_pnl,
                day_start_balance = %state.day_start_balance,
                "Daily loss limit reached — trading halted for the day"
            );
        }
    }

    /// Size the hypothetical position for a TRADE signal.
    ///
    /// Allocation is a fixed fraction of balance, capped by the absolute
    /// position limit and by the balance itself: the resulting notional
    /// never exceeds what the account holds.
    fn propose_size(&self, signal: &TradeSignal, state: &RiskState) -> (Decimal, Decimal) {
        if !signal.is_trade() {
            return (Decimal::ZERO, Decimal::ZERO);
        }
        let Some(buy_price) = signal.buy_price.filter(|p| *p > Decimal::ZERO) else {
            return (Decimal::ZERO, Decimal::ZERO);
        };
        if state.balance <= Decimal::ZERO {
            return (Decimal::ZERO, Decimal::ZERO);
        }

        let allocation = self.config.capital_pct_per_trade * state.balance;
        let mut quantity = allocation / buy_price;
        quantity = quantity.min(self.config.max_position_abs);
        if quantity * buy_price > state.balance {
            quantity = state.balance / buy_price;
        }
        quantity = quantity.max(Decimal::ZERO);

        (quantity, quantity * buy_price)
    }

    fn bucket(&self, notional: Decimal, balance: Decimal) -> RiskLevel {
        if balance <= Decimal::ZERO {
            return RiskLevel::High;
        }
        let fraction = notional / balance;
        if fraction < self.config.level_low_pct {
            RiskLevel::Low
        } else if fraction < self.config.level_medium_pct {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
