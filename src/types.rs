//! Shared types for the ARBITER pipeline.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that venue, strategy,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Quotes
// ---------------------------------------------------------------------------

/// Top-of-book snapshot for one instrument on one venue.
///
/// Produced by venue connectors; immutable; one per venue per cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceQuote {
    pub venue: String,
    pub instrument: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub mid: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl PriceQuote {
    /// Build a quote with the mid derived from bid/ask.
    pub fn new(venue: &str, instrument: &str, bid: Decimal, ask: Decimal) -> Self {
        Self {
            venue: venue.to_string(),
            instrument: instrument.to_string(),
            bid,
            ask,
            mid: (bid + ask) / Decimal::TWO,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for PriceQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} bid {:.2} / ask {:.2}",
            self.venue, self.instrument, self.bid, self.ask
        )
    }
}

// ---------------------------------------------------------------------------
// Trade signal
// ---------------------------------------------------------------------------

/// Strategy verdict for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDecision {
    #[serde(rename = "TRADE")]
    Trade,
    #[serde(rename = "HOLD")]
    Hold,
}

impl fmt::Display for TradeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDecision::Trade => write!(f, "TRADE"),
            TradeDecision::Hold => write!(f, "HOLD"),
        }
    }
}

/// How confident the strategy is in a TRADE signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "LOW")]
    Low,
}

/// Structured trade signal emitted by the strategy engine.
///
/// Created fresh each cycle; never mutated after creation. Venue and
/// price fields are populated only for TRADE decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub decision: TradeDecision,
    pub instrument: String,
    pub spread_pct: Decimal,
    pub threshold_pct: Decimal,
    pub reason: String,
    pub buy_venue: Option<String>,
    pub sell_venue: Option<String>,
    pub buy_price: Option<Decimal>,
    pub sell_price: Option<Decimal>,
    /// Spread net of fees and slippage on both legs.
    pub expected_profit_pct: Option<Decimal>,
    pub confidence: Confidence,
    pub timestamp: DateTime<Utc>,
}

impl TradeSignal {
    /// Build a HOLD signal with the given reason.
    pub fn hold(
        instrument: &str,
        reason: &str,
        spread_pct: Decimal,
        threshold_pct: Decimal,
    ) -> Self {
        Self {
            decision: TradeDecision::Hold,
            instrument: instrument.to_string(),
            spread_pct,
            threshold_pct,
            reason: reason.to_string(),
            buy_venue: None,
            sell_venue: None,
            buy_price: None,
            sell_price: None,
            expected_profit_pct: None,
            confidence: Confidence::Low,
            timestamp: Utc::now(),
        }
    }

    pub fn is_trade(&self) -> bool {
        self.decision == TradeDecision::Trade
    }
}

// ---------------------------------------------------------------------------
// Risk types
// ---------------------------------------------------------------------------

/// Risk bucket for an approved position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

/// Risk verdict for one cycle. Derived from a TradeSignal plus the
/// current RiskState; does not persist beyond the cycle that created it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    pub approved: bool,
    pub reason: String,
    /// Position size in asset units (e.g. BTC).
    pub position_size: Decimal,
    /// Currency value of the position at the signal's buy price.
    pub notional: Decimal,
    pub risk_level: RiskLevel,
    pub timestamp: DateTime<Utc>,
}

impl RiskDecision {
    /// Build a rejection with zero size.
    pub fn reject(reason: &str, risk_level: RiskLevel) -> Self {
        Self {
            approved: false,
            reason: reason.to_string(),
            position_size: Decimal::ZERO,
            notional: Decimal::ZERO,
            risk_level,
            timestamp: Utc::now(),
        }
    }
}

/// An unhedged leg left open by a partial execution failure.
///
/// Held in `RiskState::open_positions` until manually resolved; its
/// notional counts against the exposure limit every cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenPosition {
    pub venue: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl OpenPosition {
    pub fn notional(&self) -> Decimal {
        self.quantity * self.entry_price
    }
}

/// Process-wide risk state, owned exclusively by the orchestrator loop.
///
/// Daily fields reset when `day_start` rolls to a new calendar day.
/// Mutated only through `roll_day`, `apply_execution`, `close_position`
/// and the risk manager's daily-loss latch, all under the single
/// sequential cycle loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub balance: Decimal,
    pub day_start_balance: Decimal,
    pub open_exposure: Decimal,
    pub consecutive_losses: u32,
    pub daily_pnl: Decimal,
    pub daily_loss_limit_hit: bool,
    pub day_start: NaiveDate,
    pub open_positions: Vec<OpenPosition>,
    pub trades_approved: u64,
    pub trades_rejected: u64,
    pub cycle_count: u64,
}

impl RiskState {
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance,
            day_start_balance: balance,
            open_exposure: Decimal::ZERO,
            consecutive_losses: 0,
            daily_pnl: Decimal::ZERO,
            daily_loss_limit_hit: false,
            day_start: Utc::now().date_naive(),
            open_positions: Vec::new(),
            trades_approved: 0,
            trades_rejected: 0,
            cycle_count: 0,
        }
    }

    /// Reset daily counters when the calendar day has rolled over.
    ///
    /// The circuit breaker and the daily-loss latch clear only here or
    /// via `reset_circuit_breaker` — never on a single winning trade.
    pub fn roll_day(&mut self, today: NaiveDate) {
        if today == self.day_start {
            return;
        }
        self.day_start = today;
        self.day_start_balance = self.balance;
        self.daily_pnl = Decimal::ZERO;
        self.daily_loss_limit_hit = false;
        self.consecutive_losses = 0;
    }

    /// Manual override: clear the consecutive-loss counter.
    pub fn reset_circuit_breaker(&mut self) {
        self.consecutive_losses = 0;
    }

    /// Fold a terminal execution result into the state.
    ///
    /// FILLED trades settle P&L and the loss streak; FAILED trades with
    /// an unhedged leg record the open exposure for subsequent risk
    /// checks. REJECTED results leave the state untouched.
    pub fn apply_execution(&mut self, result: &ExecutionResult) {
        match result.status {
            OrderStatus::Filled => {
                self.daily_pnl += result.net_pnl;
                self.balance += result.net_pnl;
                if result.net_pnl > Decimal::ZERO {
                    self.consecutive_losses = 0;
                } else {
                    self.consecutive_losses += 1;
                }
            }
            OrderStatus::Failed => {
                if let Some(leg) = &result.unhedged {
                    self.open_exposure += leg.notional();
                    self.open_positions.push(leg.clone());
                }
            }
            OrderStatus::Rejected => {}
        }
    }

    /// Manually resolve an open unhedged position at the given exit
    /// price. Returns the realised P&L, or None for an invalid index.
    pub fn close_position(&mut self, index: usize, exit_price: Decimal) -> Option<Decimal> {
        if index >= self.open_positions.len() {
            return None;
        }
        let pos = self.open_positions.remove(index);
        let pnl = (exit_price - pos.entry_price) * pos.quantity;
        self.open_exposure -= pos.notional();
        self.balance += pnl;
        self.daily_pnl += pnl;
        Some(pnl)
    }
}

// ---------------------------------------------------------------------------
// Execution types
// ---------------------------------------------------------------------------

/// Paper simulation or real order placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    #[serde(rename = "PAPER")]
    Paper,
    #[serde(rename = "LIVE")]
    Live,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Paper => write!(f, "PAPER"),
            ExecutionMode::Live => write!(f, "LIVE"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paper" => Ok(ExecutionMode::Paper),
            "live" => Ok(ExecutionMode::Live),
            _ => Err(anyhow::anyhow!("Unknown execution mode: {s}")),
        }
    }
}

/// Terminal status of an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "FILLED")]
    Filled,
    /// Reserved for venue-side synchronous rejection; not produced by
    /// the built-in executors, which report all failures as FAILED.
    #[serde(rename = "REJECTED")]
    Rejected,
    #[serde(rename = "FAILED")]
    Failed,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
            OrderStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Complete record of one execution attempt (paper or live).
///
/// Immutable once the status is terminal; contributes to
/// `RiskState::daily_pnl` via `RiskState::apply_execution`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub trade_id: String,
    pub mode: ExecutionMode,
    pub status: OrderStatus,
    pub buy_venue: String,
    pub sell_venue: String,
    pub quantity: Decimal,
    pub buy_order_id: Option<String>,
    pub sell_order_id: Option<String>,
    pub buy_fill_price: Decimal,
    pub sell_fill_price: Decimal,
    pub fees: Decimal,
    pub net_pnl: Decimal,
    pub latency_ms: u64,
    pub reason: Option<String>,
    /// Present when the buy leg filled but the sell leg did not.
    pub unhedged: Option<OpenPosition>,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {:.4} {} -> {} pnl ${:.2} ({}ms)",
            self.mode,
            self.trade_id,
            self.status,
            self.quantity,
            self.buy_venue,
            self.sell_venue,
            self.net_pnl,
            self.latency_ms,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
