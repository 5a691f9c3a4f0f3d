//! Trade execution.
//!
//! Turns an approved risk decision into a terminal `ExecutionResult`.
//! Paper and live execution are two implementations of one `Executor`
//! capability: the strategy and risk layers never learn which mode is
//! active. Live order placement goes through a `VenueGateway` seam so
//! the two-leg sequencing and retry behaviour are testable without a
//! real exchange.

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::engine::retry::{Retryable, RetryPolicy};
use crate::types::{
    ExecutionMode, ExecutionResult, OpenPosition, OrderStatus, RiskDecision, TradeSignal,
};

// ---------------------------------------------------------------------------
// Venue errors
// ---------------------------------------------------------------------------

/// Order placement failures, classified for the retry policy.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("venue unavailable: {0}")]
    Unavailable(String),
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl Retryable for VenueError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            VenueError::Timeout(_) | VenueError::RateLimited(_) | VenueError::Unavailable(_)
        )
    }
}

/// A confirmed fill returned by a venue.
#[derive(Debug, Clone)]
pub struct Fill {
    pub order_id: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
}

/// Order placement seam implemented by real exchange adapters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VenueGateway: Send + Sync {
    async fn place_market_buy(
        &self,
        venue: &str,
        instrument: &str,
        quantity: Decimal,
    ) -> Result<Fill, VenueError>;

    async fn place_market_sell(
        &self,
        venue: &str,
        instrument: &str,
        quantity: Decimal,
    ) -> Result<Fill, VenueError>;
}

// ---------------------------------------------------------------------------
// Executor capability
// ---------------------------------------------------------------------------

/// One execution backend, selected per cycle by the orchestrator.
#[async_trait]
pub trait Executor: Send + Sync {
    fn mode(&self) -> ExecutionMode;

    /// Carry an approved trade to a terminal status.
    ///
    /// Errors from this method are internal invariant violations (an
    /// unapproved decision, a HOLD signal) — bugs, not venue failures.
    async fn execute(
        &self,
        signal: &TradeSignal,
        decision: &RiskDecision,
    ) -> Result<ExecutionResult>;
}

/// Validated trade parameters shared by both executors.
struct TradeParams<'a> {
    buy_venue: &'a str,
    sell_venue: &'a str,
    buy_price: Decimal,
    sell_price: Decimal,
}

fn trade_params<'a>(
    signal: &'a TradeSignal,
    decision: &RiskDecision,
) -> Result<TradeParams<'a>> {
    ensure!(decision.approved, "executor received an unapproved decision");
    ensure!(signal.is_trade(), "executor received a HOLD signal");
    ensure!(
        decision.position_size > Decimal::ZERO,
        "executor received a zero position size"
    );

    Ok(TradeParams {
        buy_venue: signal
            .buy_venue
            .as_deref()
            .context("trade signal missing buy venue")?,
        sell_venue: signal
            .sell_venue
            .as_deref()
            .context("trade signal missing sell venue")?,
        buy_price: signal
            .buy_price
            .context("trade signal missing buy price")?,
        sell_price: signal
            .sell_price
            .context("trade signal missing sell price")?,
    })
}

fn next_trade_id(prefix: &str, counter: &AtomicU64) -> String {
    format!("{}_{:04}", prefix, counter.fetch_add(1, Ordering::SeqCst) + 1)
}

// ---------------------------------------------------------------------------
// Paper executor
// ---------------------------------------------------------------------------

/// Simulated execution: applies configured slippage to the signal
/// prices, deducts per-leg fees, and always fills. Venue errors cannot
/// occur here; only invariant violations fail, and those are bugs.
pub struct PaperExecutor {
    fee_rate: Decimal,
    slippage: Decimal,
    counter: AtomicU64,
}

impl PaperExecutor {
    pub fn new(fee_rate: Decimal, slippage: Decimal) -> Self {
        Self {
            fee_rate,
            slippage,
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Executor for PaperExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Paper
    }

    async fn execute(
        &self,
        signal: &TradeSignal,
        decision: &RiskDecision,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();
        let params = trade_params(signal, decision)?;
        let quantity = decision.position_size;

        // Adverse fills on both legs.
        let buy_fill = params.buy_price * (Decimal::ONE + self.slippage);
        let sell_fill = params.sell_price * (Decimal::ONE - self.slippage);

        let fees = (buy_fill * quantity + sell_fill * quantity) * self.fee_rate;
        let net_pnl = (sell_fill - buy_fill) * quantity - fees;

        let trade_id = next_trade_id("PAPER", &self.counter);

        info!(
            trade_id = %trade_id,
            quantity = %quantity,
            buy_fill = %buy_fill,
            sell_fill = %sell_fill,
            fees = %fees,
            net_pnl = %net_pnl,
            "Paper trade filled"
        );

        Ok(ExecutionResult {
            trade_id,
            mode: ExecutionMode::Paper,
            status: OrderStatus::Filled,
            buy_venue: params.buy_venue.to_string(),
            sell_venue: params.sell_venue.to_string(),
            quantity,
            buy_order_id: Some(format!("paper-{}", uuid::Uuid::new_v4())),
            sell_order_id: Some(format!("paper-{}", uuid::Uuid::new_v4())),
            buy_fill_price: buy_fill,
            sell_fill_price: sell_fill,
            fees,
            net_pnl,
            latency_ms: started.elapsed().as_millis() as u64,
            reason: None,
            unhedged: None,
            timestamp: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Live executor
// ---------------------------------------------------------------------------

/// Real order placement through a `VenueGateway`.
///
/// The buy leg is placed first; only a confirmed buy fill triggers the
/// sell leg. Each leg runs under the retry policy. A sell leg that
/// exhausts its retries after a filled buy yields status FAILED with
/// reason "unhedged leg" and the open position attached — the caller
/// escalates, it never blind-retries the hedge under a moving price.
pub struct LiveExecutor<G: VenueGateway> {
    gateway: G,
    retry: RetryPolicy,
    counter: AtomicU64,
}

impl<G: VenueGateway> LiveExecutor<G> {
    pub fn new(gateway: G, retry: RetryPolicy) -> Self {
        Self {
            gateway,
            retry,
            counter: AtomicU64::new(0),
        }
    }

    fn result_template(
        &self,
        trade_id: String,
        params: &TradeParams<'_>,
        quantity: Decimal,
    ) -> ExecutionResult {
        ExecutionResult {
            trade_id,
            mode: ExecutionMode::Live,
            status: OrderStatus::Failed,
            buy_venue: params.buy_venue.to_string(),
            sell_venue: params.sell_venue.to_string(),
            quantity,
            buy_order_id: None,
            sell_order_id: None,
            buy_fill_price: Decimal::ZERO,
            sell_fill_price: Decimal::ZERO,
            fees: Decimal::ZERO,
            net_pnl: Decimal::ZERO,
            latency_ms: 0,
            reason: None,
            unhedged: None,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl<G: VenueGateway> Executor for LiveExecutor<G> {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Live
    }

    async fn execute(
        &self,
        signal: &TradeSignal,
        decision: &RiskDecision,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();
        let params = trade_params(signal, decision)?;
        let quantity = decision.position_size;
        let trade_id = next_trade_id("LIVE", &self.counter);
        let instrument = signal.instrument.as_str();

        let buy = self
            .retry
            .run("buy leg", || {
                self.gateway
                    .place_market_buy(params.buy_venue, instrument, quantity)
            })
            .await;

        let buy_fill = match buy {
            Ok(fill) => fill,
            Err(e) => {
                warn!(
                    trade_id = %trade_id,
                    venue = params.buy_venue,
                    error = %e,
                    "Buy leg failed — nothing filled"
                );
                let mut result = self.result_template(trade_id, &params, quantity);
                result.reason = Some(e.to_string());
                result.latency_ms = started.elapsed().as_millis() as u64;
                return Ok(result);
            }
        };

        let sell = self
            .retry
            .run("sell leg", || {
                self.gateway
                    .place_market_sell(params.sell_venue, instrument, buy_fill.quantity)
            })
            .await;

        let mut result = self.result_template(trade_id, &params, buy_fill.quantity);
        result.buy_fill_price = buy_fill.price;
        result.buy_order_id = Some(buy_fill.order_id.clone());

        match sell {
            Ok(sell_fill) => {
                result.status = OrderStatus::Filled;
                result.sell_order_id = Some(sell_fill.order_id.clone());
                result.sell_fill_price = sell_fill.price;
                result.fees = buy_fill.fee + sell_fill.fee;
                result.net_pnl =
                    (sell_fill.price - buy_fill.price) * buy_fill.quantity - result.fees;
                info!(
                    trade_id = %result.trade_id,
                    net_pnl = %result.net_pnl,
                    fees = %result.fees,
                    "Live trade filled"
                );
            }
            Err(e) => {
                // Most severe failure mode: directional exposure is open.
                error!(
                    trade_id = %result.trade_id,
                    venue = params.sell_venue,
                    error = %e,
                    "Sell leg failed after buy fill — unhedged leg"
                );
                result.reason = Some("unhedged leg".to_string());
                result.fees = buy_fill.fee;
                result.unhedged = Some(OpenPosition {
                    venue: params.buy_venue.to_string(),
                    quantity: buy_fill.quantity,
                    entry_price: buy_fill.price,
                    opened_at: Utc::now(),
                });
            }
        }

        result.latency_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
