//! Cycle orchestrator.
//!
//! Ties quotes, strategy, risk, execution and audit into one strictly
//! sequential cycle and owns all cross-cycle state. The next cycle must
//! not begin until the previous cycle's TRADE_CYCLE record is durably
//! written, and `RiskState` is mutated only from this single loop: the
//! loss counters and circuit breaker depend on that ordering.

use anyhow::Result;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::audit::{AuditLogger, RecordType};
use crate::engine::executor::Executor;
use crate::storage;
use crate::strategy::risk::RiskManager;
use crate::strategy::spread::StrategyEngine;
use crate::types::{
    ExecutionMode, ExecutionResult, PriceQuote, RiskDecision, RiskState, TradeSignal,
};

/// Summary of one completed cycle, for operator logging and callers.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub cycle_number: u64,
    pub venues_quoted: usize,
    pub signal: TradeSignal,
    pub decision: RiskDecision,
    pub execution: Option<ExecutionResult>,
    pub balance_after: Decimal,
}

/// The cycle driver.
///
/// Owns the risk state and selects the execution backend per cycle.
/// Mode switches requested mid-cycle are deferred to the next cycle
/// boundary rather than silently dropped.
pub struct Orchestrator {
    strategy: StrategyEngine,
    risk: RiskManager,
    paper: Box<dyn Executor>,
    live: Option<Box<dyn Executor>>,
    audit: Arc<AuditLogger>,
    state: RiskState,
    mode: ExecutionMode,
    pending_mode: Option<ExecutionMode>,
    instrument: String,
    state_file: Option<String>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy: StrategyEngine,
        risk: RiskManager,
        paper: Box<dyn Executor>,
        live: Option<Box<dyn Executor>>,
        audit: Arc<AuditLogger>,
        state: RiskState,
        mode: ExecutionMode,
        instrument: &str,
    ) -> Self {
        Self {
            strategy,
            risk,
            paper,
            live,
            audit,
            state,
            mode,
            pending_mode: None,
            instrument: instrument.to_string(),
            state_file: None,
        }
    }

    /// Persist the risk state to this path after every cycle.
    pub fn with_state_file(mut self, path: &str) -> Self {
        self.state_file = Some(path.to_string());
        self
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    /// Manual-override access: circuit-breaker reset, position closes.
    pub fn state_mut(&mut self) -> &mut RiskState {
        &mut self.state
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Request an execution-mode switch; takes effect at the next cycle
    /// boundary, never mid-cycle.
    pub fn set_mode(&mut self, mode: ExecutionMode) {
        if mode != self.mode {
            info!(current = %self.mode, requested = %mode, "Mode switch queued for next cycle");
        }
        self.pending_mode = Some(mode);
    }

    fn active_executor(&self) -> &dyn Executor {
        match self.mode {
            ExecutionMode::Paper => self.paper.as_ref(),
            ExecutionMode::Live => match &self.live {
                Some(live) => live.as_ref(),
                None => {
                    warn!("LIVE mode requested but no venue gateway configured — executing on paper");
                    self.paper.as_ref()
                }
            },
        }
    }

    /// Run one complete cycle over the given quote set.
    ///
    /// Once the risk decision approves, the trade is always carried to a
    /// terminal status within this call — cancellation belongs between
    /// cycles, not inside one.
    pub async fn run_cycle(&mut self, quotes: Vec<PriceQuote>) -> Result<CycleOutcome> {
        if let Some(next) = self.pending_mode.take() {
            if next != self.mode {
                info!(from = %self.mode, to = %next, "Execution mode switched");
                self.mode = next;
            }
        }

        self.state.cycle_count += 1;
        let cycle = self.state.cycle_count;
        info!(cycle, venues = quotes.len(), mode = %self.mode, "Starting cycle");

        self.audit.append(
            RecordType::PriceCheck,
            &json!({
                "cycle": cycle,
                "instrument": self.instrument,
                "quotes": quotes,
            }),
        )?;

        let signal = self.strategy.evaluate(&quotes)?;
        let decision = self.risk.assess(&signal, &mut self.state)?;

        let execution = if decision.approved {
            let result = self.active_executor().execute(&signal, &decision).await?;
            self.state.apply_execution(&result);

            if let Some(leg) = &result.unhedged {
                // Escalation path: the exposure is now on the books and
                // blocks future approvals until manually resolved.
                error!(
                    trade_id = %result.trade_id,
                    venue = %leg.venue,
                    quantity = %leg.quantity,
                    entry_price = %leg.entry_price,
                    "Unhedged leg open — manual resolution required"
                );
            }
            Some(result)
        } else {
            None
        };

        self.audit.append(
            RecordType::TradeCycle,
            &json!({
                "cycle": cycle,
                "mode": self.mode,
                "signal": signal,
                "risk": decision,
                "execution": execution,
            }),
        )?;

        if let Some(path) = &self.state_file {
            storage::save_state(&self.state, Some(path))?;
        }

        Ok(CycleOutcome {
            cycle_number: cycle,
            venues_quoted: quotes.len(),
            signal,
            decision,
            execution,
            balance_after: self.state.balance,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
