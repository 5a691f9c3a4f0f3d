//! End-to-end pipeline scenarios.
//!
//! Drives full quotes→signal→risk→execute→audit cycles through the
//! orchestrator with deterministic connectors and gateways — no
//! external dependencies.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arbiter::audit::{self, AuditLogger, RecordType};
use arbiter::engine::cycle::Orchestrator;
use arbiter::engine::executor::{
    Executor, Fill, LiveExecutor, PaperExecutor, VenueError, VenueGateway,
};
use arbiter::engine::retry::RetryPolicy;
use arbiter::strategy::risk::{RiskConfig, RiskManager};
use arbiter::strategy::spread::{CostModel, StrategyEngine};
use arbiter::types::{
    ExecutionMode, OrderStatus, PriceQuote, RiskState, TradeDecision,
};
use arbiter::venues::{QuoteBook, ScriptedConnector, VenueConnector};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn temp_audit_path() -> String {
    let mut p = std::env::temp_dir();
    p.push(format!("arbiter_pipeline_{}.jsonl", uuid::Uuid::new_v4()));
    p.to_string_lossy().to_string()
}

fn instant_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        jitter: false,
    }
}

fn build_orchestrator(
    audit_path: &str,
    live: Option<Box<dyn Executor>>,
    mode: ExecutionMode,
) -> Orchestrator {
    let audit = Arc::new(AuditLogger::open(Some(audit_path)).unwrap());
    Orchestrator::new(
        StrategyEngine::new(CostModel::default(), audit.clone()),
        RiskManager::new(RiskConfig::default(), audit.clone()),
        Box::new(PaperExecutor::new(dec!(0.001), Decimal::ZERO)),
        live,
        audit,
        RiskState::new(dec!(10000)),
        mode,
        "BTC-USD",
    )
}

/// Scenario A quotes: ~1.44% spread between the Binance ask and the
/// Coinbase bid, against a 0.5% default threshold.
fn wide_quotes() -> Vec<PriceQuote> {
    vec![
        PriceQuote::new("Binance", "BTC-USD", dec!(68010.00), dec!(68011.05)),
        PriceQuote::new("Coinbase", "BTC-USD", dec!(68988.79), dec!(68990.00)),
    ]
}

fn flat_quotes() -> Vec<PriceQuote> {
    vec![
        PriceQuote::new("Binance", "BTC-USD", dec!(68000), dec!(68000)),
        PriceQuote::new("Coinbase", "BTC-USD", dec!(68000), dec!(68000)),
    ]
}

/// Gateway whose fills lose money: buys fill high, sells fill low.
struct LossyGateway;

#[async_trait]
impl VenueGateway for LossyGateway {
    async fn place_market_buy(
        &self,
        _venue: &str,
        _instrument: &str,
        quantity: Decimal,
    ) -> Result<Fill, VenueError> {
        Ok(Fill {
            order_id: format!("BUY-{}", uuid::Uuid::new_v4()),
            price: dec!(68500),
            quantity,
            fee: dec!(0.50),
        })
    }

    async fn place_market_sell(
        &self,
        _venue: &str,
        _instrument: &str,
        quantity: Decimal,
    ) -> Result<Fill, VenueError> {
        Ok(Fill {
            order_id: format!("SELL-{}", uuid::Uuid::new_v4()),
            price: dec!(68400),
            quantity,
            fee: dec!(0.50),
        })
    }
}

/// Gateway where the buy leg fills but the sell venue never recovers.
struct UnhedgedGateway;

#[async_trait]
impl VenueGateway for UnhedgedGateway {
    async fn place_market_buy(
        &self,
        _venue: &str,
        _instrument: &str,
        quantity: Decimal,
    ) -> Result<Fill, VenueError> {
        Ok(Fill {
            order_id: format!("BUY-{}", uuid::Uuid::new_v4()),
            price: dec!(68020),
            quantity,
            fee: dec!(0.50),
        })
    }

    async fn place_market_sell(
        &self,
        venue: &str,
        _instrument: &str,
        _quantity: Decimal,
    ) -> Result<Fill, VenueError> {
        Err(VenueError::Unavailable(format!("{venue} down for maintenance")))
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

// Scenario A: wide spread trades with the expected venue orientation.
#[tokio::test]
async fn scenario_a_wide_spread_trades() {
    let path = temp_audit_path();
    let mut orc = build_orchestrator(&path, None, ExecutionMode::Paper);

    let outcome = orc.run_cycle(wide_quotes()).await.unwrap();

    let signal = &outcome.signal;
    assert_eq!(signal.decision, TradeDecision::Trade);
    assert_eq!(signal.buy_venue.as_deref(), Some("Binance"));
    assert_eq!(signal.sell_venue.as_deref(), Some("Coinbase"));
    assert!(signal.spread_pct > dec!(0.0143) && signal.spread_pct < dec!(0.0144));
    assert_eq!(signal.threshold_pct, dec!(0.005));
    assert!(outcome.decision.approved);
    assert_eq!(outcome.execution.unwrap().status, OrderStatus::Filled);

    std::fs::remove_file(&path).unwrap();
}

// Scenario B: identical prices hold with the threshold reason.
#[tokio::test]
async fn scenario_b_identical_prices_hold() {
    let path = temp_audit_path();
    let mut orc = build_orchestrator(&path, None, ExecutionMode::Paper);

    let outcome = orc.run_cycle(flat_quotes()).await.unwrap();

    assert_eq!(outcome.signal.decision, TradeDecision::Hold);
    assert_eq!(outcome.signal.reason, "spread below threshold");
    assert_eq!(outcome.signal.spread_pct, Decimal::ZERO);
    assert!(outcome.execution.is_none());

    std::fs::remove_file(&path).unwrap();
}

// Scenario C: a 5.1% daily loss halts trading for the rest of the day,
// regardless of how attractive the spread is.
#[tokio::test]
async fn scenario_c_daily_loss_limit_halts() {
    let path = temp_audit_path();
    let mut orc = build_orchestrator(&path, None, ExecutionMode::Paper);
    orc.state_mut().daily_pnl = dec!(-510);

    for _ in 0..3 {
        let outcome = orc.run_cycle(wide_quotes()).await.unwrap();
        assert_eq!(outcome.signal.decision, TradeDecision::Trade);
        assert!(!outcome.decision.approved);
        assert_eq!(outcome.decision.reason, "daily loss limit reached");
        assert!(outcome.execution.is_none());
    }
    assert!(orc.state().daily_loss_limit_hit);

    std::fs::remove_file(&path).unwrap();
}

// Scenario D: paper fills of 0.0074 BTC at 68,011.05 / 68,988.79 with
// 0.1% fees produce ~$1.01 in fees and ~$6.22 net.
#[tokio::test]
async fn scenario_d_paper_reference_pnl() {
    let path = temp_audit_path();
    let audit = Arc::new(AuditLogger::open(Some(&path)).unwrap());
    let mut orc = Orchestrator::new(
        StrategyEngine::new(CostModel::default(), audit.clone()),
        // Size so that the allocation works out to 0.0074 BTC at the
        // Binance ask: 68,011.05 * 0.0074 / 10,000 ≈ 5.03%.
        RiskManager::new(
            RiskConfig {
                capital_pct_per_trade: dec!(0.05032818),
                ..RiskConfig::default()
            },
            audit.clone(),
        ),
        Box::new(PaperExecutor::new(dec!(0.001), Decimal::ZERO)),
        None,
        audit,
        RiskState::new(dec!(10000)),
        ExecutionMode::Paper,
        "BTC-USD",
    );

    let outcome = orc.run_cycle(wide_quotes()).await.unwrap();
    let execution = outcome.execution.unwrap();

    assert!(execution.quantity > dec!(0.00739) && execution.quantity < dec!(0.00741));
    assert!(execution.fees > dec!(1.00) && execution.fees < dec!(1.02));
    assert!(execution.net_pnl > dec!(6.20) && execution.net_pnl < dec!(6.24));
    assert_eq!(orc.state().balance, dec!(10000) + execution.net_pnl);

    std::fs::remove_file(&path).unwrap();
}

// Scenario E: the sell leg exhausts its retries, the result is FAILED
// with reason "unhedged leg", and the exposure lands in the risk state.
#[tokio::test]
async fn scenario_e_unhedged_leg_recorded() {
    let path = temp_audit_path();
    let live = LiveExecutor::new(UnhedgedGateway, instant_retry());
    let mut orc = build_orchestrator(&path, Some(Box::new(live)), ExecutionMode::Live);

    let outcome = orc.run_cycle(wide_quotes()).await.unwrap();

    let execution = outcome.execution.unwrap();
    assert_eq!(execution.status, OrderStatus::Failed);
    assert_eq!(execution.reason.as_deref(), Some("unhedged leg"));

    let leg = execution.unhedged.as_ref().unwrap();
    assert_eq!(orc.state().open_exposure, leg.notional());
    assert_eq!(orc.state().open_positions.len(), 1);
    // The balance is untouched until the leg is manually resolved.
    assert_eq!(orc.state().balance, dec!(10000));

    std::fs::remove_file(&path).unwrap();
}

// ---------------------------------------------------------------------------
// Cross-cycle behaviour
// ---------------------------------------------------------------------------

// Three consecutive losing fills trip the circuit breaker; the fourth
// cycle is rejected before execution despite a perfect signal.
#[tokio::test]
async fn circuit_breaker_trips_after_losing_streak() {
    let path = temp_audit_path();
    let live = LiveExecutor::new(LossyGateway, instant_retry());
    let mut orc = build_orchestrator(&path, Some(Box::new(live)), ExecutionMode::Live);

    for i in 1..=3 {
        let outcome = orc.run_cycle(wide_quotes()).await.unwrap();
        let execution = outcome.execution.unwrap();
        assert_eq!(execution.status, OrderStatus::Filled);
        assert!(execution.net_pnl < Decimal::ZERO);
        assert_eq!(orc.state().consecutive_losses, i);
    }

    let fourth = orc.run_cycle(wide_quotes()).await.unwrap();
    assert_eq!(fourth.signal.decision, TradeDecision::Trade);
    assert!(!fourth.decision.approved);
    assert!(fourth.decision.reason.contains("circuit breaker"));
    assert!(fourth.execution.is_none());

    // Manual reset restores trading.
    orc.state_mut().reset_circuit_breaker();
    let fifth = orc.run_cycle(wide_quotes()).await.unwrap();
    assert!(fifth.decision.approved);

    std::fs::remove_file(&path).unwrap();
}

// Unhedged exposure left on the books blocks later approvals through
// the exposure limit.
#[tokio::test]
async fn open_exposure_from_unhedged_leg_blocks_new_trades() {
    let path = temp_audit_path();
    let live = LiveExecutor::new(UnhedgedGateway, instant_retry());
    let mut orc = build_orchestrator(&path, Some(Box::new(live)), ExecutionMode::Live);

    orc.run_cycle(wide_quotes()).await.unwrap();
    assert!(orc.state().open_exposure > Decimal::ZERO);

    // Inflate the stuck exposure past the 30% cap and try again.
    orc.state_mut().open_exposure = dec!(3100);
    let outcome = orc.run_cycle(wide_quotes()).await.unwrap();
    assert!(!outcome.decision.approved);
    assert_eq!(outcome.decision.reason, "exposure limit");

    std::fs::remove_file(&path).unwrap();
}

// A venue that stops responding drops out of the quote set and the
// pipeline degrades to HOLD instead of erroring.
#[tokio::test]
async fn missing_venue_degrades_to_hold() {
    let path = temp_audit_path();
    let mut orc = build_orchestrator(&path, None, ExecutionMode::Paper);

    let connectors: Vec<Box<dyn VenueConnector>> = vec![
        Box::new(ScriptedConnector::new(
            "binance",
            vec![(dec!(68010.00), dec!(68011.05)), (dec!(68010.00), dec!(68011.05))],
        )),
        // Only one scripted quote: this venue disappears on cycle two.
        Box::new(ScriptedConnector::new(
            "coinbase",
            vec![(dec!(68988.79), dec!(68990.00))],
        )),
    ];
    let book = QuoteBook::new(connectors, Duration::from_secs(2));

    let first = orc.run_cycle(book.collect("BTC-USD").await).await.unwrap();
    assert_eq!(first.signal.decision, TradeDecision::Trade);

    let second = orc.run_cycle(book.collect("BTC-USD").await).await.unwrap();
    assert_eq!(second.signal.decision, TradeDecision::Hold);
    assert_eq!(second.signal.reason, "insufficient venues");

    std::fs::remove_file(&path).unwrap();
}

// The audit stream carries one PRICE_CHECK, STRATEGY_DECISION,
// RISK_DECISION and TRADE_CYCLE per cycle, in cycle order, and parses
// back losslessly.
#[tokio::test]
async fn audit_stream_is_complete_and_ordered() {
    let path = temp_audit_path();
    let mut orc = build_orchestrator(&path, None, ExecutionMode::Paper);

    orc.run_cycle(wide_quotes()).await.unwrap();
    orc.run_cycle(flat_quotes()).await.unwrap();

    let records = audit::read_records(Path::new(&path)).unwrap();
    assert_eq!(records.len(), 8);

    let expected = [
        RecordType::PriceCheck,
        RecordType::StrategyDecision,
        RecordType::RiskDecision,
        RecordType::TradeCycle,
    ];
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.record_type, expected[i % 4]);
    }

    // Cycle numbering in append order.
    assert_eq!(records[0].data["cycle"], 1);
    assert_eq!(records[4].data["cycle"], 2);

    // Second cycle held: no execution in its TRADE_CYCLE record.
    assert!(records[7].data["execution"].is_null());

    std::fs::remove_file(&path).unwrap();
}

// Mode switches requested mid-run are applied at the next boundary and
// visible in the audit stream.
#[tokio::test]
async fn mode_switch_applies_at_cycle_boundary() {
    let path = temp_audit_path();
    let live = LiveExecutor::new(LossyGateway, instant_retry());
    let mut orc = build_orchestrator(&path, Some(Box::new(live)), ExecutionMode::Paper);

    let first = orc.run_cycle(wide_quotes()).await.unwrap();
    assert_eq!(first.execution.unwrap().mode, ExecutionMode::Paper);

    orc.set_mode(ExecutionMode::Live);
    let second = orc.run_cycle(wide_quotes()).await.unwrap();
    assert_eq!(second.execution.unwrap().mode, ExecutionMode::Live);

    let records = audit::read_records(Path::new(&path)).unwrap();
    assert_eq!(records[3].data["mode"], "PAPER");
    assert_eq!(records[7].data["mode"], "LIVE");

    std::fs::remove_file(&path).unwrap();
}
