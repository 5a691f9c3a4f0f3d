//! ARBITER — Cross-Venue Arbitrage Decision Pipeline
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores risk state from disk (or creates fresh), and runs the main
//! quotes→signal→risk→execute→audit loop with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use arbiter::audit::AuditLogger;
use arbiter::config;
use arbiter::engine::cycle::{CycleOutcome, Orchestrator};
use arbiter::engine::executor::PaperExecutor;
use arbiter::storage;
use arbiter::strategy::risk::{RiskConfig, RiskManager};
use arbiter::strategy::spread::{CostModel, StrategyEngine};
use arbiter::types::RiskState;
use arbiter::venues::{FixedConnector, QuoteBook, VenueConnector};

const BANNER: &str = r#"
    _    ____  ____ ___ _____ _____ ____
   / \  |  _ \| __ )_ _|_   _| ____|  _ \
  / _ \ | |_) |  _ \| |  | | |  _| | |_) |
 / ___ \|  _ <| |_) | |  | | | |___|  _ <
/_/   \_\_| \_\____/___| |_| |_____|_| \_\

  Audited Risk-Bounded Inter-venue Trade Execution Runtime
  v0.1.0 — Cycle Driver
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML; range violations are fatal here,
    // before the loop starts.
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        instrument = %cfg.agent.instrument,
        cycle_interval_secs = cfg.agent.cycle_interval_secs,
        initial_balance = %cfg.agent.initial_balance,
        mode = %cfg.execution.mode,
        "ARBITER starting up"
    );

    // -- Restore or create state -----------------------------------------

    let state = match storage::load_state(Some(&cfg.audit.state_file))? {
        Some(s) => {
            info!(
                balance = %s.balance,
                cycles = s.cycle_count,
                open_positions = s.open_positions.len(),
                "Resumed from saved state"
            );
            s
        }
        None => {
            let s = RiskState::new(cfg.agent.initial_balance);
            info!(balance = %s.balance, "Fresh start");
            s
        }
    };

    // -- Initialise components -------------------------------------------

    let audit = Arc::new(AuditLogger::open(Some(&cfg.audit.log_file))?);

    // Venue connectors. The reference harness uses fixed quotes from the
    // config; real deployments wire live connectors into the same seam.
    let connectors: Vec<Box<dyn VenueConnector>> = cfg
        .venues
        .fixed
        .iter()
        .map(|v| Box::new(FixedConnector::new(&v.name, v.bid, v.ask)) as Box<dyn VenueConnector>)
        .collect();

    if connectors.len() < 2 {
        info!(
            venues = connectors.len(),
            "Fewer than two venues configured — every cycle will HOLD"
        );
    }

    let book = QuoteBook::new(
        connectors,
        Duration::from_secs(cfg.venues.quote_timeout_secs),
    );

    let strategy = StrategyEngine::new(CostModel::from(&cfg.strategy), audit.clone());
    let risk = RiskManager::new(RiskConfig::from(&cfg.risk), audit.clone());
    let paper = PaperExecutor::new(cfg.strategy.fee_rate, cfg.strategy.slippage);

    // Live execution needs a venue gateway (exchange adapter); none ships
    // with the core pipeline, so LIVE mode falls back to paper until one
    // is wired in.
    let mut orchestrator = Orchestrator::new(
        strategy,
        risk,
        Box::new(paper),
        None,
        audit,
        state,
        cfg.execution_mode(),
        &cfg.agent.instrument,
    )
    .with_state_file(&cfg.audit.state_file);

    // -- Main loop -------------------------------------------------------

    let cycle_interval = Duration::from_secs(cfg.agent.cycle_interval_secs);
    let mut interval = tokio::time::interval(cycle_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.agent.cycle_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        // The stop signal is honoured only at cycle boundaries: a cycle
        // that has approved a trade always reaches a terminal status.
        tokio::select! {
            _ = interval.tick() => {
                let quotes = book.collect(&cfg.agent.instrument).await;
                match orchestrator.run_cycle(quotes).await {
                    Ok(outcome) => log_cycle(&outcome),
                    Err(e) => error!(error = %e, "Cycle failed — continuing to next"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    // Save final state
    storage::save_state(orchestrator.state(), Some(&cfg.audit.state_file))?;
    info!(
        balance = %orchestrator.state().balance,
        cycles = orchestrator.state().cycle_count,
        approved = orchestrator.state().trades_approved,
        rejected = orchestrator.state().trades_rejected,
        daily_pnl = %orchestrator.state().daily_pnl,
        "ARBITER shut down cleanly."
    );

    Ok(())
}

/// Log a human-readable cycle summary.
fn log_cycle(outcome: &CycleOutcome) {
    match &outcome.execution {
        Some(execution) => info!(
            cycle = outcome.cycle_number,
            venues = outcome.venues_quoted,
            decision = %outcome.signal.decision,
            trade_id = %execution.trade_id,
            status = %execution.status,
            net_pnl = %execution.net_pnl,
            balance = %outcome.balance_after,
            "Cycle complete"
        ),
        None => info!(
            cycle = outcome.cycle_number,
            venues = outcome.venues_quoted,
            decision = %outcome.signal.decision,
            reason = %outcome.decision.reason,
            balance = %outcome.balance_after,
            "Cycle complete"
        ),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("arbiter=info"));

    let json_logging = std::env::var("ARBITER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
