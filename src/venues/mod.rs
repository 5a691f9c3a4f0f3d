//! Venue quote collection.
//!
//! Defines the `VenueConnector` seam that external REST/WebSocket
//! connectors implement, and the `QuoteBook` that fans out to every
//! connector concurrently each cycle. A venue that errors or exceeds
//! its timeout is simply absent from that cycle's quote set — it never
//! blocks the cycle and never propagates an error into the pipeline.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::PriceQuote;

/// Abstraction over a single venue's market-data feed.
#[async_trait]
pub trait VenueConnector: Send + Sync {
    /// Venue name for logging and quote attribution.
    fn name(&self) -> &str;

    /// Fetch the current top-of-book for one instrument.
    async fn fetch_quote(&self, instrument: &str) -> Result<PriceQuote>;
}

// ---------------------------------------------------------------------------
// Quote book
// ---------------------------------------------------------------------------

/// Fans out to all configured connectors concurrently, bounded by a
/// per-venue timeout to keep staleness skew between venues small.
pub struct QuoteBook {
    connectors: Vec<Box<dyn VenueConnector>>,
    timeout: Duration,
}

impl QuoteBook {
    pub fn new(connectors: Vec<Box<dyn VenueConnector>>, timeout: Duration) -> Self {
        Self { connectors, timeout }
    }

    pub fn venue_count(&self) -> usize {
        self.connectors.len()
    }

    /// Collect one quote per responsive venue.
    pub async fn collect(&self, instrument: &str) -> Vec<PriceQuote> {
        let timeout = self.timeout;
        let futures = self.connectors.iter().map(|connector| async move {
            match tokio::time::timeout(timeout, connector.fetch_quote(instrument)).await {
                Ok(Ok(quote)) => {
                    debug!(venue = connector.name(), %quote, "Quote received");
                    Some(quote)
                }
                Ok(Err(e)) => {
                    warn!(venue = connector.name(), error = %e, "Quote fetch failed");
                    None
                }
                Err(_) => {
                    warn!(
                        venue = connector.name(),
                        timeout_ms = timeout.as_millis() as u64,
                        "Quote fetch timed out"
                    );
                    None
                }
            }
        });

        futures::future::join_all(futures)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Deterministic connectors
// ---------------------------------------------------------------------------

/// Connector returning a fixed bid/ask every cycle.
///
/// Backs the paper-trading reference harness and tests; real deployments
/// wire in live connectors instead.
pub struct FixedConnector {
    name: String,
    bid: Decimal,
    ask: Decimal,
}

impl FixedConnector {
    pub fn new(name: &str, bid: Decimal, ask: Decimal) -> Self {
        Self {
            name: name.to_string(),
            bid,
            ask,
        }
    }
}

#[async_trait]
impl VenueConnector for FixedConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_quote(&self, instrument: &str) -> Result<PriceQuote> {
        Ok(PriceQuote::new(&self.name, instrument, self.bid, self.ask))
    }
}

/// Connector replaying a scripted sequence of bid/ask pairs, one per
/// call. Errors once the script is exhausted.
pub struct ScriptedConnector {
    name: String,
    script: Mutex<std::vec::IntoIter<(Decimal, Decimal)>>,
}

impl ScriptedConnector {
    pub fn new(name: &str, script: Vec<(Decimal, Decimal)>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into_iter()),
        }
    }
}

#[async_trait]
impl VenueConnector for ScriptedConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_quote(&self, instrument: &str) -> Result<PriceQuote> {
        let next = self.script.lock().expect("script lock poisoned").next();
        match next {
            Some((bid, ask)) => Ok(PriceQuote::new(&self.name, instrument, bid, ask)),
            None => bail!("Scripted quotes exhausted for venue {}", self.name),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
