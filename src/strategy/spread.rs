//! Cross-venue spread evaluation.
//!
//! Compares simultaneous quotes for one instrument across venues and
//! decides whether the best buy/sell pairing clears the cost-aware
//! threshold. All monetary arithmetic is `Decimal` so comparisons near
//! the threshold are exact.

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{debug, info};

use crate::audit::{AuditLogger, RecordType};
use crate::config::StrategyConfig;
use crate::types::{Confidence, PriceQuote, TradeDecision, TradeSignal};

// ---------------------------------------------------------------------------
// Cost model
// ---------------------------------------------------------------------------

/// Round-trip cost assumptions for a two-leg trade.
#[derive(Debug, Clone)]
pub struct CostModel {
    /// Trading fee per leg (e.g. 0.001 = 0.1%).
    pub fee_rate: Decimal,
    /// Estimated slippage per leg.
    pub slippage: Decimal,
    /// Minimum spread margin required on top of fees and slippage.
    pub min_spread: Decimal,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            fee_rate: dec!(0.001),
            slippage: dec!(0.0005),
            min_spread: dec!(0.002),
        }
    }
}

impl From<&StrategyConfig> for CostModel {
    fn from(cfg: &StrategyConfig) -> Self {
        Self {
            fee_rate: cfg.fee_rate,
            slippage: cfg.slippage,
            min_spread: cfg.min_spread,
        }
    }
}

impl CostModel {
    /// Break-even threshold: fees and slippage on both legs plus the
    /// configured margin. Monotonically non-decreasing in each input.
    pub fn threshold(&self) -> Decimal {
        self.fee_rate * Decimal::TWO + self.slippage * Decimal::TWO + self.min_spread
    }
}

// ---------------------------------------------------------------------------
// Strategy engine
// ---------------------------------------------------------------------------

/// Expected profit above which a TRADE signal is flagged high-confidence.
const HIGH_CONFIDENCE_PROFIT: Decimal = dec!(0.005);

/// Evaluates cross-venue spreads and emits one trade signal per cycle.
pub struct StrategyEngine {
    costs: CostModel,
    audit: Arc<AuditLogger>,
}

impl StrategyEngine {
    pub fn new(costs: CostModel, audit: Arc<AuditLogger>) -> Self {
        Self { costs, audit }
    }

    /// Access the cost model.
    pub fn costs(&self) -> &CostModel {
        &self.costs
    }

    /// Evaluate one cycle's quote set.
    ///
    /// Missing or one-sided data is recovered locally as a HOLD signal —
    /// the cycle always continues. Identical inputs produce identical
    /// signals: the read path holds no hidden state.
    pub fn evaluate(&self, quotes: &[PriceQuote]) -> Result<TradeSignal> {
        let threshold = self.costs.threshold();
        let instrument = quotes
            .first()
            .map(|q| q.instrument.clone())
            .unwrap_or_default();

        // One quote per venue; connectors that reported twice keep their
        // first snapshot of the cycle.
        let mut venues: Vec<&PriceQuote> = Vec::new();
        for quote in quotes {
            if !venues.iter().any(|v| v.venue == quote.venue) {
                venues.push(quote);
            }
        }

        if venues.len() < 2 {
            debug!(venues = venues.len(), "Not enough venues to compare");
            return self.finish(TradeSignal::hold(
                &instrument,
                "insufficient venues",
                Decimal::ZERO,
                threshold,
            ));
        }

        // Best ordered pair (buy at A's ask, sell at B's bid). Equal
        // spreads break ties on the lexicographically first venue pair
        // so repeated evaluations are deterministic.
        let mut best: Option<(Decimal, &PriceQuote, &PriceQuote)> = None;
        for &buy in &venues {
            if buy.ask <= Decimal::ZERO {
                continue;
            }
            for &sell in &venues {
                if buy.venue == sell.venue {
                    continue;
                }
                let spread = (sell.bid - buy.ask) / buy.ask;
                let better = match &best {
                    None => true,
                    Some((s, b, l)) => {
                        spread > *s
                            || (spread == *s
                                && (buy.venue.as_str(), sell.venue.as_str())
                                    < (b.venue.as_str(), l.venue.as_str()))
                    }
                };
                if better {
                    best = Some((spread, buy, sell));
                }
            }
        }

        let Some((spread_pct, buy, sell)) = best else {
            return self.finish(TradeSignal::hold(
                &instrument,
                "insufficient venues",
                Decimal::ZERO,
                threshold,
            ));
        };

        if spread_pct <= threshold {
            debug!(
                spread = %spread_pct,
                threshold = %threshold,
                "Spread does not clear the cost threshold"
            );
            return self.finish(TradeSignal::hold(
                &instrument,
                "spread below threshold",
                spread_pct,
                threshold,
            ));
        }

        // Fee- and slippage-adjusted expectation, relative to the buy leg.
        let buy_cost = buy.ask * (Decimal::ONE + self.costs.fee_rate + self.costs.slippage);
        let sell_revenue = sell.bid * (Decimal::ONE - self.costs.fee_rate - self.costs.slippage);
        let expected_profit_pct = (sell_revenue - buy_cost) / buy.ask;

        let confidence = if expected_profit_pct > HIGH_CONFIDENCE_PROFIT {
            Confidence::High
        } else {
            Confidence::Medium
        };

        let signal = TradeSignal {
            decision: TradeDecision::Trade,
            instrument,
            spread_pct,
            threshold_pct: threshold,
            reason: format!(
                "arbitrage: buy on {} at {:.2}, sell on {} at {:.2}",
                buy.venue, buy.ask, sell.venue, sell.bid
            ),
            buy_venue: Some(buy.venue.clone()),
            sell_venue: Some(sell.venue.clone()),
            buy_price: Some(buy.ask),
            sell_price: Some(sell.bid),
            expected_profit_pct: Some(expected_profit_pct),
            confidence,
            timestamp: chrono::Utc::now(),
        };

        info!(
            buy_venue = %buy.venue,
            sell_venue = %sell.venue,
            spread = %spread_pct,
            threshold = %threshold,
            expected_profit = %expected_profit_pct,
            "Trade signal"
        );

        self.finish(signal)
    }

    /// Emit the audit record and hand the signal back.
    fn finish(&self, signal: TradeSignal) -> Result<TradeSignal> {
        self.audit.append(RecordType::StrategyDecision, &signal)?;
        Ok(signal)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
