//! Reusable retry policy with exponential backoff and jitter.
//!
//! Encapsulates the attempt loop that order placement (and any other
//! venue call) runs under, instead of inlining sleep/backoff control
//! flow at each call site. The delay schedule is a pure function of the
//! attempt number (plus jitter), so it is testable without a clock.

use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Errors that can decide whether another attempt is worthwhile.
///
/// Transient failures (timeouts, rate limits, venue hiccups) are retried;
/// anything else is surfaced immediately.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

/// Backoff schedule and attempt budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Spread delays ±25% to avoid thundering-herd retries.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    /// Delay before the retry following attempt `attempt` (0-indexed):
    /// `base_delay * 2^attempt`, capped, with optional jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let capped = exponential.min(self.max_delay);

        if self.jitter {
            let factor = rand::thread_rng().gen_range(0.75..=1.25);
            capped.mul_f64(factor)
        } else {
            capped
        }
    }

    /// Drive `op` to completion under this policy.
    ///
    /// Transient errors are retried up to `max_retries` times; the first
    /// non-transient error is returned as-is.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(label, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        label,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure — backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(label, error = %e, "Retries exhausted");
                    } else {
                        debug!(label, error = %e, "Non-transient failure — not retried");
                    }
                    return Err(e);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
