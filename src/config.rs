//! Configuration loading from TOML with startup validation.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Unset options take the documented reference defaults. Malformed or
//! out-of-range values (negative rates, zero limits) are the only fatal
//! error class — they are rejected here, before the loop starts.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::str::FromStr;

use crate::types::ExecutionMode;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub venues: VenuesConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub cycle_interval_secs: u64,
    pub initial_balance: Decimal,
    pub instrument: String,
}

/// Cost model inputs for the strategy engine.
#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    #[serde(default = "default_slippage")]
    pub slippage: Decimal,
    #[serde(default = "default_min_spread")]
    pub min_spread: Decimal,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
            slippage: default_slippage(),
            min_spread: default_min_spread(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RiskConfig {
    #[serde(default = "default_capital_pct")]
    pub capital_pct_per_trade: Decimal,
    /// Hard cap in asset units.
    #[serde(default = "default_max_position_abs")]
    pub max_position_abs: Decimal,
    #[serde(default = "default_max_exposure_pct")]
    pub max_exposure_pct: Decimal,
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: Decimal,
    #[serde(default = "default_circuit_breaker")]
    pub circuit_breaker_threshold: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            capital_pct_per_trade: default_capital_pct(),
            max_position_abs: default_max_position_abs(),
            max_exposure_pct: default_max_exposure_pct(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            circuit_breaker_threshold: default_circuit_breaker(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutionConfig {
    /// "paper" or "live"; applied at cycle boundaries only.
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VenuesConfig {
    #[serde(default = "default_quote_timeout_secs")]
    pub quote_timeout_secs: u64,
    /// Fixed-quote venues for the paper-trading reference harness.
    /// Real deployments replace these with live connectors.
    #[serde(default)]
    pub fixed: Vec<FixedVenueConfig>,
}

impl Default for VenuesConfig {
    fn default() -> Self {
        Self {
            quote_timeout_secs: default_quote_timeout_secs(),
            fixed: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FixedVenueConfig {
    pub name: String,
    pub bid: Decimal,
    pub ask: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            state_file: default_state_file(),
        }
    }
}

// Reference defaults.
fn default_fee_rate() -> Decimal {
    dec!(0.001)
}
fn default_slippage() -> Decimal {
    dec!(0.0005)
}
fn default_min_spread() -> Decimal {
    dec!(0.002)
}
fn default_capital_pct() -> Decimal {
    dec!(0.05)
}
fn default_max_position_abs() -> Decimal {
    dec!(0.05)
}
fn default_max_exposure_pct() -> Decimal {
    dec!(0.30)
}
fn default_max_daily_loss_pct() -> Decimal {
    dec!(0.05)
}
fn default_circuit_breaker() -> u32 {
    3
}
fn default_mode() -> String {
    "paper".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_quote_timeout_secs() -> u64 {
    2
}
fn default_log_file() -> String {
    "arbiter_audit.jsonl".to_string()
}
fn default_state_file() -> String {
    "arbiter_state.json".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values before the loop starts.
    pub fn validate(&self) -> Result<()> {
        if self.agent.cycle_interval_secs == 0 {
            bail!("agent.cycle_interval_secs must be positive");
        }
        if self.agent.initial_balance <= Decimal::ZERO {
            bail!("agent.initial_balance must be positive");
        }
        if self.strategy.fee_rate < Decimal::ZERO {
            bail!("strategy.fee_rate must not be negative");
        }
        if self.strategy.slippage < Decimal::ZERO {
            bail!("strategy.slippage must not be negative");
        }
        if self.strategy.min_spread < Decimal::ZERO {
            bail!("strategy.min_spread must not be negative");
        }
        if self.risk.capital_pct_per_trade <= Decimal::ZERO
            || self.risk.capital_pct_per_trade > Decimal::ONE
        {
            bail!("risk.capital_pct_per_trade must be in (0, 1]");
        }
        if self.risk.max_position_abs <= Decimal::ZERO {
            bail!("risk.max_position_abs must be positive");
        }
        if self.risk.max_exposure_pct <= Decimal::ZERO {
            bail!("risk.max_exposure_pct must be positive");
        }
        if self.risk.max_daily_loss_pct <= Decimal::ZERO {
            bail!("risk.max_daily_loss_pct must be positive");
        }
        if self.risk.circuit_breaker_threshold == 0 {
            bail!("risk.circuit_breaker_threshold must be at least 1");
        }
        if self.venues.quote_timeout_secs == 0 {
            bail!("venues.quote_timeout_secs must be positive");
        }
        ExecutionMode::from_str(&self.execution.mode)
            .context("execution.mode must be 'paper' or 'live'")?;
        Ok(())
    }

    /// The validated execution mode.
    pub fn execution_mode(&self) -> ExecutionMode {
        // validate() has already checked this parses
        ExecutionMode::from_str(&self.execution.mode).unwrap_or(ExecutionMode::Paper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [agent]
        name = "ARBITER-001"
        cycle_interval_secs = 60
        initial_balance = 10000.0
        instrument = "BTC-USD"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg: AppConfig = toml::from_str(MINIMAL).unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.strategy.fee_rate, dec!(0.001));
        assert_eq!(cfg.strategy.slippage, dec!(0.0005));
        assert_eq!(cfg.strategy.min_spread, dec!(0.002));
        assert_eq!(cfg.risk.capital_pct_per_trade, dec!(0.05));
        assert_eq!(cfg.risk.max_exposure_pct, dec!(0.30));
        assert_eq!(cfg.risk.circuit_breaker_threshold, 3);
        assert_eq!(cfg.execution.max_retries, 3);
        assert_eq!(cfg.execution_mode(), ExecutionMode::Paper);
        assert_eq!(cfg.venues.quote_timeout_secs, 2);
    }

    #[test]
    fn test_explicit_overrides() {
        let toml_str = format!(
            "{MINIMAL}\n[strategy]\nfee_rate = 0.002\n\n[execution]\nmode = \"live\"\nmax_retries = 5\n"
        );
        let cfg: AppConfig = toml::from_str(&toml_str).unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.strategy.fee_rate, dec!(0.002));
        assert_eq!(cfg.execution_mode(), ExecutionMode::Live);
        assert_eq!(cfg.execution.max_retries, 5);
    }

    #[test]
    fn test_negative_fee_rejected() {
        let toml_str = format!("{MINIMAL}\n[strategy]\nfee_rate = -0.001\n");
        let cfg: AppConfig = toml::from_str(&toml_str).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("fee_rate"));
    }

    #[test]
    fn test_zero_circuit_breaker_rejected() {
        let toml_str = format!("{MINIMAL}\n[risk]\ncircuit_breaker_threshold = 0\n");
        let cfg: AppConfig = toml::from_str(&toml_str).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_bad_mode_rejected() {
        let toml_str = format!("{MINIMAL}\n[execution]\nmode = \"margin\"\n");
        let cfg: AppConfig = toml::from_str(&toml_str).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_fixed_venues_parse() {
        let toml_str = format!(
            "{MINIMAL}\n[[venues.fixed]]\nname = \"binance\"\nbid = 68000.0\nask = 68010.0\n"
        );
        let cfg: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(cfg.venues.fixed.len(), 1);
        assert_eq!(cfg.venues.fixed[0].name, "binance");
    }
}
