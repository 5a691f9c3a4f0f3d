//! Append-only audit trail.
//!
//! Every decision point in the pipeline writes a structured record here:
//! one JSON object per line, append order = cycle order. Dashboards and
//! alerting tail this stream; the pipeline itself only ever appends.
//! Operator logging goes through `tracing` and is separate.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Default audit log path.
const DEFAULT_LOG_FILE: &str = "arbiter_audit.jsonl";

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Category of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    #[serde(rename = "PRICE_CHECK")]
    PriceCheck,
    #[serde(rename = "STRATEGY_DECISION")]
    StrategyDecision,
    #[serde(rename = "RISK_DECISION")]
    RiskDecision,
    #[serde(rename = "TRADE_CYCLE")]
    TradeCycle,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::PriceCheck => write!(f, "PRICE_CHECK"),
            RecordType::StrategyDecision => write!(f, "STRATEGY_DECISION"),
            RecordType::RiskDecision => write!(f, "RISK_DECISION"),
            RecordType::TradeCycle => write!(f, "TRADE_CYCLE"),
        }
    }
}

/// One line of the audit stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// Append-only JSONL sink shared by all pipeline components.
///
/// Each append flushes before returning: the orchestrator must not start
/// the next cycle until the previous cycle's records are durable.
pub struct AuditLogger {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl AuditLogger {
    /// Open (or create) the audit log in append mode.
    pub fn open(path: Option<&str>) -> Result<Self> {
        let path = PathBuf::from(path.unwrap_or(DEFAULT_LOG_FILE));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open audit log: {}", path.display()))?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Append one record to the stream.
    pub fn append<T: Serialize>(&self, record_type: RecordType, data: &T) -> Result<()> {
        let record = AuditRecord {
            timestamp: Utc::now(),
            record_type,
            data: serde_json::to_value(data).context("Failed to serialise audit payload")?,
        };

        let line = serde_json::to_string(&record).context("Failed to serialise audit record")?;

        let mut writer = self.writer.lock().expect("audit writer poisoned");
        writeln!(writer, "{line}")
            .and_then(|_| writer.flush())
            .with_context(|| format!("Failed to write audit log: {}", self.path.display()))?;

        debug!(record_type = %record_type, "Audit record appended");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read back an audit stream, in append order.
///
/// Used by tests and by consumers that prefer batch reads over tailing.
pub fn read_records(path: &Path) -> Result<Vec<AuditRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open audit log: {}", path.display()))?;

    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.context("Failed to read audit log line")?;
        if line.trim().is_empty() {
            continue;
        }
        let record: AuditRecord =
            serde_json::from_str(&line).context("Failed to parse audit record")?;
        records.push(record);
    }

    Ok(records)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
