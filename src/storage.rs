//! Persistence layer.
//!
//! Saves and loads the risk state to/from a JSON file so a restarted
//! process resumes with its balance, loss counters, and open exposure
//! intact. The audit trail is separate (see `audit`).

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::types::RiskState;

/// Default state file path.
const DEFAULT_STATE_FILE: &str = "arbiter_state.json";

/// Save risk state to a JSON file.
pub fn save_state(state: &RiskState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = serde_json::to_string_pretty(state)
        .context("Failed to serialise risk state")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write state to {path}"))?;

    debug!(path, balance = %state.balance, "State saved");
    Ok(())
}

/// Load risk state from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: Option<&str>) -> Result<Option<RiskState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read state from {path}"))?;

    let state: RiskState = serde_json::from_str(&json)
        .context(format!("Failed to parse state from {path}"))?;

    info!(
        path,
        balance = %state.balance,
        cycles = state.cycle_count,
        open_positions = state.open_positions.len(),
        "State loaded from disk"
    );

    Ok(Some(state))
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
