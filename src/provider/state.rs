//! State file for the dry-run engine.
//!
//! Keeps every resource the engine created so that re-applying a plan is a
//! no-op.

use crate::deferred::Outputs;
use crate::error::{TopologyError, TopologyResult};
use crate::models::ResourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;

/// One applied resource.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StateEntry {
    pub kind: ResourceKind,
    /// Serial the entry's identifiers were minted from.
    #[serde(default)]
    pub serial: u64,
    pub properties: BTreeMap<String, JsonValue>,
    pub outputs: Outputs,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Everything the engine knows about a stack.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct State {
    /// Sequence used to mint identifiers.
    #[serde(default)]
    pub serial: u64,
    #[serde(default)]
    pub resources: BTreeMap<String, StateEntry>,
    pub saved: Option<DateTime<Utc>>,
}

/// Read the state file, or start from an empty state if it does not exist.
///
/// # Arguments
/// * `state_file` - path of the JSON state file
///
/// # Returns
/// * `Ok(State)` - The stored state, or an empty one
/// * `Err` - If the file exists but cannot be read or parsed
pub fn read_state_file(state_file: &Path) -> TopologyResult<State> {
    let json = match std::fs::read_to_string(state_file) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("State file not found: {}", state_file.display());
            return Ok(State::default());
        }
        Err(e) => return Err(e.into()),
    };

    log::info!("Reading from state file: {}", state_file.display());
    let mut deserializer = serde_json::Deserializer::from_str(&json);
    let state: State = serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        TopologyError::Serialization(format!(
            "Error parsing state file {}: path={} error={}",
            state_file.display(),
            e.path(),
            e
        ))
    })?;
    log::debug!("State holds {} resources", state.resources.len());
    Ok(state)
}

/// Write the state file, stamping the save time.
pub fn write_state_file(state_file: &Path, state: &mut State) -> TopologyResult<()> {
    state.saved = Some(Utc::now());
    let json = serde_json::to_string_pretty(state)?;
    log::debug!("Writing state file: {}", state_file.display());
    std::fs::write(state_file, json).map_err(|e| {
        TopologyError::Serialization(format!(
            "Error writing state file {}: {e}",
            state_file.display()
        ))
    })
}
