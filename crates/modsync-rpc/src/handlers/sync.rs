//! Catalog sync handlers.
//!
//! Sync runs are started in the background and answered at once; progress
//! and failures reach the UI through `syncProgress` events and the state
//! queries, never as RPC errors.

use crate::handlers::{get_section_param, require_section_param};
use crate::server::AppState;
use modsync_core::{Result, Section, SyncOutcome};
use serde_json::{json, Map, Value};
use tracing::info;

pub async fn sync_all_mods(state: &AppState, _params: &Value) -> Result<Value> {
    if state.engine.is_sync_in_progress() {
        return Ok(json!({"started": false, "reason": "already-running"}));
    }
    drop(state.engine.spawn_full_sync());
    Ok(json!({"started": true}))
}

pub async fn sync_section(state: &AppState, params: &Value) -> Result<Value> {
    let section = require_section_param(params)?;
    if state.engine.is_sync_in_progress() {
        return Ok(json!({"started": false, "reason": "already-running"}));
    }

    let engine = state.engine.clone();
    tokio::spawn(async move {
        if let SyncOutcome::AlreadyRunning = engine.sync_section(section).await {
            info!("{} sync was already running", section);
        }
    });
    Ok(json!({"started": true}))
}

pub async fn wipe_mod_cache(state: &AppState, _params: &Value) -> Result<Value> {
    state.engine.wipe_mod_cache()?;
    Ok(Value::Bool(true))
}

/// Map of section name to `{lastSync, count}`, or null when never synced.
pub async fn get_sync_status(state: &AppState, _params: &Value) -> Result<Value> {
    let status = state.engine.sync_status()?;
    let mut map = Map::new();
    for (section, entry) in status {
        map.insert(section.as_str().to_string(), serde_json::to_value(entry)?);
    }
    Ok(Value::Object(map))
}

/// Live state of one section, or of every section when none is named.
pub async fn get_sync_state(state: &AppState, params: &Value) -> Result<Value> {
    match get_section_param(params)? {
        Some(section) => Ok(serde_json::to_value(state.engine.sync_state(section))?),
        None => {
            let states: Vec<_> = Section::ALL
                .iter()
                .map(|&s| state.engine.sync_state(s))
                .collect();
            Ok(serde_json::to_value(states)?)
        }
    }
}

pub async fn needs_sync(state: &AppState, _params: &Value) -> Result<Value> {
    Ok(Value::Bool(state.engine.needs_sync()?))
}

pub async fn is_sync_in_progress(state: &AppState, _params: &Value) -> Result<Value> {
    Ok(Value::Bool(state.engine.is_sync_in_progress()))
}
