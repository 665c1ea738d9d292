//! Installed mod, load order and conflict handlers.

use crate::handlers::{require_str_param, require_u64_param};
use crate::server::AppState;
use modsync_core::{ModSyncError, Result};
use serde_json::Value;

pub async fn get_installed_mods(state: &AppState, _params: &Value) -> Result<Value> {
    Ok(serde_json::to_value(state.engine.installed_mods()?)?)
}

pub async fn enable_mod(state: &AppState, params: &Value) -> Result<Value> {
    let id = require_str_param(params, "id", "id")?;
    Ok(serde_json::to_value(state.engine.enable_mod(&id)?)?)
}

pub async fn disable_mod(state: &AppState, params: &Value) -> Result<Value> {
    let id = require_str_param(params, "id", "id")?;
    Ok(serde_json::to_value(state.engine.disable_mod(&id)?)?)
}

pub async fn set_mod_priority(state: &AppState, params: &Value) -> Result<Value> {
    let id = require_str_param(params, "id", "id")?;
    let priority = require_u64_param(params, "priority", "priority")?;
    let priority = u32::try_from(priority).map_err(|_| ModSyncError::InvalidParams {
        message: format!("priority out of range: {}", priority),
    })?;
    Ok(serde_json::to_value(
        state.engine.set_mod_priority(&id, priority)?,
    )?)
}

pub async fn uninstall_mod(state: &AppState, params: &Value) -> Result<Value> {
    let id = require_str_param(params, "id", "id")?;
    Ok(serde_json::to_value(state.engine.uninstall_mod(&id)?)?)
}

pub async fn get_load_order(state: &AppState, _params: &Value) -> Result<Value> {
    Ok(serde_json::to_value(state.engine.load_order()?)?)
}

pub async fn get_conflicts(state: &AppState, _params: &Value) -> Result<Value> {
    Ok(serde_json::to_value(state.engine.conflicts()?)?)
}

pub async fn cleanup_addons(state: &AppState, _params: &Value) -> Result<Value> {
    Ok(serde_json::to_value(state.engine.cleanup_addons()?)?)
}

pub async fn get_gameinfo_status(state: &AppState, _params: &Value) -> Result<Value> {
    Ok(serde_json::to_value(state.engine.gameinfo_status()?)?)
}

pub async fn fix_gameinfo(state: &AppState, _params: &Value) -> Result<Value> {
    Ok(serde_json::to_value(state.engine.fix_gameinfo()?)?)
}
