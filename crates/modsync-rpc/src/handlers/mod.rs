//! JSON-RPC request handlers, split by domain.

mod catalog;
mod downloads;
mod installed;
mod sync;

use crate::server::AppState;
use crate::wrapper::wrap_response;
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::stream::{Stream, StreamExt};
use modsync_core::{ModSyncError, Result, Section};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, error, warn};

// ============================================================================
// JSON-RPC types
// ============================================================================

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

// ============================================================================
// Parameter extraction helpers
// ============================================================================

/// Look up a parameter by its camelCase name, then its snake_case name.
fn param<'a>(params: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    params
        .get(camel)
        .or_else(|| params.get(snake))
        .filter(|v| !v.is_null())
}

/// Extract an optional string parameter.
pub(crate) fn get_str_param<'a>(params: &'a Value, camel: &str, snake: &str) -> Option<&'a str> {
    param(params, camel, snake).and_then(|v| v.as_str())
}

/// Extract an optional unsigned parameter. Numeric strings are accepted,
/// since the portal's ids sometimes travel as strings.
pub(crate) fn get_u64_param(params: &Value, camel: &str, snake: &str) -> Option<u64> {
    param(params, camel, snake).and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Extract a required unsigned parameter or return an error.
pub(crate) fn require_u64_param(params: &Value, camel: &str, snake: &str) -> Result<u64> {
    get_u64_param(params, camel, snake).ok_or_else(|| ModSyncError::InvalidParams {
        message: format!("Missing required parameter: {}", camel),
    })
}

/// Extract a required string parameter or return an error.
pub(crate) fn require_str_param(params: &Value, camel: &str, snake: &str) -> Result<String> {
    get_str_param(params, camel, snake)
        .map(String::from)
        .ok_or_else(|| ModSyncError::InvalidParams {
            message: format!("Missing required parameter: {}", camel),
        })
}

/// Extract an optional section; absent means "not specified".
pub(crate) fn get_section_param(params: &Value) -> Result<Option<Section>> {
    match get_str_param(params, "section", "section") {
        Some(raw) => raw.parse().map(Some).map_err(|_| ModSyncError::InvalidParams {
            message: format!("Unknown section: {}", raw),
        }),
        None => Ok(None),
    }
}

/// Extract a required section.
pub(crate) fn require_section_param(params: &Value) -> Result<Section> {
    get_section_param(params)?.ok_or_else(|| ModSyncError::InvalidParams {
        message: "Missing required parameter: section".to_string(),
    })
}

/// Deserialize the whole params object into a request type.
pub(crate) fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T> {
    serde_json::from_value(params.clone()).map_err(|e| ModSyncError::InvalidParams {
        message: e.to_string(),
    })
}

// ============================================================================
// HTTP endpoints
// ============================================================================

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Engine events as server-sent events, named after their channel.
pub async fn handle_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.engine.subscribe_events()).filter_map(|item| async move {
        match item {
            Ok(event) => {
                let data = serde_json::to_value(&event)
                    .ok()
                    .and_then(|v| v.get("data").cloned())
                    .unwrap_or(Value::Null);
                Event::default()
                    .event(event.name())
                    .json_data(data)
                    .ok()
                    .map(Ok)
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!("Event subscriber lagged; {} events dropped", skipped);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let method = &request.method;
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id.clone();

    debug!("RPC call: {}({:?})", method, params);

    if method == "healthCheck" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(id, json!({"status": "ok"}))),
        );
    }

    let result = dispatch_method(&state, method, &params).await;

    match result {
        Ok(value) => {
            let wrapped = wrap_response(method, value);
            (StatusCode::OK, Json(JsonRpcResponse::success(id, wrapped)))
        }
        Err(e) => {
            error!("RPC error for {}: {}", method, e);
            let code = e.to_rpc_error_code();
            (
                StatusCode::OK,
                Json(JsonRpcResponse::error(id, code, e.to_string())),
            )
        }
    }
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call to the appropriate domain handler.
async fn dispatch_method(state: &AppState, method: &str, params: &Value) -> Result<Value> {
    match method {
        // Catalog sync
        "syncAllMods" => sync::sync_all_mods(state, params).await,
        "syncSection" => sync::sync_section(state, params).await,
        "wipeModCache" => sync::wipe_mod_cache(state, params).await,
        "getSyncStatus" => sync::get_sync_status(state, params).await,
        "getSyncState" => sync::get_sync_state(state, params).await,
        "needsSync" => sync::needs_sync(state, params).await,
        "isSyncInProgress" => sync::is_sync_in_progress(state, params).await,

        // Local catalog and portal browsing
        "searchLocalMods" => catalog::search_local_mods(state, params).await,
        "getLocalModCount" => catalog::get_local_mod_count(state, params).await,
        "getSectionStats" => catalog::get_section_stats(state, params).await,
        "browseMods" => catalog::browse_mods(state, params).await,
        "getModDetails" => catalog::get_mod_details(state, params).await,
        "listCategories" => catalog::list_categories(state, params).await,
        "listSections" => catalog::list_sections(state, params).await,
        "enrichMods" => catalog::enrich_mods(state, params).await,

        // Download queue
        "downloadMod" => downloads::download_mod(state, params).await,
        "removeFromQueue" => downloads::remove_from_queue(state, params).await,
        "getDownloadQueue" => downloads::get_download_queue(state, params).await,
        "getCurrentDownload" => downloads::get_current_download(state, params).await,

        // Installed mods
        "getInstalledMods" => installed::get_installed_mods(state, params).await,
        "enableMod" => installed::enable_mod(state, params).await,
        "disableMod" => installed::disable_mod(state, params).await,
        "setModPriority" => installed::set_mod_priority(state, params).await,
        "uninstallMod" => installed::uninstall_mod(state, params).await,
        "getLoadOrder" => installed::get_load_order(state, params).await,
        "getConflicts" => installed::get_conflicts(state, params).await,
        "cleanupAddons" => installed::cleanup_addons(state, params).await,

        // Game setup
        "getGameinfoStatus" => installed::get_gameinfo_status(state, params).await,
        "fixGameinfo" => installed::fix_gameinfo(state, params).await,

        // Unknown method
        _ => {
            warn!("Method not found: {}", method);
            Err(ModSyncError::MethodNotFound {
                method: method.to_string(),
            })
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_response_success() {
        let response = JsonRpcResponse::success(Some(json!(1)), json!({"data": "test"}));
        assert!(response.error.is_none());
        assert!(response.result.is_some());
    }

    #[test]
    fn test_json_rpc_response_error() {
        let response = JsonRpcResponse::error(Some(json!(1)), -32600, "Test error".into());
        assert!(response.error.is_some());
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[test]
    fn test_param_helpers_accept_both_casings() {
        let params = json!({"modId": 5, "file_id": "7", "section": "Sound"});
        assert_eq!(get_u64_param(&params, "modId", "mod_id"), Some(5));
        assert_eq!(get_u64_param(&params, "fileId", "file_id"), Some(7));
        assert_eq!(get_section_param(&params).unwrap(), Some(Section::Sound));
        assert!(require_u64_param(&params, "priority", "priority").is_err());
    }

    #[test]
    fn test_unknown_section_is_invalid_params() {
        let err = get_section_param(&json!({"section": "Maps"})).unwrap_err();
        assert_eq!(err.to_rpc_error_code(), -32602);
    }
}
