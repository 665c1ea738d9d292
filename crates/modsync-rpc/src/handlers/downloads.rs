//! Download queue handlers.

use crate::handlers::{get_u64_param, parse_params, require_u64_param};
use crate::server::AppState;
use modsync_core::{DownloadRequest, ModSyncError, Result};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Queue a download and answer with its placement. The outcome is reported
/// through the download events.
pub async fn download_mod(state: &AppState, params: &Value) -> Result<Value> {
    let request: DownloadRequest = parse_params(params)?;
    let mod_id = request.mod_id;
    let ticket = state.engine.download_mod(request)?;
    let placement = ticket.placement();

    tokio::spawn(async move {
        match ticket.wait().await {
            Ok(outcome) => debug!(
                "Download of mod {} finished with {} file(s)",
                mod_id,
                outcome.installed.len()
            ),
            Err(ModSyncError::DownloadCancelled) => info!("Download of mod {} was removed", mod_id),
            // already published as a downloadFailed event
            Err(e) => debug!("Download of mod {} ended with: {}", mod_id, e),
        }
    });

    Ok(json!({"placement": placement}))
}

pub async fn remove_from_queue(state: &AppState, params: &Value) -> Result<Value> {
    let mod_id = require_u64_param(params, "modId", "mod_id")?;
    let file_id = get_u64_param(params, "fileId", "file_id");
    Ok(Value::Bool(state.engine.remove_from_queue(mod_id, file_id)?))
}

pub async fn get_download_queue(state: &AppState, _params: &Value) -> Result<Value> {
    Ok(serde_json::to_value(state.engine.download_queue()?)?)
}

pub async fn get_current_download(state: &AppState, _params: &Value) -> Result<Value> {
    Ok(serde_json::to_value(state.engine.current_download()?)?)
}
