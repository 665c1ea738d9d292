//! Engine event fan-out.
//!
//! Sync progress and download lifecycle transitions are published on a
//! broadcast channel. For a given download, events arrive in the order
//! progress, extracting, then exactly one of complete or failed.

use crate::config::EventConfig;
use crate::error::DownloadFailureKind;
use crate::sync::SyncProgress;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Byte progress of the active download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgressEvent {
    pub mod_id: u64,
    pub file_id: u64,
    pub downloaded: u64,
    pub total: Option<u64>,
}

/// Identifies the download an event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRef {
    pub mod_id: u64,
    pub file_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadCompleteEvent {
    pub mod_id: u64,
    pub file_id: u64,
    pub file_name: String,
    /// File names placed into the addon directory.
    pub installed_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFailedEvent {
    pub mod_id: u64,
    /// `None` when the failure happened before a file was resolved.
    pub file_id: Option<u64>,
    pub kind: DownloadFailureKind,
    pub error: String,
}

/// Everything the engine publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum EngineEvent {
    SyncProgress(SyncProgress),
    DownloadProgress(DownloadProgressEvent),
    DownloadExtracting(DownloadRef),
    DownloadComplete(DownloadCompleteEvent),
    DownloadFailed(DownloadFailedEvent),
}

impl EngineEvent {
    /// Channel name, as used by SSE consumers.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::SyncProgress(_) => "syncProgress",
            EngineEvent::DownloadProgress(_) => "downloadProgress",
            EngineEvent::DownloadExtracting(_) => "downloadExtracting",
            EngineEvent::DownloadComplete(_) => "downloadComplete",
            EngineEvent::DownloadFailed(_) => "downloadFailed",
        }
    }
}

/// Cloneable publisher handle.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EventConfig::CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; dropped silently when nobody listens.
    pub fn publish(&self, event: EngineEvent) {
        if self.sender.receiver_count() > 0 {
            trace!(event = event.name(), "Publishing engine event");
            let _ = self.sender.send(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
