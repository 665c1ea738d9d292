//! Engine state shared by every `ModSync` clone.

use crate::catalog::CatalogStore;
use crate::downloads::DownloadQueueManager;
use crate::enrichment::EnrichmentQueue;
use crate::events::EventBus;
use crate::installed::InstalledModManager;
use crate::sync::Synchronizer;
use crate::upstream::UpstreamClient;
use crate::{ModSyncError, Result};
use std::sync::Arc;

/// All subsystems owned by an engine instance.
///
/// Installed-mod management and downloads need a game install; without one
/// they are absent and their operations fail with a configuration error.
pub(crate) struct EngineState {
    pub(crate) store: Arc<CatalogStore>,
    pub(crate) upstream: Arc<dyn UpstreamClient>,
    pub(crate) synchronizer: Arc<Synchronizer>,
    pub(crate) enrichment: EnrichmentQueue,
    pub(crate) events: EventBus,
    pub(crate) installed: Option<Arc<InstalledModManager>>,
    pub(crate) downloads: Option<DownloadQueueManager>,
}

fn no_game() -> ModSyncError {
    ModSyncError::Config {
        message: "no game install configured".to_string(),
    }
}

impl EngineState {
    pub(crate) fn installed(&self) -> Result<&InstalledModManager> {
        self.installed.as_deref().ok_or_else(no_game)
    }

    pub(crate) fn downloads(&self) -> Result<&DownloadQueueManager> {
        self.downloads.as_ref().ok_or_else(no_game)
    }
}
