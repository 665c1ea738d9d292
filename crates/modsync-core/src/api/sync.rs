//! Catalog synchronization.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::catalog::Section;
use crate::error::Result;
use crate::sync::{SectionSyncStatus, SyncOutcome, SyncState};
use crate::ModSync;

impl ModSync {
    /// Sync every section in order. A call made while a full sync is
    /// running returns [`SyncOutcome::AlreadyRunning`] at once.
    pub async fn sync_all_mods(&self) -> SyncOutcome {
        self.inner.synchronizer.sync_all().await
    }

    pub async fn sync_section(&self, section: Section) -> SyncOutcome {
        self.inner.synchronizer.sync_section(section).await
    }

    /// Run a full sync on a background task.
    pub fn spawn_full_sync(&self) -> JoinHandle<SyncOutcome> {
        let synchronizer = Arc::clone(&self.inner.synchronizer);
        info!("Starting background catalog sync");
        tokio::spawn(async move { synchronizer.sync_all().await })
    }

    /// Delete the whole catalog. Rejected while a sync runs.
    pub fn wipe_mod_cache(&self) -> Result<()> {
        self.inner.synchronizer.wipe()
    }

    pub fn sync_status(&self) -> Result<BTreeMap<Section, Option<SectionSyncStatus>>> {
        self.inner.synchronizer.sync_status()
    }

    pub fn sync_state(&self, section: Section) -> SyncState {
        self.inner.synchronizer.state(section)
    }

    pub fn needs_sync(&self) -> Result<bool> {
        self.inner.synchronizer.needs_sync()
    }

    pub fn is_sync_in_progress(&self) -> bool {
        self.inner.synchronizer.is_sync_in_progress()
    }
}
