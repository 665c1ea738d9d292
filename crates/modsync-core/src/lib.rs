//! ModSync Core - headless engine for a game mod manager.
//!
//! Keeps a local, queryable catalog of the GameBanana content portal in sync,
//! serializes mod downloads through a single active slot, installs the
//! downloaded `.vpk` payloads into the game's addon tree and reports
//! conflicts between installed mods. It can be used programmatically without
//! any HTTP/RPC layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use modsync_core::{ModSync, Section};
//!
//! #[tokio::main]
//! async fn main() -> modsync_core::Result<()> {
//!     let engine = ModSync::builder("/path/to/data")
//!         .auto_create_dirs(true)
//!         .detect_game(true)
//!         .build()
//!         .await?;
//!
//!     if engine.needs_sync()? {
//!         engine.sync_all_mods().await;
//!     }
//!
//!     let found = engine.search_local_mods(modsync_core::CatalogQuery {
//!         text: Some("haze".into()),
//!         ..modsync_core::CatalogQuery::section(Section::Mod)
//!     })?;
//!     println!("{} matches", found.total_count);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod conflicts;
pub mod downloads;
pub mod enrichment;
pub mod error;
pub mod events;
pub mod game;
pub mod installed;
pub mod network;
pub mod sync;
pub mod upstream;

mod api;

pub use api::{BrowseRequest, BrowseResult, BrowseSource, DownloadRequest, ModSyncBuilder};
pub use catalog::{
    CatalogQuery, CatalogRecord, CatalogStore, CategorySummary, QueryResult, Section,
    SectionCount, SortKey,
};
pub use conflicts::{ConflictKind, ConflictPair};
pub use downloads::{ActiveDownload, DownloadOutcome, DownloadQueueItem, DownloadTicket, Placement};
pub use enrichment::EnrichmentQueue;
pub use error::{DownloadFailureKind, ModSyncError, Result};
pub use events::{EngineEvent, EventBus};
pub use game::GameinfoStatus;
pub use installed::{CleanupReport, InstalledMod, ModOrigin};
pub use sync::{SectionSyncStatus, SyncOutcome, SyncPhase, SyncProgress, SyncState};
pub use upstream::{
    BrowseFilters, BrowsePage, CategoryNode, CategoryTree, GameBananaClient, ModDetail, ModFile,
    PortalSection, UpstreamClient,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use api::EngineState;

/// Main entry point of the engine.
///
/// Cheap to clone; every clone shares the same catalog, queue and event bus.
#[derive(Clone)]
pub struct ModSync {
    /// Directory holding the catalog database, metadata and staging area.
    data_dir: PathBuf,
    inner: Arc<EngineState>,
}

impl ModSync {
    /// Create a builder rooted at `data_dir`.
    ///
    /// ```rust,ignore
    /// let engine = ModSync::builder("./data")
    ///     .game_path("/games/Deadlock")
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder(data_dir: impl Into<PathBuf>) -> ModSyncBuilder {
        ModSyncBuilder::new(data_dir)
    }

    /// Create an engine with default settings, detecting the game install.
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::builder(data_dir)
            .auto_create_dirs(true)
            .detect_game(true)
            .build()
            .await
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Game install in use, if one is configured.
    pub fn game_path(&self) -> Option<&Path> {
        self.inner.installed.as_ref().map(|m| m.game_path())
    }

    /// Subscribe to sync and download events.
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }
}
