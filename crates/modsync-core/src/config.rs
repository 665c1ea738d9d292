//! Centralized configuration for the mod sync engine.
//!
//! Compile-time defaults live here as associated constants. Values that callers
//! may tune at runtime (page size, retry policy, freshness) are carried by
//! option structs whose `Default` impls read these constants.

use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const MAX_RETRIES: u32 = 4;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(750);
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);
    /// Backoff multiplier applied when the upstream answers 429.
    pub const RATE_LIMIT_BACKOFF_FACTOR: f64 = 4.0;
    /// Steady-state request pacing towards the content portal.
    pub const REQUESTS_PER_SECOND: u32 = 1;
    pub const REQUEST_BURST: u32 = 3;
    pub const DOWNLOAD_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
    pub const DOWNLOAD_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const DOWNLOAD_MAX_RETRIES: u32 = 3;
}

/// Content portal endpoints and identity.
pub struct UpstreamConfig;

impl UpstreamConfig {
    pub const API_BASE: &'static str = "https://gamebanana.com/apiv11";
    pub const SITE_BASE: &'static str = "https://gamebanana.com";
    pub const GAME_ID: u64 = 20948;
    pub const USER_AGENT: &'static str = "ModSync/0.3";
    /// Requested page size for full syncs; the portal may force its own.
    pub const BROWSE_PAGE_SIZE: u32 = 50;
    pub const LIST_PROPERTIES: &'static str = "_idRow,_sName,_sProfileUrl,_tsDateAdded,_tsDateModified,_nLikeCount,_nViewCount,_bHasFiles,_sInitialVisibility,_bHasContentRatings,_aSubmitter,_aPreviewMedia,_aRootCategory,_sModelName";
    pub const DETAIL_CACHE_TTL: Duration = Duration::from_secs(300);
    pub const DETAIL_CACHE_CAPACITY: u64 = 256;
}

/// Catalog synchronization limits.
pub struct SyncConfig;

impl SyncConfig {
    /// Hard ceiling on pages fetched per section in one run.
    pub const MAX_PAGES: u32 = 400;
    /// A section synced longer ago than this is considered stale.
    pub const FRESHNESS_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);
}

/// Background enrichment of catalog rows from detail lookups.
pub struct EnrichmentConfig;

impl EnrichmentConfig {
    pub const MAX_CONCURRENT: usize = 2;
}

/// Engine event fan-out.
pub struct EventConfig;

impl EventConfig {
    /// Events buffered per subscriber before slow subscribers start lagging.
    pub const CHANNEL_CAPACITY: usize = 512;
}

/// Installed-mod conventions of the game's addon tree.
pub struct InstallConfig;

impl InstallConfig {
    /// Priority assumed for addon files without a `pakNN_` prefix.
    pub const DEFAULT_PRIORITY: u32 = 50;
    pub const MIN_PAK_SLOT: u32 = 1;
    pub const MAX_PAK_SLOT: u32 = 99;
}

/// Directory and file names.
pub struct PathsConfig;

impl PathsConfig {
    pub const CATALOG_DB_NAME: &'static str = "catalog.sqlite";
    pub const METADATA_FILE_NAME: &'static str = "mod_metadata.json";
    pub const STAGING_DIR_NAME: &'static str = "downloads";
    pub const DATA_DIR_NAME: &'static str = "modsync";
    pub const ADDONS_REL_PATH: &'static str = "game/citadel/addons";
    pub const DISABLED_REL_PATH: &'static str = "game/citadel/addons/.disabled";
    pub const GAMEINFO_REL_PATH: &'static str = "game/citadel/gameinfo.gi";
}

/// Runtime options for the catalog synchronizer.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub page_size: u32,
    pub max_pages: u32,
    pub freshness: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: UpstreamConfig::BROWSE_PAGE_SIZE,
            max_pages: SyncConfig::MAX_PAGES,
            freshness: SyncConfig::FRESHNESS_THRESHOLD,
        }
    }
}

impl SyncOptions {
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }
}
