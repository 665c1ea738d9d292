//! Builder for configuring ModSync initialization.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::api::state::EngineState;
use crate::catalog::CatalogStore;
use crate::config::{PathsConfig, SyncOptions};
use crate::downloads::DownloadQueueManager;
use crate::enrichment::EnrichmentQueue;
use crate::error::{ModSyncError, Result};
use crate::events::EventBus;
use crate::game;
use crate::installed::InstalledModManager;
use crate::network::RetryConfig;
use crate::sync::Synchronizer;
use crate::upstream::{GameBananaClient, UpstreamClient};
use crate::ModSync;

/// Builder for configuring ModSync initialization.
///
/// # Example
///
/// ```rust,ignore
/// use modsync_core::ModSync;
///
/// let engine = ModSync::builder("./data")
///     .auto_create_dirs(true)
///     .game_path("/games/Deadlock")
///     .build()
///     .await?;
/// ```
pub struct ModSyncBuilder {
    data_dir: PathBuf,
    game_path: Option<PathBuf>,
    detect_game: bool,
    auto_create_dirs: bool,
    upstream: Option<Arc<dyn UpstreamClient>>,
    sync_options: SyncOptions,
    retry: Option<RetryConfig>,
}

impl ModSyncBuilder {
    /// Create a new builder with the data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            game_path: None,
            detect_game: false,
            auto_create_dirs: false,
            upstream: None,
            sync_options: SyncOptions::default(),
            retry: None,
        }
    }

    /// Auto-create the data directory and its staging area.
    ///
    /// Default: `false` (the data directory must exist)
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    /// Use this game install. Takes precedence over detection.
    pub fn game_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.game_path = Some(path.into());
        self
    }

    /// Look for the game under the usual Steam libraries when no path is set.
    ///
    /// Default: `false`
    pub fn detect_game(mut self, enable: bool) -> Self {
        self.detect_game = enable;
        self
    }

    /// Replace the GameBanana client, e.g. with a scripted one in tests.
    pub fn upstream(mut self, upstream: Arc<dyn UpstreamClient>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn sync_options(mut self, options: SyncOptions) -> Self {
        self.sync_options = options;
        self
    }

    /// Retry policy of the default GameBanana client.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    fn create_directory_structure(data_dir: &Path) -> Result<()> {
        for dir in [data_dir.to_path_buf(), data_dir.join(PathsConfig::STAGING_DIR_NAME)] {
            fs::create_dir_all(&dir).map_err(|e| ModSyncError::Io {
                message: format!("Failed to create directory: {}", dir.display()),
                path: Some(dir.clone()),
                source: Some(e),
            })?;
        }
        Ok(())
    }

    fn resolve_game_path(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.game_path {
            game::validate_game_path(path)?;
            return Ok(Some(path.clone()));
        }
        if self.detect_game {
            let detected = game::detect_game_path();
            if detected.is_none() {
                warn!("No game install found; installed-mod features are disabled");
            }
            return Ok(detected);
        }
        Ok(None)
    }

    /// Build the ModSync instance.
    pub async fn build(self) -> Result<ModSync> {
        if self.auto_create_dirs {
            Self::create_directory_structure(&self.data_dir)?;
        } else if !self.data_dir.exists() {
            return Err(ModSyncError::Config {
                message: format!("Data directory does not exist: {}", self.data_dir.display()),
            });
        }

        let game_path = self.resolve_game_path()?;

        let upstream: Arc<dyn UpstreamClient> = match &self.upstream {
            Some(upstream) => Arc::clone(upstream),
            None => {
                let client = GameBananaClient::new()?;
                let client = match &self.retry {
                    Some(retry) => client.with_retry(retry.clone()),
                    None => client,
                };
                Arc::new(client)
            }
        };

        let store = Arc::new(CatalogStore::new(
            self.data_dir.join(PathsConfig::CATALOG_DB_NAME),
        )?);
        let events = EventBus::new();
        let synchronizer = Arc::new(Synchronizer::new(
            Arc::clone(&upstream),
            Arc::clone(&store),
            events.clone(),
            self.sync_options.clone(),
        )?);
        let enrichment = EnrichmentQueue::new(Arc::clone(&upstream), Arc::clone(&store));

        let installed = game_path.map(|path| {
            info!("Managing mods of {}", path.display());
            Arc::new(InstalledModManager::new(
                path,
                self.data_dir.join(PathsConfig::METADATA_FILE_NAME),
            ))
        });
        let downloads = installed.as_ref().map(|installer| {
            DownloadQueueManager::new(
                Arc::clone(&upstream),
                Arc::clone(&store),
                Arc::clone(installer),
                events.clone(),
                self.data_dir.join(PathsConfig::STAGING_DIR_NAME),
            )
        });

        Ok(ModSync {
            data_dir: self.data_dir,
            inner: Arc::new(EngineState {
                store,
                upstream,
                synchronizer,
                enrichment,
                events,
                installed,
                downloads,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_data_dir_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let result = ModSyncBuilder::new(temp_dir.path().join("absent")).build().await;
        assert!(matches!(result, Err(ModSyncError::Config { .. })));
    }

    #[tokio::test]
    async fn test_invalid_game_path_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let result = ModSyncBuilder::new(temp_dir.path())
            .game_path(temp_dir.path().join("not-a-game"))
            .build()
            .await;
        assert!(matches!(result, Err(ModSyncError::Config { .. })));
    }

    #[tokio::test]
    async fn test_build_without_game_disables_installs() {
        let temp_dir = TempDir::new().unwrap();
        let engine = ModSyncBuilder::new(temp_dir.path().join("data"))
            .auto_create_dirs(true)
            .build()
            .await
            .unwrap();
        assert!(engine.game_path().is_none());
        assert!(temp_dir.path().join("data/downloads").is_dir());
        assert!(engine.installed_mods().is_err());
    }
}
