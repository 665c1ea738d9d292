//! Download queue manager.
//!
//! One download is active at a time. The first request on an idle queue
//! starts a worker task that processes items back to back until the queue
//! runs dry; later requests only append. Each caller gets a ticket resolving
//! to the outcome of its own item, so a failure is observable by whoever
//! queued it even though the worker moves on to the next item.

use crate::catalog::CatalogStore;
use crate::config::NetworkConfig;
use crate::downloads::extract::{extract_archive, is_supported_download};
use crate::downloads::queue::{ActiveDownload, DownloadQueueItem, Placement, QueueState, Queued};
use crate::enrichment;
use crate::error::DownloadFailureKind;
use crate::events::{
    DownloadCompleteEvent, DownloadFailedEvent, DownloadProgressEvent, DownloadRef, EngineEvent,
    EventBus,
};
use crate::installed::{InstallInfo, InstalledMod, InstalledModManager, ModOrigin};
use crate::network::TransferProgress;
use crate::upstream::{ModDetail, ModFile, UpstreamClient};
use crate::{ModSyncError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Result of a finished download.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    pub mod_id: u64,
    pub file_id: u64,
    pub file_name: String,
    pub installed: Vec<InstalledMod>,
}

/// Handle returned by [`DownloadQueueManager::enqueue`].
#[derive(Debug)]
pub struct DownloadTicket {
    placement: Placement,
    receiver: oneshot::Receiver<Result<DownloadOutcome>>,
}

impl DownloadTicket {
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Wait for this item to finish, fail or be cancelled.
    pub async fn wait(self) -> Result<DownloadOutcome> {
        self.receiver
            .await
            .map_err(|_| ModSyncError::Other("download worker stopped".to_string()))?
    }
}

struct PendingDownload {
    item: DownloadQueueItem,
    responder: oneshot::Sender<Result<DownloadOutcome>>,
}

impl Queued for PendingDownload {
    fn item(&self) -> &DownloadQueueItem {
        &self.item
    }
}

struct Inner {
    state: Mutex<QueueState<PendingDownload>>,
    upstream: Arc<dyn UpstreamClient>,
    store: Arc<CatalogStore>,
    installer: Arc<InstalledModManager>,
    events: EventBus,
    staging_dir: PathBuf,
    progress_interval: Duration,
}

/// Serializes downloads through a single active slot.
#[derive(Clone)]
pub struct DownloadQueueManager {
    inner: Arc<Inner>,
}

impl DownloadQueueManager {
    pub fn new(
        upstream: Arc<dyn UpstreamClient>,
        store: Arc<CatalogStore>,
        installer: Arc<InstalledModManager>,
        events: EventBus,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::new()),
                upstream,
                store,
                installer,
                events,
                staging_dir: staging_dir.into(),
                progress_interval: NetworkConfig::DOWNLOAD_PROGRESS_INTERVAL,
            }),
        }
    }

    /// Queue a download, starting it right away when nothing is active.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enqueue(&self, item: DownloadQueueItem) -> Result<DownloadTicket> {
        let (responder, receiver) = oneshot::channel();
        let mod_id = item.mod_id;
        let (placement, started) = self
            .inner
            .lock_state()
            .enqueue(PendingDownload { item, responder })?;

        match placement {
            Placement::Started => info!("Starting download of mod {}", mod_id),
            Placement::Queued(position) => {
                info!("Queued download of mod {} at position {}", mod_id, position)
            }
        }

        if let Some(entry) = started {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.drive(entry).await });
        }

        Ok(DownloadTicket {
            placement,
            receiver,
        })
    }

    /// Remove a queued item. The active download cannot be cancelled;
    /// naming it returns `false` and changes nothing.
    pub fn cancel(&self, mod_id: u64, file_id: Option<u64>) -> bool {
        let mut state = self.inner.lock_state();
        if let Some(removed) = state.cancel(mod_id, file_id) {
            drop(state);
            info!("Removed mod {} from the download queue", mod_id);
            let _ = removed.responder.send(Err(ModSyncError::DownloadCancelled));
            return true;
        }
        if state.is_current(mod_id, file_id) {
            info!("Mod {} is downloading and cannot be cancelled", mod_id);
        }
        false
    }

    /// Waiting items in order, excluding the active one.
    pub fn queue(&self) -> Vec<DownloadQueueItem> {
        self.inner.lock_state().queued()
    }

    pub fn current(&self) -> Option<ActiveDownload> {
        self.inner.lock_state().current().cloned()
    }

    pub fn is_idle(&self) -> bool {
        self.inner.lock_state().is_idle()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState<PendingDownload>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_current(&self, update: impl FnOnce(&mut ActiveDownload)) {
        if let Some(current) = self.lock_state().current_mut() {
            update(current);
        }
    }

    /// Process items until the queue is empty.
    async fn drive(self: Arc<Self>, first: PendingDownload) {
        let mut entry = first;
        loop {
            let PendingDownload { item, responder } = entry;
            let result = match self.process(&item).await {
                Ok(outcome) => Ok(outcome),
                Err(e) => Err(self.report_failure(&item, e)),
            };

            let next = self.lock_state().finish_current();
            if responder.send(result).is_err() {
                debug!("Nobody is waiting on mod {}", item.mod_id);
            }

            match next {
                Some(pending) => {
                    info!("Starting download of mod {}", pending.item.mod_id);
                    entry = pending;
                }
                None => break,
            }
        }
        debug!("Download queue drained");
    }

    fn report_failure(&self, item: &DownloadQueueItem, err: ModSyncError) -> ModSyncError {
        let file_id = self
            .lock_state()
            .current()
            .and_then(|c| c.resolved_file_id)
            .or(item.file_id);
        let kind = DownloadFailureKind::classify(&err);
        let message = match &err {
            ModSyncError::DownloadFailed { message, .. } => message.clone(),
            other => other.to_string(),
        };
        error!("Download of mod {} failed: {}", item.mod_id, message);

        self.events
            .publish(EngineEvent::DownloadFailed(DownloadFailedEvent {
                mod_id: item.mod_id,
                file_id,
                kind,
                error: message.clone(),
            }));

        ModSyncError::DownloadFailed {
            mod_id: item.mod_id,
            file_id,
            kind,
            message,
        }
    }

    async fn process(self: &Arc<Self>, item: &DownloadQueueItem) -> Result<DownloadOutcome> {
        let work_dir = self.staging_dir.join(item.mod_id.to_string());
        clear_dir(&work_dir);

        let result = self.download_and_install(item, &work_dir).await;
        clear_dir(&work_dir);
        result
    }

    async fn download_and_install(
        self: &Arc<Self>,
        item: &DownloadQueueItem,
        work_dir: &Path,
    ) -> Result<DownloadOutcome> {
        let detail = self.upstream.fetch_detail(item.section, item.mod_id).await?;
        if let Err(e) = enrichment::apply_detail(&self.store, &detail) {
            warn!("Failed to record details of mod {}: {}", item.mod_id, e);
        }

        let file = resolve_file(item, &detail)?;
        if !is_supported_download(&file.file_name) {
            return Err(ModSyncError::UnsupportedArchive {
                extension: Path::new(&file.file_name)
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            });
        }
        self.update_current(|current| {
            current.resolved_file_id = Some(file.id);
            current.total = Some(file.file_size).filter(|&size| size > 0);
        });

        std::fs::create_dir_all(work_dir).map_err(|e| ModSyncError::io_with_path(e, work_dir))?;
        let archive_path = work_dir.join(local_file_name(&file));

        let (progress_tx, progress_rx) = mpsc::channel(64);
        let forwarder = tokio::spawn(Arc::clone(self).forward_progress(
            item.mod_id,
            file.id,
            progress_rx,
        ));
        let transfer = self
            .upstream
            .download_file(&file, &archive_path, progress_tx)
            .await;
        if let Err(e) = forwarder.await {
            warn!("Progress forwarder for mod {} stopped: {}", item.mod_id, e);
        }
        let bytes = transfer?;
        debug!("Downloaded {} bytes of {}", bytes, file.file_name);

        self.update_current(|current| current.extracting = true);
        self.events
            .publish(EngineEvent::DownloadExtracting(DownloadRef {
                mod_id: item.mod_id,
                file_id: file.id,
            }));

        let info = InstallInfo {
            name: Some(detail.name.clone()),
            origin: Some(ModOrigin {
                section: item.section,
                mod_id: item.mod_id,
                file_id: file.id,
                category_id: item.category_id.or(detail.category_id),
            }),
            description: detail.description.clone(),
            thumbnail_url: detail.thumbnail_url.clone(),
        };
        let installer = Arc::clone(&self.installer);
        let extract_dir = work_dir.join("extracted");
        let installed = tokio::task::spawn_blocking(move || {
            let files = extract_archive(&archive_path, &extract_dir)?;
            installer.install(&files, &info)
        })
        .await
        .map_err(|e| ModSyncError::Other(format!("install task failed: {}", e)))??;

        let installed_files: Vec<String> = installed.iter().map(|m| m.file_name.clone()).collect();
        info!(
            "Installed mod {} file {} as {}",
            item.mod_id,
            file.id,
            installed_files.join(", ")
        );
        self.events
            .publish(EngineEvent::DownloadComplete(DownloadCompleteEvent {
                mod_id: item.mod_id,
                file_id: file.id,
                file_name: file.file_name.clone(),
                installed_files,
            }));

        Ok(DownloadOutcome {
            mod_id: item.mod_id,
            file_id: file.id,
            file_name: file.file_name,
            installed,
        })
    }

    /// Mirror transfer progress into the active slot and publish it, at most
    /// once per interval. The last update is always published.
    async fn forward_progress(
        self: Arc<Self>,
        mod_id: u64,
        file_id: u64,
        mut rx: mpsc::Receiver<TransferProgress>,
    ) {
        let mut last_emit: Option<Instant> = None;
        let mut unsent: Option<TransferProgress> = None;

        while let Some(progress) = rx.recv().await {
            self.update_current(|current| {
                current.downloaded = progress.downloaded;
                if progress.total.is_some() {
                    current.total = progress.total;
                }
            });

            let due = last_emit.map_or(true, |at| at.elapsed() >= self.progress_interval);
            if due {
                self.publish_progress(mod_id, file_id, progress);
                last_emit = Some(Instant::now());
                unsent = None;
            } else {
                unsent = Some(progress);
            }
        }

        if let Some(progress) = unsent {
            self.publish_progress(mod_id, file_id, progress);
        }
    }

    fn publish_progress(&self, mod_id: u64, file_id: u64, progress: TransferProgress) {
        self.events
            .publish(EngineEvent::DownloadProgress(DownloadProgressEvent {
                mod_id,
                file_id,
                downloaded: progress.downloaded,
                total: progress.total,
            }));
    }
}

/// The pinned file, or the most downloaded one.
fn resolve_file(item: &DownloadQueueItem, detail: &ModDetail) -> Result<ModFile> {
    let file = match item.file_id {
        Some(file_id) => detail.file(file_id),
        None => detail.primary_file(),
    };
    file.cloned().ok_or_else(|| ModSyncError::ModNotFound {
        id: match item.file_id {
            Some(file_id) => format!("{}/file {}", item.mod_id, file_id),
            None => format!("{} (no files)", item.mod_id),
        },
    })
}

/// File name safe to create in the staging directory.
fn local_file_name(file: &ModFile) -> String {
    Path::new(&file.file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("{}.bin", file.id))
}

fn clear_dir(dir: &Path) {
    if !dir.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(dir) {
        warn!("Failed to clean {}: {}", dir.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Section;

    fn create_test_detail(files: &[(u64, &str, u64)]) -> ModDetail {
        ModDetail {
            id: 1,
            section: Section::Mod,
            name: "Test".to_string(),
            description: None,
            category_id: None,
            category_name: None,
            files: files
                .iter()
                .map(|&(id, name, downloads)| ModFile {
                    id,
                    file_name: name.to_string(),
                    file_size: 10,
                    download_url: format!("https://example.invalid/dl/{}", id),
                    download_count: downloads,
                    description: None,
                })
                .collect(),
            nsfw: false,
            download_count: 0,
            thumbnail_url: None,
        }
    }

    #[test]
    fn test_resolve_prefers_pinned_then_most_downloaded() {
        let detail = create_test_detail(&[(10, "a.zip", 5), (11, "b.zip", 50)]);
        let unpinned = DownloadQueueItem::new(1, Section::Mod);
        assert_eq!(resolve_file(&unpinned, &detail).unwrap().id, 11);

        let pinned = DownloadQueueItem::new(1, Section::Mod).with_file(10, "a.zip");
        assert_eq!(resolve_file(&pinned, &detail).unwrap().id, 10);

        let missing = DownloadQueueItem::new(1, Section::Mod).with_file(99, "x.zip");
        assert!(matches!(
            resolve_file(&missing, &detail),
            Err(ModSyncError::ModNotFound { .. })
        ));
    }

    #[test]
    fn test_local_file_name_strips_directories() {
        let detail = create_test_detail(&[(10, "../../evil.zip", 1), (11, "", 1)]);
        assert_eq!(local_file_name(&detail.files[0]), "evil.zip");
        assert_eq!(local_file_name(&detail.files[1]), "11.bin");
    }
}
