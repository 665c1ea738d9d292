//! Download queue operations.

use serde::Deserialize;

use crate::catalog::Section;
use crate::downloads::{ActiveDownload, DownloadQueueItem, DownloadTicket};
use crate::error::Result;
use crate::ModSync;

/// A download request from the UI.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub mod_id: u64,
    /// Pinned file; the most downloaded file is used when absent.
    #[serde(default)]
    pub file_id: Option<u64>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub section: Option<Section>,
    #[serde(default)]
    pub category_id: Option<u64>,
}

impl From<DownloadRequest> for DownloadQueueItem {
    fn from(request: DownloadRequest) -> Self {
        let mut item = DownloadQueueItem::new(request.mod_id, request.section.unwrap_or(Section::Mod))
            .with_category(request.category_id);
        item.file_id = request.file_id;
        item.file_name = request.file_name;
        item
    }
}

impl ModSync {
    /// Queue a download. The returned ticket resolves when this particular
    /// item completes, fails or is removed from the queue.
    pub fn download_mod(&self, request: DownloadRequest) -> Result<DownloadTicket> {
        self.inner.downloads()?.enqueue(request.into())
    }

    /// Remove a waiting download. Returns `false` for the active download,
    /// which cannot be cancelled, and for unknown items.
    pub fn remove_from_queue(&self, mod_id: u64, file_id: Option<u64>) -> Result<bool> {
        Ok(self.inner.downloads()?.cancel(mod_id, file_id))
    }

    pub fn download_queue(&self) -> Result<Vec<DownloadQueueItem>> {
        Ok(self.inner.downloads()?.queue())
    }

    pub fn current_download(&self) -> Result<Option<ActiveDownload>> {
        Ok(self.inner.downloads()?.current())
    }
}
