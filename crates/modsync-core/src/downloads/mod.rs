//! Download queue, archive extraction and the worker that ties them to the
//! installed-mod manager.

pub mod extract;
pub mod manager;
pub mod queue;

pub use extract::{extract_archive, is_supported_download, ExtractedFile};
pub use manager::{DownloadOutcome, DownloadQueueManager, DownloadTicket};
pub use queue::{ActiveDownload, DownloadQueueItem, Placement, QueueState, Queued};
