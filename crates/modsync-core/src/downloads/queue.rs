//! Download queue state machine.
//!
//! Pure bookkeeping: a FIFO of waiting items plus one current slot. The
//! manager drives transitions; nothing here performs I/O.

use crate::catalog::Section;
use crate::{ModSyncError, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A requested download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadQueueItem {
    pub mod_id: u64,
    /// Pinned file; `None` lets the manager pick the primary file.
    pub file_id: Option<u64>,
    pub file_name: Option<String>,
    pub section: Section,
    pub category_id: Option<u64>,
    /// Unix milliseconds.
    pub enqueued_at: i64,
}

impl DownloadQueueItem {
    pub fn new(mod_id: u64, section: Section) -> Self {
        Self {
            mod_id,
            file_id: None,
            file_name: None,
            section,
            category_id: None,
            enqueued_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_file(mut self, file_id: u64, file_name: impl Into<String>) -> Self {
        self.file_id = Some(file_id);
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_category(mut self, category_id: Option<u64>) -> Self {
        self.category_id = category_id;
        self
    }

    /// Whether this item is the one identified by `mod_id` and, when given,
    /// `file_id`.
    pub fn matches(&self, mod_id: u64, file_id: Option<u64>) -> bool {
        self.mod_id == mod_id && file_id.map_or(true, |f| self.file_id == Some(f))
    }
}

/// The item in the single active slot, with live progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveDownload {
    #[serde(flatten)]
    pub item: DownloadQueueItem,
    /// File actually being fetched, once resolved.
    pub resolved_file_id: Option<u64>,
    pub downloaded: u64,
    pub total: Option<u64>,
    pub extracting: bool,
}

impl ActiveDownload {
    fn new(item: DownloadQueueItem) -> Self {
        Self {
            resolved_file_id: item.file_id,
            item,
            downloaded: 0,
            total: None,
            extracting: false,
        }
    }
}

/// What `enqueue` did with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Placement {
    /// The slot was free; the item is now current.
    Started,
    /// Appended at this 0-based queue position.
    Queued(usize),
}

/// FIFO queue plus the current slot.
#[derive(Debug)]
pub struct QueueState<T = DownloadQueueItem> {
    queue: VecDeque<T>,
    current: Option<ActiveDownload>,
}

/// Anything that wraps a queue item.
pub trait Queued {
    fn item(&self) -> &DownloadQueueItem;
}

impl Queued for DownloadQueueItem {
    fn item(&self) -> &DownloadQueueItem {
        self
    }
}

impl<T: Queued> QueueState<T> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            current: None,
        }
    }

    /// Promote immediately when idle, otherwise append.
    ///
    /// Returns the entry back when it was promoted so the caller can start
    /// it. A request for a mod/file already current or queued is rejected.
    pub fn enqueue(&mut self, entry: T) -> Result<(Placement, Option<T>)> {
        let item = entry.item();
        let pinned = item.file_id;
        let duplicate = self
            .current
            .as_ref()
            .is_some_and(|c| c.item.mod_id == item.mod_id && c.item.file_id == pinned)
            || self
                .queue
                .iter()
                .any(|q| q.item().mod_id == item.mod_id && q.item().file_id == pinned);
        if duplicate {
            return Err(ModSyncError::Validation {
                field: "modId".to_string(),
                message: format!("mod {} is already queued", item.mod_id),
            });
        }

        if self.current.is_none() {
            self.current = Some(ActiveDownload::new(entry.item().clone()));
            return Ok((Placement::Started, Some(entry)));
        }

        self.queue.push_back(entry);
        Ok((Placement::Queued(self.queue.len() - 1), None))
    }

    /// Remove the first queued match.
    ///
    /// The current download is never removed: cancelling it is an explicit
    /// no-op that returns `None`.
    pub fn cancel(&mut self, mod_id: u64, file_id: Option<u64>) -> Option<T> {
        let position = self
            .queue
            .iter()
            .position(|q| q.item().matches(mod_id, file_id))?;
        self.queue.remove(position)
    }

    /// Whether `(mod_id, file_id)` names the current download.
    pub fn is_current(&self, mod_id: u64, file_id: Option<u64>) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| c.item.matches(mod_id, file_id))
    }

    /// Clear the current slot and promote the next queued entry, if any.
    pub fn finish_current(&mut self) -> Option<T> {
        self.current = None;
        let next = self.queue.pop_front()?;
        self.current = Some(ActiveDownload::new(next.item().clone()));
        Some(next)
    }

    pub fn current(&self) -> Option<&ActiveDownload> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut ActiveDownload> {
        self.current.as_mut()
    }

    /// Queued items in order, excluding the current one.
    pub fn queued(&self) -> Vec<DownloadQueueItem> {
        self.queue.iter().map(|q| q.item().clone()).collect()
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }
}
