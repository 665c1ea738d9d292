//! Background enrichment of cached records from detail lookups.
//!
//! List pages leave the NSFW flag and download count unknown or approximate.
//! Detail lookups are authoritative but slow, so they run here with bounded
//! concurrency, off the sync and browse paths. A request for an item that is
//! already in flight is coalesced into the running one.

use crate::catalog::{CatalogStore, Section};
use crate::config::EnrichmentConfig;
use crate::upstream::{ModDetail, UpstreamClient};
use crate::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, warn};

struct Inner {
    upstream: Arc<dyn UpstreamClient>,
    store: Arc<CatalogStore>,
    permits: Semaphore,
    in_flight: Mutex<HashSet<(Section, u64)>>,
    drained: Notify,
}

/// Cloneable handle to the enrichment workers.
#[derive(Clone)]
pub struct EnrichmentQueue {
    inner: Arc<Inner>,
}

impl EnrichmentQueue {
    pub fn new(upstream: Arc<dyn UpstreamClient>, store: Arc<CatalogStore>) -> Self {
        Self::with_concurrency(upstream, store, EnrichmentConfig::MAX_CONCURRENT)
    }

    pub fn with_concurrency(
        upstream: Arc<dyn UpstreamClient>,
        store: Arc<CatalogStore>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                upstream,
                store,
                permits: Semaphore::new(max_concurrent.max(1)),
                in_flight: Mutex::new(HashSet::new()),
                drained: Notify::new(),
            }),
        }
    }

    /// Queue detail lookups for `ids`. Returns how many were newly scheduled.
    pub fn request(&self, section: Section, ids: &[u64]) -> usize {
        let mut scheduled = 0;
        for &id in ids {
            let fresh = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert((section, id));
            if !fresh {
                debug!("Enrichment of {}/{} already pending", section, id);
                continue;
            }

            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.run(section, id).await;
            });
            scheduled += 1;
        }
        scheduled
    }

    /// Number of lookups queued or running.
    pub fn pending(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Wait until no lookup is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let drained = self.inner.drained.notified();
            if self.pending() == 0 {
                return;
            }
            drained.await;
        }
    }
}

impl Inner {
    async fn run(&self, section: Section, id: u64) {
        match self.permits.acquire().await {
            Ok(_permit) => {
                if let Err(e) = self.enrich(section, id).await {
                    warn!("Enrichment of {}/{} failed: {}", section, id, e);
                }
            }
            Err(_) => warn!("Enrichment queue closed before {}/{} ran", section, id),
        }

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.remove(&(section, id));
        if in_flight.is_empty() {
            self.drained.notify_waiters();
        }
    }

    async fn enrich(&self, section: Section, id: u64) -> Result<()> {
        let detail = self.upstream.fetch_detail(section, id).await?;
        apply_detail(&self.store, &detail)?;
        Ok(())
    }
}

/// Persist the authoritative fields of a detail view onto its cached row.
pub fn apply_detail(store: &CatalogStore, detail: &ModDetail) -> Result<bool> {
    store.apply_enrichment(
        detail.section,
        detail.id,
        Some(detail.nsfw),
        Some(detail.download_count),
    )
}
