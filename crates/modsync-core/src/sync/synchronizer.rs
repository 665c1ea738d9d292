//! Catalog synchronizer.
//!
//! Walks every page of a section through the upstream client and upserts each
//! page as soon as it arrives, so readers see a growing catalog and a failure
//! halfway through keeps everything fetched so far. Runs are single-flight:
//! one run per section, and a full sync excludes every other run.

use crate::catalog::{CatalogStore, Section};
use crate::config::SyncOptions;
use crate::events::{EngineEvent, EventBus};
use crate::sync::state::{SectionSyncStatus, SyncOutcome, SyncPhase, SyncProgress, SyncState};
use crate::upstream::{BrowseFilters, UpstreamClient};
use crate::{ModSyncError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Clears the full-sync flag when a run ends, however it ends.
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives upstream pagination into the catalog store.
pub struct Synchronizer {
    upstream: Arc<dyn UpstreamClient>,
    store: Arc<CatalogStore>,
    events: EventBus,
    options: SyncOptions,
    full_sync: AtomicBool,
    section_locks: HashMap<Section, Mutex<()>>,
    states: RwLock<HashMap<Section, SyncState>>,
}

impl Synchronizer {
    /// Create a synchronizer, restoring persisted per-section state.
    pub fn new(
        upstream: Arc<dyn UpstreamClient>,
        store: Arc<CatalogStore>,
        events: EventBus,
        options: SyncOptions,
    ) -> Result<Self> {
        let mut states = HashMap::new();
        for section in Section::ALL {
            let mut state = store
                .load_sync_state(section)?
                .unwrap_or_else(|| SyncState::new(section));
            if state.phase == SyncPhase::Fetching {
                // A run that was fetching when the process died will never finish.
                warn!("Previous {} sync was interrupted", section);
                state.phase = SyncPhase::Idle;
            }
            states.insert(section, state);
        }

        Ok(Self {
            upstream,
            store,
            events,
            options,
            full_sync: AtomicBool::new(false),
            section_locks: Section::ALL.iter().map(|&s| (s, Mutex::new(()))).collect(),
            states: RwLock::new(states),
        })
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Sync every section in order.
    ///
    /// Returns [`SyncOutcome::AlreadyRunning`] without touching anything when
    /// another full sync is in flight.
    pub async fn sync_all(&self) -> SyncOutcome {
        if self
            .full_sync
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Full sync requested while one is running; ignoring");
            return SyncOutcome::AlreadyRunning;
        }
        let _guard = FlagGuard(&self.full_sync);

        info!("Starting full catalog sync");
        let mut sections = Vec::with_capacity(Section::ALL.len());
        for section in Section::ALL {
            match self.run_section(section, false).await {
                Some(state) => sections.push(state),
                None => {
                    warn!("Skipping {} during full sync: already syncing", section);
                    sections.push(self.state(section));
                }
            }
        }
        info!("Full catalog sync finished");

        SyncOutcome::Finished { sections }
    }

    /// Sync one section. Rejected while a full sync or another run of the
    /// same section is in flight.
    pub async fn sync_section(&self, section: Section) -> SyncOutcome {
        if self.full_sync.load(Ordering::Acquire) {
            info!("{} sync requested during full sync; ignoring", section);
            return SyncOutcome::AlreadyRunning;
        }
        match self.run_section(section, true).await {
            Some(state) => SyncOutcome::Finished {
                sections: vec![state],
            },
            None => SyncOutcome::AlreadyRunning,
        }
    }

    /// Run one section under its lock. `None` when the lock is taken, or when
    /// `yield_to_full` is set and a full sync began before the lock was held.
    async fn run_section(&self, section: Section, yield_to_full: bool) -> Option<SyncState> {
        let lock = self.section_locks.get(&section)?;
        let Ok(_running) = lock.try_lock() else {
            return None;
        };
        if yield_to_full && self.full_sync.load(Ordering::Acquire) {
            info!("{} sync lost the race to a full sync; ignoring", section);
            return None;
        }

        let mut state = self.state(section);
        state.phase = SyncPhase::Fetching;
        state.current_page = 0;
        state.total_pages = 0;
        state.error = None;
        self.transition(&state, 0);
        info!("Syncing {}", section);

        let page_size = self.options.page_size;
        let max_pages = self.options.max_pages;
        let filters = BrowseFilters::default();
        let mut seen: HashSet<u64> = HashSet::new();
        let mut page: u32 = 1;

        loop {
            if page > max_pages {
                warn!(
                    "{} sync hit the {} page ceiling; stopping",
                    section, max_pages
                );
                break;
            }

            let browse = match self.upstream.browse(section, page, page_size, &filters).await {
                Ok(browse) => browse,
                Err(e) => {
                    error!("{} sync failed on page {}: {}", section, page, e);
                    return Some(self.fail(state, seen.len(), e));
                }
            };

            let raw_count = browse.raw_count;
            let returned = browse.records.len();
            let fresh: Vec<_> = browse
                .records
                .into_iter()
                .filter(|r| seen.insert(r.id))
                .collect();
            if fresh.len() < returned {
                debug!(
                    "{} page {} repeated {} already-seen records",
                    section,
                    page,
                    returned - fresh.len()
                );
            }

            if let Err(e) = self.store.upsert(&fresh) {
                let err = ModSyncError::CacheWriteFailed {
                    section: section.to_string(),
                    message: e.to_string(),
                };
                error!("{}", err);
                return Some(self.fail(state, seen.len(), err));
            }

            let expected_pages = pages_for(browse.total_count, browse.per_page);
            let total_pages = expected_pages.max(page);
            state.total_count = browse.total_count;
            state.current_page = page;
            state.total_pages = total_pages;
            self.transition(&state, seen.len());

            debug!(
                "{} page {}/{}: {} new, {} total",
                section,
                page,
                total_pages,
                fresh.len(),
                seen.len()
            );

            // A page can hold only other sections' rows; that is not the end.
            if browse.is_complete || raw_count == 0 || page >= expected_pages {
                break;
            }
            page += 1;
        }

        state.phase = SyncPhase::Complete;
        state.last_sync = Some(chrono::Utc::now().timestamp());
        self.transition(&state, seen.len());
        info!(
            "{} sync complete: {} records over {} pages",
            section,
            seen.len(),
            state.current_page
        );

        Some(state)
    }

    fn fail(&self, mut state: SyncState, processed: usize, err: ModSyncError) -> SyncState {
        state.phase = SyncPhase::Error;
        state.error = Some(err.to_string());
        self.transition(&state, processed);
        state
    }

    /// Record a state change: live map, persisted row, progress event.
    fn transition(&self, state: &SyncState, processed: usize) {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state.section, state.clone());

        if let Err(e) = self.store.save_sync_state(state) {
            warn!("Failed to persist {} sync state: {}", state.section, e);
        }

        self.events.publish(EngineEvent::SyncProgress(SyncProgress {
            section: state.section,
            current_page: state.current_page,
            total_pages: state.total_pages,
            mods_processed: processed,
            total_mods: state.total_count,
            phase: state.phase,
            error: state.error.clone(),
        }));
    }

    /// Live state of a section.
    pub fn state(&self, section: Section) -> SyncState {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&section)
            .cloned()
            .unwrap_or_else(|| SyncState::new(section))
    }

    pub fn is_sync_in_progress(&self) -> bool {
        self.full_sync.load(Ordering::Acquire)
            || self
                .states
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .values()
                .any(|s| s.phase == SyncPhase::Fetching)
    }

    /// Whether any section is empty or older than the freshness threshold.
    pub fn needs_sync(&self) -> Result<bool> {
        for section in Section::ALL {
            if !self.is_fresh(section)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether `section` has cached rows from a run completed within the
    /// freshness threshold.
    pub fn is_fresh(&self, section: Section) -> Result<bool> {
        if self.store.count_by_section(Some(section))? == 0 {
            debug!("{} has no cached records", section);
            return Ok(false);
        }
        let now = chrono::Utc::now().timestamp();
        let freshness = self.options.freshness.as_secs() as i64;
        match self.state(section).last_sync {
            Some(last) if now - last <= freshness => Ok(true),
            _ => {
                debug!("{} is stale", section);
                Ok(false)
            }
        }
    }

    /// Per-section last sync and cached count; `None` for never-synced sections.
    pub fn sync_status(&self) -> Result<BTreeMap<Section, Option<SectionSyncStatus>>> {
        let mut status = BTreeMap::new();
        for section in Section::ALL {
            let entry = match self.state(section).last_sync {
                Some(last_sync) => Some(SectionSyncStatus {
                    last_sync,
                    count: self.store.count_by_section(Some(section))?,
                }),
                None => None,
            };
            status.insert(section, entry);
        }
        Ok(status)
    }

    /// Delete the whole catalog and all sync bookkeeping.
    pub fn wipe(&self) -> Result<()> {
        if self.is_sync_in_progress() {
            return Err(ModSyncError::Validation {
                field: "cache".to_string(),
                message: "cannot wipe the catalog while a sync is running".to_string(),
            });
        }

        self.store.wipe()?;
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        for section in Section::ALL {
            states.insert(section, SyncState::new(section));
        }
        info!("Catalog cache wiped");
        Ok(())
    }
}

/// Page count for `total` items at `per_page` per page.
fn pages_for(total: u64, per_page: u32) -> u32 {
    if per_page == 0 {
        return 0;
    }
    total.div_ceil(per_page as u64).min(u32::MAX as u64) as u32
}
