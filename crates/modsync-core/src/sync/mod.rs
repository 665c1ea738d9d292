//! Catalog synchronization: per-section state and the synchronizer.

mod state;
mod synchronizer;

pub use state::{SectionSyncStatus, SyncOutcome, SyncPhase, SyncProgress, SyncState};
pub use synchronizer::Synchronizer;
