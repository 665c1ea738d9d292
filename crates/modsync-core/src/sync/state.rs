//! Per-section sync state and progress payloads.

use crate::catalog::Section;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of one section's sync.
///
/// `Complete` and `Error` are terminal for a run and stay observable until the
/// next run starts; any non-`Fetching` phase may start a new run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    Complete,
    Error,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Complete => "complete",
            SyncPhase::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "fetching" => SyncPhase::Fetching,
            "complete" => SyncPhase::Complete,
            "error" => SyncPhase::Error,
            _ => SyncPhase::Idle,
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted sync bookkeeping for one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub section: Section,
    /// Unix seconds of the last run that reached `Complete`.
    pub last_sync: Option<i64>,
    /// Item count the portal reported on the last run.
    pub total_count: u64,
    pub phase: SyncPhase,
    pub current_page: u32,
    pub total_pages: u32,
    pub error: Option<String>,
}

impl SyncState {
    pub fn new(section: Section) -> Self {
        Self {
            section,
            last_sync: None,
            total_count: 0,
            phase: SyncPhase::Idle,
            current_page: 0,
            total_pages: 0,
            error: None,
        }
    }
}

/// Progress event published once per fetched page and on every phase change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub section: Section,
    pub current_page: u32,
    pub total_pages: u32,
    pub mods_processed: usize,
    pub total_mods: u64,
    pub phase: SyncPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `getSyncStatus` entry of a section that has synced at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSyncStatus {
    pub last_sync: i64,
    pub count: usize,
}

/// Outcome of a sync request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum SyncOutcome {
    /// The run finished; per-section final states.
    Finished { sections: Vec<SyncState> },
    /// Another run held the resource; nothing was started.
    AlreadyRunning,
}
