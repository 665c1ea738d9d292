//! Installed-mod data types.

use crate::catalog::Section;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where an installed file came from upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModOrigin {
    pub section: Section,
    pub mod_id: u64,
    pub file_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<u64>,
}

/// One mod present in the addon tree, enabled or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledMod {
    /// Stable across enable/disable and priority changes.
    pub id: String,
    pub name: String,
    /// Current `_dir.vpk` (or single `.vpk`) file name.
    pub file_name: String,
    pub path: PathBuf,
    pub enabled: bool,
    pub priority: u32,
    /// Bytes on disk, parts included.
    pub size: u64,
    /// Unix seconds.
    pub installed_at: Option<i64>,
    /// Asset paths listed in the mod's package directory tree, lowercased
    /// and `/`-separated. Empty when the package cannot be read.
    pub content_paths: Vec<String>,
    pub origin: Option<ModOrigin>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Descriptive fields recorded at install time.
#[derive(Debug, Clone, Default)]
pub struct InstallInfo {
    pub name: Option<String>,
    pub origin: Option<ModOrigin>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Result of sweeping leftover archives out of the addon tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub removed_archives: u32,
}
