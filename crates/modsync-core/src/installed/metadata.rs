//! Per-file install metadata.
//!
//! Stored as one JSON document keyed by the addon file name. Writes go to a
//! sibling temp file that is synced and then renamed over the target, so a
//! crash never leaves a truncated document behind.

use crate::installed::types::ModOrigin;
use crate::{ModSyncError, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// What we remember about an installed file beyond its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModMetadata {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ModOrigin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<i64>,
}

impl ModMetadata {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            origin: None,
            description: None,
            thumbnail_url: None,
            installed_at: None,
        }
    }
}

/// Read and parse a JSON file. `None` when it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ModSyncError::io_with_path(e, path)),
    };

    let data = serde_json::from_str(&contents).map_err(|e| ModSyncError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;
    Ok(Some(data))
}

/// Write `data` as pretty JSON through a synced temp file and a rename.
///
/// With `keep_backup`, the previous document is copied to `*.bak` first.
pub fn write_json<T: Serialize>(path: &Path, data: &T, keep_backup: bool) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| ModSyncError::io_with_path(e, parent))?;

    let serialized = serde_json::to_string_pretty(data)?;

    if keep_backup && path.exists() {
        let backup = path.with_extension("json.bak");
        match fs::copy(path, &backup) {
            Ok(_) => debug!("Backed up {}", backup.display()),
            Err(e) => warn!("Failed to back up {}: {}", path.display(), e),
        }
    }

    write_atomic(path, serialized.as_bytes())
}

/// Replace `path` with `contents` through a synced sibling temp file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| ModSyncError::io_with_path(e, parent))?;
    temp.write_all(contents)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| ModSyncError::io_with_path(e, temp.path()))?;

    temp.persist(path)
        .map_err(|e| ModSyncError::io_with_path(e.error, path))?;
    Ok(())
}

/// File-backed map of addon file name to metadata.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, ModMetadata>>,
}

impl MetadataStore {
    /// Load the document at `path`, starting empty when missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_json::<BTreeMap<String, ModMetadata>>(&path) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                warn!("Ignoring unreadable mod metadata: {}", e);
                BTreeMap::new()
            }
        };
        debug!("Loaded {} metadata entries from {}", entries.len(), path.display());
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ModMetadata>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, file_name: &str) -> Option<ModMetadata> {
        self.lock().get(file_name).cloned()
    }

    /// Insert or replace an entry and persist.
    pub fn put(&self, file_name: &str, metadata: ModMetadata) -> Result<()> {
        let mut entries = self.lock();
        entries.insert(file_name.to_string(), metadata);
        write_json(&self.path, &*entries, true)
    }

    /// Move an entry to a new key and persist. No-op when `from` is absent.
    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut entries = self.lock();
        let Some(metadata) = entries.remove(from) else {
            return Ok(());
        };
        entries.insert(to.to_string(), metadata);
        write_json(&self.path, &*entries, true)
    }

    pub fn remove(&self, file_name: &str) -> Result<Option<ModMetadata>> {
        let mut entries = self.lock();
        let removed = entries.remove(file_name);
        if removed.is_some() {
            write_json(&self.path, &*entries, true)?;
        }
        Ok(removed)
    }
}
