//! Shared fixtures for the integration tests: a scripted upstream and
//! engine/game directory helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use modsync_core::network::TransferProgress;
use modsync_core::{
    BrowseFilters, BrowsePage, CatalogRecord, CategoryTree, ModDetail, ModFile, ModSync,
    ModSyncError, PortalSection, Result, Section, UpstreamClient,
};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};

/// In-process upstream driven entirely by test data.
#[derive(Default)]
pub struct ScriptedUpstream {
    pub records: Mutex<HashMap<Section, Vec<CatalogRecord>>>,
    /// Page size the fake portal enforces regardless of the request.
    pub forced_page_size: Option<u32>,
    /// Pages at or after this one fail as if retries were exhausted.
    pub fail_from_page: Mutex<Option<u32>>,
    pub browse_delay: Duration,
    pub details: Mutex<HashMap<(Section, u64), ModDetail>>,
    /// File id to payload written by `download_file`.
    pub payloads: Mutex<HashMap<u64, Vec<u8>>>,
    /// When set, each download waits for one permit.
    pub download_gate: Option<Arc<Semaphore>>,
    pub browse_calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedUpstream {
    pub fn with_records(section: Section, count: u64) -> Self {
        let upstream = Self::default();
        upstream.set_records(section, (1..=count).map(|id| create_test_record(section, id)).collect());
        upstream
    }

    pub fn set_records(&self, section: Section, records: Vec<CatalogRecord>) {
        self.records.lock().unwrap().insert(section, records);
    }

    pub fn add_detail(&self, detail: ModDetail) {
        self.details
            .lock()
            .unwrap()
            .insert((detail.section, detail.id), detail);
    }

    pub fn add_payload(&self, file_id: u64, bytes: Vec<u8>) {
        self.payloads.lock().unwrap().insert(file_id, bytes);
    }

    pub fn browse_calls(&self) -> usize {
        self.browse_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    async fn browse(
        &self,
        section: Section,
        page: u32,
        page_size: u32,
        _filters: &BrowseFilters,
    ) -> Result<BrowsePage> {
        self.browse_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.browse_delay.is_zero() {
            tokio::time::sleep(self.browse_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(fail_from) = *self.fail_from_page.lock().unwrap() {
            if page >= fail_from {
                return Err(ModSyncError::UpstreamUnavailable {
                    attempts: 3,
                    message: "empty response body".to_string(),
                });
            }
        }

        let all = self
            .records
            .lock()
            .unwrap()
            .get(&section)
            .cloned()
            .unwrap_or_default();
        let per_page = self.forced_page_size.unwrap_or(page_size) as usize;
        let start = (page as usize - 1) * per_page;
        let records: Vec<_> = all.iter().skip(start).take(per_page).cloned().collect();

        Ok(BrowsePage {
            is_complete: start + records.len() >= all.len(),
            total_count: all.len() as u64,
            per_page: per_page as u32,
            raw_count: records.len(),
            records,
        })
    }

    async fn fetch_detail(&self, section: Section, id: u64) -> Result<ModDetail> {
        self.details
            .lock()
            .unwrap()
            .get(&(section, id))
            .cloned()
            .ok_or_else(|| ModSyncError::ModNotFound {
                id: format!("{}/{}", section, id),
            })
    }

    async fn list_categories(&self, section: Section) -> Result<CategoryTree> {
        Ok(CategoryTree {
            section,
            nodes: Vec::new(),
            canonical: false,
        })
    }

    async fn list_sections(&self) -> Result<Vec<PortalSection>> {
        let records = self.records.lock().unwrap();
        Ok(Section::ALL
            .into_iter()
            .map(|section| PortalSection {
                plural_title: format!("{}s", section),
                model_name: section.as_str().to_string(),
                category_model_name: section.category_model_name().to_string(),
                item_count: records.get(&section).map_or(0, |r| r.len() as u64),
                section: Some(section),
            })
            .collect())
    }

    async fn download_file(
        &self,
        file: &ModFile,
        destination: &Path,
        progress: mpsc::Sender<TransferProgress>,
    ) -> Result<u64> {
        if let Some(gate) = &self.download_gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let payload = self
            .payloads
            .lock()
            .unwrap()
            .get(&file.id)
            .cloned()
            .ok_or_else(|| ModSyncError::Network {
                message: format!("no payload for file {}", file.id),
                cause: None,
            })?;

        let total = payload.len() as u64;
        let _ = progress
            .send(TransferProgress {
                downloaded: total / 2,
                total: Some(total),
            })
            .await;
        std::fs::write(destination, &payload).map_err(|e| ModSyncError::io_with_path(e, destination))?;
        let _ = progress
            .send(TransferProgress {
                downloaded: total,
                total: Some(total),
            })
            .await;
        Ok(total)
    }
}

pub fn create_test_record(section: Section, id: u64) -> CatalogRecord {
    CatalogRecord {
        id,
        section,
        name: format!("{} item {}", section, id),
        category_id: Some(100 + id % 3),
        category_name: Some(format!("Category {}", id % 3)),
        submitter_id: Some(7),
        submitter_name: Some("someone".to_string()),
        like_count: id * 2,
        view_count: id * 10,
        download_count: None,
        date_added: 1_700_000_000 + id as i64,
        date_modified: 1_700_000_000 + id as i64,
        has_files: true,
        nsfw: None,
        thumbnail_url: None,
        profile_url: format!("https://gamebanana.com/mods/{}", id),
        cached_at: 1_700_000_000,
    }
}

pub fn create_test_detail(section: Section, id: u64, files: &[(u64, &str)]) -> ModDetail {
    ModDetail {
        id,
        section,
        name: format!("Mod {}", id),
        description: Some("test mod".to_string()),
        category_id: Some(100),
        category_name: Some("Skins".to_string()),
        files: files
            .iter()
            .enumerate()
            .map(|(i, &(file_id, name))| ModFile {
                id: file_id,
                file_name: name.to_string(),
                file_size: 0,
                download_url: format!("https://example.invalid/dl/{}", file_id),
                download_count: 100 - i as u64,
                description: None,
            })
            .collect(),
        nsfw: false,
        download_count: 100,
        thumbnail_url: None,
    }
}

/// Zip archive bytes holding the given entries.
pub fn create_test_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Bytes of a version 2 `.vpk` package whose directory tree lists `assets`.
pub fn create_test_vpk(assets: &[&str]) -> Vec<u8> {
    let mut tree: BTreeMap<&str, BTreeMap<&str, Vec<&str>>> = BTreeMap::new();
    for asset in assets {
        let (dir, file) = asset.rsplit_once('/').unwrap_or((" ", asset));
        let (name, ext) = file.rsplit_once('.').unwrap_or((file, " "));
        tree.entry(ext).or_default().entry(dir).or_default().push(name);
    }

    let mut body = Vec::new();
    for (ext, dirs) in tree {
        body.extend_from_slice(ext.as_bytes());
        body.push(0);
        for (dir, names) in dirs {
            body.extend_from_slice(dir.as_bytes());
            body.push(0);
            for name in names {
                body.extend_from_slice(name.as_bytes());
                body.push(0);
                // crc, preload, archive index, offset, length, terminator
                body.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0xFF, 0x7F]);
                body.extend_from_slice(&[0; 8]);
                body.extend_from_slice(&[0xFF, 0xFF]);
            }
            body.push(0);
        }
        body.push(0);
    }
    body.push(0);

    let mut package = Vec::new();
    package.extend_from_slice(&0x55AA_1234u32.to_le_bytes());
    package.extend_from_slice(&2u32.to_le_bytes());
    package.extend_from_slice(&(body.len() as u32).to_le_bytes());
    package.extend_from_slice(&[0; 16]);
    package.extend_from_slice(&body);
    package
}

/// A directory laid out like a game install.
pub fn create_test_game(temp_dir: &TempDir) -> std::path::PathBuf {
    let game = temp_dir.path().join("Deadlock");
    std::fs::create_dir_all(game.join("game/citadel/addons")).unwrap();
    game
}

pub async fn create_test_engine(
    temp_dir: &TempDir,
    upstream: Arc<ScriptedUpstream>,
    with_game: bool,
) -> ModSync {
    let mut builder = ModSync::builder(temp_dir.path().join("data"))
        .auto_create_dirs(true)
        .upstream(upstream);
    if with_game {
        builder = builder.game_path(create_test_game(temp_dir));
    }
    builder.build().await.unwrap()
}
