//! Installed-mod management over the game's addon directory.
//!
//! Enabled mods live in `game/citadel/addons`, disabled ones in its
//! `.disabled` subdirectory. A mod is a `_dir.vpk` file plus any numbered
//! `_NNN.vpk` parts sharing its base name; its priority is the `pakNN_`
//! prefix. Lower numbers are mounted first and win over higher ones.

use crate::config::{InstallConfig, PathsConfig};
use crate::downloads::ExtractedFile;
use crate::game;
use crate::installed::metadata::{MetadataStore, ModMetadata};
use crate::installed::naming;
use crate::installed::vpk;
use crate::installed::types::{CleanupReport, InstallInfo, InstalledMod};
use crate::{ModSyncError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Reads and rearranges the addon tree.
#[derive(Debug)]
pub struct InstalledModManager {
    game_path: PathBuf,
    metadata: MetadataStore,
    /// Serializes filesystem mutations.
    ops: Mutex<()>,
}

/// Files extracted from one archive that install as one mod.
#[derive(Debug, Default)]
struct InstallGroup<'a> {
    dir: Option<&'a ExtractedFile>,
    parts: Vec<(String, &'a ExtractedFile)>,
}

impl InstalledModManager {
    pub fn new(game_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            game_path: game_path.into(),
            metadata: MetadataStore::open(metadata_path),
            ops: Mutex::new(()),
        }
    }

    pub fn game_path(&self) -> &Path {
        &self.game_path
    }

    fn enabled_root(&self) -> PathBuf {
        self.game_path.join(PathsConfig::ADDONS_REL_PATH)
    }

    fn disabled_root(&self) -> PathBuf {
        self.game_path.join(PathsConfig::DISABLED_REL_PATH)
    }

    /// Every installed mod, enabled first, each group ordered by priority.
    pub fn list(&self) -> Result<Vec<InstalledMod>> {
        let mut mods = self.scan_dir(&self.enabled_root(), true)?;
        mods.extend(self.scan_dir(&self.disabled_root(), false)?);
        Ok(mods)
    }

    /// Enabled mods in mount order: lowest priority first, ties by id.
    pub fn load_order(&self) -> Result<Vec<InstalledMod>> {
        let mut mods: Vec<_> = self.list()?.into_iter().filter(|m| m.enabled).collect();
        mods.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(mods)
    }

    pub fn find(&self, id: &str) -> Result<InstalledMod> {
        self.list()?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| ModSyncError::ModNotFound { id: id.to_string() })
    }

    fn scan_dir(&self, dir: &Path, enabled: bool) -> Result<Vec<InstalledMod>> {
        let names = match list_vpk_names(dir) {
            Ok(names) => names,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ModSyncError::io_with_path(e, dir)),
        };

        let mut mods = Vec::new();
        for name in &names {
            // Parts are folded into their directory file.
            if !naming::is_dir_vpk(name) && naming::split_part(name).is_some() {
                continue;
            }

            let group = group_members(&names, name);
            let size = group
                .iter()
                .filter_map(|member| fs::metadata(dir.join(member)).ok())
                .map(|m| m.len())
                .sum();

            let metadata = self.metadata.get(name);
            let id = metadata
                .as_ref()
                .map(|m| m.id.clone())
                .unwrap_or_else(|| fallback_id(name));
            let (display, origin, description, thumbnail_url, installed_at) = match metadata {
                Some(m) => (m.name, m.origin, m.description, m.thumbnail_url, m.installed_at),
                None => (None, None, None, None, None),
            };
            let content_paths = vpk::read_entry_paths(&dir.join(name)).unwrap_or_else(|e| {
                debug!("No readable directory tree in {}: {}", name, e);
                Vec::new()
            });

            mods.push(InstalledMod {
                id,
                name: display.unwrap_or_else(|| naming::display_name(name)),
                file_name: name.clone(),
                path: dir.join(name),
                enabled,
                priority: naming::priority_or_default(name),
                size,
                installed_at,
                content_paths,
                origin,
                description,
                thumbnail_url,
            });
        }

        mods.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        debug!("Found {} mod(s) in {}", mods.len(), dir.display());
        Ok(mods)
    }

    pub fn enable(&self, id: &str) -> Result<InstalledMod> {
        self.set_enabled(id, true)
    }

    pub fn disable(&self, id: &str) -> Result<InstalledMod> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> Result<InstalledMod> {
        let _ops = self.ops.lock().unwrap_or_else(PoisonError::into_inner);
        let target = self.find(id)?;
        if target.enabled == enabled {
            return Ok(target);
        }

        let (from, to) = if enabled {
            (self.disabled_root(), game::addons_dir(&self.game_path)?)
        } else {
            (self.enabled_root(), game::disabled_dir(&self.game_path)?)
        };

        let names = list_vpk_names(&from).map_err(|e| ModSyncError::io_with_path(e, &from))?;
        let members = group_members(&names, &target.file_name);
        if members.iter().any(|m| to.join(m).exists()) {
            return Err(ModSyncError::PriorityInUse {
                priority: target.priority,
            });
        }
        for member in &members {
            move_file(&from.join(member), &to.join(member))?;
        }

        info!(
            "{} {} ({})",
            if enabled { "Enabled" } else { "Disabled" },
            target.name,
            target.file_name
        );
        self.find(id)
    }

    /// Move a mod to another pak slot.
    ///
    /// Fails with [`ModSyncError::PriorityInUse`] when any installed mod,
    /// enabled or not, already owns the slot.
    pub fn set_priority(&self, id: &str, priority: u32) -> Result<InstalledMod> {
        if !(InstallConfig::MIN_PAK_SLOT..=InstallConfig::MAX_PAK_SLOT).contains(&priority) {
            return Err(ModSyncError::Validation {
                field: "priority".to_string(),
                message: format!(
                    "must be between {} and {}",
                    InstallConfig::MIN_PAK_SLOT,
                    InstallConfig::MAX_PAK_SLOT
                ),
            });
        }

        let _ops = self.ops.lock().unwrap_or_else(PoisonError::into_inner);
        let target = self.find(id)?;
        let new_name = naming::slot_file_name(priority);
        if target.file_name.eq_ignore_ascii_case(&new_name) {
            return Ok(target);
        }

        let taken = self.list()?.iter().any(|m| {
            m.id != target.id && naming::priority_from_file_name(&m.file_name) == Some(priority)
        });
        if taken {
            return Err(ModSyncError::PriorityInUse { priority });
        }

        let dir = self.dir_of(&target);
        let names = list_vpk_names(&dir).map_err(|e| ModSyncError::io_with_path(e, &dir))?;
        let renames: Vec<(String, String)> = group_members(&names, &target.file_name)
            .into_iter()
            .map(|member| {
                let renamed = match naming::split_part(&member) {
                    Some((_, part)) if !naming::is_dir_vpk(&member) => {
                        naming::slot_part_name(priority, part)
                    }
                    _ => new_name.clone(),
                };
                (member, renamed)
            })
            .collect();
        if let Some((_, clash)) = renames.iter().find(|(_, to)| dir.join(to).exists()) {
            warn!("Cannot move {} to {}: file exists", target.file_name, clash);
            return Err(ModSyncError::PriorityInUse { priority });
        }

        // Pin the id before the file name it was derived from changes.
        if self.metadata.get(&target.file_name).is_none() {
            self.metadata
                .put(&target.file_name, ModMetadata::new(target.id.clone()))?;
        }

        for (from, to) in &renames {
            move_file(&dir.join(from), &dir.join(to))?;
        }
        self.metadata.rename(&target.file_name, &new_name)?;

        info!(
            "Moved {} from priority {} to {}",
            target.name, target.priority, priority
        );
        self.find(id)
    }

    /// Delete a mod's files and its metadata.
    pub fn uninstall(&self, id: &str) -> Result<InstalledMod> {
        let _ops = self.ops.lock().unwrap_or_else(PoisonError::into_inner);
        let target = self.find(id)?;
        let dir = self.dir_of(&target);
        let names = list_vpk_names(&dir).map_err(|e| ModSyncError::io_with_path(e, &dir))?;

        for member in group_members(&names, &target.file_name) {
            let path = dir.join(&member);
            fs::remove_file(&path).map_err(|e| ModSyncError::io_with_path(e, &path))?;
            debug!("Removed {}", path.display());
        }
        self.metadata.remove(&target.file_name)?;

        info!("Uninstalled {} ({})", target.name, target.file_name);
        Ok(target)
    }

    /// Delete zip, 7z and rar files left in the addon directories. The game
    /// ignores them; they are usually archives unpacked by hand.
    pub fn cleanup_archives(&self) -> Result<CleanupReport> {
        let _ops = self.ops.lock().unwrap_or_else(PoisonError::into_inner);
        let mut report = CleanupReport::default();

        for dir in [self.enabled_root(), self.disabled_root()] {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(ModSyncError::io_with_path(e, &dir)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| ModSyncError::io_with_path(e, &dir))?;
                let path = entry.path();
                if !path.is_file() || !is_leftover_archive(&path) {
                    continue;
                }
                fs::remove_file(&path).map_err(|e| ModSyncError::io_with_path(e, &path))?;
                debug!("Removed leftover archive {}", path.display());
                report.removed_archives += 1;
            }
        }

        if report.removed_archives > 0 {
            info!("Removed {} leftover archive(s)", report.removed_archives);
        }
        Ok(report)
    }

    /// Place extracted `.vpk` payloads into the addon directory.
    ///
    /// Each `_dir.vpk` travels with its numbered parts and lands in the
    /// first free slot at or after the one its name asks for (default 50),
    /// wrapping around to the lowest slots. Returns the installed mods.
    pub fn install(&self, files: &[ExtractedFile], info: &InstallInfo) -> Result<Vec<InstalledMod>> {
        let groups = build_groups(files);
        if groups.is_empty() {
            return Err(ModSyncError::Validation {
                field: "files".to_string(),
                message: "no installable .vpk files".to_string(),
            });
        }

        let _ops = self.ops.lock().unwrap_or_else(PoisonError::into_inner);
        let addons = game::addons_dir(&self.game_path)?;
        let mut used: BTreeSet<u32> = self
            .list()?
            .iter()
            .filter_map(|m| naming::priority_from_file_name(&m.file_name))
            .collect();

        let now = chrono::Utc::now().timestamp();
        let mut installed_ids = Vec::with_capacity(groups.len());
        let single = groups.len() == 1;

        for (base, group) in &groups {
            let Some(dir_file) = group.dir else {
                warn!("Skipping parts of {} without a _dir.vpk", base);
                continue;
            };
            let dir_name = dir_file.file_name();
            let preferred =
                naming::requested_slot(&dir_name).unwrap_or(InstallConfig::DEFAULT_PRIORITY);
            let slot = naming::find_available_slot(preferred, &used).ok_or_else(|| {
                ModSyncError::Validation {
                    field: "priority".to_string(),
                    message: "no free pak slot left".to_string(),
                }
            })?;
            used.insert(slot);

            let dest_name = naming::slot_file_name(slot);
            move_file(&dir_file.path, &addons.join(&dest_name))?;
            for (part, file) in &group.parts {
                move_file(&file.path, &addons.join(naming::slot_part_name(slot, part)))?;
            }

            let id = uuid::Uuid::new_v4().to_string();
            let name = match (&info.name, single) {
                (Some(name), true) => name.clone(),
                (Some(name), false) => format!("{} ({})", name, naming::display_name(&dir_name)),
                (None, _) => naming::display_name(&dir_name),
            };
            self.metadata.put(
                &dest_name,
                ModMetadata {
                    id: id.clone(),
                    name: Some(name),
                    origin: info.origin.clone(),
                    description: info.description.clone(),
                    thumbnail_url: info.thumbnail_url.clone(),
                    installed_at: Some(now),
                },
            )?;
            info!("Installed {} as {}", dir_file.entry_path, dest_name);
            installed_ids.push(id);
        }

        let installed: Vec<_> = self
            .list()?
            .into_iter()
            .filter(|m| installed_ids.contains(&m.id))
            .collect();
        if installed.is_empty() {
            return Err(ModSyncError::Validation {
                field: "files".to_string(),
                message: "archive held only orphaned .vpk parts".to_string(),
            });
        }
        Ok(installed)
    }

    fn dir_of(&self, installed: &InstalledMod) -> PathBuf {
        if installed.enabled {
            self.enabled_root()
        } else {
            self.disabled_root()
        }
    }
}

/// `.vpk` file names directly inside `dir`, sorted.
fn list_vpk_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.to_ascii_lowercase().ends_with(".vpk") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// A mod's file followed by the parts sharing its base name.
fn group_members(names: &[String], file_name: &str) -> Vec<String> {
    let mut members = vec![file_name.to_string()];
    if !naming::is_dir_vpk(file_name) {
        return members;
    }
    let base = naming::archive_base(file_name);
    members.extend(
        names
            .iter()
            .filter(|n| !naming::is_dir_vpk(n))
            .filter(|n| naming::split_part(n).is_some_and(|(b, _)| b.eq_ignore_ascii_case(base)))
            .cloned(),
    );
    members
}

/// Group extracted files by archive base. A lone `.vpk` without the `_dir`
/// suffix is treated as a directory file of its own.
fn build_groups(files: &[ExtractedFile]) -> BTreeMap<String, InstallGroup<'_>> {
    let mut groups: BTreeMap<String, InstallGroup<'_>> = BTreeMap::new();
    for file in files {
        let name = file.file_name();
        if naming::is_dir_vpk(&name) {
            groups
                .entry(naming::archive_base(&name).to_ascii_lowercase())
                .or_default()
                .dir = Some(file);
        } else if let Some((base, part)) = naming::split_part(&name) {
            groups
                .entry(base.to_ascii_lowercase())
                .or_default()
                .parts
                .push((part.to_string(), file));
        } else {
            groups.entry(name.to_ascii_lowercase()).or_default().dir = Some(file);
        }
    }
    groups
}

fn is_leftover_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| matches!(e.as_str(), "zip" | "7z" | "rar"))
}

/// Id for a file we hold no metadata for.
fn fallback_id(file_name: &str) -> String {
    blake3::hash(file_name.as_bytes()).to_hex().as_str()[..16].to_string()
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|e| ModSyncError::io_with_path(e, to))?;
    fs::remove_file(from).map_err(|e| ModSyncError::io_with_path(e, from))?;
    Ok(())
}
