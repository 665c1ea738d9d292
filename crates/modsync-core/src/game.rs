//! Game installation discovery and `gameinfo.gi` setup.
//!
//! The game lives in a Steam library under `steamapps/common/Deadlock`. An
//! install is considered valid when it contains `game/citadel`. The game
//! only mounts `citadel/addons` once `gameinfo.gi` lists it as a search path.

use crate::config::PathsConfig;
use crate::installed::metadata::write_atomic;
use crate::{ModSyncError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const GAME_FOLDER: &str = "Deadlock";

/// Whether `path` looks like a game install root.
pub fn is_valid_game_path(path: &Path) -> bool {
    path.join("game").join("citadel").is_dir()
}

/// Steam `steamapps/common` directories to search on this platform.
fn steam_library_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    #[cfg(target_os = "windows")]
    {
        roots.push(PathBuf::from(r"C:\Program Files (x86)\Steam\steamapps\common"));
        roots.push(PathBuf::from(r"C:\Program Files\Steam\steamapps\common"));
        roots.push(PathBuf::from(r"D:\Steam\steamapps\common"));
        roots.push(PathBuf::from(r"D:\SteamLibrary\steamapps\common"));
    }

    #[cfg(target_os = "macos")]
    if let Some(home) = dirs::home_dir() {
        roots.push(home.join("Library/Application Support/Steam/steamapps/common"));
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    if let Some(home) = dirs::home_dir() {
        roots.push(home.join(".steam/steam/steamapps/common"));
        roots.push(home.join(".local/share/Steam/steamapps/common"));
        roots.push(home.join(".var/app/com.valvesoftware.Steam/.local/share/Steam/steamapps/common"));
    }

    roots
}

/// Look for the game under the usual Steam library locations.
pub fn detect_game_path() -> Option<PathBuf> {
    steam_library_roots()
        .into_iter()
        .map(|root| root.join(GAME_FOLDER))
        .inspect(|candidate| debug!("Checking {}", candidate.display()))
        .find(|candidate| is_valid_game_path(candidate))
        .inspect(|found| info!("Detected game install at {}", found.display()))
}

/// Directory the game mounts addons from. Created on demand.
pub fn addons_dir(game_path: &Path) -> Result<PathBuf> {
    ensure_dir(game_path.join(PathsConfig::ADDONS_REL_PATH))
}

/// Where disabled addons are parked. Created on demand.
pub fn disabled_dir(game_path: &Path) -> Result<PathBuf> {
    ensure_dir(game_path.join(PathsConfig::DISABLED_REL_PATH))
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf> {
    fs::create_dir_all(&path).map_err(|e| ModSyncError::io_with_path(e, &path))?;
    Ok(path)
}

/// Fail unless `path` is a usable game install.
pub fn validate_game_path(path: &Path) -> Result<()> {
    if is_valid_game_path(path) {
        Ok(())
    } else {
        Err(ModSyncError::Config {
            message: format!("{} is not a game install (missing game/citadel)", path.display()),
        })
    }
}

/// Lines `gameinfo.gi` must contain for addons to load.
const GAMEINFO_REQUIRED: [&str; 4] = [
    "Game                citadel/addons",
    "AddonRoot           citadel_addons",
    "OfficialAddonRoot   citadel_community_addons",
    "\"UseOfficialAddons\" \"1\"",
];

/// Replacement for the `FileSystem` block, followed by the addon switch.
const GAMEINFO_FILESYSTEM: &str = "FileSystem
\t{
\t\tSearchPaths
\t\t{
\t\t\tGame_Language\t\tcitadel_*LANGUAGE*

\t\t\tMod                 citadel
\t\t\tWrite               citadel
\t\t\tGame                citadel/addons
\t\t\tGame                citadel
\t\t\tMod                 core
\t\t\tWrite               core
\t\t\tGame                core
\t\t\tAddonRoot           citadel_addons
\t\t\tOfficialAddonRoot   citadel_community_addons
\t\t}
\t}
\tAddonConfig
\t{
\t\t\"UseOfficialAddons\" \"1\"
\t}";

/// Whether the game's `gameinfo.gi` mounts the addon directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameinfoStatus {
    pub configured: bool,
    pub message: String,
}

pub fn gameinfo_path(game_path: &Path) -> PathBuf {
    game_path.join(PathsConfig::GAMEINFO_REL_PATH)
}

pub fn is_gameinfo_configured(content: &str) -> bool {
    GAMEINFO_REQUIRED.iter().all(|line| content.contains(line))
}

/// Rewrite the `FileSystem` block with addon search paths and replace any
/// `AddonConfig` block with one enabling addons. Text outside those blocks
/// is kept as-is.
pub fn normalize_gameinfo(content: &str) -> Result<String> {
    // The block goes with the whitespace before it so repeated runs are stable.
    let without_config = match find_block(content, "AddonConfig") {
        Some((start, end)) => format!("{}{}", content[..start].trim_end(), &content[end..]),
        None => content.to_string(),
    };
    let (start, end) =
        find_block(&without_config, "FileSystem").ok_or_else(|| ModSyncError::Config {
            message: "FileSystem block not found in gameinfo.gi".to_string(),
        })?;

    let mut updated = String::with_capacity(without_config.len() + GAMEINFO_FILESYSTEM.len());
    updated.push_str(&without_config[..start]);
    updated.push_str(GAMEINFO_FILESYSTEM);
    updated.push_str(&without_config[end..]);
    Ok(updated)
}

/// Byte range of `key { ... }`, from the key to the matching close brace.
/// Occurrences of `key` not followed by an opening brace are skipped.
fn find_block(content: &str, key: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(found) = content[from..].find(key) {
        let start = from + found;
        let after = start + key.len();
        let rest = &content[after..];
        let gap = rest.len() - rest.trim_start().len();
        if rest[gap..].starts_with('{') {
            let open = after + gap;
            let mut depth = 0usize;
            for (offset, byte) in content.as_bytes()[open..].iter().enumerate() {
                match byte {
                    b'{' => depth += 1,
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some((start, open + offset + 1));
                        }
                    }
                    _ => {}
                }
            }
            return None;
        }
        from = after;
    }
    None
}

fn read_gameinfo(game_path: &Path) -> Result<(PathBuf, String)> {
    let path = gameinfo_path(game_path);
    let content = fs::read_to_string(&path).map_err(|e| ModSyncError::io_with_path(e, &path))?;
    Ok((path, content))
}

/// Report whether addons are mounted by the install at `game_path`.
pub fn gameinfo_status(game_path: &Path) -> Result<GameinfoStatus> {
    let (_, content) = read_gameinfo(game_path)?;
    let configured = is_gameinfo_configured(&content);
    Ok(GameinfoStatus {
        configured,
        message: if configured {
            "gameinfo.gi is configured for addons.".to_string()
        } else {
            "gameinfo.gi is missing addon search paths.".to_string()
        },
    })
}

/// Normalize `gameinfo.gi` in place. The file is only rewritten when the
/// normalized text differs.
pub fn fix_gameinfo(game_path: &Path) -> Result<GameinfoStatus> {
    let (path, content) = read_gameinfo(game_path)?;
    let updated = normalize_gameinfo(&content)?;
    if updated != content {
        write_atomic(&path, updated.as_bytes())?;
        info!("Updated {} with addon search paths", path.display());
    } else {
        debug!("{} already normalized", path.display());
    }
    Ok(GameinfoStatus {
        configured: true,
        message: "gameinfo.gi updated with addon paths.".to_string(),
    })
}
