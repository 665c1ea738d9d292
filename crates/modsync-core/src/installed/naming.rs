//! Addon file naming conventions.
//!
//! The game mounts `pakNN_dir.vpk` files from the addon directory, with the
//! numeric part acting as the load-order priority. Multi-part archives add
//! `pakNN_000.vpk`, `pakNN_001.vpk`, ... next to the directory file.

use crate::config::InstallConfig;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Leading `pakNN_` of an addon file.
static PAK_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^pak(\d{2})_").expect("pak prefix regex must compile"));

/// `pakNN_dir.vpk` anywhere at the end of a name, e.g. `textures-pak21_dir.vpk`.
static PAK_DIR_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)pak(\d{2})_dir\.vpk$").expect("pak dir regex must compile")
});

/// Numbered part of a multi-file archive: `<base>_NNN.vpk`.
static PART_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.+)_(\d{3})\.vpk$").expect("part regex must compile"));

/// Priority encoded in an installed file name.
pub fn priority_from_file_name(file_name: &str) -> Option<u32> {
    PAK_PREFIX
        .captures(file_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Priority of an installed file, defaulting when the name carries none.
pub fn priority_or_default(file_name: &str) -> u32 {
    priority_from_file_name(file_name).unwrap_or(InstallConfig::DEFAULT_PRIORITY)
}

/// Slot an archive entry asks for through its own name.
pub fn requested_slot(file_name: &str) -> Option<u32> {
    PAK_DIR_SUFFIX
        .captures(file_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn is_dir_vpk(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with("_dir.vpk")
}

/// Split `<base>_NNN.vpk` into its base and part number.
pub fn split_part(file_name: &str) -> Option<(&str, &str)> {
    let captures = PART_FILE.captures(file_name)?;
    Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
}

/// Base name shared by a directory file and its parts.
pub fn archive_base(file_name: &str) -> &str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with("_dir.vpk") {
        &file_name[..file_name.len() - "_dir.vpk".len()]
    } else if let Some((base, _)) = split_part(file_name) {
        base
    } else if lower.ends_with(".vpk") {
        &file_name[..file_name.len() - ".vpk".len()]
    } else {
        file_name
    }
}

pub fn slot_file_name(slot: u32) -> String {
    format!("pak{:02}_dir.vpk", slot)
}

pub fn slot_part_name(slot: u32, part: &str) -> String {
    format!("pak{:02}_{}.vpk", slot, part)
}

/// Human-readable name from a file name: `pak03_blue_haze_dir.vpk` becomes
/// `Blue Haze`.
pub fn display_name(file_name: &str) -> String {
    let stem = archive_base(file_name);
    let stem = match PAK_PREFIX.find(stem) {
        Some(m) => &stem[m.end()..],
        None => stem.strip_prefix("pak").map_or(stem, |rest| {
            if rest.len() == 2 && rest.chars().all(|c| c.is_ascii_digit()) {
                ""
            } else {
                stem
            }
        }),
    };

    let name = stem
        .replace(['_', '-'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if name.is_empty() {
        archive_base(file_name).to_string()
    } else {
        name
    }
}

/// First free slot from `preferred` up to the maximum, then wrapping around
/// from the minimum.
pub fn find_available_slot(preferred: u32, used: &BTreeSet<u32>) -> Option<u32> {
    let min = InstallConfig::MIN_PAK_SLOT;
    let max = InstallConfig::MAX_PAK_SLOT;
    let preferred = preferred.clamp(min, max);

    (preferred..=max)
        .chain(min..preferred)
        .find(|slot| !used.contains(slot))
}
