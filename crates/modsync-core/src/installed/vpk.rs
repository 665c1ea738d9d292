//! Directory tree reader for Valve `.vpk` packages.
//!
//! A package starts with a small header followed by a tree of
//! extension → directory → file name strings. The asset paths in that tree
//! are what the game mounts, so they are what two mods can collide on.
//! Only the header and tree are read; file data is never touched.

use crate::{ModSyncError, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Magic number at the start of every package.
pub const VPK_SIGNATURE: u32 = 0x55AA_1234;

/// Upper bound on the tree we are willing to buffer.
const MAX_TREE_SIZE: u32 = 64 * 1024 * 1024;

/// Bytes following each file name: crc, preload size, archive index,
/// offset, length and the 0xFFFF terminator.
const ENTRY_SIZE: usize = 18;

fn invalid(path: &Path, message: impl Into<String>) -> ModSyncError {
    ModSyncError::io_with_path(
        std::io::Error::new(std::io::ErrorKind::InvalidData, message.into()),
        path,
    )
}

/// Asset paths listed in the package at `path`, lowercased and `/`-separated.
pub fn read_entry_paths(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| ModSyncError::io_with_path(e, path))?;
    let mut reader = BufReader::new(file);

    let mut header = [0u8; 12];
    reader
        .read_exact(&mut header)
        .map_err(|e| ModSyncError::io_with_path(e, path))?;
    let signature = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let tree_size = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);

    if signature != VPK_SIGNATURE {
        return Err(invalid(path, "not a vpk package"));
    }
    match version {
        1 => {}
        2 => {
            // section sizes we do not need
            let mut skip = [0u8; 16];
            reader
                .read_exact(&mut skip)
                .map_err(|e| ModSyncError::io_with_path(e, path))?;
        }
        other => return Err(invalid(path, format!("unsupported vpk version {}", other))),
    }
    if tree_size > MAX_TREE_SIZE {
        return Err(invalid(path, format!("vpk tree of {} bytes is too large", tree_size)));
    }

    let mut tree = vec![0u8; tree_size as usize];
    reader
        .read_exact(&mut tree)
        .map_err(|e| ModSyncError::io_with_path(e, path))?;

    parse_tree(&tree).ok_or_else(|| invalid(path, "truncated vpk directory tree"))
}

struct TreeCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TreeCursor<'a> {
    fn string(&mut self) -> Option<&'a str> {
        let rest = self.data.get(self.pos..)?;
        let len = rest.iter().position(|&b| b == 0)?;
        self.pos += len + 1;
        std::str::from_utf8(&rest[..len]).ok()
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos.checked_add(n)?)?;
        self.pos += n;
        Some(bytes)
    }
}

fn parse_tree(data: &[u8]) -> Option<Vec<String>> {
    let mut cursor = TreeCursor { data, pos: 0 };
    let mut paths = Vec::new();

    loop {
        let ext = cursor.string()?;
        if ext.is_empty() {
            break;
        }
        loop {
            let dir = cursor.string()?;
            if dir.is_empty() {
                break;
            }
            loop {
                let name = cursor.string()?;
                if name.is_empty() {
                    break;
                }
                let entry = cursor.take(ENTRY_SIZE)?;
                let preload = u16::from_le_bytes([entry[4], entry[5]]) as usize;
                cursor.take(preload)?;
                paths.push(join_entry(dir, name, ext));
            }
        }
    }

    Some(paths)
}

/// A single space stands for "none" in both the directory and extension.
fn join_entry(dir: &str, name: &str, ext: &str) -> String {
    let file = match ext.trim() {
        "" => name.to_string(),
        ext => format!("{}.{}", name, ext),
    };
    let path = match dir.trim() {
        "" => file,
        dir => format!("{}/{}", dir.trim_end_matches('/'), file),
    };
    path.replace('\\', "/").to_lowercase()
}

#[cfg(test)]
pub(crate) fn build_package(paths: &[&str]) -> Vec<u8> {
    use std::collections::BTreeMap;

    let mut tree: BTreeMap<&str, BTreeMap<&str, Vec<&str>>> = BTreeMap::new();
    for path in paths {
        let (dir, file) = path.rsplit_once('/').unwrap_or((" ", path));
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
                body.extend_from_slice(&0u32.to_le_bytes());
                body.extend_from_slice(&0u16.to_le_bytes());
                body.extend_from_slice(&0x7FFFu16.to_le_bytes());
                body.extend_from_slice(&0u32.to_le_bytes());
                body.extend_from_slice(&0u32.to_le_bytes());
                body.extend_from_slice(&0xFFFFu16.to_le_bytes());
            }
            body.push(0);
        }
        body.push(0);
    }
    body.push(0);

    let mut package = Vec::new();
    package.extend_from_slice(&VPK_SIGNATURE.to_le_bytes());
    package.extend_from_slice(&2u32.to_le_bytes());
    package.extend_from_slice(&(body.len() as u32).to_le_bytes());
    package.extend_from_slice(&[0u8; 16]);
    package.extend_from_slice(&body);
    package
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reads_every_entry_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pak01_dir.vpk");
        std::fs::write(
            &path,
            build_package(&[
                "materials/heroes/haze/body.vmat_c",
                "materials/heroes/haze/body_color.vtex_c",
                "soundevents/haze.vsndevts_c",
                "README",
            ]),
        )
        .unwrap();

        let mut paths = read_entry_paths(&path).unwrap();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "materials/heroes/haze/body.vmat_c",
                "materials/heroes/haze/body_color.vtex_c",
                "readme",
                "soundevents/haze.vsndevts_c",
            ]
        );
    }

    #[test]
    fn test_preload_bytes_are_skipped() {
        let mut package = build_package(&["a/one.txt"]);
        // Rewrite the single entry with 3 preload bytes appended after it.
        let tree_start = 28;
        let entry_start = tree_start + "txt\0a\0one\0".len();
        package[entry_start + 4..entry_start + 6].copy_from_slice(&3u16.to_le_bytes());
        let insert_at = entry_start + ENTRY_SIZE;
        package.splice(insert_at..insert_at, [1u8, 2, 3]);
        let tree_size = (package.len() - tree_start) as u32;
        package[8..12].copy_from_slice(&tree_size.to_le_bytes());

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pak02_dir.vpk");
        std::fs::write(&path, package).unwrap();
        assert_eq!(read_entry_paths(&path).unwrap(), vec!["a/one.txt"]);
    }

    #[test]
    fn test_non_package_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pak03_dir.vpk");
        std::fs::write(&path, b"not a package at all").unwrap();
        assert!(read_entry_paths(&path).is_err());

        let mut truncated = build_package(&["a/b.c"]);
        truncated.truncate(truncated.len() - 4);
        std::fs::write(&path, truncated).unwrap();
        assert!(read_entry_paths(&path).is_err());
    }
}
