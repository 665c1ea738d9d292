//! Archive expansion for downloaded mod files.
//!
//! The format is taken from the file's leading magic bytes, falling back to
//! its extension when they match nothing known. zip is read in-process, 7z
//! in-process with a `7z`/`7za` executable as fallback, rar only through an
//! external `7z`, `7za` or `unrar`. Only `.vpk` payloads are returned;
//! everything else in an archive is ignored.

use crate::installed::vpk::VPK_SIGNATURE;
use crate::{ModSyncError, Result};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A `.vpk` payload produced by extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Path inside the archive, `/`-separated.
    pub entry_path: String,
    /// Location on disk.
    pub path: PathBuf,
}

impl ExtractedFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.entry_path.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Vpk,
    Zip,
    SevenZip,
    Rar,
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const SEVEN_ZIP_MAGIC: &[u8] = b"7z\xBC\xAF\x27\x1C";
const RAR_MAGIC: &[u8] = b"Rar!\x1A\x07";

/// Identify an archive by its leading bytes. Empty zips start with the
/// end-of-central-directory record instead.
fn sniff_kind(path: &Path) -> Option<ArchiveKind> {
    let mut head = [0u8; 8];
    let mut file = fs::File::open(path).ok()?;
    let mut filled = 0;
    while filled < head.len() {
        match file.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(_) => return None,
        }
    }
    let head = &head[..filled];

    if head.starts_with(ZIP_MAGIC) || head.starts_with(b"PK\x05\x06") {
        Some(ArchiveKind::Zip)
    } else if head.starts_with(SEVEN_ZIP_MAGIC) {
        Some(ArchiveKind::SevenZip)
    } else if head.starts_with(RAR_MAGIC) {
        Some(ArchiveKind::Rar)
    } else if head.starts_with(&VPK_SIGNATURE.to_le_bytes()) {
        Some(ArchiveKind::Vpk)
    } else {
        None
    }
}

fn archive_kind(path: &Path) -> Option<ArchiveKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "vpk" => Some(ArchiveKind::Vpk),
        "zip" => Some(ArchiveKind::Zip),
        "7z" => Some(ArchiveKind::SevenZip),
        "rar" => Some(ArchiveKind::Rar),
        _ => None,
    }
}

/// Whether a downloaded file name is something we can install.
pub fn is_supported_download(file_name: &str) -> bool {
    archive_kind(Path::new(file_name)).is_some()
}

/// Expand `archive` into `out_dir` and return its `.vpk` payloads.
///
/// A bare `.vpk` download is returned as-is without copying.
pub fn extract_archive(archive: &Path, out_dir: &Path) -> Result<Vec<ExtractedFile>> {
    let sniffed = sniff_kind(archive);
    if let (Some(found), Some(named)) = (sniffed, archive_kind(archive)) {
        if found != named {
            debug!(
                "{} is named as {:?} but holds {:?}",
                archive.display(),
                named,
                found
            );
        }
    }
    let kind = sniffed
        .or_else(|| archive_kind(archive))
        .ok_or_else(|| ModSyncError::UnsupportedArchive {
            extension: archive
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })?;

    if kind == ArchiveKind::Vpk {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(vec![ExtractedFile {
            entry_path: name,
            path: archive.to_path_buf(),
        }]);
    }

    fs::create_dir_all(out_dir).map_err(|e| ModSyncError::io_with_path(e, out_dir))?;

    match kind {
        ArchiveKind::Zip => extract_zip(archive, out_dir)?,
        ArchiveKind::SevenZip => extract_7z(archive, out_dir)?,
        ArchiveKind::Rar => extract_rar(archive, out_dir)?,
        ArchiveKind::Vpk => {}
    }

    let files = collect_vpks(out_dir);
    if files.is_empty() {
        return Err(ModSyncError::Archive {
            path: archive.to_path_buf(),
            message: "archive contains no .vpk files".to_string(),
        });
    }

    debug!(
        "Extracted {} vpk file(s) from {}",
        files.len(),
        archive.display()
    );
    Ok(files)
}

fn archive_error(archive: &Path, message: impl Into<String>) -> ModSyncError {
    ModSyncError::Archive {
        path: archive.to_path_buf(),
        message: message.into(),
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive).map_err(|e| ModSyncError::io_with_path(e, archive))?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| archive_error(archive, format!("read zip: {}", e)))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| archive_error(archive, format!("zip entry {}: {}", i, e)))?;
        // Entries escaping the destination are skipped.
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe zip entry {}", entry.name());
            continue;
        };

        let out_path = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| ModSyncError::io_with_path(e, &out_path))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ModSyncError::io_with_path(e, parent))?;
        }

        let mut out_file =
            fs::File::create(&out_path).map_err(|e| ModSyncError::io_with_path(e, &out_path))?;
        io::copy(&mut entry, &mut out_file).map_err(|e| ModSyncError::io_with_path(e, &out_path))?;
    }

    Ok(())
}

fn extract_7z(archive: &Path, dest: &Path) -> Result<()> {
    match sevenz_rust::decompress_file(archive, dest) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("In-process 7z extraction failed ({}), trying external tool", e);
            match extract_with_tool(archive, dest, &["7z", "7za"])? {
                Some(()) => Ok(()),
                None => Err(archive_error(archive, format!("7z extraction failed: {}", e))),
            }
        }
    }
}

fn extract_rar(archive: &Path, dest: &Path) -> Result<()> {
    match extract_with_tool(archive, dest, &["7z", "7za", "unrar"])? {
        Some(()) => Ok(()),
        None => Err(archive_error(
            archive,
            "rar extraction needs 7z, 7za or unrar on PATH",
        )),
    }
}

/// Try each tool in order. `Ok(None)` when none is installed.
fn extract_with_tool(archive: &Path, dest: &Path, tools: &[&str]) -> Result<Option<()>> {
    for tool in tools {
        let mut command = Command::new(tool);
        if *tool == "unrar" {
            command
                .arg("x")
                .arg("-o+")
                .arg("-y")
                .arg(archive)
                .arg(format!("{}{}", dest.display(), std::path::MAIN_SEPARATOR));
        } else {
            command
                .arg("x")
                .arg("-y")
                .arg(format!("-o{}", dest.display()))
                .arg(archive);
        }

        let output = match command.stdout(Stdio::null()).stderr(Stdio::piped()).output() {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(ModSyncError::io_with_path(e, archive)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(archive_error(
                archive,
                format!("{} failed: {}", tool, stderr.trim()),
            ));
        }
        debug!("Extracted {} with {}", archive.display(), tool);
        return Ok(Some(()));
    }
    Ok(None)
}

fn collect_vpks(root: &Path) -> Vec<ExtractedFile> {
    let mut files: Vec<ExtractedFile> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("vpk"))
        })
        .map(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            ExtractedFile {
                entry_path: relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
                path: entry.path().to_path_buf(),
            }
        })
        .collect();
    files.sort_by(|a, b| a.entry_path.cmp(&b.entry_path));
    files
}
