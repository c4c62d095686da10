/// Holding area for deleted entries, with reversible moves.
///
/// A delete renames the entry into the holding area and writes a JSON
/// sidecar (`<entry>.meta.json`) next to it recording where it came from.
/// The sidecar is what makes the move recoverable after a crash:
/// [`TrashManager::items`] rebuilds the records from disk.
///
/// When a rename is impossible (different filesystem) both directions fall
/// back to a recursive copy followed by removal of the source. A failure
/// leaves the source where it was.
pub mod copy;
pub mod undo;

pub use undo::{UndoEntry, UndoStack, MAX_UNDO_HISTORY};

use crate::error::TrashError;
use chrono::{DateTime, Utc};
use copy::{copy_recursive, remove_any};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extension appended to a holding-area entry's path for its sidecar.
pub const META_SUFFIX: &str = ".meta.json";

/// Record of one entry moved into the holding area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashItem {
    /// Base name of the original entry.
    pub name: String,
    /// Where the entry lives inside the holding area.
    pub trash_path: PathBuf,
    /// Absolute path it was moved from.
    pub orig_path: PathBuf,
    pub deleted_at: DateTime<Utc>,
    pub is_dir: bool,
}

impl TrashItem {
    /// Path of the sidecar metadata file for this record.
    pub fn meta_path(&self) -> PathBuf {
        meta_path(&self.trash_path)
    }
}

#[derive(Debug, Clone)]
pub struct TrashManager {
    dir: PathBuf,
}

impl TrashManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The holding-area directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Move `src` into the holding area and record where it came from.
    ///
    /// The entry keeps its base name unless that name is taken, in which case
    /// a short random suffix is appended.
    pub fn move_to_trash(&self, src: &Path) -> Result<TrashItem, TrashError> {
        fs::create_dir_all(&self.dir).map_err(|source| TrashError::CreateHoldingArea {
            path: self.dir.clone(),
            source,
        })?;

        let meta = fs::symlink_metadata(src).map_err(|source| TrashError::MissingSource {
            path: src.to_path_buf(),
            source,
        })?;
        let name = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| src.to_string_lossy().into_owned());

        let mut dst = self.dir.join(&name);
        if exists(&dst) || exists(&meta_path(&dst)) {
            dst = with_suffix(&dst, &random_suffix());
        }

        relocate(src, &dst)?;

        let item = TrashItem {
            name,
            trash_path: dst,
            orig_path: src.to_path_buf(),
            deleted_at: Utc::now(),
            is_dir: meta.is_dir(),
        };

        if let Err(err) = write_meta(&item) {
            // Without a sidecar the move could not be recovered after a crash;
            // put the entry back.
            if let Err(undo_err) = relocate(&item.trash_path, src) {
                warn!(
                    "cannot roll back {} after metadata failure: {undo_err}",
                    item.trash_path.display()
                );
            }
            return Err(err);
        }

        info!(
            "moved {} to holding area as {}",
            src.display(),
            item.trash_path.display()
        );
        Ok(item)
    }

    /// Move a holding-area entry back where it came from.
    ///
    /// If the original path is occupied the entry is restored next to it as
    /// `<original>-<n>` with the smallest free `n`. Returns the path the
    /// entry was restored to. The sidecar is removed on success.
    pub fn restore_from_trash(&self, item: &TrashItem) -> Result<PathBuf, TrashError> {
        fs::symlink_metadata(&item.trash_path).map_err(|source| TrashError::MissingEntry {
            path: item.trash_path.clone(),
            source,
        })?;

        let dst = free_restore_path(&item.orig_path);
        if let Some(parent) = dst.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| TrashError::Copy {
                    from: item.trash_path.clone(),
                    to: dst.clone(),
                    source,
                })?;
            }
        }

        relocate(&item.trash_path, &dst)?;

        let meta = item.meta_path();
        match fs::remove_file(&meta) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!("cannot remove {}: {err}", meta.display()),
        }

        info!("restored {} to {}", item.name, dst.display());
        Ok(dst)
    }

    /// Every record in the holding area whose entry still exists, oldest first.
    ///
    /// Malformed sidecars are skipped with a warning.
    pub fn items(&self) -> Result<Vec<TrashItem>, TrashError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(TrashError::ReadMeta {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut items = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.to_string_lossy().ends_with(META_SUFFIX) {
                continue;
            }
            match read_meta(&path) {
                Ok(item) if exists(&item.trash_path) => items.push(item),
                Ok(item) => debug!("{} has no backing entry", item.trash_path.display()),
                Err(err) => warn!("{err}"),
            }
        }
        items.sort_by_key(|item| item.deleted_at);
        Ok(items)
    }
}

/// Sidecar path for a holding-area entry.
pub fn meta_path(trash_path: &Path) -> PathBuf {
    let mut raw: OsString = trash_path.as_os_str().to_owned();
    raw.push(META_SUFFIX);
    PathBuf::from(raw)
}

fn write_meta(item: &TrashItem) -> Result<(), TrashError> {
    let path = item.meta_path();
    let bytes = serde_json::to_vec(item).map_err(|source| TrashError::EncodeMeta {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, bytes).map_err(|source| TrashError::WriteMeta { path, source })
}

fn read_meta(path: &Path) -> Result<TrashItem, TrashError> {
    let bytes = fs::read(path).map_err(|source| TrashError::ReadMeta {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| TrashError::DecodeMeta {
        path: path.to_path_buf(),
        source,
    })
}

/// Rename `from` to `to`, or copy then remove when renaming fails.
///
/// A failed copy removes whatever part of `to` was written.
fn relocate(from: &Path, to: &Path) -> Result<(), TrashError> {
    match fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(err) => debug!(
            "rename {} -> {} failed ({err}), copying instead",
            from.display(),
            to.display()
        ),
    }

    if let Err(source) = copy_recursive(from, to) {
        if exists(to) {
            let _ = remove_any(to);
        }
        return Err(TrashError::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        });
    }
    remove_any(from).map_err(|source| TrashError::RemoveSource {
        path: from.to_path_buf(),
        source,
    })
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// `-` followed by 12 random hex digits.
fn random_suffix() -> String {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut suffix = String::with_capacity(13);
    suffix.push('-');
    for b in bytes {
        suffix.push_str(&format!("{b:02x}"));
    }
    suffix
}

/// `orig` if free, else the first free `orig-1`, `orig-2`, ...
fn free_restore_path(orig: &Path) -> PathBuf {
    if !exists(orig) {
        return orig.to_path_buf();
    }
    (1u32..)
        .map(|n| with_suffix(orig, &format!("-{n}")))
        .find(|candidate| !exists(candidate))
        .unwrap_or_else(|| with_suffix(orig, &random_suffix()))
}
