/// Bounded-parallel subtree walker built on a fixed-size `rayon` pool.
///
/// # Admission
///
/// Every directory below the root becomes one job on the scanner's pool.
/// The pool has exactly `workers` threads, so at most that many directory
/// reads are in flight at any depth, no matter how wide or deep the tree
/// is. Jobs queue rather than spawn threads.
///
/// # Shared counters
///
/// All jobs of one `summarize` call accumulate into a single set of atomic
/// counters. No intermediate tree is kept: a subtree of any size costs
/// four words of state.
use super::cancel::CancelToken;
use super::DirSummary;
use crate::model::Node;
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// What a directory entry contributes to a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    Dir,
    File(u64),
}

/// One directory listing, sorted by file name.
#[derive(Debug, Default)]
pub(crate) struct Listing {
    pub entries: Vec<(PathBuf, EntryKind)>,
    /// Last per-entry error encountered while listing.
    pub error: Option<String>,
}

/// Classify an entry without following symlinks unless asked to.
///
/// `None` means the entry is a skipped symlink and contributes nothing.
pub(crate) fn classify(entry: &fs::DirEntry, follow_symlinks: bool) -> io::Result<Option<EntryKind>> {
    let file_type = entry.file_type()?;
    if file_type.is_symlink() {
        if !follow_symlinks {
            return Ok(None);
        }
        let meta = fs::metadata(entry.path())?;
        return Ok(Some(if meta.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File(meta.len())
        }));
    }
    if file_type.is_dir() {
        Ok(Some(EntryKind::Dir))
    } else {
        Ok(Some(EntryKind::File(entry.metadata()?.len())))
    }
}

/// List the immediate entries of `path`.
///
/// Fails only if `path` itself cannot be opened; unreadable entries are
/// dropped and remembered in `Listing::error`.
pub(crate) fn list_dir(path: &Path, follow_symlinks: bool) -> io::Result<Listing> {
    let mut listing = Listing::default();
    for entry in fs::read_dir(path)? {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                listing.error = Some(format!("{}: {err}", path.display()));
                continue;
            }
        };
        match classify(&entry, follow_symlinks) {
            Ok(None) => {}
            Ok(Some(kind)) => listing.entries.push((entry.path(), kind)),
            Err(err) => listing.error = Some(format!("{}: {err}", entry.path().display())),
        }
    }
    listing
        .entries
        .sort_unstable_by(|(a, _), (b, _)| a.file_name().cmp(&b.file_name()));
    Ok(listing)
}

#[derive(Default)]
struct Totals {
    size: AtomicU64,
    files: AtomicU64,
    dirs: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl Totals {
    fn record_error(&self, path: &Path, err: io::Error) {
        *self.last_error.lock() = Some(format!("{}: {err}", path.display()));
    }

    fn into_summary(self) -> DirSummary {
        DirSummary {
            size: self.size.into_inner(),
            files: self.files.into_inner(),
            dirs: self.dirs.into_inner(),
            error: self.last_error.into_inner(),
        }
    }
}

/// Walk the whole subtree under `root` and return its totals.
///
/// `dirs` counts every directory strictly below `root`. A read failure
/// anywhere is recorded (last one wins) and the walk carries on with the
/// siblings; the totals returned are then partial.
pub(crate) fn summarize(
    pool: &ThreadPool,
    root: &Path,
    follow_symlinks: bool,
    cancel: &CancelToken,
) -> DirSummary {
    let totals = Totals::default();
    pool.scope(|scope| walk(scope, root.to_path_buf(), &totals, follow_symlinks, cancel));
    totals.into_summary()
}

fn walk<'s>(
    scope: &rayon::Scope<'s>,
    dir: PathBuf,
    totals: &'s Totals,
    follow_symlinks: bool,
    cancel: &'s CancelToken,
) {
    // Checked once per job, i.e. each time a pool slot is granted.
    if cancel.is_cancelled() {
        return;
    }
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) => {
            totals.record_error(&dir, err);
            return;
        }
    };
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                totals.record_error(&dir, err);
                continue;
            }
        };
        match classify(&entry, follow_symlinks) {
            Ok(None) => {}
            Ok(Some(EntryKind::Dir)) => {
                totals.dirs.fetch_add(1, Ordering::Relaxed);
                let child = entry.path();
                scope.spawn(move |scope| walk(scope, child, totals, follow_symlinks, cancel));
            }
            Ok(Some(EntryKind::File(len))) => {
                totals.size.fetch_add(len, Ordering::Relaxed);
                totals.files.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => totals.record_error(&entry.path(), err),
        }
    }
}

/// One level of `path`: files read directly, subdirectories summarised on
/// the pool, aggregated into a scanned `Node`.
///
/// Fails only when `path` itself cannot be listed.
pub(crate) fn build_level(
    pool: &ThreadPool,
    path: &Path,
    follow_symlinks: bool,
    summarize_dir: impl Fn(&Path) -> DirSummary + Sync,
) -> io::Result<Node> {
    let Listing { entries, error } = list_dir(path, follow_symlinks)?;

    let children: Vec<Node> = pool.install(|| {
        entries
            .into_par_iter()
            .map(|(child, kind)| match kind {
                EntryKind::Dir => {
                    let summary = summarize_dir(&child);
                    Node::summarized_dir(child, summary)
                }
                EntryKind::File(len) => Node::file(child, len),
            })
            .collect()
    });

    let mut node = Node::from_children(path.to_path_buf(), children);
    if error.is_some() {
        node.error = error;
    }
    Ok(node)
}
