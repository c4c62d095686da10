/// Live view state: turns scan events into rate-limited snapshots.
///
/// The aggregator owns the single live `Node` for the displayed path and is
/// driven from one thread: a frontend calls [`Aggregator::pump`] once per
/// frame (or [`Aggregator::process_events`] and [`Aggregator::tick`]
/// separately with its own clock). Nothing here blocks on a session.
///
/// # Staleness
///
/// Every navigation starts a new session and makes its token the active
/// one. Older sessions keep running in the background; their events are
/// still drained but never touch the live node. A late `ScanDone` from an
/// old session is only written to the cache.
///
/// # Debounce
///
/// `ChildUpdate`s mutate the live node immediately but are published at
/// most once per `debounce` interval. `ScanDone` publishes at once.
///
/// # Loading indicator
///
/// Loading ends no earlier than `loading_min` after it started, and only
/// while at most one session is running process-wide. That count is not
/// per displayed path, so background sessions from rapid navigation can
/// hold the indicator up after the displayed scan has finished.
use crate::cache::PathCache;
use crate::config::ScanConfig;
use crate::error::TrashError;
use crate::model::size::{format_count, format_size};
use crate::model::{Node, SortMode};
use crate::scanner::{CancelToken, ScanError, ScanEvent, ScanSession, Scanner, SessionToken};
use crate::trash::{TrashItem, TrashManager, UndoEntry, UndoStack};
use crossbeam_channel::TryRecvError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Maximum number of events applied per [`Aggregator::process_events`] call.
///
/// Keeps a frame from stalling on a backlog; the rest is picked up next call.
pub const MAX_EVENTS_PER_PUMP: usize = 1_000;

/// What an undo request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    NothingToRestore,
    /// The most recent record was outside the undo window and was dropped
    /// without touching the filesystem. Callers should treat this as nothing
    /// to restore; the record is returned only for reporting.
    Expired(TrashItem),
    Restored { item: TrashItem, restored_to: PathBuf },
}

pub struct Aggregator {
    scanner: Scanner,
    trash: TrashManager,
    undo: UndoStack,
    debounce: Duration,
    loading_min: Duration,
    /// Process-level token; every session runs under a child of it.
    cancel: CancelToken,

    breadcrumbs: Vec<PathBuf>,
    sort: SortMode,

    live: Arc<Node>,
    snapshot: Arc<Node>,
    publications: u64,
    pending: bool,
    flush_at: Option<Instant>,

    active: Option<ScanSession>,
    background: Vec<ScanSession>,

    loading: bool,
    loading_since: Instant,
    /// Set once the active session's `ScanDone` has been applied.
    finish_at: Option<Instant>,
    status: String,
}

impl Aggregator {
    pub fn new(config: &ScanConfig) -> Result<Self, ScanError> {
        Self::with_cache(config, PathCache::new())
    }

    pub fn with_cache(config: &ScanConfig, cache: PathCache) -> Result<Self, ScanError> {
        let scanner = Scanner::new(config, cache)?;
        let empty = Arc::new(Node::pending_dir(PathBuf::new()));
        Ok(Self {
            scanner,
            trash: TrashManager::new(config.trash_dir.clone()),
            undo: UndoStack::new(config.undo_window),
            debounce: config.debounce,
            loading_min: config.loading_min,
            cancel: CancelToken::new(),
            breadcrumbs: Vec::new(),
            sort: SortMode::default(),
            live: empty.clone(),
            snapshot: empty,
            publications: 0,
            pending: false,
            flush_at: None,
            active: None,
            background: Vec::new(),
            loading: false,
            loading_since: Instant::now(),
            finish_at: None,
            status: String::new(),
        })
    }

    // ── Navigation ─────────────────────────────────────────

    /// Start over at `root`, ignoring anything cached for it.
    pub fn open(&mut self, root: PathBuf) {
        self.breadcrumbs = vec![root.clone()];
        self.scanner.cache().invalidate(&root);
        self.status = format!("Scanning {} ...", root.display());
        self.navigate(root, false);
    }

    /// Descend into a child directory of the displayed node.
    ///
    /// Returns `false` (and does nothing) for files and unknown paths.
    pub fn enter(&mut self, path: &Path) -> bool {
        let is_child_dir = self
            .live
            .children
            .iter()
            .any(|c| c.path == path && c.is_dir);
        if !is_child_dir {
            return false;
        }
        self.breadcrumbs.push(path.to_path_buf());
        self.status = format!("Scanning {} ...", path.display());
        self.navigate(path.to_path_buf(), true);
        true
    }

    /// Go back to the parent of the displayed path. No-op at the root.
    pub fn up(&mut self) -> bool {
        if self.breadcrumbs.len() <= 1 {
            return false;
        }
        self.breadcrumbs.pop();
        let target = self.current_path().to_path_buf();
        self.status = format!("Scanning {} ...", target.display());
        self.navigate(target, true);
        true
    }

    /// Rescan the displayed path from disk.
    pub fn rescan(&mut self) {
        let Some(current) = self.breadcrumbs.last().cloned() else {
            return;
        };
        self.scanner.cache().invalidate(&current);
        self.status = format!("Rescanning {} ...", current.display());
        self.navigate(current, false);
    }

    fn navigate(&mut self, path: PathBuf, fast_path: bool) {
        let now = Instant::now();
        if let Some(previous) = self.active.take() {
            debug!("{} superseded; continuing in background", previous.token());
            self.background.push(previous);
        }

        self.live = Arc::new(Node::pending_dir(path.clone()));
        self.pending = false;
        self.flush_at = None;
        self.publish();

        self.loading = true;
        self.loading_since = now;
        self.finish_at = None;

        let session = self.scanner.start_session(path, fast_path, &self.cancel);
        debug!(
            "{} started for {} (fast path: {fast_path})",
            session.token(),
            session.path().display()
        );
        self.active = Some(session);
    }

    // ── Event processing ───────────────────────────────────

    /// Drain queued events from the active and background sessions, then run
    /// [`Aggregator::tick`]. Returns `true` if anything visible changed.
    pub fn pump(&mut self) -> bool {
        let now = Instant::now();
        let applied = self.process_events(now);
        self.tick(now) || applied
    }

    /// Apply up to [`MAX_EVENTS_PER_PUMP`] queued events without blocking.
    pub fn process_events(&mut self, now: Instant) -> bool {
        let mut events = Vec::new();

        if let Some(active) = &self.active {
            while events.len() < MAX_EVENTS_PER_PUMP {
                match active.try_recv() {
                    Ok(event) => events.push(event),
                    Err(_) => break,
                }
            }
        }

        let mut finished = Vec::new();
        for (i, session) in self.background.iter().enumerate() {
            loop {
                if events.len() >= MAX_EVENTS_PER_PUMP {
                    break;
                }
                match session.try_recv() {
                    Ok(event) => events.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        finished.push(i);
                        break;
                    }
                }
            }
        }
        for i in finished.into_iter().rev() {
            let session = self.background.swap_remove(i);
            trace!("{} background session drained", session.token());
            session.join();
        }

        let mut changed = false;
        for event in events {
            changed |= self.handle_event(event, now);
        }
        changed
    }

    /// Apply one event. Events whose token is not the active one never touch
    /// the live node.
    pub fn handle_event(&mut self, event: ScanEvent, now: Instant) -> bool {
        let active = self.active_token();
        match event {
            ScanEvent::ChildUpdate {
                parent,
                child,
                token,
            } => {
                if Some(token) != active || parent != self.live.path {
                    trace!("dropping stale update from {token}");
                    return false;
                }
                let live = Arc::make_mut(&mut self.live);
                live.upsert_child(child);
                live.resum();

                self.pending = true;
                if self.flush_at.is_none() {
                    self.flush_at = Some(now + self.debounce);
                }
                false
            }
            ScanEvent::ScanDone { node, token } => {
                if Some(token) != active {
                    if node.scanned && !node.is_unreadable() {
                        debug!("{token} finished in background; caching {}", node.path.display());
                        self.scanner.cache().insert(node);
                    }
                    return false;
                }
                self.live = node;
                self.pending = false;
                self.flush_at = None;
                self.publish();

                let earliest = self.loading_since + self.loading_min;
                self.finish_at = Some(earliest.max(now));
                self.try_finish_loading(now);
                true
            }
        }
    }

    /// Publish pending updates whose debounce interval has elapsed and leave
    /// the loading state when allowed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if let Some(at) = self.flush_at {
            if now >= at {
                if self.pending {
                    self.publish();
                    self.pending = false;
                    if !self.live.scanned {
                        self.scanner.cache().insert_partial(self.live.clone());
                    }
                    changed = true;
                }
                self.flush_at = None;
            }
        }
        if self.loading {
            changed |= self.try_finish_loading(now);
        }
        changed
    }

    fn try_finish_loading(&mut self, now: Instant) -> bool {
        let Some(at) = self.finish_at else {
            return false;
        };
        if now < at {
            return false;
        }
        let ongoing = self.scanner.sessions_running();
        if ongoing > 1 {
            self.status = format!("Scanning... (ongoing: {ongoing})");
            return false;
        }
        self.loading = false;
        self.finish_at = None;
        self.status = match &self.live.error {
            Some(err) => format!("⚠ {err}"),
            None => format!(
                "{}: {} ({} files, {} dirs)",
                self.live.path.display(),
                format_size(self.live.size_or_zero()),
                format_count(self.live.files),
                format_count(self.live.dirs)
            ),
        };
        true
    }

    fn publish(&mut self) {
        self.snapshot = self.live.clone();
        self.publications += 1;
    }

    /// Block (pumping) until loading ends or `timeout` elapses. Returns
    /// whether loading ended. Meant for headless use and tests.
    pub fn wait_until_loaded(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.loading {
            if Instant::now() >= deadline {
                return false;
            }
            if !self.pump() {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        true
    }

    // ── Delete / undo ──────────────────────────────────────

    /// Move `path` to the holding area and drop it from the live view
    /// without rescanning.
    ///
    /// Refused with [`TrashError::ScanInProgress`] while the displayed path
    /// is loading; queued events for it would re-add the entry.
    pub fn delete(&mut self, path: &Path) -> Result<TrashItem, TrashError> {
        if self.loading {
            debug!("delete of {} refused while loading", path.display());
            self.status = "Scan in progress; wait for it to finish before deleting".to_string();
            return Err(TrashError::ScanInProgress {
                path: path.to_path_buf(),
            });
        }
        let item = match self.trash.move_to_trash(path) {
            Ok(item) => item,
            Err(err) => {
                self.status = format!("⚠ {err}");
                return Err(err);
            }
        };
        self.undo.push(item.clone());

        // Totals cached for ancestors now overstate their size.
        for ancestor in &self.breadcrumbs[..self.breadcrumbs.len().saturating_sub(1)] {
            self.scanner.cache().invalidate(ancestor);
        }

        if path.parent() == Some(self.live.path.as_path()) {
            let live = Arc::make_mut(&mut self.live);
            live.remove_child(path);
            live.resum();
            if !self.live.is_unreadable() {
                self.scanner.cache().insert(self.live.clone());
            }
            self.publish();
            self.status = format!("Deleted {}", item.name);
        } else {
            self.status = format!("Deleted (refresh available for {})", self.live.path.display());
        }
        Ok(item)
    }

    /// Restore the most recent delete if it is still inside the undo window.
    ///
    /// A failed restore drops the record and returns the error.
    pub fn undo(&mut self) -> Result<UndoOutcome, TrashError> {
        let item = match self.undo.pop_restorable(chrono::Utc::now()) {
            UndoEntry::Empty => {
                self.status = "Nothing to restore".to_string();
                return Ok(UndoOutcome::NothingToRestore);
            }
            UndoEntry::Expired(item) => {
                info!("undo window expired for {}", item.orig_path.display());
                self.status = "Undo window expired".to_string();
                return Ok(UndoOutcome::Expired(item));
            }
            UndoEntry::Ready(item) => item,
        };

        let restored_to = match self.trash.restore_from_trash(&item) {
            Ok(path) => path,
            Err(err) => {
                self.status = format!("Restore failed: {err}");
                return Err(err);
            }
        };

        self.status = format!("Restored {}", item.name);
        if restored_to.parent() == Some(self.live.path.as_path()) {
            let current = self.live.path.clone();
            self.scanner.cache().invalidate(&current);
            self.navigate(current, false);
            self.status = format!("Restored {}, refreshing view", item.name);
        }
        Ok(UndoOutcome::Restored { item, restored_to })
    }

    // ── Accessors ──────────────────────────────────────────

    /// The most recently published node. This is what a frontend renders.
    pub fn snapshot(&self) -> Arc<Node> {
        self.snapshot.clone()
    }

    /// The live node, including updates not yet published.
    pub fn live(&self) -> &Node {
        &self.live
    }

    /// Number of snapshot publications so far.
    pub fn publications(&self) -> u64 {
        self.publications
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    pub fn current_path(&self) -> &Path {
        self.breadcrumbs
            .last()
            .map(PathBuf::as_path)
            .unwrap_or(self.live.path.as_path())
    }

    pub fn breadcrumbs(&self) -> &[PathBuf] {
        &self.breadcrumbs
    }

    pub fn active_token(&self) -> Option<SessionToken> {
        self.active.as_ref().map(ScanSession::token)
    }

    pub fn background_sessions(&self) -> usize {
        self.background.len()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn sort(&self) -> SortMode {
        self.sort
    }

    pub fn set_sort(&mut self, sort: SortMode) {
        self.sort = sort;
    }

    pub fn cache(&self) -> &PathCache {
        self.scanner.cache()
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn trash(&self) -> &TrashManager {
        &self.trash
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Cancel every session started by this aggregator and wait for them.
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        for session in self.active.take().into_iter().chain(self.background.drain(..)) {
            session.join();
        }
        self.loading = false;
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
