/// Incremental scan sessions.
///
/// A session builds one level the same way [`Scanner::build_level`] does,
/// but reports every entry as it is discovered. One coordinating thread
/// lists the target and handles files inline; each child directory becomes
/// one job on the scanner pool, so the session shares the scanner's worker
/// bound with every other session and one-shot call.
///
/// Events go through a bounded channel. A full channel blocks the producer
/// (back-pressure, never loss); dropping the receiver turns every further
/// send into a no-op while the computation still finishes and lands in the
/// cache.
use super::cancel::CancelToken;
use super::parallel::{list_dir, EntryKind};
use super::progress::{ScanEvent, SessionToken};
use super::{Scanner, ScannerInner};
use crate::model::Node;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A running (or finished) scan of one path.
///
/// The background thread is owned here: call [`ScanSession::join`] to wait
/// for it or [`ScanSession::detach`] to let it finish on its own. Dropping
/// the session detaches it.
pub struct ScanSession {
    token: SessionToken,
    path: PathBuf,
    events: Receiver<ScanEvent>,
    cancel: CancelToken,
    thread: Option<thread::JoinHandle<()>>,
}

impl ScanSession {
    pub fn token(&self) -> SessionToken {
        self.token
    }

    /// The target path of this session.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn events(&self) -> &Receiver<ScanEvent> {
        &self.events
    }

    /// Block for the next event; `None` once the stream has ended.
    pub fn recv(&self) -> Option<ScanEvent> {
        self.events.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<ScanEvent, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<ScanEvent, TryRecvError> {
        self.events.try_recv()
    }

    /// Stop scheduling new work. Events already queued stay readable.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the background thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Wait for the background thread. Unread events are discarded so a
    /// producer blocked on a full channel can make progress.
    pub fn join(mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        while !handle.is_finished() {
            match self.events.recv_timeout(Duration::from_millis(10)) {
                Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        if handle.join().is_err() {
            warn!("{} session thread panicked", self.token);
        }
    }

    /// Let the session run to completion unobserved. Its result still ends
    /// up in the cache.
    pub fn detach(mut self) {
        if self.thread.take().is_some() {
            debug!("{} detached", self.token);
        }
    }
}

/// Decrements the process-wide running-session count when the session
/// thread exits, whatever path it exits by.
struct RunningGuard(Arc<ScannerInner>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.sessions_running.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Scanner {
    /// Start scanning `path` in the background.
    ///
    /// With `fast_path`, a fully scanned cache entry for `path` is answered
    /// with a lone `ScanDone` and no workers are started. `cancel` is the
    /// caller's token; the session works under a child of it.
    pub fn start_session(&self, path: PathBuf, fast_path: bool, cancel: &CancelToken) -> ScanSession {
        let token = SessionToken::fresh();
        let cancel = cancel.child();
        let (tx, rx) = crossbeam_channel::bounded::<ScanEvent>(self.inner.event_capacity);

        self.inner.sessions_running.fetch_add(1, Ordering::SeqCst);
        let guard = RunningGuard(self.inner.clone());
        let scanner = self.clone();
        let worker_cancel = cancel.clone();
        let target = path.clone();

        let thread = thread::Builder::new()
            .name("disktree-session".into())
            .spawn(move || {
                let _guard = guard;
                run_session(&scanner, &target, fast_path, token, tx, &worker_cancel);
            })
            .expect("failed to spawn session thread");

        ScanSession {
            token,
            path,
            events: rx,
            cancel,
            thread: Some(thread),
        }
    }
}

fn run_session(
    scanner: &Scanner,
    path: &Path,
    fast_path: bool,
    token: SessionToken,
    tx: Sender<ScanEvent>,
    cancel: &CancelToken,
) {
    let start = Instant::now();

    if fast_path {
        if let Some(node) = scanner.cache().get_scanned(path) {
            debug!("{token} fast path hit for {}", path.display());
            let _ = tx.send(ScanEvent::ScanDone { node, token });
            return;
        }
    }

    info!("{token} scanning {}", path.display());

    let listing = match list_dir(path, scanner.follow_symlinks()) {
        Ok(listing) => listing,
        Err(err) => {
            warn!("{token} cannot read {}: {err}", path.display());
            let node = Node::unreadable(path.to_path_buf(), format!("{}: {err}", path.display()));
            let _ = tx.send(ScanEvent::ScanDone {
                node: Arc::new(node),
                token,
            });
            return;
        }
    };

    let parent = path.to_path_buf();
    let children: Mutex<Vec<Node>> = Mutex::new(Vec::with_capacity(listing.entries.len()));

    scanner.inner.pool.in_place_scope(|scope| {
        for (child_path, kind) in listing.entries {
            if cancel.is_cancelled() {
                break;
            }
            match kind {
                EntryKind::File(len) => {
                    let child = Node::file(child_path, len);
                    children.lock().push(child.clone());
                    let _ = tx.send(ScanEvent::ChildUpdate {
                        parent: parent.clone(),
                        child,
                        token,
                    });
                }
                EntryKind::Dir => {
                    let placeholder = Node::pending_dir(child_path.clone());
                    let slot = {
                        let mut children = children.lock();
                        children.push(placeholder.clone());
                        children.len() - 1
                    };
                    let _ = tx.send(ScanEvent::ChildUpdate {
                        parent: parent.clone(),
                        child: placeholder,
                        token,
                    });

                    let (tx, parent, children) = (tx.clone(), parent.clone(), &children);
                    scope.spawn(move |_| {
                        if cancel.is_cancelled() {
                            return;
                        }
                        let summary = scanner.summarize(&child_path, cancel);
                        if cancel.is_cancelled() {
                            // Partial totals; do not report them.
                            return;
                        }
                        let child = Node::summarized_dir(child_path, summary);
                        children.lock()[slot] = child.clone();
                        let _ = tx.send(ScanEvent::ChildUpdate {
                            parent,
                            child,
                            token,
                        });
                    });
                }
            }
        }
    });

    if cancel.is_cancelled() {
        info!("{token} cancelled after {:?}", start.elapsed());
        return;
    }

    let mut node = Node::from_children(parent, children.into_inner());
    if listing.error.is_some() {
        node.error = listing.error;
    }
    let node = Arc::new(node);
    scanner.cache().insert(node.clone());

    info!(
        "{token} finished {} in {:?}: {} bytes, {} files, {} dirs",
        path.display(),
        start.elapsed(),
        node.size_or_zero(),
        node.files,
        node.dirs
    );
    let _ = tx.send(ScanEvent::ScanDone { node, token });
}
