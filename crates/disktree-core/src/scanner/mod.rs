/// Scanner module — subtree measurement and incremental scan sessions.
///
/// Two primitives share one bounded worker pool:
/// - [`Scanner::summarize`] reduces a whole subtree to size/file/dir totals.
/// - [`Scanner::build_level`] materialises one level with each child
///   directory summarised.
///
/// [`Scanner::start_session`] runs the same level build on a background
/// thread and streams [`ScanEvent`]s so a consumer can render while workers
/// are still running.
pub mod cancel;
pub mod parallel;
pub mod progress;
pub mod session;

pub use cancel::CancelToken;
pub use progress::{ScanEvent, SessionToken};
pub use session::ScanSession;

use crate::cache::PathCache;
use crate::config::ScanConfig;
use crate::model::Node;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Totals for an entire subtree, without its shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirSummary {
    pub size: u64,
    pub files: u64,
    /// Directories strictly below the summarised root.
    pub dirs: u64,
    /// Last read error seen anywhere in the subtree.
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("cannot start scanner worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Handle to the shared scanning machinery. Cloning is cheap and shares the
/// pool, the cache and the counters.
#[derive(Clone)]
pub struct Scanner {
    inner: Arc<ScannerInner>,
}

pub(crate) struct ScannerInner {
    pool: rayon::ThreadPool,
    workers: usize,
    follow_symlinks: bool,
    event_capacity: usize,
    cache: PathCache,
    sessions_running: AtomicUsize,
    summaries_started: AtomicU64,
}

impl Scanner {
    pub fn new(config: &ScanConfig, cache: PathCache) -> Result<Self, ScanError> {
        let workers = config.workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("disktree-worker-{i}"))
            .build()?;
        debug!("scanner pool started with {workers} workers");
        Ok(Self {
            inner: Arc::new(ScannerInner {
                pool,
                workers,
                follow_symlinks: config.follow_symlinks,
                event_capacity: config.event_capacity.max(1),
                cache,
                sessions_running: AtomicUsize::new(0),
                summaries_started: AtomicU64::new(0),
            }),
        })
    }

    /// Totals for the subtree under `path`. Never fails; see `DirSummary::error`.
    pub fn summarize(&self, path: &Path, cancel: &CancelToken) -> DirSummary {
        self.inner.summaries_started.fetch_add(1, Ordering::Relaxed);
        parallel::summarize(&self.inner.pool, path, self.inner.follow_symlinks, cancel)
    }

    /// One fully populated level of `path` with summarised subdirectories.
    ///
    /// A fully scanned cache entry for `path` is returned as-is. Fresh results
    /// are cached unless the walk was cancelled or the root was unreadable.
    pub fn build_level(&self, path: &Path, cancel: &CancelToken) -> Node {
        if let Some(cached) = self.inner.cache.get_scanned(path) {
            return (*cached).clone();
        }
        let built = parallel::build_level(
            &self.inner.pool,
            path,
            self.inner.follow_symlinks,
            |dir| self.summarize(dir, cancel),
        );
        match built {
            Ok(node) => {
                if !cancel.is_cancelled() {
                    self.inner.cache.insert(node.clone());
                }
                node
            }
            Err(err) => {
                warn!("cannot read {}: {err}", path.display());
                Node::unreadable(path.to_path_buf(), format!("{}: {err}", path.display()))
            }
        }
    }

    pub fn cache(&self) -> &PathCache {
        &self.inner.cache
    }

    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    pub fn follow_symlinks(&self) -> bool {
        self.inner.follow_symlinks
    }

    /// Sessions whose background thread has not finished yet, across the
    /// whole process.
    pub fn sessions_running(&self) -> usize {
        self.inner.sessions_running.load(Ordering::SeqCst)
    }

    /// Number of `summarize` calls started since this scanner was created.
    pub fn summaries_started(&self) -> u64 {
        self.inner.summaries_started.load(Ordering::Relaxed)
    }
}
