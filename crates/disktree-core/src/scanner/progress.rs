/// Scan events — the messages a session streams to its consumer.
///
/// Per directory entry a session sends one or two `ChildUpdate`s, then a
/// single `ScanDone` once every worker has joined. Every event carries the
/// token of the session that produced it so that a consumer can drop
/// anything coming from a session it no longer listens to.
use crate::model::Node;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier of one scan invocation. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(u64);

impl SessionToken {
    pub fn fresh() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scan-{:04x}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A child of `parent` appeared or got its final totals.
    ///
    /// Directories are announced twice: first with `size == None` as a
    /// placeholder, then with their summarised totals.
    ChildUpdate {
        parent: PathBuf,
        child: Node,
        token: SessionToken,
    },
    /// The fully aggregated node for the session's target path. Always last.
    ScanDone {
        node: Arc<Node>,
        token: SessionToken,
    },
}

impl ScanEvent {
    pub fn token(&self) -> SessionToken {
        match self {
            Self::ChildUpdate { token, .. } | Self::ScanDone { token, .. } => *token,
        }
    }
}
