/// Process-lifetime cache of computed nodes, keyed by absolute path.
///
/// Entries are immutable `Arc<Node>` snapshots: writers replace a whole entry,
/// readers get a cheap refcount bump and can never observe a half-updated
/// node. Each write is a single key/value replacement, so callers never need
/// an outer lock.
use crate::model::Node;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Shared handle to the cache. Cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct PathCache {
    inner: Arc<RwLock<HashMap<PathBuf, Arc<Node>>>>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last stored node for `path`, fully or partially computed.
    pub fn get(&self, path: &Path) -> Option<Arc<Node>> {
        self.inner.read().get(path).cloned()
    }

    /// The stored node for `path` only if it is fully scanned.
    pub fn get_scanned(&self, path: &Path) -> Option<Arc<Node>> {
        self.get(path).filter(|n| n.scanned)
    }

    /// Store `node` under its own path, replacing any previous entry.
    pub fn insert(&self, node: impl Into<Arc<Node>>) {
        let node = node.into();
        self.inner.write().insert(node.path.clone(), node);
    }

    /// Store a partially computed `node` unless a fully scanned entry for the
    /// same path is already present. Returns whether it was stored.
    pub fn insert_partial(&self, node: impl Into<Arc<Node>>) -> bool {
        let node = node.into();
        let mut map = self.inner.write();
        if map.get(&node.path).is_some_and(|n| n.scanned) {
            return false;
        }
        map.insert(node.path.clone(), node);
        true
    }

    /// Drop the entry for `path`. Returns `true` if one was present.
    pub fn invalidate(&self, path: &Path) -> bool {
        let removed = self.inner.write().remove(path).is_some();
        if removed {
            debug!("cache invalidated for {}", path.display());
        }
        removed
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
