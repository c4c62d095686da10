/// Scan, view and trash settings.
///
/// Everything has a sensible default; `from_env` layers a handful of
/// environment overrides on top so the headless binary needs no flag parser.
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Capacity of each session's event channel.
///
/// Large enough that workers rarely stall on a consumer that drains once per
/// frame; when it does fill up, producers block rather than drop events.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Default coalescing window between snapshot publications.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Default minimum time the loading indicator stays visible.
pub const DEFAULT_LOADING_MIN: Duration = Duration::from_millis(500);

/// Default window during which a delete can be undone.
pub const DEFAULT_UNDO_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Maximum number of concurrently running subtree computations.
    pub workers: usize,
    /// Follow symbolic links instead of skipping them. Cycles are not detected.
    pub follow_symlinks: bool,
    pub debounce: Duration,
    pub loading_min: Duration,
    /// Zero disables expiry.
    pub undo_window: Duration,
    /// Holding area for deleted entries.
    pub trash_dir: PathBuf,
    pub event_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: (num_cpus::get() * 4).max(1),
            follow_symlinks: false,
            debounce: DEFAULT_DEBOUNCE,
            loading_min: DEFAULT_LOADING_MIN,
            undo_window: DEFAULT_UNDO_WINDOW,
            trash_dir: default_trash_dir(),
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl ScanConfig {
    /// Defaults overridden by `DISKTREE_WORKERS`, `DISKTREE_FOLLOW_SYMLINKS`,
    /// `DISKTREE_UNDO_SECS` and `DISKTREE_TRASH_DIR`.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("DISKTREE_WORKERS") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.workers = n,
                _ => warn!("ignoring DISKTREE_WORKERS={raw:?}: expected a positive integer"),
            }
        }
        if let Some(raw) = lookup("DISKTREE_FOLLOW_SYMLINKS") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.follow_symlinks = true,
                "0" | "false" | "no" => self.follow_symlinks = false,
                _ => warn!("ignoring DISKTREE_FOLLOW_SYMLINKS={raw:?}: expected a boolean"),
            }
        }
        if let Some(raw) = lookup("DISKTREE_UNDO_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.undo_window = Duration::from_secs(secs),
                Err(_) => warn!("ignoring DISKTREE_UNDO_SECS={raw:?}: expected seconds"),
            }
        }
        if let Some(raw) = lookup("DISKTREE_TRASH_DIR") {
            if !raw.is_empty() {
                self.trash_dir = PathBuf::from(raw);
            }
        }
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_loading_min(mut self, loading_min: Duration) -> Self {
        self.loading_min = loading_min;
        self
    }

    pub fn with_undo_window(mut self, undo_window: Duration) -> Self {
        self.undo_window = undo_window;
        self
    }

    pub fn with_trash_dir(mut self, trash_dir: impl Into<PathBuf>) -> Self {
        self.trash_dir = trash_dir.into();
        self
    }

    /// Session event channel capacity, at least 1.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

/// `$XDG_DATA_HOME/disktree/trash`, else `~/.local/share/disktree/trash`,
/// else `./.disktree_trash`.
pub fn default_trash_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg).join("disktree").join("trash");
    }
    match dirs::home_dir() {
        Some(home) => home.join(".local").join("share").join("disktree").join("trash"),
        None => PathBuf::from("./.disktree_trash"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = ScanConfig::default();
        assert!(cfg.workers >= 1);
        assert!(!cfg.follow_symlinks);
        assert_eq!(cfg.debounce, Duration::from_millis(100));
        assert_eq!(cfg.undo_window, Duration::from_secs(30));
        assert_eq!(cfg.event_capacity, EVENT_CHANNEL_CAPACITY);
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = ScanConfig::default().with_overrides(lookup(&[
            ("DISKTREE_WORKERS", "3"),
            ("DISKTREE_FOLLOW_SYMLINKS", "yes"),
            ("DISKTREE_UNDO_SECS", "5"),
            ("DISKTREE_TRASH_DIR", "/tmp/holding"),
        ]));
        assert_eq!(cfg.workers, 3);
        assert!(cfg.follow_symlinks);
        assert_eq!(cfg.undo_window, Duration::from_secs(5));
        assert_eq!(cfg.trash_dir, PathBuf::from("/tmp/holding"));
    }

    #[test]
    fn malformed_overrides_are_ignored() {
        let base = ScanConfig::default();
        let cfg = base.clone().with_overrides(lookup(&[
            ("DISKTREE_WORKERS", "0"),
            ("DISKTREE_FOLLOW_SYMLINKS", "maybe"),
            ("DISKTREE_UNDO_SECS", "soon"),
        ]));
        assert_eq!(cfg.workers, base.workers);
        assert!(!cfg.follow_symlinks);
        assert_eq!(cfg.undo_window, base.undo_window);
    }

    #[test]
    fn with_workers_never_zero() {
        assert_eq!(ScanConfig::default().with_workers(0).workers, 1);
    }
}
