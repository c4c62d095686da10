/// Disktree Core — scanning, caching, and trash handling for a disk-usage
/// explorer.
///
/// This crate contains all business logic with zero UI dependencies. A
/// frontend drives an [`aggregator::Aggregator`] and renders its snapshots.
///
/// # Modules
///
/// - [`model`] — Directory-level nodes and size formatting.
/// - [`cache`] — Process-wide path → node cache.
/// - [`scanner`] — Bounded parallel summaries and incremental scan sessions.
/// - [`aggregator`] — Token filtering, debounce, and loading state for the live view.
/// - [`trash`] — Recoverable delete with sidecar metadata and time-limited undo.
/// - [`export`] — CSV export of one level.
/// - [`config`] — Scan and trash settings.
pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod scanner;
pub mod trash;

pub use aggregator::{Aggregator, UndoOutcome};
pub use cache::PathCache;
pub use config::ScanConfig;
pub use model::{Node, SortMode};
pub use scanner::{CancelToken, ScanEvent, ScanSession, Scanner, SessionToken};
pub use trash::{TrashItem, TrashManager};
