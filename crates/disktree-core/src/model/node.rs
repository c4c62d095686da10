/// A single filesystem entry together with the aggregate totals of its subtree.
///
/// Unlike an arena tree, a `Node` owns its immediate children directly. Only
/// the level that is currently displayed is ever materialised; deeper levels
/// are reduced to `size` / `files` / `dirs` totals by the scanner.
use compact_str::CompactString;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::scanner::DirSummary;

/// Sort order for the immediate children of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// Largest first; entries still being measured sink to the bottom.
    #[default]
    Size,
    /// Case-insensitive, ascending.
    Name,
}

/// One file or directory and its subtree totals.
///
/// `path` is the identity key everywhere: the cache, child merging and
/// removal all match on it, never on `name` or position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Base name, for display only.
    pub name: CompactString,

    /// Absolute path of the entry.
    pub path: PathBuf,

    /// Subtree byte total. `None` while a directory is still being measured.
    pub size: Option<u64>,

    /// Number of regular files in the subtree.
    pub files: u64,

    /// Directory count as reported by the aggregation rule.
    ///
    /// A parent sums its children's `dirs` values but never counts the
    /// immediate child directories themselves, so this is lower than a naive
    /// subtree directory count by exactly the number of immediate
    /// subdirectories. Percentages and the status line depend on this.
    pub dirs: u64,

    pub is_dir: bool,

    /// Immediate children. Empty for files and for summarised directories.
    pub children: Vec<Node>,

    /// Last read error seen inside the subtree. Informational only.
    pub error: Option<String>,

    /// `true` once the totals are final and `children` is load-complete.
    pub scanned: bool,
}

impl Node {
    /// A regular file with a known size.
    pub fn file(path: PathBuf, size: u64) -> Self {
        Self {
            name: display_name(&path),
            path,
            size: Some(size),
            files: 1,
            dirs: 0,
            is_dir: false,
            children: Vec::new(),
            error: None,
            scanned: true,
        }
    }

    /// A directory whose totals are not known yet.
    pub fn pending_dir(path: PathBuf) -> Self {
        Self {
            name: display_name(&path),
            path,
            size: None,
            files: 0,
            dirs: 0,
            is_dir: true,
            children: Vec::new(),
            error: None,
            scanned: false,
        }
    }

    /// A directory reduced to its subtree totals, without children.
    pub fn summarized_dir(path: PathBuf, summary: DirSummary) -> Self {
        Self {
            name: display_name(&path),
            path,
            size: Some(summary.size),
            files: summary.files,
            dirs: summary.dirs,
            is_dir: true,
            children: Vec::new(),
            error: summary.error,
            scanned: false,
        }
    }

    /// Terminal node for a path whose listing could not be read at all.
    pub fn unreadable(path: PathBuf, error: String) -> Self {
        Self {
            name: display_name(&path),
            path,
            size: Some(0),
            files: 0,
            dirs: 0,
            is_dir: true,
            children: Vec::new(),
            error: Some(error),
            scanned: true,
        }
    }

    /// Whether this is the terminal node produced for a path whose listing
    /// failed outright. Such nodes are never cached.
    pub fn is_unreadable(&self) -> bool {
        self.is_dir
            && self.scanned
            && self.error.is_some()
            && self.children.is_empty()
            && self.size == Some(0)
    }

    /// A fully scanned directory built from its immediate children.
    ///
    /// The last child error (in child order) is carried up.
    pub fn from_children(path: PathBuf, children: Vec<Node>) -> Self {
        let mut node = Self {
            name: display_name(&path),
            path,
            size: Some(0),
            files: 0,
            dirs: 0,
            is_dir: true,
            children,
            error: None,
            scanned: true,
        };
        node.resum();
        node.error = node.children.iter().rev().find_map(|c| c.error.clone());
        node
    }

    /// Recompute `size`, `files` and `dirs` from the immediate children.
    ///
    /// Pending children contribute 0 bytes.
    pub fn resum(&mut self) {
        let (mut size, mut files, mut dirs) = (0u64, 0u64, 0u64);
        for child in &self.children {
            size += child.size_or_zero();
            files += child.files;
            dirs += child.dirs;
        }
        self.size = Some(size);
        self.files = files;
        self.dirs = dirs;
    }

    /// Byte total with the "in progress" state read as 0.
    #[inline]
    pub fn size_or_zero(&self) -> u64 {
        self.size.unwrap_or(0)
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.size.is_none()
    }

    /// Replace the child with the same path in place, or append it.
    ///
    /// Returns `true` if an existing child was replaced.
    pub fn upsert_child(&mut self, child: Node) -> bool {
        match self.children.iter_mut().find(|c| c.path == child.path) {
            Some(slot) => {
                *slot = child;
                true
            }
            None => {
                self.children.push(child);
                false
            }
        }
    }

    /// Remove the child at `path`, returning it if it was present.
    pub fn remove_child(&mut self, path: &Path) -> Option<Node> {
        let pos = self.children.iter().position(|c| c.path == path)?;
        Some(self.children.remove(pos))
    }

    /// Sum of the children's byte totals; the denominator for percentages.
    pub fn children_total(&self) -> u64 {
        self.children.iter().map(Node::size_or_zero).sum()
    }

    /// Immediate children in display order.
    pub fn sorted_children(&self, mode: SortMode) -> Vec<&Node> {
        let mut children: Vec<&Node> = self.children.iter().collect();
        match mode {
            SortMode::Name => children.sort_by_cached_key(|c| c.name.to_lowercase()),
            SortMode::Size => children.sort_by(|a, b| match (a.size, b.size) {
                (Some(a), Some(b)) => b.cmp(&a),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }),
        }
        children
    }
}

/// Share of `total` taken by `size`, in percent (0.0–100.0).
pub fn percent_of(size: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        size as f64 / total as f64 * 100.0
    }
}

/// Base name of `path`; filesystem roots show the full path instead.
pub fn display_name(path: &Path) -> CompactString {
    match path.file_name() {
        Some(name) => CompactString::new(name.to_string_lossy()),
        None => CompactString::new(path.to_string_lossy()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir_with(path: &str, size: u64, files: u64, dirs: u64) -> Node {
        Node::summarized_dir(
            PathBuf::from(path),
            DirSummary {
                size,
                files,
                dirs,
                error: None,
            },
        )
    }

    #[test]
    fn from_children_does_not_count_immediate_dirs() {
        let children = vec![
            dir_with("/r/a", 300, 2, 1),
            Node::file(PathBuf::from("/r/file3"), 300),
        ];
        let node = Node::from_children(PathBuf::from("/r"), children);

        assert_eq!(node.size, Some(600));
        assert_eq!(node.files, 3);
        // `a` itself is not counted, only its nested `b`.
        assert_eq!(node.dirs, 1);
        assert!(node.scanned);
    }

    #[test]
    fn unreadable_is_distinguished_from_scanned_levels() {
        let broken = Node::unreadable(PathBuf::from("/gone"), "denied".into());
        assert!(broken.is_unreadable());

        let empty = Node::from_children(PathBuf::from("/empty"), Vec::new());
        assert!(!empty.is_unreadable());
        assert!(!Node::pending_dir(PathBuf::from("/p")).is_unreadable());
    }

    #[test]
    fn pending_children_sum_as_zero() {
        let mut node = Node::pending_dir(PathBuf::from("/r"));
        node.upsert_child(Node::pending_dir(PathBuf::from("/r/big")));
        node.upsert_child(Node::file(PathBuf::from("/r/f"), 10));
        node.resum();
        assert_eq!(node.size, Some(10));
        assert_eq!(node.files, 1);
    }

    #[test]
    fn upsert_replaces_by_path_in_place() {
        let mut node = Node::pending_dir(PathBuf::from("/r"));
        node.upsert_child(Node::pending_dir(PathBuf::from("/r/a")));
        node.upsert_child(Node::file(PathBuf::from("/r/b"), 1));

        let replaced = node.upsert_child(dir_with("/r/a", 50, 1, 0));
        assert!(replaced);
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[0].path, PathBuf::from("/r/a"));
        assert_eq!(node.children[0].size, Some(50));
    }

    #[test]
    fn last_child_error_wins() {
        let mut a = dir_with("/r/a", 1, 1, 0);
        a.error = Some("first".into());
        let mut b = dir_with("/r/b", 1, 1, 0);
        b.error = Some("second".into());
        let node = Node::from_children(PathBuf::from("/r"), vec![a, b]);
        assert_eq!(node.error.as_deref(), Some("second"));
    }

    #[test]
    fn size_sort_puts_pending_last() {
        let mut node = Node::pending_dir(PathBuf::from("/r"));
        node.upsert_child(Node::pending_dir(PathBuf::from("/r/p")));
        node.upsert_child(Node::file(PathBuf::from("/r/small"), 1));
        node.upsert_child(Node::file(PathBuf::from("/r/big"), 100));

        let names: Vec<&str> = node
            .sorted_children(SortMode::Size)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, ["big", "small", "p"]);
    }

    #[test]
    fn name_sort_ignores_case() {
        let mut node = Node::pending_dir(PathBuf::from("/r"));
        node.upsert_child(Node::file(PathBuf::from("/r/beta"), 1));
        node.upsert_child(Node::file(PathBuf::from("/r/Alpha"), 1));
        let names: Vec<&str> = node
            .sorted_children(SortMode::Name)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, ["Alpha", "beta"]);
    }

    #[test]
    fn remove_child_matches_path() {
        let mut node = Node::pending_dir(PathBuf::from("/r"));
        node.upsert_child(Node::file(PathBuf::from("/r/x"), 5));
        assert!(node.remove_child(Path::new("/r/y")).is_none());
        assert!(node.remove_child(Path::new("/r/x")).is_some());
        assert!(node.children.is_empty());
    }

    #[test]
    fn root_display_name_is_full_path() {
        assert_eq!(display_name(Path::new("/")), "/");
        assert_eq!(display_name(Path::new("/home/user")), "user");
    }
}
