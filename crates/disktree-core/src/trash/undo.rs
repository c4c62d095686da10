/// Undo history for deletes: a LIFO stack with a rolling time window.
use super::TrashItem;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Maximum number of deletes remembered. The oldest record is dropped first;
/// its holding-area entry stays on disk.
pub const MAX_UNDO_HISTORY: usize = 100;

/// Result of popping the most recent delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoEntry {
    Empty,
    /// The record was older than the undo window and has been discarded.
    Expired(TrashItem),
    Ready(TrashItem),
}

#[derive(Debug, Clone)]
pub struct UndoStack {
    items: Vec<TrashItem>,
    window: Duration,
}

impl UndoStack {
    /// A zero `window` never expires records.
    pub fn new(window: Duration) -> Self {
        Self {
            items: Vec::new(),
            window,
        }
    }

    pub fn push(&mut self, item: TrashItem) {
        if self.items.len() >= MAX_UNDO_HISTORY {
            self.items.remove(0);
        }
        self.items.push(item);
    }

    /// Pop the most recent record, checking it against the window at `now`.
    ///
    /// Either way the record leaves the stack; an expired one is never
    /// offered for restore.
    pub fn pop_restorable(&mut self, now: DateTime<Utc>) -> UndoEntry {
        let Some(item) = self.items.pop() else {
            return UndoEntry::Empty;
        };
        if self.is_expired(&item, now) {
            UndoEntry::Expired(item)
        } else {
            UndoEntry::Ready(item)
        }
    }

    fn is_expired(&self, item: &TrashItem, now: DateTime<Utc>) -> bool {
        if self.window.is_zero() {
            return false;
        }
        let age = now.signed_duration_since(item.deleted_at);
        match chrono::Duration::from_std(self.window) {
            Ok(window) => age > window,
            Err(_) => false,
        }
    }

    pub fn peek(&self) -> Option<&TrashItem> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn item(name: &str, deleted_at: DateTime<Utc>) -> TrashItem {
        TrashItem {
            name: name.to_string(),
            trash_path: PathBuf::from("/trash").join(name),
            orig_path: PathBuf::from("/home").join(name),
            deleted_at,
            is_dir: false,
        }
    }

    #[test]
    fn pops_most_recent_first() {
        let now = Utc::now();
        let mut stack = UndoStack::new(Duration::from_secs(30));
        stack.push(item("first", now));
        stack.push(item("second", now));

        assert_eq!(stack.pop_restorable(now), UndoEntry::Ready(item("second", now)));
        assert_eq!(stack.pop_restorable(now), UndoEntry::Ready(item("first", now)));
        assert_eq!(stack.pop_restorable(now), UndoEntry::Empty);
    }

    #[test]
    fn expired_record_is_discarded() {
        let now = Utc::now();
        let old = now - chrono::Duration::seconds(31);
        let mut stack = UndoStack::new(Duration::from_secs(30));
        stack.push(item("old", old));

        assert_eq!(stack.pop_restorable(now), UndoEntry::Expired(item("old", old)));
        assert!(stack.is_empty());
    }

    #[test]
    fn zero_window_never_expires() {
        let now = Utc::now();
        let ancient = now - chrono::Duration::days(365);
        let mut stack = UndoStack::new(Duration::ZERO);
        stack.push(item("ancient", ancient));
        assert!(matches!(stack.pop_restorable(now), UndoEntry::Ready(_)));
    }

    #[test]
    fn history_is_bounded() {
        let now = Utc::now();
        let mut stack = UndoStack::new(Duration::from_secs(30));
        for i in 0..MAX_UNDO_HISTORY + 5 {
            stack.push(item(&format!("f{i}"), now));
        }
        assert_eq!(stack.len(), MAX_UNDO_HISTORY);
        assert_eq!(stack.peek().map(|i| i.name.as_str()), Some("f104"));
    }
}
