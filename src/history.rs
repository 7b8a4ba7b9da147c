/*!
 * History stack of visited directories and searches
 */

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::Session;
use crate::state::Navigable;

/// One history entry; positions grow monotonically and are never reused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub position: u64,
    pub item: Navigable,
}

/// Ordered stack of history entries, newest last
#[derive(Debug, Clone, Default)]
pub struct HistoryStack {
    entries: Vec<HistoryEntry>,
    next_position: u64,
}

impl HistoryStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a stack from persisted entries
    pub fn from_entries(mut entries: Vec<HistoryEntry>) -> Self {
        entries.sort_by_key(|e| e.position);
        let next_position = entries.last().map_or(0, |e| e.position + 1);
        Self {
            entries,
            next_position,
        }
    }

    /// Push an item, returning its position
    pub fn push(&mut self, item: Navigable) -> u64 {
        let position = self.next_position;
        self.next_position += 1;
        debug!("History push #{} ({})", position, item.directory());
        self.entries.push(HistoryEntry { position, item });
        position
    }

    pub fn peek_last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop()
    }

    /// Drop every entry newer than `position`
    pub fn truncate_after(&mut self, position: u64) {
        self.entries.retain(|e| e.position <= position);
    }

    /// Drop entries matching `predicate`; returns how many were dropped
    pub fn prune<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&HistoryEntry) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|e| !predicate(e));
        before - self.entries.len()
    }

    /// Drop entries living on an unmounted virtual console
    pub fn prune_unmounted(&mut self, session: &Session) -> usize {
        self.prune(|e| session.is_unmounted(e.item.directory()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{NavigationState, SearchState};

    fn nav(dir: &str) -> Navigable {
        Navigable::Navigation(NavigationState {
            view_id: "main".to_string(),
            current_dir: dir.to_string(),
            selection: Vec::new(),
            chroot: false,
            files: Vec::new(),
            first_visible: None,
        })
    }

    #[test]
    fn test_positions_are_monotonic() {
        let mut history = HistoryStack::new();
        assert_eq!(history.push(nav("/a")), 0);
        assert_eq!(history.push(nav("/b")), 1);
        history.pop();
        assert_eq!(history.push(nav("/c")), 2);
        assert_eq!(history.peek_last().unwrap().item.directory(), "/c");
    }

    #[test]
    fn test_truncate_after() {
        let mut history = HistoryStack::new();
        for dir in ["/a", "/b", "/c", "/d"] {
            history.push(nav(dir));
        }
        history.truncate_after(1);
        let dirs: Vec<&str> = history.entries().iter().map(|e| e.item.directory()).collect();
        assert_eq!(dirs, vec!["/a", "/b"]);
    }

    #[test]
    fn test_prune_and_restore() {
        let mut history = HistoryStack::new();
        history.push(nav("/mnt/secure/a"));
        history.push(Navigable::Search(SearchState {
            query: "*.txt".to_string(),
            directory: "/sdcard".to_string(),
            results: Vec::new(),
            first_visible: None,
        }));
        history.push(nav("/mnt/secure"));
        assert_eq!(history.prune(|e| e.item.directory().starts_with("/mnt")), 2);
        assert_eq!(history.len(), 1);

        let mut restored = HistoryStack::from_entries(history.entries().to_vec());
        assert_eq!(restored.push(nav("/x")), 2);
    }
}
