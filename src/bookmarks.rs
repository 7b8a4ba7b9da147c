/*!
 * Bookmarked paths
 */

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::path;

/// A named path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub name: String,
    pub path: String,
}

/// Bookmark registry of a session
#[derive(Debug, Default)]
pub struct Bookmarks {
    entries: Mutex<Vec<Bookmark>>,
}

impl Bookmarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bookmark, replacing one with the same path
    pub fn add(&self, name: &str, target: &str) {
        let target = path::normalize(target);
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|b| b.path != target);
            entries.push(Bookmark {
                name: name.to_string(),
                path: target,
            });
        }
    }

    /// Remove the bookmark at `target`; returns whether one existed
    pub fn remove(&self, target: &str) -> bool {
        let target = path::normalize(target);
        match self.entries.lock() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|b| b.path != target);
                entries.len() != before
            }
            Err(_) => false,
        }
    }

    pub fn list(&self) -> Vec<Bookmark> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Drop bookmarks pointing at or below `source`, which no longer exists
    pub fn drop_orphans(&self, source: &str) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|b| !path::is_descendant_or_self(&b.path, source));
        let dropped = before - entries.len();
        if dropped > 0 {
            info!("Dropped {} bookmarks under {}", dropped, source);
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orphans_are_dropped() {
        let bookmarks = Bookmarks::new();
        bookmarks.add("music", "/sdcard/Music");
        bookmarks.add("rock", "/sdcard/Music/rock/");
        bookmarks.add("docs", "/sdcard/Documents");
        bookmarks.add("musicals", "/sdcard/Musicals");

        assert_eq!(bookmarks.drop_orphans("/sdcard/Music"), 2);
        let left: Vec<String> = bookmarks.list().into_iter().map(|b| b.name).collect();
        assert_eq!(left, vec!["docs", "musicals"]);
    }

    #[test]
    fn test_add_replaces_same_path() {
        let bookmarks = Bookmarks::new();
        bookmarks.add("a", "/sdcard");
        bookmarks.add("b", "/sdcard");
        assert_eq!(bookmarks.list().len(), 1);
        assert!(bookmarks.remove("/sdcard"));
        assert!(!bookmarks.remove("/sdcard"));
    }
}
