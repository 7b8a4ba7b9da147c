/*!
 * Navigation snapshots kept in history and persisted across recreation
 */

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::history::HistoryEntry;
use crate::types::FileSystemObject;

/// Snapshot of a view showing a directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationState {
    /// Owning view
    pub view_id: String,
    pub current_dir: String,
    pub selection: Vec<FileSystemObject>,
    pub chroot: bool,
    /// The listing exactly as it was displayed
    pub files: Vec<FileSystemObject>,
    /// Scroll anchor
    pub first_visible: Option<FileSystemObject>,
}

/// Snapshot of a search result view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchState {
    pub query: String,
    /// Directory the search started from
    pub directory: String,
    pub results: Vec<FileSystemObject>,
    pub first_visible: Option<FileSystemObject>,
}

/// Anything a history entry can restore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Navigable {
    Navigation(NavigationState),
    Search(SearchState),
}

impl Navigable {
    /// Directory the entry lives in
    pub fn directory(&self) -> &str {
        match self {
            Self::Navigation(state) => &state.current_dir,
            Self::Search(state) => &state.directory,
        }
    }
}

/// Everything a view needs to come back after its process was recreated
///
/// Thumbnails are dropped on serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedNavigation {
    pub current_dir: Option<String>,
    pub files: Vec<FileSystemObject>,
    pub selection: Vec<FileSystemObject>,
    pub chroot: bool,
    pub first_visible: Option<FileSystemObject>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl PersistedNavigation {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_thumbnails_are_not_persisted() {
        let mut photo = FileSystemObject::file("/sdcard/DCIM/cat.jpg", 2048);
        photo.thumbnail = Some(Arc::new(vec![0xff, 0xd8]));

        let bundle = PersistedNavigation {
            current_dir: Some("/sdcard/DCIM".to_string()),
            files: vec![photo.clone()],
            selection: vec![photo],
            chroot: false,
            first_visible: None,
            history: Vec::new(),
        };
        let restored = PersistedNavigation::from_json(&bundle.to_json().unwrap()).unwrap();
        assert!(restored.files[0].thumbnail.is_none());
        assert_eq!(restored.files[0].size, 2048);
        assert_eq!(restored.current_dir.as_deref(), Some("/sdcard/DCIM"));
    }

    #[test]
    fn test_corrupt_bundle_is_rejected() {
        assert!(PersistedNavigation::from_json("{\"current_dir\":").is_err());
    }
}
