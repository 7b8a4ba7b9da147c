/*!
 * Core types and data structures for filenav
 */

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path;

/// Kind of special (system) file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialKind {
    /// Block device node
    BlockDevice,
    /// Character device node
    CharDevice,
    /// FIFO
    NamedPipe,
    /// Unix domain socket
    Socket,
}

/// Represents the different kinds of filesystem entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FsoKind {
    /// Regular file
    RegularFile,
    /// Directory
    Directory,
    /// Navigational sentinel meaning "go up"; its path is the target directory
    ParentDirectory,
    /// Symbolic link with its resolved target, when it could be resolved
    Symlink {
        /// Resolved link target
        target: Option<Box<FileSystemObject>>,
    },
    /// Entry point of a storage volume
    RootDirectory {
        /// Human readable volume description
        title: String,
    },
    /// Device nodes, pipes and sockets
    Special(SpecialKind),
}

/// A filesystem entry on some backing store
///
/// Values are never mutated in place; a change on disk produces a new value
/// through a fresh stat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSystemObject {
    /// Absolute normalized path
    pub path: String,
    /// Entry name
    pub name: String,
    /// Entry kind
    pub kind: FsoKind,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub last_modified: Option<DateTime<Utc>>,
    /// Permission bits
    pub mode: u32,
    /// Lives on a secure (virtual) mount
    pub secure: bool,
    /// Lives on a remote storage provider
    pub remote: bool,
    /// Cached thumbnail, UI-only and never serialized
    #[serde(skip)]
    pub thumbnail: Option<Arc<Vec<u8>>>,
}

impl FileSystemObject {
    fn with_kind(path: &str, kind: FsoKind) -> Self {
        let path = path::normalize(path);
        Self {
            name: path::file_name(&path).to_string(),
            path,
            kind,
            size: 0,
            last_modified: None,
            mode: 0,
            secure: false,
            remote: false,
            thumbnail: None,
        }
    }

    /// A regular file
    pub fn file(path: &str, size: u64) -> Self {
        Self {
            size,
            mode: 0o644,
            ..Self::with_kind(path, FsoKind::RegularFile)
        }
    }

    /// A directory
    pub fn directory(path: &str) -> Self {
        Self {
            mode: 0o755,
            ..Self::with_kind(path, FsoKind::Directory)
        }
    }

    /// A symbolic link with an optional resolved target
    pub fn symlink(path: &str, target: Option<FileSystemObject>) -> Self {
        Self {
            mode: 0o777,
            ..Self::with_kind(
                path,
                FsoKind::Symlink {
                    target: target.map(Box::new),
                },
            )
        }
    }

    /// The "go up" sentinel that navigates to `target_dir`
    pub fn parent_marker(target_dir: &str) -> Self {
        Self {
            name: "..".to_string(),
            ..Self::with_kind(target_dir, FsoKind::ParentDirectory)
        }
    }

    /// A storage volume entry point
    pub fn volume_root(volume: &StorageVolume) -> Self {
        Self::with_kind(
            &volume.path,
            FsoKind::RootDirectory {
                title: volume.description.clone(),
            },
        )
    }

    /// Sets the modification time
    pub fn modified_at(mut self, when: DateTime<Utc>) -> Self {
        self.last_modified = Some(when);
        self
    }

    /// Parent directory path, `None` for the filesystem root
    pub fn parent(&self) -> Option<String> {
        path::parent(&self.path)
    }

    /// Whether navigating into this entry lists a directory
    pub fn is_directory(&self) -> bool {
        match &self.kind {
            FsoKind::Directory | FsoKind::ParentDirectory | FsoKind::RootDirectory { .. } => true,
            FsoKind::Symlink {
                target: Some(target),
            } => target.is_directory(),
            _ => false,
        }
    }

    /// Whether this is the "go up" sentinel
    pub fn is_parent_marker(&self) -> bool {
        matches!(self.kind, FsoKind::ParentDirectory)
    }

    /// Whether this is a symbolic link
    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, FsoKind::Symlink { .. })
    }

    /// Whether this is a device node, pipe or socket
    pub fn is_system(&self) -> bool {
        matches!(self.kind, FsoKind::Special(_))
    }

    /// Whether the name marks a hidden entry
    pub fn is_hidden(&self) -> bool {
        !self.is_parent_marker() && self.name.starts_with('.')
    }

    /// Lower-cased extension, if any
    pub fn extension(&self) -> Option<String> {
        if self.is_directory() {
            return None;
        }
        path::split_extension(&self.name)
            .1
            .map(|ext| ext.to_lowercase())
    }
}

/// A storage volume the chroot boundary is made of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageVolume {
    /// Mount point
    pub path: String,
    /// Human readable description
    pub description: String,
    /// Whether the volume can be ejected
    pub removable: bool,
}

impl StorageVolume {
    /// Create a non-removable volume at `path`
    pub fn new(path: &str) -> Self {
        let path = path::normalize(path);
        Self {
            description: path::file_name(&path).to_string(),
            path,
            removable: false,
        }
    }

    /// Whether `candidate` is inside this volume
    pub fn contains(&self, candidate: &str) -> bool {
        path::is_descendant_or_self(candidate, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_normalize() {
        let fso = FileSystemObject::file("/sdcard//Download/./a.TXT", 12);
        assert_eq!(fso.path, "/sdcard/Download/a.TXT");
        assert_eq!(fso.name, "a.TXT");
        assert_eq!(fso.parent().as_deref(), Some("/sdcard/Download"));
        assert_eq!(fso.extension().as_deref(), Some("txt"));

        let root = FileSystemObject::directory("/");
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn test_symlink_to_directory_is_directory() {
        let target = FileSystemObject::directory("/storage/emulated/0");
        let link = FileSystemObject::symlink("/sdcard", Some(target));
        assert!(link.is_directory());
        assert!(link.is_symlink());

        let dangling = FileSystemObject::symlink("/sdcard/broken", None);
        assert!(!dangling.is_directory());
    }

    #[test]
    fn test_parent_marker_is_never_hidden() {
        let up = FileSystemObject::parent_marker("/sdcard");
        assert_eq!(up.name, "..");
        assert_eq!(up.path, "/sdcard");
        assert!(up.is_directory());
        assert!(!up.is_hidden());
    }

    #[test]
    fn test_thumbnail_is_not_serialized() {
        let mut fso = FileSystemObject::file("/sdcard/pic.png", 1);
        fso.thumbnail = Some(Arc::new(vec![1, 2, 3]));
        let json = serde_json::to_string(&fso).unwrap();
        let back: FileSystemObject = serde_json::from_str(&json).unwrap();
        assert!(back.thumbnail.is_none());
        assert_eq!(back.path, fso.path);
    }

    #[test]
    fn test_volume_contains() {
        let volume = StorageVolume::new("/sdcard");
        assert!(volume.contains("/sdcard"));
        assert!(volume.contains("/sdcard/Download"));
        assert!(!volume.contains("/sdcard2"));
    }
}
