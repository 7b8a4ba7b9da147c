/*!
 * Storage providers backing virtual and remote consoles
 */

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::error::{NavError, Result};
use crate::path;
use crate::types::FileSystemObject;

/// A storage backend addressed by its own absolute paths
///
/// Consoles translate their scope onto the provider namespace, so a provider
/// always sees `/` as its root.
pub trait StorageProvider: Send + Sync + fmt::Debug {
    /// List a directory
    fn list(&self, path: &str) -> Result<Vec<FileSystemObject>>;

    /// Stat a path
    fn stat(&self, path: &str) -> Result<FileSystemObject>;

    /// Copy a path, recursively for directories
    fn copy(&self, src: &str, dst: &str) -> Result<()>;

    /// Rename a path
    fn rename(&self, src: &str, dst: &str) -> Result<()>;

    /// Remove a path, recursively for directories
    fn remove(&self, path: &str) -> Result<()>;

    /// Create a directory and missing parents
    fn create_dir(&self, path: &str) -> Result<()>;

    /// Read a file
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or replace a file
    fn write(&self, path: &str, data: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone)]
enum MemContent {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Clone)]
struct MemNode {
    content: MemContent,
    modified: DateTime<Utc>,
    mode: u32,
}

impl MemNode {
    fn dir() -> Self {
        Self {
            content: MemContent::Dir,
            modified: Utc::now(),
            mode: 0o755,
        }
    }

    fn file(data: Vec<u8>) -> Self {
        Self {
            content: MemContent::File(data),
            modified: Utc::now(),
            mode: 0o644,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.content, MemContent::Dir)
    }

    fn readable(&self) -> bool {
        self.mode & 0o444 != 0
    }

    fn to_object(&self, path: &str) -> FileSystemObject {
        let fso = match &self.content {
            MemContent::Dir => FileSystemObject::directory(path),
            MemContent::File(data) => FileSystemObject::file(path, data.len() as u64),
        };
        FileSystemObject {
            mode: self.mode,
            ..fso.modified_at(self.modified)
        }
    }
}

/// In-memory tree; the reference provider for secure mounts and tests
#[derive(Debug)]
pub struct MemoryProvider {
    nodes: RwLock<BTreeMap<String, MemNode>>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    /// Create a provider holding only the root directory
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(path::ROOT.to_string(), MemNode::dir());
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Builder-style directory insertion
    pub fn with_dir(self, dir: &str) -> Self {
        // A fresh provider only fails on a file shadowing a parent
        let _ = self.create_dir(dir);
        self
    }

    /// Builder-style file insertion, creating parents
    pub fn with_file(self, file: &str, data: &[u8]) -> Self {
        let file = path::normalize(file);
        if let Some(parent) = path::parent(&file) {
            let _ = self.create_dir(&parent);
        }
        let _ = self.write(&file, data);
        self
    }

    /// Change the permission bits of a node
    pub fn set_mode(&self, target: &str, mode: u32) -> Result<()> {
        let target = path::normalize(target);
        let mut nodes = self.write_nodes()?;
        let node = nodes
            .get_mut(&target)
            .ok_or_else(|| NavError::NoSuchFileOrDirectory(target.clone()))?;
        node.mode = mode;
        Ok(())
    }

    /// Change the modification time of a node
    pub fn set_modified(&self, target: &str, when: DateTime<Utc>) -> Result<()> {
        let target = path::normalize(target);
        let mut nodes = self.write_nodes()?;
        let node = nodes
            .get_mut(&target)
            .ok_or_else(|| NavError::NoSuchFileOrDirectory(target.clone()))?;
        node.modified = when;
        Ok(())
    }

    /// Whether a path exists
    pub fn contains(&self, target: &str) -> bool {
        let target = path::normalize(target);
        self.read_nodes()
            .map(|nodes| nodes.contains_key(&target))
            .unwrap_or(false)
    }

    fn read_nodes(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, MemNode>>> {
        self.nodes
            .read()
            .map_err(|_| NavError::ExecutionError("memory provider lock poisoned".to_string()))
    }

    fn write_nodes(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, MemNode>>> {
        self.nodes
            .write()
            .map_err(|_| NavError::ExecutionError("memory provider lock poisoned".to_string()))
    }

    fn subtree(nodes: &BTreeMap<String, MemNode>, root: &str) -> Vec<(String, MemNode)> {
        nodes
            .iter()
            .filter(|(key, _)| path::is_descendant_or_self(key, root))
            .map(|(key, node)| (key.clone(), node.clone()))
            .collect()
    }

    fn ensure_parent_dir(nodes: &BTreeMap<String, MemNode>, target: &str) -> Result<()> {
        let parent = path::parent(target)
            .ok_or_else(|| NavError::InvalidArgument(format!("no parent for {}", target)))?;
        match nodes.get(&parent) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(NavError::ExecutionError(format!("not a directory: {}", parent))),
            None => Err(NavError::NoSuchFileOrDirectory(parent)),
        }
    }

    fn clone_subtree(
        nodes: &mut BTreeMap<String, MemNode>,
        src: &str,
        dst: &str,
        remove_source: bool,
    ) -> Result<()> {
        if !nodes.contains_key(src) {
            return Err(NavError::NoSuchFileOrDirectory(src.to_string()));
        }
        if path::is_descendant(dst, src) {
            return Err(NavError::Consistency(format!(
                "cannot place {} inside itself",
                src
            )));
        }
        if path::is_descendant(src, dst) {
            return Err(NavError::Consistency(format!(
                "cannot replace {} with its own child",
                dst
            )));
        }
        Self::ensure_parent_dir(nodes, dst)?;

        let subtree = Self::subtree(nodes, src);
        if src != dst {
            nodes.retain(|key, _| !path::is_descendant_or_self(key, dst));
        }
        if remove_source {
            for (key, _) in &subtree {
                nodes.remove(key);
            }
        }
        for (key, node) in subtree {
            if let Some(target) = path::rebase(&key, src, dst) {
                nodes.insert(target, node);
            }
        }
        Ok(())
    }
}

impl StorageProvider for MemoryProvider {
    fn list(&self, dir: &str) -> Result<Vec<FileSystemObject>> {
        let nodes = self.read_nodes()?;
        let node = nodes
            .get(dir)
            .ok_or_else(|| NavError::NoSuchFileOrDirectory(dir.to_string()))?;
        if !node.is_dir() {
            return Err(NavError::ExecutionError(format!("not a directory: {}", dir)));
        }
        if !node.readable() {
            return Err(NavError::InsufficientPermissions(dir.to_string()));
        }

        Ok(nodes
            .iter()
            .filter(|(key, _)| path::parent(key).as_deref() == Some(dir))
            .map(|(key, node)| node.to_object(key))
            .collect())
    }

    fn stat(&self, target: &str) -> Result<FileSystemObject> {
        let nodes = self.read_nodes()?;
        nodes
            .get(target)
            .map(|node| node.to_object(target))
            .ok_or_else(|| NavError::NoSuchFileOrDirectory(target.to_string()))
    }

    fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let mut nodes = self.write_nodes()?;
        Self::clone_subtree(&mut nodes, src, dst, false)
    }

    fn rename(&self, src: &str, dst: &str) -> Result<()> {
        if path::is_root(src) {
            return Err(NavError::InvalidArgument("cannot move the root".to_string()));
        }
        let mut nodes = self.write_nodes()?;
        Self::clone_subtree(&mut nodes, src, dst, true)
    }

    fn remove(&self, target: &str) -> Result<()> {
        if path::is_root(target) {
            return Err(NavError::InvalidArgument("cannot remove the root".to_string()));
        }
        let mut nodes = self.write_nodes()?;
        if !nodes.contains_key(target) {
            return Err(NavError::NoSuchFileOrDirectory(target.to_string()));
        }
        nodes.retain(|key, _| !path::is_descendant_or_self(key, target));
        Ok(())
    }

    fn create_dir(&self, target: &str) -> Result<()> {
        let target = path::normalize(target);
        let mut nodes = self.write_nodes()?;
        let mut current = path::ROOT.to_string();
        for segment in target.split('/').filter(|s| !s.is_empty()) {
            current = path::join(&current, segment);
            match nodes.get(&current) {
                Some(node) if node.is_dir() => {}
                Some(_) => {
                    return Err(NavError::ExecutionError(format!(
                        "not a directory: {}",
                        current
                    )))
                }
                None => {
                    nodes.insert(current.clone(), MemNode::dir());
                }
            }
        }
        Ok(())
    }

    fn read(&self, target: &str) -> Result<Vec<u8>> {
        let nodes = self.read_nodes()?;
        let node = nodes
            .get(target)
            .ok_or_else(|| NavError::NoSuchFileOrDirectory(target.to_string()))?;
        if !node.readable() {
            return Err(NavError::InsufficientPermissions(target.to_string()));
        }
        match &node.content {
            MemContent::File(data) => Ok(data.clone()),
            MemContent::Dir => Err(NavError::ExecutionError(format!(
                "is a directory: {}",
                target
            ))),
        }
    }

    fn write(&self, target: &str, data: &[u8]) -> Result<()> {
        let mut nodes = self.write_nodes()?;
        Self::ensure_parent_dir(&nodes, target)?;
        if nodes.get(target).map_or(false, MemNode::is_dir) {
            return Err(NavError::ExecutionError(format!(
                "is a directory: {}",
                target
            )));
        }
        nodes.insert(target.to_string(), MemNode::file(data.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryProvider {
        MemoryProvider::new()
            .with_file("/docs/a.txt", b"alpha")
            .with_file("/docs/nested/b.txt", b"beta")
            .with_dir("/empty")
    }

    #[test]
    fn test_list_direct_children_only() {
        let provider = sample();
        let mut names: Vec<String> = provider
            .list("/docs")
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "nested"]);
    }

    #[test]
    fn test_copy_and_rename_subtrees() {
        let provider = sample();
        provider.copy("/docs", "/empty/docs").unwrap();
        assert_eq!(provider.read("/empty/docs/nested/b.txt").unwrap(), b"beta");
        assert!(provider.contains("/docs/a.txt"));

        provider.rename("/docs", "/moved").unwrap();
        assert!(!provider.contains("/docs"));
        assert!(!provider.contains("/docs/nested/b.txt"));
        assert!(provider.contains("/moved/nested/b.txt"));
    }

    #[test]
    fn test_rejects_copy_into_itself() {
        let provider = sample();
        let err = provider.copy("/docs", "/docs/nested/docs").unwrap_err();
        assert!(matches!(err, NavError::Consistency(_)));
    }

    #[test]
    fn test_unreadable_directory() {
        let provider = sample();
        provider.set_mode("/docs", 0o000).unwrap();
        assert!(matches!(
            provider.list("/docs"),
            Err(NavError::InsufficientPermissions(_))
        ));
    }

    #[test]
    fn test_remove_and_missing_parent() {
        let provider = sample();
        provider.remove("/docs").unwrap();
        assert!(!provider.contains("/docs/nested"));
        assert!(matches!(
            provider.write("/nope/x.txt", b"x"),
            Err(NavError::NoSuchFileOrDirectory(_))
        ));
    }
}
