/*!
 * Console backed by direct filesystem calls
 */

use std::fs;
use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{ensure_in_scope, Console, ConsoleFlags, ConsoleKind};
use crate::error::{NavError, Result};
use crate::path;
use crate::types::{FileSystemObject, FsoKind, SpecialKind};

// EXDEV on Linux
const CROSS_DEVICE_ERROR: i32 = 18;

/// Console that talks to the local filesystem with the process' own privileges
#[derive(Debug)]
pub struct LocalConsole {
    /// Requests must live under this prefix
    scope: String,
    flags: ConsoleFlags,
}

impl LocalConsole {
    /// Create a console scoped to the whole filesystem
    pub fn new() -> Self {
        Self::scoped(path::ROOT)
    }

    /// Create a console restricted to `scope`
    pub fn scoped(scope: &str) -> Self {
        Self {
            scope: path::normalize(scope),
            flags: ConsoleFlags::default(),
        }
    }

    /// Build the object for one path from its link metadata
    fn object_for(&self, path: &str) -> io::Result<FileSystemObject> {
        let metadata = fs::symlink_metadata(path)?;
        if metadata.file_type().is_symlink() {
            let target = self.resolve_link(path);
            let mut link = FileSystemObject::symlink(path, target);
            apply_metadata(&mut link, &metadata);
            return Ok(link);
        }
        Ok(object_from_metadata(path, &metadata))
    }

    /// Resolve a link target; dangling links resolve to `None`
    fn resolve_link(&self, link_path: &str) -> Option<FileSystemObject> {
        let raw = fs::read_link(link_path).ok()?;
        let raw = raw.to_string_lossy();
        let target_path = if raw.starts_with('/') {
            path::normalize(&raw)
        } else {
            let parent = path::parent(link_path).unwrap_or_else(|| path::ROOT.to_string());
            path::normalize(&path::join(&parent, &raw))
        };
        let metadata = fs::metadata(link_path).ok()?;
        Some(object_from_metadata(&target_path, &metadata))
    }

    /// Recursive copy honoring cancellation between entries
    fn copy_tree(&self, src: &str, dst: &str) -> Result<()> {
        for entry in WalkDir::new(src).follow_links(false) {
            self.flags.check_cancelled()?;
            let entry = entry.map_err(|e| {
                let message = e.to_string();
                match e.into_io_error() {
                    Some(io_err) => NavError::from_io(io_err, src),
                    None => NavError::ExecutionError(message),
                }
            })?;
            let entry_path = path::normalize(&entry.path().to_string_lossy());
            let target = path::rebase(&entry_path, src, dst)
                .ok_or_else(|| NavError::ExecutionError(format!("cannot rebase {}", entry_path)))?;

            let file_type = entry.file_type();
            if file_type.is_dir() {
                fs::create_dir_all(&target).map_err(|e| NavError::from_io(e, &target))?;
            } else if file_type.is_symlink() {
                let link = fs::read_link(entry.path()).map_err(|e| NavError::from_io(e, &entry_path))?;
                if fs::symlink_metadata(&target).is_ok() {
                    fs::remove_file(&target).map_err(|e| NavError::from_io(e, &target))?;
                }
                std::os::unix::fs::symlink(&link, &target)
                    .map_err(|e| NavError::from_io(e, &target))?;
            } else {
                fs::copy(entry.path(), &target).map_err(|e| NavError::from_io(e, &entry_path))?;
            }
        }
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        let metadata = fs::symlink_metadata(path).map_err(|e| NavError::from_io(e, path))?;
        let result = if metadata.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| NavError::from_io(e, path))
    }
}

impl Default for LocalConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for LocalConsole {
    fn kind(&self) -> ConsoleKind {
        ConsoleKind::Local
    }

    fn scope(&self) -> &str {
        &self.scope
    }

    fn is_alive(&self) -> bool {
        self.flags.is_alive()
    }

    fn list_files(&self, dir: &str) -> Result<Vec<FileSystemObject>> {
        ensure_in_scope(&self.scope, dir)?;
        let _busy = self.flags.begin("list")?;

        let children: Vec<String> = fs::read_dir(dir)
            .map_err(|e| NavError::from_io(e, dir))?
            .filter_map(|entry| match entry {
                Ok(entry) => Some(path::join(dir, &entry.file_name().to_string_lossy())),
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", dir, e);
                    None
                }
            })
            .collect();
        self.flags.check_cancelled()?;

        // Entries can vanish between read_dir and stat
        let files: Vec<FileSystemObject> = children
            .par_iter()
            .filter_map(|child| match self.object_for(child) {
                Ok(fso) => Some(fso),
                Err(e) => {
                    warn!("Skipping {}: {}", child, e);
                    None
                }
            })
            .collect();

        self.flags.check_cancelled()?;
        debug!("Listed {} entries in {}", files.len(), dir);
        Ok(files)
    }

    fn stat(&self, path: &str) -> Result<FileSystemObject> {
        ensure_in_scope(&self.scope, path)?;
        let _busy = self.flags.begin("stat")?;
        self.object_for(path).map_err(|e| NavError::from_io(e, path))
    }

    fn copy(&self, src: &str, dst: &str) -> Result<()> {
        ensure_in_scope(&self.scope, src)?;
        ensure_in_scope(&self.scope, dst)?;
        let _busy = self.flags.begin("copy")?;

        let metadata = fs::symlink_metadata(src).map_err(|e| NavError::from_io(e, src))?;
        if metadata.is_dir() {
            self.copy_tree(src, dst)
        } else {
            fs::copy(src, dst)
                .map(|_| ())
                .map_err(|e| NavError::from_io(e, src))
        }
    }

    fn move_file(&self, src: &str, dst: &str) -> Result<()> {
        ensure_in_scope(&self.scope, src)?;
        ensure_in_scope(&self.scope, dst)?;
        let _busy = self.flags.begin("move")?;

        match fs::rename(src, dst) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_ERROR) => {
                debug!("Cross-device move of {}, copying instead", src);
                let metadata = fs::symlink_metadata(src).map_err(|e| NavError::from_io(e, src))?;
                if metadata.is_dir() {
                    self.copy_tree(src, dst)?;
                } else {
                    fs::copy(src, dst).map_err(|e| NavError::from_io(e, src))?;
                }
                self.remove(src)
            }
            Err(e) => Err(NavError::from_io(e, src)),
        }
    }

    fn delete(&self, path: &str) -> Result<()> {
        ensure_in_scope(&self.scope, path)?;
        let _busy = self.flags.begin("delete")?;
        self.remove(path)
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        ensure_in_scope(&self.scope, path)?;
        let _busy = self.flags.begin("mkdir")?;
        fs::create_dir_all(path).map_err(|e| NavError::from_io(e, path))
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        ensure_in_scope(&self.scope, path)?;
        let _busy = self.flags.begin("read")?;
        fs::read(path).map_err(|e| NavError::from_io(e, path))
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        ensure_in_scope(&self.scope, path)?;
        let _busy = self.flags.begin("write")?;
        fs::write(path, data).map_err(|e| NavError::from_io(e, path))
    }

    fn cancel(&self) -> bool {
        self.flags.cancel()
    }

    fn dispose(&self) {
        self.flags.dispose();
    }
}

fn object_from_metadata(path: &str, metadata: &fs::Metadata) -> FileSystemObject {
    let file_type = metadata.file_type();
    let mut fso = if file_type.is_dir() {
        FileSystemObject::directory(path)
    } else if file_type.is_block_device() {
        special(path, SpecialKind::BlockDevice)
    } else if file_type.is_char_device() {
        special(path, SpecialKind::CharDevice)
    } else if file_type.is_fifo() {
        special(path, SpecialKind::NamedPipe)
    } else if file_type.is_socket() {
        special(path, SpecialKind::Socket)
    } else {
        FileSystemObject::file(path, metadata.len())
    };
    apply_metadata(&mut fso, metadata);
    fso
}

fn special(path: &str, kind: SpecialKind) -> FileSystemObject {
    FileSystemObject {
        kind: FsoKind::Special(kind),
        ..FileSystemObject::file(path, 0)
    }
}

fn apply_metadata(fso: &mut FileSystemObject, metadata: &fs::Metadata) {
    fso.size = if metadata.is_dir() { 0 } else { metadata.len() };
    fso.mode = metadata.permissions().mode() & 0o7777;
    fso.last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn native_exists(path: &str) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn root_of(dir: &tempfile::TempDir) -> String {
        path::normalize(&dir.path().to_string_lossy())
    }

    #[test]
    fn test_list_and_stat() -> io::Result<()> {
        let temp = tempdir()?;
        let root = root_of(&temp);
        fs::create_dir(temp.path().join("dir1"))?;
        let mut file = File::create(temp.path().join("file1.txt"))?;
        writeln!(file, "hello")?;
        std::os::unix::fs::symlink(temp.path().join("dir1"), temp.path().join("link"))?;

        let console = LocalConsole::scoped(&root);
        let mut files = console.list_files(&root).unwrap();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["dir1", "file1.txt", "link"]);

        assert!(files[0].is_directory());
        assert_eq!(files[1].size, 6);
        assert!(files[2].is_symlink());
        assert!(files[2].is_directory());

        let stat = console.stat(&path::join(&root, "file1.txt")).unwrap();
        assert_eq!(stat.kind, FsoKind::RegularFile);
        assert!(stat.last_modified.is_some());
        Ok(())
    }

    #[test]
    fn test_out_of_scope_and_missing() -> io::Result<()> {
        let temp = tempdir()?;
        let root = root_of(&temp);
        let console = LocalConsole::scoped(&root);

        assert!(matches!(
            console.list_files("/etc"),
            Err(NavError::OutOfScope(_))
        ));
        assert!(matches!(
            console.stat(&path::join(&root, "missing")),
            Err(NavError::NoSuchFileOrDirectory(_))
        ));
        Ok(())
    }

    #[test]
    fn test_copy_tree_and_delete() -> io::Result<()> {
        let temp = tempdir()?;
        let root = root_of(&temp);
        fs::create_dir_all(temp.path().join("src").join("nested"))?;
        fs::write(temp.path().join("src").join("nested").join("a.txt"), "a")?;

        let console = LocalConsole::scoped(&root);
        let src = path::join(&root, "src");
        let dst = path::join(&root, "dst");
        console.copy(&src, &dst).unwrap();
        assert_eq!(
            fs::read_to_string(temp.path().join("dst").join("nested").join("a.txt"))?,
            "a"
        );

        console.delete(&src).unwrap();
        assert!(!native_exists(&src));
        Ok(())
    }

    #[test]
    fn test_disposed_console_refuses_work() -> io::Result<()> {
        let temp = tempdir()?;
        let root = root_of(&temp);
        let console = LocalConsole::scoped(&root);
        console.dispose();
        assert!(!console.is_alive());
        assert!(matches!(
            console.list_files(&root),
            Err(NavError::ConsoleAlloc(_))
        ));
        Ok(())
    }
}
