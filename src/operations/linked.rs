/*!
 * Source/destination pairs and the pre-flight checks run before any I/O
 */

use tracing::warn;

use super::OperationKind;
use crate::error::Result;
use crate::path;
use crate::types::FileSystemObject;
use crate::{bail, ensure};

/// A file operation item: where a source ends up
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedResource {
    pub source: FileSystemObject,
    pub destination: FileSystemObject,
}

impl LinkedResource {
    pub fn new(source: FileSystemObject, destination: FileSystemObject) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// `source` placed under `dir` with its own name
    pub fn into_dir(source: &FileSystemObject, dir: &str) -> Self {
        let target = path::join(&path::normalize(dir), &source.name);
        Self::new(source.clone(), relocated(source, &target))
    }

    /// `source` renamed in place
    pub fn renamed(source: &FileSystemObject, name: &str) -> Self {
        let parent = source.parent().unwrap_or_else(|| path::ROOT.to_string());
        Self::new(source.clone(), relocated(source, &path::join(&parent, name)))
    }

    /// Directory the destination lands in
    pub fn destination_dir(&self) -> String {
        self.destination
            .parent()
            .unwrap_or_else(|| path::ROOT.to_string())
    }
}

/// Copy of `fso` describing the same object at `target`
pub(crate) fn relocated(fso: &FileSystemObject, target: &str) -> FileSystemObject {
    let target = path::normalize(target);
    FileSystemObject {
        name: path::file_name(&target).to_string(),
        path: target,
        thumbnail: None,
        ..fso.clone()
    }
}

/// Reject a batch that can never succeed
///
/// Runs on the caller's thread and touches no console.
pub(crate) fn preflight(
    kind: OperationKind,
    items: &[LinkedResource],
    dest_dir: &str,
    current_dir: Option<&str>,
) -> Result<()> {
    let dest_dir = path::normalize(dest_dir);
    let result = check(kind, items, &dest_dir, current_dir);
    if let Err(e) = &result {
        warn!("Rejected {} into {}: {}", kind, dest_dir, e);
    }
    result
}

fn check(
    kind: OperationKind,
    items: &[LinkedResource],
    dest_dir: &str,
    current_dir: Option<&str>,
) -> Result<()> {
    ensure!(!items.is_empty(), InvalidArgument, "nothing to {}", kind);

    for item in items {
        let (src, dst) = (&item.source.path, &item.destination.path);
        ensure!(
            item.destination_dir() == dest_dir,
            Consistency,
            "destination {} is not inside {}",
            dst,
            dest_dir
        );
        ensure!(
            !item.source.is_parent_marker() && !path::is_root(src),
            Consistency,
            "cannot {} {}",
            kind,
            src
        );

        match kind {
            OperationKind::Move => {
                if let Some(current) = current_dir {
                    ensure!(
                        !path::is_descendant_or_self(current, src),
                        Consistency,
                        "cannot move {} while browsing it",
                        src
                    );
                }
                ensure_not_into_itself(kind, src, dst)?;
            }
            OperationKind::Copy => ensure_not_into_itself(kind, src, dst)?,
            OperationKind::Rename => {
                let name = &item.destination.name;
                ensure!(
                    path::is_valid_name(name),
                    InvalidArgument,
                    "invalid file name: {:?}",
                    name
                );
                ensure!(src != dst, InvalidArgument, "{} already has that name", src);
            }
            OperationKind::CreateCopy => {}
        }
    }
    Ok(())
}

fn ensure_not_into_itself(kind: OperationKind, src: &str, dst: &str) -> Result<()> {
    if src == dst {
        bail!(Consistency, "cannot {} {} onto itself, duplicate it instead", kind, src);
    }
    if path::is_descendant(dst, src) {
        bail!(Consistency, "cannot {} {} into its own subtree", kind, src);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NavError;

    fn dir(p: &str) -> FileSystemObject {
        FileSystemObject::directory(p)
    }

    #[test]
    fn test_destination_must_be_in_declared_dir() {
        let item = LinkedResource::new(
            FileSystemObject::file("/a/x", 1),
            FileSystemObject::file("/b/c/x", 1),
        );
        let err = preflight(OperationKind::Copy, &[item], "/b", None).unwrap_err();
        assert!(matches!(err, NavError::Consistency(_)));
    }

    #[test]
    fn test_move_of_browsed_ancestor() {
        let item = LinkedResource::into_dir(&dir("/sdcard/Music"), "/sdcard/Backup");
        assert!(preflight(
            OperationKind::Move,
            &[item.clone()],
            "/sdcard/Backup",
            Some("/sdcard/Music/rock")
        )
        .is_err());
        assert!(preflight(OperationKind::Move, &[item], "/sdcard/Backup", Some("/sdcard")).is_ok());
    }

    #[test]
    fn test_copy_into_itself() {
        let music = dir("/sdcard/Music");
        let into_child = LinkedResource::into_dir(&music, "/sdcard/Music/rock");
        assert!(preflight(OperationKind::Copy, &[into_child], "/sdcard/Music/rock", None).is_err());

        let onto_self = LinkedResource::into_dir(&music, "/sdcard");
        assert!(preflight(OperationKind::Copy, &[onto_self], "/sdcard", None).is_err());

        let sibling = LinkedResource::into_dir(&music, "/sdcard/Musicals");
        assert!(preflight(OperationKind::Copy, &[sibling], "/sdcard/Musicals", None).is_ok());
    }

    #[test]
    fn test_rename_names() {
        let file = FileSystemObject::file("/sdcard/a.txt", 1);
        for bad in ["", ".", "..", "x/y"] {
            let item = LinkedResource::new(
                file.clone(),
                FileSystemObject {
                    name: bad.to_string(),
                    ..FileSystemObject::file("/sdcard/placeholder", 1)
                },
            );
            assert!(
                preflight(OperationKind::Rename, &[item], "/sdcard", None).is_err(),
                "{:?} accepted",
                bad
            );
        }
        let good = LinkedResource::renamed(&file, "b.txt");
        assert_eq!(good.destination.path, "/sdcard/b.txt");
        assert!(preflight(OperationKind::Rename, &[good], "/sdcard", None).is_ok());
    }
}
