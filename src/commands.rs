/*!
 * Stateless command helpers
 *
 * Every helper resolves the console serving the path through the session and
 * runs one console call. Callers run these from background tasks.
 */

use std::collections::VecDeque;
use std::sync::Arc;

use glob_match::glob_match;
use tracing::{debug, warn};

use crate::console::Console;
use crate::error::{NavError, Result};
use crate::path;
use crate::session::Session;
use crate::state::SearchState;
use crate::task::CancellationToken;
use crate::types::FileSystemObject;

pub use crate::operations::naming::create_non_existing_name;

/// Console serving `target`
pub fn console_for(session: &Session, target: &str) -> Result<Arc<dyn Console>> {
    session.console_for(&path::normalize(target))
}

pub fn list_files(session: &Session, dir: &str) -> Result<Vec<FileSystemObject>> {
    let dir = path::normalize(dir);
    console_for(session, &dir)?.list_files(&dir)
}

pub fn stat(session: &Session, target: &str) -> Result<FileSystemObject> {
    let target = path::normalize(target);
    console_for(session, &target)?.stat(&target)
}

/// Whether `target` exists; unreachable mounts count as absent
pub fn exists(session: &Session, target: &str) -> Result<bool> {
    match stat(session, target) {
        Ok(_) => Ok(true),
        Err(NavError::NoSuchFileOrDirectory(_)) | Err(NavError::NotMounted(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn copy(session: &Session, src: &str, dst: &str) -> Result<()> {
    let (src, dst) = (path::normalize(src), path::normalize(dst));
    console_for(session, &src)?.copy(&src, &dst)
}

pub fn move_file(session: &Session, src: &str, dst: &str) -> Result<()> {
    let (src, dst) = (path::normalize(src), path::normalize(dst));
    console_for(session, &src)?.move_file(&src, &dst)
}

pub fn delete(session: &Session, target: &str) -> Result<()> {
    let target = path::normalize(target);
    console_for(session, &target)?.delete(&target)
}

pub fn create_directory(session: &Session, target: &str) -> Result<()> {
    let target = path::normalize(target);
    console_for(session, &target)?.create_directory(&target)
}

/// Search `dir` recursively for names matching a glob pattern
///
/// Matching ignores case. Symlinked directories are not followed.
/// Unreadable subdirectories are skipped; the search root must be readable.
pub fn find(
    session: &Session,
    dir: &str,
    pattern: &str,
    token: &CancellationToken,
) -> Result<SearchState> {
    let root = path::normalize(dir);
    let pattern = pattern.to_lowercase();
    let mut results = Vec::new();
    let mut queue = VecDeque::from([root.clone()]);

    while let Some(current) = queue.pop_front() {
        token.check()?;
        let entries = match list_files(session, &current) {
            Ok(entries) => entries,
            Err(e) if current == root => return Err(e),
            Err(e) => {
                warn!("Skipping {} during search: {}", current, e);
                continue;
            }
        };
        for entry in entries {
            if glob_match(&pattern, &entry.name.to_lowercase()) {
                results.push(entry.clone());
            }
            if entry.is_directory() && !entry.is_symlink() {
                queue.push_back(entry.path);
            }
        }
    }

    debug!("Search for {} under {} found {} entries", pattern, root, results.len());
    Ok(SearchState {
        query: pattern,
        directory: root,
        results,
        first_visible: None,
    })
}

/// Copy `src` from one console to `dst` on another, recursively
///
/// Symlinks are copied as the content they point to.
pub fn transfer(
    from: &dyn Console,
    to: &dyn Console,
    src: &str,
    dst: &str,
    token: &CancellationToken,
) -> Result<()> {
    token.check()?;
    let source = from.stat(src)?;
    if source.is_directory() && !source.is_symlink() {
        to.create_directory(dst)?;
        for child in from.list_files(src)? {
            transfer(from, to, &child.path, &path::join(dst, &child.name), token)?;
        }
        Ok(())
    } else {
        let data = from.read_file(src)?;
        token.check()?;
        to.write_file(dst, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{MemoryProvider, RemoteConsole, VirtualConsole};

    fn session_with_drive() -> Arc<Session> {
        let provider = MemoryProvider::new()
            .with_file("/docs/Report.TXT", b"q3")
            .with_file("/docs/old/report.txt", b"q2")
            .with_file("/docs/notes.md", b"n");
        Session::builder()
            .mount(Arc::new(RemoteConsole::new("/remote", Arc::new(provider))))
            .build()
    }

    #[test]
    fn test_find_is_recursive_and_case_insensitive() {
        let session = session_with_drive();
        let state = find(&session, "/remote", "report*", &CancellationToken::new()).unwrap();
        let mut paths: Vec<String> = state.results.into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(paths, vec!["/remote/docs/Report.TXT", "/remote/docs/old/report.txt"]);
        assert_eq!(state.directory, "/remote");
    }

    #[test]
    fn test_find_honors_cancellation() {
        let session = session_with_drive();
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            find(&session, "/remote", "*", &token),
            Err(NavError::Cancelled)
        ));
    }

    #[test]
    fn test_exists_on_unmounted_storage() {
        let secure = Arc::new(VirtualConsole::new(
            "/mnt/secure",
            Arc::new(MemoryProvider::new().with_dir("/a")),
        ));
        let session = Session::builder().mount(secure.clone()).build();
        assert!(!exists(&session, "/mnt/secure/a").unwrap());
        secure.mount();
        assert!(exists(&session, "/mnt/secure/a").unwrap());
        assert!(!exists(&session, "/mnt/secure/b").unwrap());
    }

    #[test]
    fn test_transfer_between_consoles() {
        let remote = RemoteConsole::new(
            "/remote",
            Arc::new(MemoryProvider::new().with_file("/album/one.jpg", b"1")),
        );
        let secure = VirtualConsole::new("/mnt/secure", Arc::new(MemoryProvider::new()));
        secure.mount();

        transfer(
            &remote,
            &secure,
            "/remote/album",
            "/mnt/secure/album",
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(secure.read_file("/mnt/secure/album/one.jpg").unwrap(), b"1");
    }
}
