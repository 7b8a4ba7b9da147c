/*!
 * Console abstraction
 *
 * A console is a command-execution backend bound to a filesystem scope. The
 * navigation engine never touches a filesystem directly; every listing, stat
 * and transfer goes through one of these.
 */

mod local;
mod provider;
mod remote;
mod shell;
mod virtual_fs;

pub use local::LocalConsole;
pub use provider::{MemoryProvider, StorageProvider};
pub use remote::RemoteConsole;
pub use shell::ShellConsole;
pub use virtual_fs::VirtualConsole;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use strum::Display;

use crate::error::{NavError, Result};
use crate::path;
use crate::types::FileSystemObject;

/// Console variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConsoleKind {
    /// Direct filesystem access
    Local,
    /// Shell command definitions
    Shell,
    /// Secure virtual mount
    Virtual,
    /// Remote storage provider
    Remote,
}

/// A command-execution backend bound to a filesystem scope
///
/// All calls block the calling thread; the engine only invokes them from
/// background tasks. Paths outside [`Console::scope`] fail with
/// [`NavError::OutOfScope`].
pub trait Console: Send + Sync + fmt::Debug {
    /// Console variant
    fn kind(&self) -> ConsoleKind;

    /// Path prefix every request must live under
    fn scope(&self) -> &str;

    /// Whether commands run with elevated privileges
    fn is_privileged(&self) -> bool {
        false
    }

    /// Whether the console can still accept commands
    fn is_alive(&self) -> bool;

    /// Whether the backing storage is currently mounted
    fn is_mounted(&self) -> bool {
        true
    }

    /// List the entries of a directory
    fn list_files(&self, path: &str) -> Result<Vec<FileSystemObject>>;

    /// Stat a single path
    fn stat(&self, path: &str) -> Result<FileSystemObject>;

    /// Copy `src` to `dst` (recursively for directories)
    fn copy(&self, src: &str, dst: &str) -> Result<()>;

    /// Move `src` to `dst`
    fn move_file(&self, src: &str, dst: &str) -> Result<()>;

    /// Delete a path (recursively for directories)
    fn delete(&self, path: &str) -> Result<()>;

    /// Create a directory, including missing parents
    fn create_directory(&self, path: &str) -> Result<()>;

    /// Read a whole file
    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or replace a file
    fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Ask the console to abandon in-flight work; returns whether anything
    /// was running
    fn cancel(&self) -> bool;

    /// Release the console; later calls fail
    fn dispose(&self);
}

/// Rejects paths outside `scope`
pub(crate) fn ensure_in_scope(scope: &str, candidate: &str) -> Result<()> {
    if path::is_descendant_or_self(candidate, scope) {
        Ok(())
    } else {
        Err(NavError::OutOfScope(candidate.to_string()))
    }
}

/// Liveness and cancellation flags shared by the console implementations
#[derive(Debug, Default)]
pub(crate) struct ConsoleFlags {
    disposed: AtomicBool,
    cancelled: AtomicBool,
    busy: AtomicBool,
}

impl ConsoleFlags {
    pub(crate) fn is_alive(&self) -> bool {
        !self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn dispose(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.disposed.store(true, Ordering::Release);
    }

    /// Marks the start of a command, failing on a disposed console
    pub(crate) fn begin(&self, what: &str) -> Result<BusyGuard<'_>> {
        if !self.is_alive() {
            return Err(NavError::ConsoleAlloc(format!(
                "console disposed before {}",
                what
            )));
        }
        self.cancelled.store(false, Ordering::Release);
        self.busy.store(true, Ordering::Release);
        Ok(BusyGuard { flags: self })
    }

    pub(crate) fn cancel(&self) -> bool {
        self.cancelled.store(true, Ordering::Release);
        self.busy.load(Ordering::Acquire)
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Acquire) {
            Err(NavError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Clears the busy flag when a command finishes
pub(crate) struct BusyGuard<'a> {
    flags: &'a ConsoleFlags,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flags.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_check() {
        assert!(ensure_in_scope("/mnt/secure", "/mnt/secure/a").is_ok());
        assert!(ensure_in_scope("/", "/anything").is_ok());
        let err = ensure_in_scope("/mnt/secure", "/sdcard").unwrap_err();
        assert!(matches!(err, NavError::OutOfScope(p) if p == "/sdcard"));
    }

    #[test]
    fn test_flags_lifecycle() {
        let flags = ConsoleFlags::default();
        {
            let _guard = flags.begin("list").unwrap();
            assert!(flags.cancel());
            assert!(flags.check_cancelled().is_err());
        }
        assert!(!flags.cancel());

        flags.dispose();
        assert!(!flags.is_alive());
        assert!(matches!(
            flags.begin("list"),
            Err(NavError::ConsoleAlloc(_))
        ));
    }
}
