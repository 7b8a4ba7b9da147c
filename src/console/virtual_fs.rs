/*!
 * Secure virtual mount console
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use super::{ensure_in_scope, Console, ConsoleFlags, ConsoleKind, StorageProvider};
use crate::error::{NavError, Result};
use crate::path;
use crate::types::FileSystemObject;

/// Console for a secure storage mounted at a fixed mount point
///
/// The storage can be mounted and unmounted while the console lives; every
/// call on an unmounted console fails with [`NavError::NotMounted`].
#[derive(Debug)]
pub struct VirtualConsole {
    mount_point: String,
    provider: Arc<dyn StorageProvider>,
    mounted: AtomicBool,
    flags: ConsoleFlags,
}

impl VirtualConsole {
    /// Create an unmounted console at `mount_point`
    pub fn new(mount_point: &str, provider: Arc<dyn StorageProvider>) -> Self {
        Self {
            mount_point: path::normalize(mount_point),
            provider,
            mounted: AtomicBool::new(false),
            flags: ConsoleFlags::default(),
        }
    }

    /// Mount the storage
    pub fn mount(&self) {
        info!("Mounting secure storage at {}", self.mount_point);
        self.mounted.store(true, Ordering::Release);
    }

    /// Unmount the storage, abandoning in-flight work
    pub fn unmount(&self) {
        info!("Unmounting secure storage at {}", self.mount_point);
        self.mounted.store(false, Ordering::Release);
        self.flags.cancel();
    }

    /// Map a scoped path onto the provider namespace
    fn inner(&self, target: &str) -> Result<String> {
        ensure_in_scope(&self.mount_point, target)?;
        if !self.is_mounted() {
            return Err(NavError::NotMounted(self.mount_point.clone()));
        }
        path::rebase(target, &self.mount_point, path::ROOT)
            .ok_or_else(|| NavError::OutOfScope(target.to_string()))
    }

    /// Map a provider object back into the mount point
    fn outer(&self, mut fso: FileSystemObject) -> FileSystemObject {
        if let Some(mapped) = path::rebase(&fso.path, path::ROOT, &self.mount_point) {
            fso.name = path::file_name(&mapped).to_string();
            fso.path = mapped;
        }
        fso.secure = true;
        fso
    }
}

impl Console for VirtualConsole {
    fn kind(&self) -> ConsoleKind {
        ConsoleKind::Virtual
    }

    fn scope(&self) -> &str {
        &self.mount_point
    }

    fn is_alive(&self) -> bool {
        self.flags.is_alive()
    }

    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    fn list_files(&self, dir: &str) -> Result<Vec<FileSystemObject>> {
        let inner = self.inner(dir)?;
        let _busy = self.flags.begin("list")?;
        let files = self.provider.list(&inner)?;
        self.flags.check_cancelled()?;
        Ok(files.into_iter().map(|f| self.outer(f)).collect())
    }

    fn stat(&self, target: &str) -> Result<FileSystemObject> {
        let inner = self.inner(target)?;
        let _busy = self.flags.begin("stat")?;
        self.provider.stat(&inner).map(|f| self.outer(f))
    }

    fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let (src, dst) = (self.inner(src)?, self.inner(dst)?);
        let _busy = self.flags.begin("copy")?;
        self.provider.copy(&src, &dst)
    }

    fn move_file(&self, src: &str, dst: &str) -> Result<()> {
        let (src, dst) = (self.inner(src)?, self.inner(dst)?);
        let _busy = self.flags.begin("move")?;
        self.provider.rename(&src, &dst)
    }

    fn delete(&self, target: &str) -> Result<()> {
        let inner = self.inner(target)?;
        let _busy = self.flags.begin("delete")?;
        self.provider.remove(&inner)
    }

    fn create_directory(&self, target: &str) -> Result<()> {
        let inner = self.inner(target)?;
        let _busy = self.flags.begin("mkdir")?;
        self.provider.create_dir(&inner)
    }

    fn read_file(&self, target: &str) -> Result<Vec<u8>> {
        let inner = self.inner(target)?;
        let _busy = self.flags.begin("read")?;
        self.provider.read(&inner)
    }

    fn write_file(&self, target: &str, data: &[u8]) -> Result<()> {
        let inner = self.inner(target)?;
        let _busy = self.flags.begin("write")?;
        self.provider.write(&inner, data)
    }

    fn cancel(&self) -> bool {
        self.flags.cancel()
    }

    fn dispose(&self) {
        self.flags.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::MemoryProvider;

    fn secure() -> VirtualConsole {
        let provider = MemoryProvider::new().with_file("/vault/key.txt", b"k");
        VirtualConsole::new("/mnt/secure", Arc::new(provider))
    }

    #[test]
    fn test_unmounted_console_refuses_calls() {
        let console = secure();
        assert!(!console.is_mounted());
        assert!(matches!(
            console.list_files("/mnt/secure"),
            Err(NavError::NotMounted(_))
        ));
    }

    #[test]
    fn test_paths_are_mapped_through_mount_point() {
        let console = secure();
        console.mount();
        let files = console.list_files("/mnt/secure/vault").unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "/mnt/secure/vault/key.txt");
        assert!(files[0].secure);

        let root = console.stat("/mnt/secure").unwrap();
        assert_eq!(root.path, "/mnt/secure");
        assert_eq!(root.name, "secure");
    }

    #[test]
    fn test_scope_is_enforced() {
        let console = secure();
        console.mount();
        assert!(matches!(
            console.stat("/sdcard"),
            Err(NavError::OutOfScope(_))
        ));
    }
}
