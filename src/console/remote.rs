/*!
 * Remote storage-provider console
 */

use std::sync::Arc;

use super::{ensure_in_scope, Console, ConsoleFlags, ConsoleKind, StorageProvider};
use crate::error::{NavError, Result};
use crate::path;
use crate::types::FileSystemObject;

/// Console exposing a storage provider under a local path prefix
#[derive(Debug)]
pub struct RemoteConsole {
    scope: String,
    provider: Arc<dyn StorageProvider>,
    flags: ConsoleFlags,
}

impl RemoteConsole {
    /// Expose `provider` under `scope`
    pub fn new(scope: &str, provider: Arc<dyn StorageProvider>) -> Self {
        Self {
            scope: path::normalize(scope),
            provider,
            flags: ConsoleFlags::default(),
        }
    }

    fn inner(&self, target: &str) -> Result<String> {
        ensure_in_scope(&self.scope, target)?;
        path::rebase(target, &self.scope, path::ROOT)
            .ok_or_else(|| NavError::OutOfScope(target.to_string()))
    }

    fn outer(&self, mut fso: FileSystemObject) -> FileSystemObject {
        if let Some(mapped) = path::rebase(&fso.path, path::ROOT, &self.scope) {
            fso.name = path::file_name(&mapped).to_string();
            fso.path = mapped;
        }
        fso.remote = true;
        fso
    }
}

impl Console for RemoteConsole {
    fn kind(&self) -> ConsoleKind {
        ConsoleKind::Remote
    }

    fn scope(&self) -> &str {
        &self.scope
    }

    fn is_alive(&self) -> bool {
        self.flags.is_alive()
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

    #[test]
    fn test_remote_objects_are_flagged() {
        let provider = MemoryProvider::new().with_file("/photos/cat.jpg", b"meow");
        let console = RemoteConsole::new("/remote/drive", Arc::new(provider));

        let files = console.list_files("/remote/drive/photos").unwrap();
        assert_eq!(files[0].path, "/remote/drive/photos/cat.jpg");
        assert!(files[0].remote);
        assert!(!files[0].secure);

        console
            .move_file("/remote/drive/photos/cat.jpg", "/remote/drive/cat.jpg")
            .unwrap();
        assert_eq!(console.read_file("/remote/drive/cat.jpg").unwrap(), b"meow");
    }
}
