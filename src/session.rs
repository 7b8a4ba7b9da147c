/*!
 * Session state shared by navigation views and file operations
 *
 * A session owns what a file manager process keeps global: the current
 * settings, the storage volumes, the lazily allocated background console,
 * the mounted virtual and remote consoles, the privilege state, the prompt
 * used to reach the user and the bookmarks.
 */

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use crate::bookmarks::Bookmarks;
use crate::config::{AccessMode, Config, Settings, ShellConfig};
use crate::console::{Console, LocalConsole, ShellConsole};
use crate::error::{NavError, Result};
use crate::path;
use crate::prompt::{AutoPrompt, UserPrompt};
use crate::types::StorageVolume;

/// Creates consoles on demand
pub trait ConsoleAllocator: Send + Sync + fmt::Debug {
    /// Allocate a console, privileged or not
    fn allocate(&self, privileged: bool) -> Result<Arc<dyn Console>>;
}

/// Local console for normal access, shell console behind the elevation
/// wrapper for privileged access
#[derive(Debug, Clone, Default)]
pub struct DefaultAllocator {
    shell: ShellConfig,
}

impl DefaultAllocator {
    pub fn new(shell: ShellConfig) -> Self {
        Self { shell }
    }
}

impl ConsoleAllocator for DefaultAllocator {
    fn allocate(&self, privileged: bool) -> Result<Arc<dyn Console>> {
        if privileged {
            Ok(Arc::new(ShellConsole::privileged(self.shell.clone())?))
        } else {
            Ok(Arc::new(LocalConsole::new()))
        }
    }
}

/// Shared session state
pub struct Session {
    settings: RwLock<Settings>,
    volumes: Vec<StorageVolume>,
    home: String,
    allocator: Arc<dyn ConsoleAllocator>,
    background: Mutex<Option<Arc<dyn Console>>>,
    mounts: RwLock<Vec<Arc<dyn Console>>>,
    elevated: AtomicBool,
    prompt: Arc<dyn UserPrompt>,
    bookmarks: Bookmarks,
    max_retries: usize,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("settings", &self.settings())
            .field("volumes", &self.volumes)
            .field("home", &self.home)
            .field("elevated", &self.is_elevated())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Snapshot of the current settings
    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Replace the settings
    ///
    /// Changing the access mode drops the elevated state and the background
    /// console so the next command runs with the new privileges.
    pub fn update_settings(&self, settings: Settings) {
        let previous = match self.settings.write() {
            Ok(mut current) => std::mem::replace(&mut *current, settings.clone()),
            Err(_) => return,
        };
        if previous.access_mode != settings.access_mode {
            info!(
                "Access mode changed from {} to {}",
                previous.access_mode, settings.access_mode
            );
            self.elevated.store(false, Ordering::SeqCst);
            self.invalidate_background();
        }
    }

    pub fn access_mode(&self) -> AccessMode {
        self.settings().access_mode
    }

    pub fn is_chrooted(&self) -> bool {
        self.access_mode().is_chrooted()
    }

    pub fn volumes(&self) -> &[StorageVolume] {
        &self.volumes
    }

    pub fn home(&self) -> &str {
        &self.home
    }

    /// Directory to fall back to when the current one becomes unreachable
    pub fn fallback_dir(&self) -> String {
        if self.is_chrooted() {
            if let Some(volume) = self.volumes.first() {
                return volume.path.clone();
            }
        }
        self.home.clone()
    }

    /// Volume containing `target`, the innermost one when volumes nest
    pub fn volume_for(&self, target: &str) -> Option<&StorageVolume> {
        self.volumes
            .iter()
            .filter(|v| v.contains(target))
            .max_by_key(|v| v.path.len())
    }

    /// Whether `target` is the mount point of a volume
    pub fn is_volume_root(&self, target: &str) -> bool {
        let target = path::normalize(target);
        self.volumes.iter().any(|v| v.path == target)
    }

    pub fn prompt(&self) -> &Arc<dyn UserPrompt> {
        &self.prompt
    }

    pub fn bookmarks(&self) -> &Bookmarks {
        &self.bookmarks
    }

    /// Retries granted to a timed out step
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated.load(Ordering::SeqCst)
    }

    fn wants_privileges(&self) -> bool {
        match self.access_mode() {
            AccessMode::Root => true,
            AccessMode::Prompt => self.is_elevated(),
            AccessMode::Safe => false,
        }
    }

    /// Switch to privileged consoles; refused in chroot mode
    pub fn elevate(&self) -> bool {
        if self.is_chrooted() {
            warn!("Refusing to elevate a sandboxed session");
            return false;
        }
        info!("Elevating session privileges");
        self.elevated.store(true, Ordering::SeqCst);
        self.invalidate_background();
        true
    }

    /// Allocate a console with the session's current privileges
    ///
    /// A privileged allocation that fails falls back to a normal console.
    pub fn allocate_console(&self) -> Result<Arc<dyn Console>> {
        let privileged = self.wants_privileges();
        match self.allocator.allocate(privileged) {
            Ok(console) => Ok(console),
            Err(NavError::ConsoleAlloc(reason)) if privileged => {
                warn!("Privileged console unavailable ({}), falling back", reason);
                self.allocator.allocate(false)
            }
            Err(e) => Err(e),
        }
    }

    /// The shared background console, allocated on first use
    pub fn background_console(&self) -> Result<Arc<dyn Console>> {
        let mut slot = self
            .background
            .lock()
            .map_err(|_| NavError::ConsoleAlloc("background console lock poisoned".into()))?;
        if let Some(console) = slot.as_ref() {
            if console.is_alive() {
                return Ok(Arc::clone(console));
            }
        }
        let console = self.allocate_console()?;
        debug!(
            "Allocated background {} console (privileged: {})",
            console.kind(),
            console.is_privileged()
        );
        *slot = Some(Arc::clone(&console));
        Ok(console)
    }

    /// Dispose the background console; the next command allocates a new one
    pub fn invalidate_background(&self) {
        if let Ok(mut slot) = self.background.lock() {
            if let Some(console) = slot.take() {
                debug!("Disposing background {} console", console.kind());
                console.dispose();
            }
        }
    }

    /// Register a virtual or remote console
    pub fn mount_console(&self, console: Arc<dyn Console>) {
        if let Ok(mut mounts) = self.mounts.write() {
            info!("Registering {} console at {}", console.kind(), console.scope());
            mounts.retain(|c| c.scope() != console.scope());
            mounts.push(console);
        }
    }

    /// Unregister the console at `scope`
    pub fn unmount_console(&self, scope: &str) -> Option<Arc<dyn Console>> {
        let scope = path::normalize(scope);
        let mut mounts = self.mounts.write().ok()?;
        let index = mounts.iter().position(|c| c.scope() == scope)?;
        Some(mounts.remove(index))
    }

    /// Registered console whose scope is the longest prefix of `target`
    pub fn mounted_console_for(&self, target: &str) -> Option<Arc<dyn Console>> {
        let mounts = self.mounts.read().ok()?;
        mounts
            .iter()
            .filter(|c| path::is_descendant_or_self(target, c.scope()))
            .max_by_key(|c| c.scope().len())
            .cloned()
    }

    /// Whether `target` sits on a registered console that is not mounted
    pub fn is_unmounted(&self, target: &str) -> bool {
        self.mounted_console_for(target)
            .map_or(false, |console| !console.is_mounted())
    }

    /// Console for `target`: a registered one or the background console
    pub fn console_for(&self, target: &str) -> Result<Arc<dyn Console>> {
        match self.mounted_console_for(target) {
            Some(console) => Ok(console),
            None => self.background_console(),
        }
    }

    /// Console owned by one file operation
    ///
    /// Registered consoles are shared; anything else gets a fresh console
    /// the operation disposes when done.
    pub fn operation_console(&self, target: &str) -> Result<(Arc<dyn Console>, bool)> {
        match self.mounted_console_for(target) {
            Some(console) => Ok((console, false)),
            None => Ok((self.allocate_console()?, true)),
        }
    }
}

/// Builder for [`Session`]
#[derive(Default)]
pub struct SessionBuilder {
    settings: Settings,
    volumes: Vec<StorageVolume>,
    home: Option<String>,
    allocator: Option<Arc<dyn ConsoleAllocator>>,
    prompt: Option<Arc<dyn UserPrompt>>,
    mounts: Vec<Arc<dyn Console>>,
    max_retries: Option<usize>,
}

impl SessionBuilder {
    /// Start from a CLI configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            settings: config.settings.clone(),
            volumes: config.volumes.clone(),
            home: Some(config.home.clone()),
            allocator: Some(Arc::new(DefaultAllocator::new(config.shell.clone()))),
            max_retries: Some(config.max_retries),
            ..Self::default()
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn volume(mut self, volume: StorageVolume) -> Self {
        self.volumes.push(volume);
        self
    }

    pub fn home(mut self, home: &str) -> Self {
        self.home = Some(path::normalize(home));
        self
    }

    pub fn allocator(mut self, allocator: Arc<dyn ConsoleAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    pub fn prompt(mut self, prompt: Arc<dyn UserPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn mount(mut self, console: Arc<dyn Console>) -> Self {
        self.mounts.push(console);
        self
    }

    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn build(self) -> Arc<Session> {
        let session = Session {
            settings: RwLock::new(self.settings),
            volumes: self.volumes,
            home: self.home.unwrap_or_else(|| path::ROOT.to_string()),
            allocator: self
                .allocator
                .unwrap_or_else(|| Arc::new(DefaultAllocator::default())),
            background: Mutex::new(None),
            mounts: RwLock::new(Vec::new()),
            elevated: AtomicBool::new(false),
            prompt: self.prompt.unwrap_or_else(|| Arc::new(AutoPrompt::default())),
            bookmarks: Bookmarks::new(),
            max_retries: self.max_retries.unwrap_or(1),
        };
        for console in self.mounts {
            session.mount_console(console);
        }
        Arc::new(session)
    }
}
