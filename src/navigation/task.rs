/*!
 * Directory listing task
 *
 * A listing resolves the chroot boundary, lists and stats the target on the
 * console serving it, applies the display preferences and synthesizes the
 * parent entry. It runs on a background task and reports one [`Outcome`].
 */

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::console::Console;
use crate::error::{NavError, Result};
use crate::path;
use crate::prompt::Decision;
use crate::session::Session;
use crate::sort::apply_display_prefs;
use crate::state::SearchState;
use crate::task::CancellationToken;
use crate::types::FileSystemObject;

/// A request to show a directory
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryChange {
    pub path: String,
    /// Push the state being left onto the history
    pub add_to_history: bool,
    /// Reload the directory even when it is the current one
    pub reload: bool,
    /// Reuse the files already listed instead of asking the console
    pub use_current: bool,
    /// Search the user navigates away from
    pub search: Option<SearchState>,
    /// Entry to scroll to once loaded
    pub scroll_to: Option<FileSystemObject>,
    /// Selection to restore once loaded
    pub selection: Option<Vec<FileSystemObject>>,
}

impl DirectoryChange {
    pub fn to(path: &str) -> Self {
        Self {
            path: path::normalize(path),
            add_to_history: false,
            reload: false,
            use_current: false,
            search: None,
            scroll_to: None,
            selection: None,
        }
    }

    pub fn add_to_history(mut self) -> Self {
        self.add_to_history = true;
        self
    }

    pub fn reload(mut self) -> Self {
        self.reload = true;
        self
    }

    pub fn use_current(mut self) -> Self {
        self.use_current = true;
        self
    }

    pub fn search(mut self, search: SearchState) -> Self {
        self.search = Some(search);
        self
    }

    pub fn scroll_to(mut self, fso: Option<FileSystemObject>) -> Self {
        self.scroll_to = fso;
        self
    }

    pub fn restore_selection(mut self, selection: Vec<FileSystemObject>) -> Self {
        self.selection = Some(selection);
        self
    }
}

/// Lifecycle of the view's listing task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Listing,
    Loaded,
    Failed,
    Cancelled,
}

/// A finished listing, ready to be applied
#[derive(Debug, Clone)]
pub struct Listing {
    /// The request, with its path replaced by the directory actually listed
    pub change: DirectoryChange,
    pub directory: FileSystemObject,
    pub files: Vec<FileSystemObject>,
    pub chroot: bool,
}

/// Result of a listing task
#[derive(Debug)]
pub enum Outcome {
    Loaded(Listing),
    Failed {
        change: DirectoryChange,
        error: NavError,
    },
    Cancelled,
}

/// Outcome tagged with the generation of the request that produced it
#[derive(Debug)]
pub(crate) struct Event {
    pub generation: u64,
    pub outcome: Outcome,
}

/// Everything the background side needs
#[derive(Debug, Clone)]
pub(crate) struct ListingRequest {
    pub change: DirectoryChange,
    pub picker: bool,
    /// Current directory and files, for `use_current`
    pub current: Option<(FileSystemObject, Vec<FileSystemObject>)>,
}

pub(crate) fn run_listing(
    session: &Session,
    request: ListingRequest,
    token: &CancellationToken,
) -> Outcome {
    debug!("Listing {}", request.change.path);
    let change = request.change.clone();
    match list(session, request, token) {
        Ok(_) if token.is_cancelled() => Outcome::Cancelled,
        Ok(listing) => {
            debug!(
                "Listed {} ({} entries)",
                listing.directory.path,
                listing.files.len()
            );
            Outcome::Loaded(listing)
        }
        Err(NavError::Cancelled) => Outcome::Cancelled,
        Err(error) => {
            warn!("Listing {} failed: {}", change.path, error);
            Outcome::Failed { change, error }
        }
    }
}

fn list(
    session: &Session,
    request: ListingRequest,
    token: &CancellationToken,
) -> Result<Listing> {
    token.check()?;
    let chroot = session.is_chrooted();
    let mut change = request.change;
    let mut target = path::normalize(&change.path);

    if request.picker && path::is_root(&target) {
        let files = session
            .volumes()
            .iter()
            .map(FileSystemObject::volume_root)
            .collect();
        change.path = target.clone();
        return Ok(Listing {
            change,
            directory: FileSystemObject::directory(&target),
            files,
            chroot,
        });
    }

    if chroot && session.volume_for(&target).is_none() {
        let volume = session.volumes().first().ok_or_else(|| {
            NavError::OutOfScope(format!("{} and no storage volume to fall back to", target))
        })?;
        info!("{} is outside the storage volumes, showing {}", target, volume.path);
        target = volume.path.clone();
    }
    change.path = target.clone();

    let (directory, files) = match (&request.current, change.use_current) {
        (Some((directory, files)), true) if directory.path == target => (
            directory.clone(),
            files
                .iter()
                .filter(|f| !f.is_parent_marker())
                .cloned()
                .collect(),
        ),
        _ => {
            let files = with_relaunch(session, &target, token, |c| c.list_files(&target))?;
            token.check()?;
            let directory = with_relaunch(session, &target, token, |c| c.stat(&target))?;
            (directory, files)
        }
    };
    if !directory.is_directory() {
        return Err(NavError::InvalidArgument(format!("not a directory: {}", target)));
    }

    let settings = session.settings();
    let mut files = apply_display_prefs(files, &settings, chroot);

    if !path::is_root(&target) {
        if chroot && session.is_volume_root(&target) {
            if request.picker {
                files.insert(0, FileSystemObject::parent_marker(path::ROOT));
            }
        } else if let Some(parent) = path::parent(&target) {
            files.insert(0, FileSystemObject::parent_marker(&parent));
        }
    }

    Ok(Listing {
        change,
        directory,
        files,
        chroot,
    })
}

/// Run one console step, relaunching with privileges when allowed
fn with_relaunch<T, F>(
    session: &Session,
    target: &str,
    token: &CancellationToken,
    mut step: F,
) -> Result<T>
where
    F: FnMut(&Arc<dyn Console>) -> Result<T>,
{
    let mut retries = 0;
    loop {
        token.check()?;
        let console = session.console_for(target)?;
        match step(&console) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && retries < session.max_retries() => {
                retries += 1;
                warn!("Retrying {} after timeout: {}", target, e);
            }
            Err(e)
                if e.is_relaunchable()
                    && session.access_mode().allows_relaunch()
                    && !session.is_elevated() =>
            {
                info!("Asking to relaunch {} with privileges", target);
                match session.prompt().request_relaunch(&e) {
                    Decision::Granted => {
                        session.elevate();
                    }
                    Decision::Denied => return Err(e),
                    Decision::Cancelled => return Err(NavError::Cancelled),
                }
            }
            Err(e) => return Err(e),
        }
    }
}
