/*!
 * Navigation view
 *
 * A [`NavigationView`] owns the state of one browsing pane: the current
 * directory, the displayed files, the selection and the history. Directory
 * changes run as background tasks; their outcomes come back over a channel
 * and are applied on the owner's thread by [`NavigationView::process_events`]
 * or [`NavigationView::wait_idle`]. At most one listing runs per view.
 */

pub mod task;

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::commands;
use crate::error::{NavError, Result};
use crate::history::{HistoryEntry, HistoryStack};
use crate::path;
use crate::session::Session;
use crate::state::{Navigable, NavigationState, PersistedNavigation, SearchState};
use crate::task::{self as background, TaskHandle};
use crate::types::FileSystemObject;

pub use task::{DirectoryChange, Listing, Outcome, TaskState};
use task::{Event, ListingRequest};

/// Receives view events, always on the owner's thread
pub trait NavigationListener: Send + Sync {
    fn on_directory_changed(&self, _dir: &FileSystemObject) {}

    fn on_new_history(&self, _entry: &HistoryEntry) {}

    fn on_selection_changed(&self, _selection: &[FileSystemObject]) {}

    /// The displayed listing is stale
    fn on_request_refresh(&self) {}

    /// A listing failed; the current directory is unchanged
    fn on_navigation_failed(&self, _path: &str, _error: &NavError) {}

    /// The current directory became unreachable
    fn on_request_go_home(&self) {}

    /// Back reached a search entry
    fn on_restore_search(&self, _search: &SearchState) {}
}

/// Listener ignoring every event
#[derive(Debug, Default)]
pub struct NoopNavigationListener;

impl NavigationListener for NoopNavigationListener {}

struct ActiveTask {
    handle: TaskHandle<()>,
    path: String,
}

/// One browsing pane
pub struct NavigationView {
    id: String,
    session: Arc<Session>,
    listener: Arc<dyn NavigationListener>,
    history: HistoryStack,
    current: Option<FileSystemObject>,
    files: Vec<FileSystemObject>,
    selection: Vec<FileSystemObject>,
    first_visible: Option<FileSystemObject>,
    chroot: bool,
    picker: bool,
    state: TaskState,
    active: Option<ActiveTask>,
    generation: u64,
    sender: Sender<Event>,
    receiver: Receiver<Event>,
    pending_retry: Option<DirectoryChange>,
}

impl NavigationView {
    pub fn new(id: &str, session: Arc<Session>, listener: Arc<dyn NavigationListener>) -> Self {
        let (sender, receiver) = mpsc::channel();
        let chroot = session.is_chrooted();
        Self {
            id: id.to_string(),
            session,
            listener,
            history: HistoryStack::new(),
            current: None,
            files: Vec::new(),
            selection: Vec::new(),
            first_visible: None,
            chroot,
            picker: false,
            state: TaskState::Idle,
            active: None,
            generation: 0,
            sender,
            receiver,
            pending_retry: None,
        }
    }

    /// Picker mode shows `/` as the list of storage volumes
    pub fn with_picker_mode(mut self, picker: bool) -> Self {
        self.picker = picker;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn current_dir(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.path.as_str())
    }

    pub fn current(&self) -> Option<&FileSystemObject> {
        self.current.as_ref()
    }

    pub fn files(&self) -> &[FileSystemObject] {
        &self.files
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_chroot(&self) -> bool {
        self.chroot
    }

    pub fn first_visible(&self) -> Option<&FileSystemObject> {
        self.first_visible.as_ref()
    }

    /// Record the scroll anchor
    pub fn set_first_visible(&mut self, fso: Option<FileSystemObject>) {
        self.first_visible = fso;
    }

    /// Whether a failed listing can be retried
    pub fn can_retry(&self) -> bool {
        self.pending_retry.is_some()
    }

    /// Start listing a directory, cancelling the listing in progress
    pub fn change_current_dir(&mut self, change: DirectoryChange) -> Result<()> {
        if self.is_showing(&change) {
            debug!("View {} already shows {}", self.id, change.path);
            return Ok(());
        }
        self.cancel_active();
        self.generation += 1;
        let generation = self.generation;

        let current = if change.use_current {
            self.current
                .as_ref()
                .map(|dir| (dir.clone(), self.files.clone()))
        } else {
            None
        };
        let request = ListingRequest {
            change,
            picker: self.picker,
            current,
        };
        let path = request.change.path.clone();
        let session = Arc::clone(&self.session);
        let sender = self.sender.clone();

        let handle = background::spawn("listing", move |token| {
            let outcome = task::run_listing(&session, request, &token);
            // The view may be gone
            let _ = sender.send(Event {
                generation,
                outcome,
            });
        })?;
        debug!("View {} listing {} (generation {})", self.id, path, generation);
        self.state = TaskState::Listing;
        self.active = Some(ActiveTask { handle, path });
        Ok(())
    }

    /// Whether `change` asks for the loaded directory with nothing to restore
    fn is_showing(&self, change: &DirectoryChange) -> bool {
        !change.reload
            && !change.use_current
            && change.search.is_none()
            && change.selection.is_none()
            && change.scroll_to.is_none()
            && self.active.is_none()
            && self.state == TaskState::Loaded
            && self.current_dir() == Some(change.path.as_str())
    }

    /// Cancel the listing in progress and wait for its teardown
    pub fn cancel(&mut self) {
        if self.cancel_active() {
            self.state = TaskState::Cancelled;
        }
    }

    fn cancel_active(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        active.handle.cancel();
        if let Some(console) = self.session.mounted_console_for(&active.path) {
            console.cancel();
        } else if let Ok(console) = self.session.background_console() {
            console.cancel();
        }
        if let Err(e) = active.handle.join() {
            warn!("Listing of {} ended abnormally: {}", active.path, e);
        }
        true
    }

    /// Apply finished listings; returns how many were applied
    pub fn process_events(&mut self) -> Result<usize> {
        let mut applied = 0;
        while let Ok(event) = self.receiver.try_recv() {
            if self.apply(event)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Block until no listing is in progress
    pub fn wait_idle(&mut self) -> Result<TaskState> {
        while self.active.is_some() {
            let event = self
                .receiver
                .recv()
                .map_err(|_| NavError::ExecutionError("listing channel closed".to_string()))?;
            self.apply(event)?;
        }
        Ok(self.state)
    }

    fn apply(&mut self, event: Event) -> Result<bool> {
        if event.generation != self.generation {
            debug!("Dropping stale listing (generation {})", event.generation);
            return Ok(false);
        }
        if let Some(active) = self.active.take() {
            let _ = active.handle.join();
        }

        match event.outcome {
            Outcome::Loaded(listing) => self.apply_loaded(listing),
            Outcome::Cancelled => self.state = TaskState::Cancelled,
            Outcome::Failed { change, error } => {
                self.state = TaskState::Failed;
                self.listener.on_navigation_failed(&change.path, &error);
                let home = self.session.fallback_dir();
                if let (NavError::NotMounted(mount), false) = (&error, change.path == home) {
                    let dropped = self.prune_under(mount);
                    info!("{} is not mounted, dropped {} history entries", mount, dropped);
                    self.go_home()?;
                } else {
                    self.pending_retry = Some(change);
                }
            }
        }
        Ok(true)
    }

    fn apply_loaded(&mut self, listing: Listing) {
        let Listing {
            change,
            directory,
            files,
            chroot,
        } = listing;

        let left = self.current_dir().map(str::to_string);
        if change.add_to_history {
            let item = match &change.search {
                Some(search) => Some(Navigable::Search(search.clone())),
                None if left.as_deref().map_or(false, |l| l != directory.path) => {
                    Some(Navigable::Navigation(self.snapshot()))
                }
                None => None,
            };
            if let Some(item) = item {
                self.history.push(item);
                if let Some(entry) = self.history.peek_last() {
                    self.listener.on_new_history(entry);
                }
            }
        }

        let same_dir = left.as_deref() == Some(directory.path.as_str());
        self.files = files;
        self.current = Some(directory);
        self.chroot = chroot;

        let previous_selection = std::mem::take(&mut self.selection);
        let wanted = match change.selection {
            Some(selection) => selection,
            None if same_dir => previous_selection.clone(),
            None => Vec::new(),
        };
        self.selection = wanted
            .into_iter()
            .filter(|s| self.files.iter().any(|f| f.path == s.path))
            .collect();
        if self.selection != previous_selection {
            self.listener.on_selection_changed(&self.selection);
        }

        self.first_visible = match change.scroll_to {
            Some(anchor) => self.files.iter().find(|f| f.path == anchor.path).cloned(),
            None if same_dir => self.first_visible.take(),
            None => None,
        };

        self.state = TaskState::Loaded;
        self.pending_retry = None;
        if let Some(current) = &self.current {
            self.listener.on_directory_changed(current);
        }
    }

    /// Snapshot of what the view currently shows
    pub fn snapshot(&self) -> NavigationState {
        NavigationState {
            view_id: self.id.clone(),
            current_dir: self.current_dir().unwrap_or(path::ROOT).to_string(),
            selection: self.selection.clone(),
            chroot: self.chroot,
            files: self.files.clone(),
            first_visible: self.first_visible.clone(),
        }
    }

    /// Go back to the newest history entry that can still be shown
    ///
    /// Entries whose directory vanished or sits on an unmounted storage are
    /// discarded on the way. Returns whether anything was restored.
    pub fn back(&mut self) -> Result<bool> {
        while let Some(entry) = self.history.pop() {
            let dir = entry.item.directory().to_string();
            if self.session.is_unmounted(&dir) {
                debug!("Skipping history entry on unmounted storage: {}", dir);
                continue;
            }
            if matches!(commands::exists(&self.session, &dir), Ok(false)) {
                debug!("Skipping vanished history entry: {}", dir);
                continue;
            }

            match entry.item {
                Navigable::Search(search) => {
                    if self.cancel_active() {
                        self.generation += 1;
                        self.state = TaskState::Cancelled;
                    }
                    self.listener.on_restore_search(&search);
                }
                Navigable::Navigation(state) => {
                    self.change_current_dir(
                        DirectoryChange::to(&state.current_dir)
                            .restore_selection(state.selection)
                            .scroll_to(state.first_visible),
                    )?;
                }
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Run the last failed listing again
    pub fn retry(&mut self) -> Result<bool> {
        match self.pending_retry.take() {
            Some(change) => {
                self.change_current_dir(change)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reload the current directory, keeping selection and scroll position
    pub fn refresh(&mut self) -> Result<()> {
        let Some(current) = self.current_dir().map(str::to_string) else {
            return Ok(());
        };
        let change = DirectoryChange::to(&current)
            .reload()
            .restore_selection(self.selection.clone())
            .scroll_to(self.first_visible.clone());
        self.change_current_dir(change)
    }

    /// Re-apply the session settings to the listing
    pub fn on_settings_changed(&mut self) -> Result<()> {
        self.chroot = self.session.is_chrooted();
        self.listener.on_request_refresh();
        self.refresh()
    }

    /// React to a storage being mounted or unmounted
    pub fn on_mount_state_changed(&mut self, mount_point: &str, mounted: bool) {
        if mounted {
            if self.picker && self.current_dir().map_or(false, path::is_root) {
                self.listener.on_request_refresh();
            }
            return;
        }
        let mount_point = path::normalize(mount_point);
        let dropped = self.prune_under(&mount_point) + self.history.prune_unmounted(&self.session);
        debug!("Dropped {} history entries after unmount of {}", dropped, mount_point);

        let before = self.selection.len();
        self.selection
            .retain(|s| !path::is_descendant_or_self(&s.path, &mount_point));
        if self.selection.len() != before {
            self.listener.on_selection_changed(&self.selection);
        }

        if self
            .current_dir()
            .map_or(false, |c| path::is_descendant_or_self(c, &mount_point))
        {
            info!("Current directory was on {}, requesting home", mount_point);
            self.listener.on_request_go_home();
        }
    }

    fn prune_under(&mut self, mount_point: &str) -> usize {
        self.history
            .prune(|e| path::is_descendant_or_self(e.item.directory(), mount_point))
    }

    /// Show the fallback directory without adding history
    pub fn go_home(&mut self) -> Result<()> {
        let home = self.session.fallback_dir();
        self.change_current_dir(DirectoryChange::to(&home))
    }

    /// Everything needed to bring the view back after recreation
    pub fn save_state(&self) -> PersistedNavigation {
        PersistedNavigation {
            current_dir: self.current_dir().map(str::to_string),
            files: self.files.clone(),
            selection: self.selection.clone(),
            chroot: self.chroot,
            first_visible: self.first_visible.clone(),
            history: self.history.entries().to_vec(),
        }
    }

    /// Restore a saved state without touching any console
    pub fn restore_state(&mut self, saved: PersistedNavigation) {
        self.cancel_active();
        self.generation += 1;
        self.current = saved
            .current_dir
            .as_deref()
            .map(FileSystemObject::directory);
        self.files = saved.files;
        self.selection = saved.selection;
        self.chroot = saved.chroot;
        self.first_visible = saved.first_visible;
        self.history = HistoryStack::from_entries(saved.history);
        self.state = if self.current.is_some() {
            TaskState::Loaded
        } else {
            TaskState::Idle
        };
        if let Some(current) = &self.current {
            self.listener.on_directory_changed(current);
        }
    }

    pub fn selection(&self) -> &[FileSystemObject] {
        &self.selection
    }

    /// Add a listed entry to the selection
    pub fn select(&mut self, target: &str) -> bool {
        let target = path::normalize(target);
        if self.selection.iter().any(|s| s.path == target) {
            return false;
        }
        let Some(fso) = self
            .files
            .iter()
            .find(|f| f.path == target && !f.is_parent_marker())
        else {
            return false;
        };
        self.selection.push(fso.clone());
        self.listener.on_selection_changed(&self.selection);
        true
    }

    pub fn deselect(&mut self, target: &str) -> bool {
        let target = path::normalize(target);
        let before = self.selection.len();
        self.selection.retain(|s| s.path != target);
        let changed = self.selection.len() != before;
        if changed {
            self.listener.on_selection_changed(&self.selection);
        }
        changed
    }

    pub fn select_all(&mut self) {
        self.selection = self
            .files
            .iter()
            .filter(|f| !f.is_parent_marker())
            .cloned()
            .collect();
        self.listener.on_selection_changed(&self.selection);
    }

    pub fn clear_selection(&mut self) {
        if !self.selection.is_empty() {
            self.selection.clear();
            self.listener.on_selection_changed(&self.selection);
        }
    }
}

impl Drop for NavigationView {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.cancel();
        }
    }
}
