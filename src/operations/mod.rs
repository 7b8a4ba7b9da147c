/*!
 * Copy, move, rename, duplicate and delete orchestration
 *
 * Every transfer kind runs through the same pipeline:
 *
 * 1. pre-flight on the caller's thread, without touching any console;
 * 2. on a background task, list the destination, compute duplicate names and
 *    ask before overwriting anything;
 * 3. run the items in order, each on the consoles serving its two ends,
 *    retrying timeouts and pausing for privilege relaunch, then verify the
 *    destination with a stat.
 *
 * Completed items are never rolled back.
 */

pub mod linked;
pub mod naming;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use strum::Display;
use tracing::{debug, info, warn};

use crate::commands;
use crate::console::Console;
use crate::error::{NavError, Result};
use crate::path;
use crate::prompt::Decision;
use crate::session::Session;
use crate::task::{self, CancellationToken, TaskHandle};
use crate::types::FileSystemObject;
use crate::ensure;

pub use linked::LinkedResource;
pub use naming::create_non_existing_name;

/// Transfer kinds sharing the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum OperationKind {
    Copy,
    Move,
    Rename,
    CreateCopy,
}

impl OperationKind {
    fn removes_source(self) -> bool {
        matches!(self, Self::Move | Self::Rename)
    }
}

/// Outcome of one item
#[derive(Debug)]
pub struct ItemResult {
    pub source: String,
    /// Final destination, empty for deletions
    pub destination: String,
    pub error: Option<NavError>,
}

impl ItemResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// How an operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OperationStatus {
    /// Every item succeeded
    Completed,
    /// At least one item failed or was never attempted
    PartiallyFailed,
    /// Cancelled by the caller or at a prompt
    Cancelled,
    /// The user refused to overwrite
    Declined,
}

/// Summary of a finished operation
#[derive(Debug)]
pub struct OperationReport {
    /// `None` for deletions
    pub kind: Option<OperationKind>,
    pub status: OperationStatus,
    pub items: Vec<ItemResult>,
    /// Items requested
    pub total: usize,
    pub duration: Duration,
}

impl OperationReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Completed
    }
}

/// Receives operation progress; called from the background task
pub trait OperationListener: Send + Sync {
    /// `done` of `total` items processed
    fn on_progress(&self, done: usize, total: usize, item: &ItemResult) {
        let _ = (done, total, item);
    }

    /// The affected directories changed and should be reloaded
    fn on_request_refresh(&self) {}
}

/// Listener ignoring every event
#[derive(Debug, Default)]
pub struct NoopListener;

impl OperationListener for NoopListener {}

/// Consoles currently used by a running operation
type ActiveConsoles = Arc<Mutex<Vec<Arc<dyn Console>>>>;

/// A running operation
pub struct Operation {
    handle: TaskHandle<Result<OperationReport>>,
    active: ActiveConsoles,
}

impl Operation {
    /// Cancel the operation and the console work in flight
    pub fn cancel(&self) {
        self.handle.cancel();
        if let Ok(active) = self.active.lock() {
            for console in active.iter() {
                console.cancel();
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the operation finished
    pub fn wait(self) -> Result<OperationReport> {
        self.handle.join()?
    }
}

/// Entry point for file operations
pub struct FileOperations {
    session: Arc<Session>,
    listener: Arc<dyn OperationListener>,
    current_dir: Option<String>,
}

impl FileOperations {
    pub fn new(session: Arc<Session>, listener: Arc<dyn OperationListener>) -> Self {
        Self {
            session,
            listener,
            current_dir: None,
        }
    }

    /// Directory the user is browsing; a move of it or an ancestor is refused
    pub fn with_current_dir(mut self, dir: &str) -> Self {
        self.current_dir = Some(path::normalize(dir));
        self
    }

    /// Copy `files` into `dest_dir`
    pub fn copy(&self, files: &[FileSystemObject], dest_dir: &str) -> Result<Operation> {
        let items = files
            .iter()
            .map(|f| LinkedResource::into_dir(f, dest_dir))
            .collect();
        self.start(OperationKind::Copy, items, dest_dir)
    }

    /// Move `files` into `dest_dir`
    pub fn move_files(&self, files: &[FileSystemObject], dest_dir: &str) -> Result<Operation> {
        let items = files
            .iter()
            .map(|f| LinkedResource::into_dir(f, dest_dir))
            .collect();
        self.start(OperationKind::Move, items, dest_dir)
    }

    /// Rename `fso` in place
    pub fn rename(&self, fso: &FileSystemObject, new_name: &str) -> Result<Operation> {
        ensure!(
            path::is_valid_name(new_name),
            InvalidArgument,
            "invalid file name: {:?}",
            new_name
        );
        let dir = fso.parent().unwrap_or_else(|| path::ROOT.to_string());
        self.start(
            OperationKind::Rename,
            vec![LinkedResource::renamed(fso, new_name)],
            &dir,
        )
    }

    /// Copy `fso` next to itself under a fresh `name (n).ext`
    pub fn create_duplicate(&self, fso: &FileSystemObject) -> Result<Operation> {
        let dir = fso.parent().unwrap_or_else(|| path::ROOT.to_string());
        self.start(
            OperationKind::CreateCopy,
            vec![LinkedResource::into_dir(fso, &dir)],
            &dir,
        )
    }

    /// Delete `files`
    pub fn delete(&self, files: &[FileSystemObject]) -> Result<Operation> {
        ensure!(!files.is_empty(), InvalidArgument, "nothing to delete");
        for file in files {
            ensure!(
                !file.is_parent_marker() && !path::is_root(&file.path),
                Consistency,
                "cannot delete {}",
                file.path
            );
        }

        let worker = self.worker();
        let active = Arc::clone(&worker.active);
        let targets: Vec<String> = files.iter().map(|f| f.path.clone()).collect();
        let handle = task::spawn("delete", move |token| {
            let mut worker = worker;
            worker.token = token;
            worker.run_delete(targets)
        })?;
        Ok(Operation { handle, active })
    }

    fn start(
        &self,
        kind: OperationKind,
        items: Vec<LinkedResource>,
        dest_dir: &str,
    ) -> Result<Operation> {
        linked::preflight(kind, &items, dest_dir, self.current_dir.as_deref())?;
        info!("Starting {} of {} items into {}", kind, items.len(), dest_dir);

        let worker = self.worker();
        let active = Arc::clone(&worker.active);
        let dest_dir = path::normalize(dest_dir);
        let handle = task::spawn(&kind.to_string(), move |token| {
            let mut worker = worker;
            worker.token = token;
            worker.run(kind, items, dest_dir)
        })?;
        Ok(Operation { handle, active })
    }

    fn worker(&self) -> Worker {
        Worker {
            session: Arc::clone(&self.session),
            listener: Arc::clone(&self.listener),
            token: CancellationToken::new(),
            active: Arc::new(Mutex::new(Vec::new())),
            owned: None,
        }
    }
}

/// Background side of an operation
struct Worker {
    session: Arc<Session>,
    listener: Arc<dyn OperationListener>,
    token: CancellationToken,
    active: ActiveConsoles,
    /// Console allocated for this operation, with the privilege it was made for
    owned: Option<(Arc<dyn Console>, bool)>,
}

/// Why the item loop stopped early
enum Abort {
    Cancelled,
    /// A permission failure the user did not allow to relaunch
    Denied,
}

impl Worker {
    fn run(
        &mut self,
        kind: OperationKind,
        mut items: Vec<LinkedResource>,
        dest_dir: String,
    ) -> Result<OperationReport> {
        let started = Instant::now();
        let total = items.len();

        let listing = match self.attempt(|w| {
            let console = w.console(&dest_dir)?;
            console.list_files(&dest_dir)
        }) {
            Ok(listing) => listing,
            Err(e) if e.is_cancelled() => {
                return Ok(self.finish(Some(kind), OperationStatus::Cancelled, Vec::new(), total, started))
            }
            Err(e) => {
                self.release();
                return Err(e);
            }
        };

        if kind == OperationKind::CreateCopy {
            for item in items.iter_mut() {
                let name = create_non_existing_name(&item.source, &listing);
                item.destination = linked::relocated(&item.source, &path::join(&dest_dir, &name));
            }
        }

        let existing: HashSet<&str> = listing.iter().map(|f| f.path.as_str()).collect();
        let collisions: Vec<String> = items
            .iter()
            .filter(|i| existing.contains(i.destination.path.as_str()))
            .map(|i| i.destination.path.clone())
            .collect();
        if !collisions.is_empty() {
            debug!("{} destinations already exist", collisions.len());
            match self.session.prompt().confirm_overwrite(&collisions) {
                Decision::Granted => {}
                Decision::Denied => {
                    info!("Overwrite declined, {} aborted", kind);
                    return Ok(self.finish(Some(kind), OperationStatus::Declined, Vec::new(), total, started));
                }
                Decision::Cancelled => {
                    return Ok(self.finish(Some(kind), OperationStatus::Cancelled, Vec::new(), total, started));
                }
            }
        }
        let replaced: HashSet<String> = listing
            .into_iter()
            .filter(|f| f.is_directory() && !f.is_symlink() && collisions.contains(&f.path))
            .map(|f| f.path)
            .collect();

        let mut results = Vec::with_capacity(total);
        let mut abort = None;
        for (index, item) in items.iter().enumerate() {
            if self.token.is_cancelled() {
                abort = Some(Abort::Cancelled);
                break;
            }
            let outcome = self.attempt(|w| w.transfer_item(kind, item, replaced.contains(&item.destination.path)));
            let result = ItemResult {
                source: item.source.path.clone(),
                destination: item.destination.path.clone(),
                error: outcome.err(),
            };
            match &result.error {
                Some(e) if e.is_cancelled() => {
                    abort = Some(Abort::Cancelled);
                    break;
                }
                Some(e) if e.is_relaunchable() => {
                    warn!("{} of {} needs privileges: {}", kind, item.source.path, e);
                    abort = Some(Abort::Denied);
                }
                Some(e) => warn!("{} of {} failed: {}", kind, item.source.path, e),
                None => {}
            }
            self.listener.on_progress(index + 1, total, &result);
            results.push(result);
            if abort.is_some() {
                break;
            }
        }

        let status = match abort {
            Some(Abort::Cancelled) => OperationStatus::Cancelled,
            Some(Abort::Denied) => OperationStatus::PartiallyFailed,
            None if results.iter().all(ItemResult::is_ok) => OperationStatus::Completed,
            None => OperationStatus::PartiallyFailed,
        };

        if status == OperationStatus::Completed && kind.removes_source() {
            for item in &items {
                self.session.bookmarks().drop_orphans(&item.source.path);
            }
        }
        if results.iter().any(ItemResult::is_ok) {
            self.listener.on_request_refresh();
        }
        Ok(self.finish(Some(kind), status, results, total, started))
    }

    fn run_delete(&mut self, targets: Vec<String>) -> Result<OperationReport> {
        let started = Instant::now();
        let total = targets.len();
        let mut results = Vec::with_capacity(total);
        let mut status = OperationStatus::Completed;

        for (index, target) in targets.iter().enumerate() {
            if self.token.is_cancelled() {
                status = OperationStatus::Cancelled;
                break;
            }
            let outcome = self.attempt(|w| {
                w.token.check()?;
                w.console(target)?.delete(target)
            });
            if let Err(e) = &outcome {
                if e.is_cancelled() {
                    status = OperationStatus::Cancelled;
                    break;
                }
                warn!("Delete of {} failed: {}", target, e);
                status = OperationStatus::PartiallyFailed;
            } else {
                self.session.bookmarks().drop_orphans(target);
            }
            let result = ItemResult {
                source: target.clone(),
                destination: String::new(),
                error: outcome.err(),
            };
            self.listener.on_progress(index + 1, total, &result);
            results.push(result);
        }

        if results.iter().any(ItemResult::is_ok) {
            self.listener.on_request_refresh();
        }
        Ok(self.finish(None, status, results, total, started))
    }

    /// Move or copy one item and verify its destination
    fn transfer_item(&mut self, kind: OperationKind, item: &LinkedResource, replace_dir: bool) -> Result<()> {
        let (src, dst) = (&item.source.path, &item.destination.path);
        self.token.check()?;
        let from = self.console(src)?;
        let to = self.console(dst)?;
        let same_console = Arc::ptr_eq(&from, &to);

        if replace_dir {
            debug!("Replacing directory {}", dst);
            to.delete(dst)?;
        }
        self.token.check()?;

        match (kind.removes_source(), same_console) {
            (true, true) => from.move_file(src, dst)?,
            (false, true) => from.copy(src, dst)?,
            (removes, false) => {
                commands::transfer(from.as_ref(), to.as_ref(), src, dst, &self.token)?;
                if removes {
                    from.delete(src)?;
                }
            }
        }

        to.stat(dst).map_err(|e| match e {
            NavError::NoSuchFileOrDirectory(_) => {
                NavError::NoSuchFileOrDirectory(format!("{} missing after {}", dst, kind))
            }
            other => other,
        })?;
        Ok(())
    }

    /// Run `step`, retrying timeouts and relaunching on permission failures
    fn attempt<T, F>(&mut self, mut step: F) -> Result<T>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let mut retries = 0;
        loop {
            self.token.check()?;
            match step(self) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retries < self.session.max_retries() => {
                    retries += 1;
                    warn!("Retrying after timeout ({}/{}): {}", retries, self.session.max_retries(), e);
                }
                Err(e) if e.is_relaunchable() && self.can_relaunch() => {
                    match self.session.prompt().request_relaunch(&e) {
                        Decision::Granted => {
                            info!("Relaunching with privileges after: {}", e);
                            self.session.elevate();
                        }
                        Decision::Denied => return Err(e),
                        Decision::Cancelled => return Err(NavError::Cancelled),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn can_relaunch(&self) -> bool {
        self.session.access_mode().allows_relaunch() && !self.session.is_elevated()
    }

    /// Console serving `target` for this operation
    fn console(&mut self, target: &str) -> Result<Arc<dyn Console>> {
        if let Some(console) = self.session.mounted_console_for(target) {
            self.track(&console);
            return Ok(console);
        }
        let elevated = self.session.is_elevated();
        if let Some((console, made_elevated)) = &self.owned {
            if *made_elevated == elevated && console.is_alive() {
                return Ok(Arc::clone(console));
            }
        }
        let console = self.session.allocate_console()?;
        debug!("Allocated {} console for operation", console.kind());
        if let Some((previous, _)) = self.owned.replace((Arc::clone(&console), elevated)) {
            previous.dispose();
        }
        self.track(&console);
        Ok(console)
    }

    fn track(&self, console: &Arc<dyn Console>) {
        if let Ok(mut active) = self.active.lock() {
            if !active.iter().any(|c| Arc::ptr_eq(c, console)) {
                active.push(Arc::clone(console));
            }
        }
    }

    /// Dispose the consoles owned by this operation
    fn release(&mut self) {
        if let Some((console, _)) = self.owned.take() {
            console.dispose();
        }
        if let Ok(mut active) = self.active.lock() {
            active.clear();
        }
    }

    fn finish(
        &mut self,
        kind: Option<OperationKind>,
        status: OperationStatus,
        items: Vec<ItemResult>,
        total: usize,
        started: Instant,
    ) -> OperationReport {
        self.release();
        let report = OperationReport {
            kind,
            status,
            items,
            total,
            duration: started.elapsed(),
        };
        info!(
            "Operation finished: {} ({} ok, {} failed of {})",
            report.status,
            report.succeeded(),
            report.failed(),
            total
        );
        report
    }
}
