/*!
 * filenav - Navigation, console and history engine for file managers
 *
 * This library keeps the state of file browsing panes: a history of visited
 * directories with back semantics, cancellable background listings through
 * pluggable consoles (local, privileged shell, secure virtual mounts, remote
 * storage providers) and copy/move/rename orchestration across consoles.
 */

pub mod bookmarks;
pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod history;
pub mod navigation;
pub mod operations;
pub mod path;
pub mod prompt;
pub mod report;
pub mod session;
pub mod sort;
pub mod state;
pub mod task;
pub mod types;
pub mod utils;


// Re-export main components for easier access
pub use config::{AccessMode, Config, Settings, SortMode};
pub use console::{Console, ConsoleKind};
pub use error::{ErrorClass, NavError, Result};
pub use history::{HistoryEntry, HistoryStack};
pub use navigation::{DirectoryChange, NavigationListener, NavigationView, TaskState};
pub use operations::{FileOperations, OperationKind, OperationListener, OperationReport};
pub use prompt::{Decision, UserPrompt};
pub use session::{Session, SessionBuilder};
pub use state::{NavigationState, PersistedNavigation, SearchState};
pub use types::{FileSystemObject, FsoKind, StorageVolume};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
