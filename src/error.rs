//! Error handling for filenav
//!
//! Every console, navigation and file-operation failure is expressed as a
//! [`NavError`]. Callers decide what to do with a failure through
//! [`NavError::class`]: relaunch with elevated privileges, retry, fall back
//! to a lesser console, or surface it verbatim.

use std::io;
use thiserror::Error;

/// Global error type for filenav operations
#[derive(Error, Debug)]
pub enum NavError {
    /// The path does not exist on the backing store
    #[error("No such file or directory: {0}")]
    NoSuchFileOrDirectory(String),

    /// The console lacks the privileges for the request
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    /// A command needed by the console is not installed
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    /// A command produced output the console cannot interpret
    #[error("Invalid command definition: {0}")]
    InvalidCommandDefinition(String),

    /// The command did not finish before its deadline
    #[error("Operation timed out: {0}")]
    OperationTimeout(String),

    /// Opaque failure reported by the backend
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// A console could not be created
    #[error("Console allocation failed: {0}")]
    ConsoleAlloc(String),

    /// The path lies outside the console scope
    #[error("Path is outside of console scope: {0}")]
    OutOfScope(String),

    /// The virtual mount backing the path is not mounted
    #[error("Storage not mounted: {0}")]
    NotMounted(String),

    /// Pre-flight validation of a file operation failed
    #[error("Consistency violation: {0}")]
    Consistency(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// JSON processing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Specialized Result type for filenav operations
pub type Result<T> = std::result::Result<T, NavError>;

/// How a caller is expected to react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The target is gone
    NotFound,
    /// Recoverable by relaunching with elevated privileges
    PermissionDenied,
    /// Worth retrying as is
    Timeout,
    /// Fatal for the current operation; a lesser console may still work
    ConsoleUnavailable,
    /// Terminal state, not a failure
    Cancelled,
    /// Rejected before reaching any console
    ConsistencyViolation,
    /// Surfaced to the user verbatim
    Opaque,
}

impl NavError {
    /// Classify the error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoSuchFileOrDirectory(_) | Self::NotMounted(_) => ErrorClass::NotFound,
            Self::InsufficientPermissions(_) => ErrorClass::PermissionDenied,
            Self::OperationTimeout(_) => ErrorClass::Timeout,
            Self::CommandNotFound(_) | Self::InvalidCommandDefinition(_) | Self::ConsoleAlloc(_) => {
                ErrorClass::ConsoleUnavailable
            }
            Self::Cancelled => ErrorClass::Cancelled,
            Self::Consistency(_) | Self::OutOfScope(_) | Self::InvalidArgument(_) => {
                ErrorClass::ConsistencyViolation
            }
            Self::ExecutionError(_) | Self::Json(_) => ErrorClass::Opaque,
        }
    }

    /// Whether a privilege relaunch can recover the failed step
    pub fn is_relaunchable(&self) -> bool {
        self.class() == ErrorClass::PermissionDenied
    }

    /// Whether the failed step can be retried unchanged
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Timeout
    }

    /// Whether this is the cancellation terminal state
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Classify an I/O error raised while touching `path`
    pub fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NoSuchFileOrDirectory(path.to_string()),
            io::ErrorKind::PermissionDenied => {
                Self::InsufficientPermissions(format!("{}: {}", path, err))
            }
            io::ErrorKind::TimedOut => Self::OperationTimeout(format!("{}: {}", path, err)),
            _ => Self::ExecutionError(format!("{}: {}", path, err)),
        }
    }
}

impl From<io::Error> for NavError {
    fn from(err: io::Error) -> Self {
        let message = err.to_string();
        Self::from_io(err, &message)
    }
}

/// Creates a NavError with a formatted message
#[macro_export]
macro_rules! error {
    ($error_type:ident, $($arg:tt)*) => {
        $crate::error::NavError::$error_type(format!($($arg)*))
    };
}

/// Returns an error result with a formatted message
#[macro_export]
macro_rules! bail {
    ($error_type:ident, $($arg:tt)*) => {
        return Err($crate::error!($error_type, $($arg)*))
    };
}

/// Ensures a condition is true, otherwise returns an error
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $error_type:ident, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($error_type, $($arg)*)
        }
    };
}

// The CLI reports through io::Result like the rest of main
impl From<NavError> for io::Error {
    fn from(err: NavError) -> Self {
        let kind = match err.class() {
            ErrorClass::NotFound => io::ErrorKind::NotFound,
            ErrorClass::PermissionDenied => io::ErrorKind::PermissionDenied,
            ErrorClass::Timeout => io::ErrorKind::TimedOut,
            ErrorClass::ConsistencyViolation => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(path: &str) -> Result<()> {
        ensure!(path.starts_with('/'), InvalidArgument, "not absolute: {}", path);
        Ok(())
    }

    #[test]
    fn test_io_errors_map_to_taxonomy() {
        let err = NavError::from_io(io::Error::from(io::ErrorKind::NotFound), "/sdcard/x");
        assert!(matches!(err, NavError::NoSuchFileOrDirectory(ref p) if p == "/sdcard/x"));

        let err = NavError::from_io(io::Error::from(io::ErrorKind::PermissionDenied), "/data");
        assert!(err.is_relaunchable());

        let err = NavError::from_io(io::Error::from(io::ErrorKind::TimedOut), "/mnt");
        assert!(err.is_retryable());

        let err = NavError::from_io(io::Error::new(io::ErrorKind::Other, "boom"), "/mnt");
        assert_eq!(err.class(), ErrorClass::Opaque);
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            NavError::NotMounted("/mnt/secure".into()).class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            NavError::ConsoleAlloc("su".into()).class(),
            ErrorClass::ConsoleUnavailable
        );
        assert_eq!(
            NavError::Consistency("x".into()).class(),
            ErrorClass::ConsistencyViolation
        );
        assert!(NavError::Cancelled.is_cancelled());
        assert!(!NavError::Cancelled.is_relaunchable());
    }

    #[test]
    fn test_ensure_macro() {
        assert!(check("/sdcard").is_ok());
        let err = check("sdcard").unwrap_err();
        assert_eq!(err.to_string(), "Invalid argument: not absolute: sdcard");
    }
}
