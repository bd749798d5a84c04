//! Error types for modsync

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for modsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for modsync operations
///
/// Expected git states (up to date, nothing to commit, conflicts) are not
/// errors; they are reported through the result enums in [`crate::git`].
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error raised by libgit2
    #[error("Git error: {}", .0.message())]
    Git(#[from] git2::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Path is not inside a git repository
    #[error("Invalid git repository: {}", .0.display())]
    InvalidRepository(PathBuf),

    /// A remote host could not be reached
    #[error("Network unreachable: {0}")]
    Offline(String),

    /// A guarded network call did not finish in time
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        /// Name of the operation that timed out
        operation: &'static str,
        /// How long the caller waited
        after: Duration,
    },

    /// The operation was cancelled by its owner
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error reported by the forge (fork / pull request host)
    #[error("Forge error: {0}")]
    Forge(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is a timeout of a guarded network call
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}
