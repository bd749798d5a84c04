//! Error types for GitHub operations

use thiserror::Error;

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub operations
#[derive(Error, Debug)]
pub enum Error {
    /// GitHub API error
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    /// Authentication error
    #[error("GitHub authentication error: {0}")]
    Auth(String),

    /// Repository does not exist or is not visible to the token
    #[error("Repository {0} not found")]
    RepoNotFound(String),

    /// A repository with the fork's name exists but is not a fork of upstream
    #[error("{0} exists but is not a fork of {1}")]
    NotAFork(String, String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether GitHub answered 404
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::RepoNotFound(_) => true,
            Error::Api(octocrab::Error::GitHub { source, .. }) => {
                source.message.contains("Not Found")
            }
            _ => false,
        }
    }
}

impl From<Error> for modsync_core::Error {
    fn from(err: Error) -> Self {
        modsync_core::Error::Forge(err.to_string())
    }
}
