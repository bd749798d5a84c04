//! Classifying repositories by whether their remote has new commits

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::git::{try_check_updates, CancelFlag, GitOperationConfig, RepoHandle};
use crate::Error;

/// Where one repository stands after an update check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Not a git repository, or not openable as one
    Invalid,
    /// The check failed
    Errored(String),
    /// Messages of the incoming commits, newest first
    Updates(Vec<String>),
    /// Nothing new on the remote
    Current,
}

/// Check one repository and classify the outcome
pub fn classify_repository(path: &Path, config: &GitOperationConfig, cancel: &CancelFlag) -> UpdateStatus {
    let handle = match RepoHandle::open(path) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Skipping invalid repository");
            return UpdateStatus::Invalid;
        }
    };

    let status = match try_check_updates(&handle, config, cancel) {
        Ok(Some(commits)) if !commits.is_empty() => {
            UpdateStatus::Updates(commits.into_iter().map(|c| c.message).collect())
        }
        Ok(_) => UpdateStatus::Current,
        Err(Error::InvalidRepository(_)) => UpdateStatus::Invalid,
        Err(e) => {
            let message = e.to_string();
            if message.to_lowercase().contains("invalid git repository") {
                UpdateStatus::Invalid
            } else {
                tracing::warn!(path = %path.display(), error = %message, "Update check failed");
                UpdateStatus::Errored(message)
            }
        }
    };

    handle.cleanup();
    status
}

/// Aggregate of an update check over many repositories
///
/// Repositories that are current have no entry anywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Incoming commit messages per repository
    pub updates: BTreeMap<PathBuf, Vec<String>>,
    /// Paths that are not git repositories
    pub invalid_paths: Vec<PathBuf>,
    /// Failure message per repository
    pub errors: BTreeMap<PathBuf, String>,
}

impl UpdateReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// File one repository's status
    pub fn record(&mut self, path: PathBuf, status: UpdateStatus) {
        match status {
            UpdateStatus::Invalid => self.invalid_paths.push(path),
            UpdateStatus::Errored(message) => {
                self.errors.insert(path, message);
            }
            UpdateStatus::Updates(messages) => {
                self.updates.insert(path, messages);
            }
            UpdateStatus::Current => {}
        }
    }

    pub fn has_updates(&self) -> bool {
        !self.updates.is_empty()
    }

    /// No updates, no invalid paths, no errors
    pub fn is_clean(&self) -> bool {
        self.updates.is_empty() && self.invalid_paths.is_empty() && self.errors.is_empty()
    }
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} with updates, {} invalid, {} failed",
            self.updates.len(),
            self.invalid_paths.len(),
            self.errors.len()
        )
    }
}
