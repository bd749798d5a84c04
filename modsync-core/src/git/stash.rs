//! Stash save, apply, pop, drop and list

use git2::{ErrorCode, Oid, StashFlags};

use super::commit::signature;
use super::status::conflicted_paths;
use super::{GitOperationConfig, GitOutcome, RepoHandle, StashResult};
use crate::notify::OperationKind;
use crate::Result;

/// Message used when a stash is saved without one
pub const DEFAULT_STASH_MESSAGE: &str = "modsync: stashed changes";

/// One stash operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StashAction {
    /// Stash uncommitted changes
    Save {
        message: Option<String>,
        include_untracked: bool,
    },
    /// Apply a stash and keep it
    Apply { index: usize },
    /// Apply a stash and drop it when it applied cleanly
    Pop { index: usize },
    /// Delete a stash
    Drop { index: usize },
    /// Enumerate stashes
    List,
}

/// A stash entry, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashEntry {
    pub index: usize,
    pub message: String,
    pub id: Oid,
}

/// Run a stash action
///
/// A pop that runs into conflicts yields [`StashResult::StashPopConflict`]
/// and leaves the repository as it is; resolving is up to the caller.
pub fn stash(handle: &mut RepoHandle, action: &StashAction, config: &GitOperationConfig) -> StashResult {
    let result = match try_stash(handle, action) {
        Ok(result) => result,
        Err(e) => {
            config.report(
                OperationKind::Stash,
                &format!("Stash failed in {}", handle.root().display()),
                Some(&e.to_string()),
            );
            return StashResult::GitError;
        }
    };

    if result == StashResult::StashPopConflict {
        let details = handle
            .inner()
            .index()
            .ok()
            .and_then(|index| conflicted_paths(&index).ok())
            .filter(|paths| !paths.is_empty())
            .map(|paths| paths.join("\n"));
        config.report(
            OperationKind::Stash,
            "Restoring stashed changes caused conflicts",
            details.as_deref(),
        );
    } else if result.is_successful() {
        tracing::debug!(root = %handle.root().display(), %result, "Stash finished");
    }
    result
}

fn try_stash(handle: &mut RepoHandle, action: &StashAction) -> Result<StashResult> {
    match action {
        StashAction::Save {
            message,
            include_untracked,
        } => {
            let sig = signature(handle.inner())?;
            let message = message.as_deref().unwrap_or(DEFAULT_STASH_MESSAGE);
            let flags = if *include_untracked {
                StashFlags::INCLUDE_UNTRACKED
            } else {
                StashFlags::DEFAULT
            };

            match handle.inner_mut().stash_save(&sig, message, Some(flags)) {
                Ok(oid) => {
                    tracing::info!(root = %handle.root().display(), stash = %oid, "Stashed changes");
                    Ok(StashResult::Stashed)
                }
                Err(e) if e.code() == ErrorCode::NotFound => Ok(StashResult::NoChanges),
                Err(e) => Err(e.into()),
            }
        }
        StashAction::Apply { index } => match handle.inner_mut().stash_apply(*index, None) {
            Ok(()) if handle.inner().index()?.has_conflicts() => Ok(StashResult::StashPopConflict),
            Ok(()) => Ok(StashResult::StashApplied),
            Err(e) if is_conflict(&e) => Ok(StashResult::StashPopConflict),
            Err(e) => Err(e.into()),
        },
        // Applied then dropped by hand so a conflicting entry stays recoverable
        StashAction::Pop { index } => match handle.inner_mut().stash_apply(*index, None) {
            Ok(()) if handle.inner().index()?.has_conflicts() => Ok(StashResult::StashPopConflict),
            Ok(()) => {
                handle.inner_mut().stash_drop(*index)?;
                Ok(StashResult::StashPopSuccess)
            }
            Err(e) if is_conflict(&e) => Ok(StashResult::StashPopConflict),
            Err(e) => Err(e.into()),
        },
        StashAction::Drop { index } => {
            handle.inner_mut().stash_drop(*index)?;
            Ok(StashResult::StashDropped)
        }
        StashAction::List => {
            let entries = list_stashes(handle)?;
            for entry in &entries {
                tracing::info!(index = entry.index, id = %entry.id, "{}", entry.message);
            }
            Ok(StashResult::StashListSuccess)
        }
    }
}

fn is_conflict(error: &git2::Error) -> bool {
    matches!(error.code(), ErrorCode::Conflict | ErrorCode::MergeConflict)
}

/// All stashes, newest first
pub fn list_stashes(handle: &mut RepoHandle) -> Result<Vec<StashEntry>> {
    let mut entries = Vec::new();
    handle.inner_mut().stash_foreach(|index, message, id| {
        entries.push(StashEntry {
            index,
            message: message.to_string(),
            id: *id,
        });
        true
    })?;
    Ok(entries)
}
