//! Staging and committing

use std::path::{Path, PathBuf};

use git2::{ErrorCode, Index, IndexAddOption, Oid, Repository, Signature, Tree};

use super::{GitOperationConfig, RepoHandle, StageCommitResult};
use crate::notify::OperationKind;
use crate::Result;

/// Identity used when the repository and user config define none
const FALLBACK_NAME: &str = "modsync";
const FALLBACK_EMAIL: &str = "modsync@localhost";

/// What to stage before committing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staging {
    /// Every change in the working tree, including deletions and new files
    All,
    /// Only these paths, relative to the working tree root or absolute below it
    Paths(Vec<PathBuf>),
    /// Nothing; commit whatever the index already holds
    Index,
}

/// Committer identity configured for `repo`, or a fixed fallback
pub(crate) fn signature(repo: &Repository) -> Result<Signature<'static>> {
    match repo.signature() {
        Ok(sig) => Ok(sig),
        Err(e) if e.code() == ErrorCode::NotFound => {
            tracing::warn!("No git identity configured, committing as {}", FALLBACK_NAME);
            Ok(Signature::now(FALLBACK_NAME, FALLBACK_EMAIL)?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Stage according to `staging`, then commit with `message`
///
/// Never creates an empty commit: when the resulting tree equals the parent's
/// tree the result is [`StageCommitResult::NoChanges`].
pub fn stage_commit(
    handle: &RepoHandle,
    message: &str,
    staging: &Staging,
    config: &GitOperationConfig,
) -> StageCommitResult {
    match try_stage_commit(handle, message, staging, config) {
        Ok(result) => result,
        Err(e) => {
            config.report(
                OperationKind::StageCommit,
                &format!("Failed to commit in {}", handle.root().display()),
                Some(&e.to_string()),
            );
            StageCommitResult::GitError
        }
    }
}

fn try_stage_commit(
    handle: &RepoHandle,
    message: &str,
    staging: &Staging,
    config: &GitOperationConfig,
) -> Result<StageCommitResult> {
    let repo = handle.inner();
    let parent = match handle.head_commit_id()? {
        Some(id) => Some(repo.find_commit(id)?),
        None => None,
    };
    let parent_tree = parent.as_ref().map(|c| c.tree()).transpose()?;
    let mut index = repo.index()?;

    let staged = match staging {
        Staging::All => stage_all(&mut index),
        Staging::Paths(paths) => {
            stage_paths(handle.root(), &mut index, paths);
            Ok(())
        }
        Staging::Index => Ok(()),
    };
    if let Err(e) = staged.and_then(|_| index.write()) {
        config.report(
            OperationKind::StageCommit,
            "Failed to stage changes",
            Some(e.message()),
        );
        return Ok(StageCommitResult::StagingFailed);
    }

    let tree_id = index.write_tree()?;
    if tree_unchanged(tree_id, parent_tree.as_ref(), &index) {
        tracing::debug!(root = %handle.root().display(), "Nothing to commit");
        return Ok(StageCommitResult::NoChanges);
    }

    match create_commit(repo, tree_id, message, parent.as_ref()) {
        Ok(oid) => {
            tracing::info!(root = %handle.root().display(), commit = %oid, "Committed");
            Ok(StageCommitResult::Committed)
        }
        Err(e) => {
            config.report(
                OperationKind::StageCommit,
                "Failed to create commit",
                Some(&e.to_string()),
            );
            Ok(StageCommitResult::CommitFailed)
        }
    }
}

fn stage_all(index: &mut Index) -> std::result::Result<(), git2::Error> {
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.update_all(["*"].iter(), None)?;
    Ok(())
}

/// Stage each path on its own; a path that cannot be staged is skipped
fn stage_paths(root: &Path, index: &mut Index, paths: &[PathBuf]) {
    for path in paths {
        let relative = path.strip_prefix(root).unwrap_or(path);

        let staged = if root.join(relative).is_file() {
            index.add_path(relative)
        } else if index.get_path(relative, 0).is_some() {
            index.remove_path(relative)
        } else {
            tracing::warn!(path = %relative.display(), "Path not found, skipping");
            continue;
        };

        if let Err(e) = staged {
            tracing::warn!(path = %relative.display(), error = %e, "Failed to stage path, skipping");
        }
    }
}

fn tree_unchanged(tree_id: Oid, parent_tree: Option<&Tree<'_>>, index: &Index) -> bool {
    match parent_tree {
        Some(tree) => tree.id() == tree_id,
        None => index.is_empty(),
    }
}

fn create_commit(
    repo: &Repository,
    tree_id: Oid,
    message: &str,
    parent: Option<&git2::Commit<'_>>,
) -> Result<Oid> {
    let tree = repo.find_tree(tree_id)?;
    let sig = signature(repo)?;
    let parents: Vec<&git2::Commit<'_>> = parent.into_iter().collect();
    Ok(repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?)
}
