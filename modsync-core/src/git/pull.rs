//! Pulling: fetch, merge analysis, then fast-forward, force checkout or merge

use git2::build::CheckoutBuilder;
use git2::{Oid, Repository, ResetType};

use super::commit::signature;
use super::fetch::{fetch_branch, ORIGIN};
use super::guard::CancelFlag;
use super::status::conflicted_paths;
use super::{GitOperationConfig, PullResult, RepoHandle};
use crate::notify::OperationKind;
use crate::{net, Error, Result};

/// What to pull and how to integrate it
#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    /// Remote to pull from; defaults to `origin`
    pub remote: Option<String>,
    /// Branch to pull; defaults to the current branch
    pub branch: Option<String>,
    /// Discard uncommitted changes before integrating
    pub reset_working_tree: bool,
    /// Replace local history with the remote tip
    pub force: bool,
}

impl PullOptions {
    pub fn remote_name(&self) -> &str {
        self.remote.as_deref().unwrap_or(ORIGIN)
    }
}

/// Pull the remote branch into the local one
pub fn pull(
    handle: &RepoHandle,
    options: &PullOptions,
    config: &GitOperationConfig,
    cancel: &CancelFlag,
) -> PullResult {
    match try_pull(handle, options, config, cancel) {
        Ok(result) => {
            tracing::info!(root = %handle.root().display(), %result, "Pull finished");
            result
        }
        Err(e) => {
            config.report(
                OperationKind::Pull,
                &format!("Failed to pull {}", handle.root().display()),
                Some(&e.to_string()),
            );
            PullResult::GitError
        }
    }
}

fn try_pull(
    handle: &RepoHandle,
    options: &PullOptions,
    config: &GitOperationConfig,
    cancel: &CancelFlag,
) -> Result<PullResult> {
    let remote_name = options.remote_name();
    let Some(remote) = handle.remote(remote_name) else {
        config.report(
            OperationKind::Pull,
            &format!("Remote '{}' not found", remote_name),
            Some(&handle.root().display().to_string()),
        );
        return Ok(PullResult::UnknownRemote);
    };
    let branch = handle.resolve_branch(options.branch.as_deref())?;

    net::check_reachable(&remote.url, config.connection_timeout())?;
    let remote_tip = fetch_branch(handle, remote_name, &branch, config, cancel)?.ok_or_else(|| {
        Error::Other(format!("Remote branch {}/{} not found", remote_name, branch))
    })?;

    let repo = handle.inner();
    let local_ref = format!("refs/heads/{}", branch);
    let fetched = repo.find_annotated_commit(remote_tip)?;
    let (analysis, _) = repo.merge_analysis(&[&fetched])?;

    if analysis.is_up_to_date() {
        return Ok(PullResult::UpToDate);
    }

    if options.force {
        move_branch_to(repo, &local_ref, remote_tip, true)?;
        tracing::warn!(root = %handle.root().display(), %branch, "Local branch reset to remote tip");
        return Ok(PullResult::ForceCheckout);
    }

    if options.reset_working_tree {
        if let Some(head) = handle.head_commit_id()? {
            let head = repo.find_object(head, None)?;
            repo.reset(&head, ResetType::Hard, None)?;
            tracing::debug!(root = %handle.root().display(), "Discarded uncommitted changes");
        }
    }

    if analysis.is_fast_forward() || analysis.is_unborn() {
        move_branch_to(repo, &local_ref, remote_tip, false)?;
        return Ok(PullResult::FastForward);
    }

    if analysis.is_normal() {
        return merge(handle, &fetched, remote_tip, remote_name, &branch, config);
    }

    Ok(PullResult::Unknown)
}

/// Check out `target` and point `refname` (and HEAD) at it
fn move_branch_to(repo: &Repository, refname: &str, target: Oid, force: bool) -> Result<()> {
    let commit = repo.find_commit(target)?;
    let mut checkout = CheckoutBuilder::new();
    if force {
        checkout.force();
    } else {
        checkout.safe();
    }
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;

    let log_message = format!("modsync: move to {}", target);
    match repo.find_reference(refname) {
        Ok(mut reference) => {
            reference.set_target(target, &log_message)?;
        }
        Err(_) => {
            repo.reference(refname, target, true, &log_message)?;
        }
    }
    repo.set_head(refname)?;
    Ok(())
}

fn merge(
    handle: &RepoHandle,
    fetched: &git2::AnnotatedCommit<'_>,
    remote_tip: Oid,
    remote_name: &str,
    branch: &str,
    config: &GitOperationConfig,
) -> Result<PullResult> {
    let repo = handle.inner();
    let mut checkout = CheckoutBuilder::new();
    checkout.safe().allow_conflicts(true).conflict_style_merge(true);
    repo.merge(&[fetched], None, Some(&mut checkout))?;

    let mut index = repo.index()?;
    if index.has_conflicts() {
        let paths = conflicted_paths(&index)?;
        config.report(
            OperationKind::Pull,
            &format!("Merge conflicts in {} file(s)", paths.len()),
            Some(&paths.join("\n")),
        );
        return Ok(PullResult::Conflict);
    }

    let tree = repo.find_tree(index.write_tree()?)?;
    let sig = signature(repo)?;
    let local = repo.head()?.peel_to_commit()?;
    let theirs = repo.find_commit(remote_tip)?;
    let message = format!("Merge {}/{} into {}", remote_name, branch, branch);

    repo.commit(Some("HEAD"), &sig, &sig, &message, &tree, &[&local, &theirs])?;
    repo.cleanup_state()?;
    Ok(PullResult::Merge)
}
