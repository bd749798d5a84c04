//! Fetching and incoming-commit detection

use git2::{FetchOptions, Oid, Sort};

use super::guard::{run_guarded, CancelFlag};
use super::{GitOperationConfig, RepoHandle};
use crate::notify::OperationKind;
use crate::{net, Error, Result};

/// Remote consulted for updates
pub const ORIGIN: &str = "origin";

/// A commit present on the remote but not locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCommit {
    /// Full commit id
    pub id: String,
    /// First line of the message
    pub summary: String,
    /// Full message, trimmed
    pub message: String,
    /// Author name
    pub author: String,
}

/// Fetch one branch of `remote` into its remote-tracking ref
///
/// Runs under the fetch timeout. Returns the fetched tip, or `None` when the
/// remote has no such branch.
pub(crate) fn fetch_branch(
    handle: &RepoHandle,
    remote: &str,
    branch: &str,
    config: &GitOperationConfig,
    cancel: &CancelFlag,
) -> Result<Option<Oid>> {
    let refspec = format!("+refs/heads/{0}:refs/remotes/{1}/{0}", branch, remote);
    let remote_name = remote.to_string();

    tracing::debug!(root = %handle.root().display(), %refspec, "Fetching");
    run_guarded(
        handle.root(),
        "fetch",
        config.fetch_timeout(),
        cancel,
        move |repo, interrupt| {
            let mut remote = repo.find_remote(&remote_name)?;
            let mut options = FetchOptions::new();
            options.remote_callbacks(interrupt.callbacks());
            remote.fetch(&[refspec.as_str()], Some(&mut options), None)
        },
    )?;

    let tracking = format!("refs/remotes/{}/{}", remote, branch);
    match handle.inner().refname_to_id(&tracking) {
        Ok(oid) => Ok(Some(oid)),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(Error::Git(e)),
    }
}

/// Commits on `origin` that the current branch does not have
///
/// Returns `None` when there is nothing to compare (no `origin`, no local
/// history, no matching remote branch) or when the tips are equal. Otherwise
/// the incoming commits are returned in topological order.
pub fn try_check_updates(
    handle: &RepoHandle,
    config: &GitOperationConfig,
    cancel: &CancelFlag,
) -> Result<Option<Vec<IncomingCommit>>> {
    let Some(remote) = handle.remote(ORIGIN) else {
        tracing::debug!(root = %handle.root().display(), "No origin remote, skipping update check");
        return Ok(None);
    };
    let Some(local) = handle.head_commit_id()? else {
        tracing::debug!(root = %handle.root().display(), "Empty history, skipping update check");
        return Ok(None);
    };
    let branch = handle.resolve_branch(None)?;

    net::check_reachable(&remote.url, config.connection_timeout())?;
    let Some(remote_tip) = fetch_branch(handle, ORIGIN, &branch, config, cancel)? else {
        return Ok(None);
    };

    if remote_tip == local {
        return Ok(None);
    }

    let repo = handle.inner();
    let mut walk = repo.revwalk()?;
    walk.set_sorting(Sort::TOPOLOGICAL)?;
    walk.push(remote_tip)?;
    walk.hide(local)?;

    let mut commits = Vec::new();
    for oid in walk {
        let commit = repo.find_commit(oid?)?;
        commits.push(IncomingCommit {
            id: commit.id().to_string(),
            summary: commit.summary().unwrap_or_default().to_string(),
            message: commit.message().unwrap_or_default().trim().to_string(),
            author: commit.author().name().unwrap_or_default().to_string(),
        });
    }

    Ok(Some(commits))
}

/// [`try_check_updates`] with failures reported instead of returned
pub fn check_updates(
    handle: &RepoHandle,
    config: &GitOperationConfig,
    cancel: &CancelFlag,
) -> Option<Vec<IncomingCommit>> {
    match try_check_updates(handle, config, cancel) {
        Ok(commits) => commits,
        Err(e) => {
            config.report(
                OperationKind::Pull,
                &format!("Failed to check {} for updates", handle.root().display()),
                Some(&e.to_string()),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testing::{advance_remote, init_repo, remote_with_clone, unresponsive_remote};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_fresh_clone_has_no_updates() {
        let base = TempDir::new().unwrap();
        let (_, clone) = remote_with_clone(base.path());
        let handle = RepoHandle::open(&clone).unwrap();

        let updates = check_updates(&handle, &GitOperationConfig::silent(), &CancelFlag::new());
        assert!(updates.map_or(true, |c| c.is_empty()));
    }

    #[test]
    fn test_incoming_commits_listed_in_order() {
        let base = TempDir::new().unwrap();
        let (remote, clone) = remote_with_clone(base.path());
        advance_remote(base.path(), &remote, "Defs/First.xml", "<Defs/>");
        advance_remote(base.path(), &remote, "Defs/Second.xml", "<Defs/>");

        let handle = RepoHandle::open(&clone).unwrap();
        let commits = try_check_updates(&handle, &GitOperationConfig::silent(), &CancelFlag::new())
            .unwrap()
            .unwrap();

        let messages: Vec<_> = commits.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, vec!["update Defs/Second.xml", "update Defs/First.xml"]);
    }

    #[test]
    fn test_no_origin_means_no_updates() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        crate::git::testing::commit_file(&repo, "a.txt", "a", "init");
        let handle = RepoHandle::open(dir.path()).unwrap();

        let result = try_check_updates(&handle, &GitOperationConfig::silent(), &CancelFlag::new());
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_unreachable_origin_is_error() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        crate::git::testing::commit_file(&repo, "a.txt", "a", "init");
        repo.remote("origin", dir.path().join("gone.git").to_str().unwrap())
            .unwrap();
        let handle = RepoHandle::open(dir.path()).unwrap();

        let result = try_check_updates(&handle, &GitOperationConfig::silent(), &CancelFlag::new());
        assert!(result.is_err());
        assert!(check_updates(&handle, &GitOperationConfig::silent(), &CancelFlag::new()).is_none());
    }

    #[test]
    fn test_hung_remote_times_out() {
        let base = TempDir::new().unwrap();
        let (_, clone) = remote_with_clone(base.path());
        git2::Repository::open(&clone)
            .unwrap()
            .remote_set_url("origin", &unresponsive_remote())
            .unwrap();
        let handle = RepoHandle::open(&clone).unwrap();
        let config = GitOperationConfig::silent()
            .with_connection_timeout(Duration::from_secs(1))
            .with_fetch_timeout(Duration::from_secs(1));

        let err = try_check_updates(&handle, &config, &CancelFlag::new()).unwrap_err();
        assert!(err.is_timeout(), "unexpected error: {}", err);
        assert!(check_updates(&handle, &config, &CancelFlag::new()).is_none());
    }
}
