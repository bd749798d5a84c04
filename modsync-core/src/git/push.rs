//! Pushing a branch, optionally with HTTP credentials

use std::fmt;
use std::time::Duration;

use git2::{Cred, CredentialType, ErrorClass, ErrorCode, PushOptions};

use super::fetch::ORIGIN;
use super::guard::{run_guarded, CancelFlag};
use super::{GitOperationConfig, GitOutcome, PushResult, RepoHandle};
use crate::notify::OperationKind;
use crate::{net, Error, Result};

/// Where and how to push; carries credentials, never persisted
#[derive(Clone, Default)]
pub struct PushConfig {
    /// Remote to push to; defaults to `origin`
    pub remote: Option<String>,
    /// Branch to push; defaults to the current branch
    pub branch: Option<String>,
    /// Overwrite the remote branch
    pub force: bool,
    /// Username for HTTP authentication
    pub username: Option<String>,
    /// Personal access token for HTTP authentication
    pub token: Option<String>,
    /// Overrides the configured fetch timeout
    pub timeout: Option<Duration>,
}

impl fmt::Debug for PushConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushConfig")
            .field("remote", &self.remote)
            .field("branch", &self.branch)
            .field("force", &self.force)
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PushConfig {
    pub fn remote_name(&self) -> &str {
        self.remote.as_deref().unwrap_or(ORIGIN)
    }

    /// Credentials, only when both halves are present
    fn credentials(&self) -> Option<(String, String)> {
        match (&self.username, &self.token) {
            (Some(user), Some(token)) if !user.is_empty() && !token.is_empty() => {
                Some((user.clone(), token.clone()))
            }
            _ => None,
        }
    }
}

/// What the remote said about our update
#[derive(Debug, Default)]
struct PushReport {
    rejection: Option<String>,
    up_to_date: bool,
}

/// Refspec pushing `branch` to the same name, `+`-prefixed when forcing
pub fn push_refspec(branch: &str, force: bool) -> String {
    format!(
        "{}refs/heads/{1}:refs/heads/{1}",
        if force { "+" } else { "" },
        branch
    )
}

/// Push a branch to a remote
pub fn push(
    handle: &RepoHandle,
    push: &PushConfig,
    config: &GitOperationConfig,
    cancel: &CancelFlag,
) -> PushResult {
    let result = match try_push(handle, push, config, cancel) {
        Ok(result) => result,
        Err(e) => classify_error(&e),
    };

    if result.is_successful() {
        tracing::info!(root = %handle.root().display(), %result, "Push finished");
    } else {
        config.report(
            OperationKind::Push,
            &format!("Failed to push {}", handle.root().display()),
            Some(result.to_string().as_str()),
        );
    }
    result
}

fn try_push(
    handle: &RepoHandle,
    push: &PushConfig,
    config: &GitOperationConfig,
    cancel: &CancelFlag,
) -> Result<PushResult> {
    if handle.is_unborn() {
        return Ok(PushResult::NoCommits);
    }

    let remote_name = push.remote_name().to_string();
    let Some(remote) = handle.remote(&remote_name) else {
        return Ok(PushResult::UnknownRemote);
    };
    let branch = handle.resolve_branch(push.branch.as_deref())?;
    let refspec = push_refspec(&branch, push.force);
    let credentials = push.credentials();

    net::check_reachable(&remote.url, config.connection_timeout())?;

    tracing::debug!(root = %handle.root().display(), %refspec, authenticated = credentials.is_some(), "Pushing");
    let report = run_guarded(
        handle.root(),
        "push",
        push.timeout.unwrap_or(config.fetch_timeout()),
        cancel,
        move |repo, interrupt| {
            let mut remote = repo.find_remote(&remote_name)?;
            let mut report = PushReport::default();

            {
                let mut rejection: Option<String> = None;
                let mut callbacks = interrupt.callbacks();

                if let Some((username, token)) = credentials {
                    callbacks.credentials(move |_url, _username_from_url, allowed| {
                        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                            Cred::userpass_plaintext(&username, &token)
                        } else {
                            Err(git2::Error::from_str(
                                "remote does not accept username/token authentication",
                            ))
                        }
                    });
                }

                callbacks.push_negotiation(|updates| {
                    report.up_to_date = updates.iter().all(|u| u.src() == u.dst());
                    Ok(())
                });

                callbacks.push_update_reference(|refname, status| {
                    if let Some(message) = status {
                        tracing::warn!(refname, reason = message, "Remote rejected reference update");
                        rejection = Some(message.to_string());
                    }
                    Ok(())
                });

                let mut options = PushOptions::new();
                options.remote_callbacks(callbacks);
                remote.push(&[refspec.as_str()], Some(&mut options))?;
                drop(options);
                report.rejection = rejection;
            }

            Ok(report)
        },
    )?;

    Ok(match report.rejection {
        Some(message) => classify_rejection(&message),
        None if report.up_to_date => PushResult::UpToDate,
        None => PushResult::Pushed,
    })
}

/// Map a per-reference rejection message from the remote
fn classify_rejection(message: &str) -> PushResult {
    let message = message.to_lowercase();
    if message.contains("non-fast-forward") || message.contains("fetch first") {
        PushResult::RejectedNonFastForward
    } else if message.contains("stale") {
        PushResult::RejectedStale
    } else {
        PushResult::RemoteError
    }
}

/// Map a failed push call where libgit2 tells us enough, else `GitError`
fn classify_error(error: &Error) -> PushResult {
    tracing::error!(error = %error, "Push failed");
    let Error::Git(e) = error else {
        return PushResult::GitError;
    };

    match e.code() {
        ErrorCode::Auth => PushResult::AuthenticationFailed,
        ErrorCode::NotFastForward => PushResult::RejectedNonFastForward,
        _ if e.class() == ErrorClass::Http
            && (e.message().contains("401") || e.message().contains("403")) =>
        {
            PushResult::AuthenticationFailed
        }
        _ => PushResult::GitError,
    }
}
