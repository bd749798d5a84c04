//! Publishing a data-file change as a pull request from the user's fork
//!
//! The steps run in order and the first failure aborts the rest. Whatever
//! happens, the local clone is switched back to the base branch at the end.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::forge::{ForgeClient, Fork, Interaction, NewPullRequest};
use super::target::{read_target, TargetFile};
use crate::git::{
    clone_repository, create_branch, delete_branch, move_branch, pull, push, reset_hard,
    set_remote_url, stage_commit, stash, switch_branch, try_has_uncommitted_changes, CancelFlag,
    CloneOptions, GitOperationConfig, GitOutcome, PullOptions, PushConfig, PushResult, RepoHandle,
    RepoUrl, StageCommitResult, StashAction, StashResult, Staging, DEFAULT_BRANCH, ORIGIN,
};
use crate::notify::OperationKind;
use crate::secrets::Credentials;
use crate::{net, Result};

/// Connectivity check run before anything else
pub type ReachabilityCheck = fn(&str, Duration) -> Result<()>;

/// Phases of an upload, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UploadStep {
    Preconditions,
    LocalClone,
    ForkResolution,
    RemoteRepoint,
    StashGuard,
    Pull,
    Restore,
    Branch,
    Commit,
    Relocate,
    Push,
    PullRequest,
}

impl UploadStep {
    pub fn description(&self) -> &'static str {
        match self {
            UploadStep::Preconditions => "checking preconditions",
            UploadStep::LocalClone => "cloning the repository",
            UploadStep::ForkResolution => "resolving the fork",
            UploadStep::RemoteRepoint => "pointing origin at the fork",
            UploadStep::StashGuard => "stashing local changes",
            UploadStep::Pull => "pulling the latest changes",
            UploadStep::Restore => "restoring local changes",
            UploadStep::Branch => "creating the upload branch",
            UploadStep::Commit => "committing the file",
            UploadStep::Relocate => "moving the commit to the upload branch",
            UploadStep::Push => "pushing the upload branch",
            UploadStep::PullRequest => "opening the pull request",
        }
    }
}

impl fmt::Display for UploadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// How an upload ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    PullRequestOpened { url: String, branch: String },
    /// The file matches what is already committed
    NothingToUpload,
    Aborted { step: UploadStep, message: String },
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, UploadOutcome::Aborted { .. })
    }
}

/// What to upload and as whom
#[derive(Clone)]
pub struct UploadRequest {
    /// Upstream repository, `http(s)://host/owner/repo`
    pub upstream_url: String,
    /// Local clone the file lives in
    pub local_path: PathBuf,
    /// The data file, relative to `local_path` or absolute below it
    pub target_file: PathBuf,
    pub username: String,
    pub token: String,
    /// Branch pulled from and targeted by the pull request
    pub base_branch: String,
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("upstream_url", &self.upstream_url)
            .field("local_path", &self.local_path)
            .field("target_file", &self.target_file)
            .field("username", &self.username)
            .field("base_branch", &self.base_branch)
            .finish_non_exhaustive()
    }
}

impl UploadRequest {
    pub fn new(
        upstream_url: impl Into<String>,
        local_path: impl Into<PathBuf>,
        target_file: impl Into<PathBuf>,
        credentials: Credentials,
    ) -> Self {
        Self {
            upstream_url: upstream_url.into(),
            local_path: local_path.into(),
            target_file: target_file.into(),
            username: credentials.username,
            token: credentials.token,
            base_branch: DEFAULT_BRANCH.to_string(),
        }
    }

    pub fn with_base_branch(mut self, branch: impl Into<String>) -> Self {
        self.base_branch = branch.into();
        self
    }
}

/// A step failure: where, and what went wrong
#[derive(Debug)]
struct Abort {
    step: UploadStep,
    message: String,
}

impl Abort {
    fn new(step: UploadStep, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}

trait AtStep<T> {
    fn at(self, step: UploadStep) -> std::result::Result<T, Abort>;
}

impl<T, E: fmt::Display> AtStep<T> for std::result::Result<T, E> {
    fn at(self, step: UploadStep) -> std::result::Result<T, Abort> {
        self.map_err(|e| Abort::new(step, e.to_string()))
    }
}

/// Run blocking git work off the async executor
async fn blocking<T, F>(step: UploadStep, f: F) -> std::result::Result<T, Abort>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, Abort> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Abort::new(step, format!("background task failed: {}", e)))?
}

/// Runs uploads against one forge on behalf of one user interface
pub struct Uploader {
    forge: Arc<dyn ForgeClient>,
    interaction: Arc<dyn Interaction>,
    config: GitOperationConfig,
    clone_options: CloneOptions,
    reachable: ReachabilityCheck,
    cancel: CancelFlag,
}

impl fmt::Debug for Uploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uploader")
            .field("config", &self.config)
            .field("clone_options", &self.clone_options)
            .finish_non_exhaustive()
    }
}

impl Uploader {
    pub fn new(
        forge: Arc<dyn ForgeClient>,
        interaction: Arc<dyn Interaction>,
        config: GitOperationConfig,
    ) -> Self {
        Self {
            forge,
            interaction,
            config,
            clone_options: CloneOptions {
                depth: 0,
                ..Default::default()
            },
            reachable: net::check_reachable,
            cancel: CancelFlag::new(),
        }
    }

    /// Options used when the local clone has to be created
    pub fn with_clone_options(mut self, options: CloneOptions) -> Self {
        self.clone_options = options;
        self
    }

    /// Replace the connectivity check
    pub fn with_reachability_check(mut self, reachable: ReachabilityCheck) -> Self {
        self.reachable = reachable;
        self
    }

    /// Stop at the next network operation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run the whole upload
    ///
    /// A failed step is reported once through the configured notifier and
    /// returned as [`UploadOutcome::Aborted`].
    pub async fn upload(&self, request: &UploadRequest) -> UploadOutcome {
        tracing::info!(file = %request.target_file.display(), upstream = %request.upstream_url, "Upload started");

        let outcome = match self.run_steps(request).await {
            Ok(outcome) => outcome,
            Err(abort) => {
                self.config.report(
                    OperationKind::Upload,
                    &format!("Upload failed while {}", abort.step),
                    Some(&abort.message),
                );
                UploadOutcome::Aborted {
                    step: abort.step,
                    message: abort.message,
                }
            }
        };

        self.switch_back(request).await;
        tracing::info!(?outcome, "Upload finished");
        outcome
    }

    async fn run_steps(&self, request: &UploadRequest) -> std::result::Result<UploadOutcome, Abort> {
        let upstream = RepoUrl::parse(&request.upstream_url).at(UploadStep::Preconditions)?;
        if request.username.trim().is_empty() || request.token.trim().is_empty() {
            return Err(Abort::new(
                UploadStep::Preconditions,
                "A GitHub username and token are required",
            ));
        }

        let reachable = self.reachable;
        let url = upstream.clone_url();
        let timeout = self.config.connection_timeout();
        blocking(UploadStep::Preconditions, move || {
            reachable(&url, timeout).at(UploadStep::Preconditions)
        })
        .await?;

        self.ensure_local_clone(request, &upstream).await?;
        let target = read_target(&request.local_path, &request.target_file).at(UploadStep::Preconditions)?;

        let fork = self.resolve_fork(&upstream, &request.username).await?;

        let local = request.local_path.clone();
        let base = request.base_branch.clone();
        let fork_url = fork.clone_url.clone();
        let prepared_target = target.clone();
        let config = self.git_config();
        let cancel = self.cancel.clone();
        let branch = blocking(UploadStep::RemoteRepoint, move || {
            prepare_branch(&local, &base, &fork_url, &prepared_target, &config, &cancel)
        })
        .await?;

        let Some(branch) = branch else {
            self.interaction.inform(&format!(
                "{} is unchanged, nothing to upload",
                target.relative.display()
            ));
            return Ok(UploadOutcome::NothingToUpload);
        };

        let local = request.local_path.clone();
        let push_config = PushConfig {
            remote: Some(ORIGIN.to_string()),
            branch: Some(branch.clone()),
            force: false,
            username: Some(request.username.clone()),
            token: Some(request.token.clone()),
            timeout: None,
        };
        let config = self.git_config();
        let cancel = self.cancel.clone();
        blocking(UploadStep::Push, move || push_branch(&local, push_config, &config, &cancel)).await?;

        let file_name = target
            .relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| target.relative.display().to_string());
        let pull_request = NewPullRequest {
            upstream,
            head_owner: fork.owner.clone(),
            head_branch: branch.clone(),
            base: request.base_branch.clone(),
            title: format!("Update {} to {}", file_name, target.label),
            body: format!(
                "Updates `{}` to {}.\n\nUploaded by {} with modsync.",
                target.relative.display(),
                target.label,
                request.username
            ),
        };
        let url = self
            .forge
            .create_pull_request(&pull_request)
            .await
            .at(UploadStep::PullRequest)?;

        self.interaction.offer_open_url(&url);
        Ok(UploadOutcome::PullRequestOpened { url, branch })
    }

    /// Low-level failures are folded into the single upload notification
    fn git_config(&self) -> GitOperationConfig {
        self.config.clone().with_notify_errors(false)
    }

    async fn ensure_local_clone(
        &self,
        request: &UploadRequest,
        upstream: &RepoUrl,
    ) -> std::result::Result<(), Abort> {
        if RepoHandle::exists_at(&request.local_path) {
            return Ok(());
        }

        let question = format!(
            "No local clone at {}. Clone {} there now?",
            request.local_path.display(),
            upstream.clone_url()
        );
        if !self.interaction.confirm(&question) {
            return Err(Abort::new(UploadStep::LocalClone, "No local clone to upload from"));
        }

        let url = upstream.clone_url();
        let dest = request.local_path.clone();
        let options = self.clone_options.clone();
        let config = self.git_config();
        let cancel = self.cancel.clone();
        blocking(UploadStep::LocalClone, move || {
            let (handle, result) = clone_repository(&url, &dest, &options, &config, &cancel);
            if let Some(handle) = handle {
                handle.cleanup();
            }
            if result.is_successful() {
                Ok(())
            } else {
                Err(Abort::new(UploadStep::LocalClone, result.description()))
            }
        })
        .await
    }

    async fn resolve_fork(&self, upstream: &RepoUrl, owner: &str) -> std::result::Result<Fork, Abort> {
        if let Some(fork) = self
            .forge
            .find_fork(upstream, owner)
            .await
            .at(UploadStep::ForkResolution)?
        {
            tracing::debug!(owner = %fork.owner, repo = %fork.repo, "Using existing fork");
            return Ok(fork);
        }

        let fork = self
            .forge
            .create_fork(upstream)
            .await
            .at(UploadStep::ForkResolution)?;
        self.interaction.inform(&format!(
            "Created fork {}/{}. A new fork can take a moment before it accepts pushes.",
            fork.owner, fork.repo
        ));
        Ok(fork)
    }

    /// Best effort: leave the clone on the base branch
    async fn switch_back(&self, request: &UploadRequest) {
        let path = request.local_path.clone();
        let base = request.base_branch.clone();
        let switched = tokio::task::spawn_blocking(move || -> Result<()> {
            if !RepoHandle::exists_at(&path) {
                return Ok(());
            }
            let handle = RepoHandle::open(&path)?;
            let result = switch_branch(&handle, &base);
            handle.cleanup();
            result
        })
        .await;

        match switched {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(branch = %request.base_branch, error = %e, "Could not switch back after upload")
            }
            Err(e) => tracing::warn!(error = %e, "Switch-back task failed"),
        }
    }
}

/// Steps from repointing origin through relocating the commit
///
/// Returns the upload branch, or `None` when there is nothing to commit.
fn prepare_branch(
    local: &Path,
    base: &str,
    fork_url: &str,
    target: &TargetFile,
    config: &GitOperationConfig,
    cancel: &CancelFlag,
) -> std::result::Result<Option<String>, Abort> {
    let mut handle = RepoHandle::open(local).at(UploadStep::RemoteRepoint)?;
    set_remote_url(&handle, ORIGIN, fork_url).at(UploadStep::RemoteRepoint)?;

    // The edit being uploaded, kept in case restoring the stash has to be discarded
    let snapshot = std::fs::read(&target.path).at(UploadStep::StashGuard)?;
    let stashed = if try_has_uncommitted_changes(&handle).at(UploadStep::StashGuard)? {
        let action = StashAction::Save {
            message: Some(format!("modsync: before uploading {}", target.label)),
            include_untracked: false,
        };
        match stash(&mut handle, &action, config) {
            StashResult::Stashed => true,
            StashResult::NoChanges => false,
            other => return Err(Abort::new(UploadStep::StashGuard, other.description())),
        }
    } else {
        false
    };

    switch_branch(&handle, base).at(UploadStep::Pull)?;
    let options = PullOptions {
        remote: Some(ORIGIN.to_string()),
        branch: Some(base.to_string()),
        reset_working_tree: true,
        force: true,
    };
    let pulled = pull(&handle, &options, config, cancel);
    if !pulled.is_successful() {
        let mut message = pulled.description().to_string();
        if stashed {
            message.push_str("; local changes were kept in the stash");
        }
        return Err(Abort::new(UploadStep::Pull, message));
    }
    let post_pull = handle
        .head_commit_id()
        .at(UploadStep::Pull)?
        .ok_or_else(|| Abort::new(UploadStep::Pull, "Base branch has no commits"))?;

    if stashed {
        match stash(&mut handle, &StashAction::Pop { index: 0 }, config) {
            StashResult::StashPopSuccess => {}
            StashResult::StashPopConflict => {
                tracing::warn!(
                    file = %target.relative.display(),
                    "Stashed changes conflict with the pulled ones, keeping only the uploaded file"
                );
                reset_hard(&handle, post_pull).at(UploadStep::Restore)?;
                handle.inner().cleanup_state().at(UploadStep::Restore)?;
                std::fs::write(&target.path, &snapshot).at(UploadStep::Restore)?;
            }
            other => return Err(Abort::new(UploadStep::Restore, other.description())),
        }
    }

    create_branch(&handle, &target.branch, post_pull, true).at(UploadStep::Branch)?;

    let message = format!("Update {} to {}", target.relative.display(), target.label);
    let staging = Staging::Paths(vec![target.relative.clone()]);
    match stage_commit(&handle, &message, &staging, config) {
        StageCommitResult::Committed => {}
        StageCommitResult::NoChanges => {
            delete_branch(&handle, &target.branch).at(UploadStep::Commit)?;
            handle.cleanup();
            return Ok(None);
        }
        other => return Err(Abort::new(UploadStep::Commit, other.description())),
    }
    let commit = handle
        .head_commit_id()
        .at(UploadStep::Commit)?
        .ok_or_else(|| Abort::new(UploadStep::Commit, "Commit not found after committing"))?;

    move_branch(&handle, &target.branch, commit).at(UploadStep::Relocate)?;
    switch_branch(&handle, &target.branch).at(UploadStep::Relocate)?;
    move_branch(&handle, base, post_pull).at(UploadStep::Relocate)?;

    tracing::info!(branch = %target.branch, %commit, "Upload branch prepared");
    handle.cleanup();
    Ok(Some(target.branch.clone()))
}

/// Push the upload branch, forcing once if the fork's branch has diverged
fn push_branch(
    local: &Path,
    mut push_config: PushConfig,
    config: &GitOperationConfig,
    cancel: &CancelFlag,
) -> std::result::Result<(), Abort> {
    let handle = RepoHandle::open(local).at(UploadStep::Push)?;

    let mut result = push(&handle, &push_config, config, cancel);
    if result == PushResult::RejectedNonFastForward {
        tracing::warn!("Upload branch diverged on the fork, retrying with force");
        push_config.force = true;
        result = push(&handle, &push_config, config, cancel);
    }
    handle.cleanup();

    if result.is_successful() {
        Ok(())
    } else {
        Err(Abort::new(UploadStep::Push, result.description()))
    }
}
