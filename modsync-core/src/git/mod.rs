//! Git operations for modsync
//!
//! Each operation opens nothing itself: it works on a [`RepoHandle`] the caller
//! acquired, and returns a typed result instead of an error for every expected
//! outcome. Failures are routed through the [`GitOperationConfig`] handed in.

mod branch;
mod clone;
mod commit;
mod fetch;
mod guard;
mod options;
mod pull;
mod push;
mod repo;
mod results;
mod stash;
mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use branch::{
    create_branch, delete_branch, move_branch, reset_hard, sanitize_branch_name, set_remote_url,
    switch_branch, validate_branch_name,
};
pub use clone::{
    build_preserve_set, clear_destination, clone_repository, CloneOptions, RepoUrl,
    DEFAULT_PRESERVE_PATTERNS,
};
pub use commit::{stage_commit, Staging};
pub use fetch::{check_updates, try_check_updates, IncomingCommit, ORIGIN};
pub use guard::{run_detached, run_guarded, CancelFlag, Interrupt};
pub use options::{GitOperationConfig, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_FETCH_TIMEOUT};
pub use pull::{pull, PullOptions};
pub use push::{push, push_refspec, PushConfig};
pub use repo::{RemoteInfo, RepoHandle, DEFAULT_BRANCH};
pub use results::{
    CloneResult, GitOutcome, PullResult, PushResult, StageCommitResult, StashResult,
};
pub use stash::{list_stashes, stash, StashAction, StashEntry, DEFAULT_STASH_MESSAGE};
pub use status::{
    has_uncommitted_changes, head_commit_info, repo_status, try_has_uncommitted_changes,
    try_repo_status, CommitInfo, RepoStatus,
};
