//! Outcome enums for every git operation family
//!
//! Each enum is a closed set. Whether a variant counts as a success is decided
//! by a single exhaustive `match` per enum, so call sites never test set
//! membership themselves.

use std::fmt;

/// Classification shared by all operation outcomes
pub trait GitOutcome: Copy + fmt::Debug {
    /// Whether the outcome counts as a success
    fn is_successful(&self) -> bool;

    /// Human-readable description of the outcome
    fn description(&self) -> &'static str;

    /// Whether the outcome counts as an error
    fn is_error(&self) -> bool {
        !self.is_successful()
    }
}

/// Outcome of cloning a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloneResult {
    /// Repository cloned
    Cloned,
    /// Destination exists and is not a directory
    PathNotDir,
    /// Destination is a non-empty directory and force was not requested
    PathNotEmpty,
    /// Destination could not be cleared
    PathDeleteError,
    /// libgit2 reported an error
    GitError,
}

impl GitOutcome for CloneResult {
    fn is_successful(&self) -> bool {
        match self {
            CloneResult::Cloned => true,
            CloneResult::PathNotDir
            | CloneResult::PathNotEmpty
            | CloneResult::PathDeleteError
            | CloneResult::GitError => false,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            CloneResult::Cloned => "Repository cloned successfully",
            CloneResult::PathNotDir => "Destination exists and is not a directory",
            CloneResult::PathNotEmpty => "Destination directory is not empty",
            CloneResult::PathDeleteError => "Failed to clear destination directory",
            CloneResult::GitError => "Git error while cloning",
        }
    }
}

/// Outcome of pulling from a remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PullResult {
    /// Local branch already contains the remote tip
    UpToDate,
    /// Local branch fast-forwarded to the remote tip
    FastForward,
    /// Local divergence discarded, branch reset to the remote tip
    ForceCheckout,
    /// Remote tip merged with a merge commit
    Merge,
    /// Merge stopped with conflicts left in the working tree
    Conflict,
    /// Merge analysis gave no actionable answer
    Unknown,
    /// The requested remote is not configured
    UnknownRemote,
    /// libgit2 reported an error, the fetch timed out or the network is down
    GitError,
}

impl GitOutcome for PullResult {
    fn is_successful(&self) -> bool {
        match self {
            PullResult::UpToDate
            | PullResult::FastForward
            | PullResult::ForceCheckout
            | PullResult::Merge => true,
            PullResult::Conflict
            | PullResult::Unknown
            | PullResult::UnknownRemote
            | PullResult::GitError => false,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            PullResult::UpToDate => "Already up to date",
            PullResult::FastForward => "Fast-forwarded to remote",
            PullResult::ForceCheckout => "Reset to remote, local changes discarded",
            PullResult::Merge => "Merged remote changes",
            PullResult::Conflict => "Merge conflicts need to be resolved",
            PullResult::Unknown => "Unknown merge analysis result",
            PullResult::UnknownRemote => "Remote not found",
            PullResult::GitError => "Git error while pulling",
        }
    }
}

/// Outcome of pushing to a remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushResult {
    /// Remote updated
    Pushed,
    /// Remote already had the local tip
    UpToDate,
    /// Remote rejected a non-fast-forward update
    RejectedNonFastForward,
    /// Remote rejected the update because our view of it was stale
    RejectedStale,
    /// Credentials were refused
    AuthenticationFailed,
    /// Remote refused the update for another reason
    RemoteError,
    /// The requested remote is not configured
    UnknownRemote,
    /// HEAD is unborn, nothing to push
    NoCommits,
    /// libgit2 reported an error
    GitError,
}

impl GitOutcome for PushResult {
    fn is_successful(&self) -> bool {
        match self {
            PushResult::Pushed | PushResult::UpToDate => true,
            PushResult::RejectedNonFastForward
            | PushResult::RejectedStale
            | PushResult::AuthenticationFailed
            | PushResult::RemoteError
            | PushResult::UnknownRemote
            | PushResult::NoCommits
            | PushResult::GitError => false,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            PushResult::Pushed => "Pushed to remote",
            PushResult::UpToDate => "Remote already up to date",
            PushResult::RejectedNonFastForward => "Rejected: remote contains work you do not have",
            PushResult::RejectedStale => "Rejected: stale remote information",
            PushResult::AuthenticationFailed => "Authentication failed",
            PushResult::RemoteError => "Remote rejected the push",
            PushResult::UnknownRemote => "Remote not found",
            PushResult::NoCommits => "No commits to push",
            PushResult::GitError => "Git error while pushing",
        }
    }
}

/// Outcome of staging and committing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageCommitResult {
    /// A commit was created
    Committed,
    /// Nothing differs from HEAD, no commit created
    NoChanges,
    /// Staging failed
    StagingFailed,
    /// Commit creation failed
    CommitFailed,
    /// libgit2 reported an error
    GitError,
}

impl GitOutcome for StageCommitResult {
    fn is_successful(&self) -> bool {
        match self {
            StageCommitResult::Committed | StageCommitResult::NoChanges => true,
            StageCommitResult::StagingFailed
            | StageCommitResult::CommitFailed
            | StageCommitResult::GitError => false,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            StageCommitResult::Committed => "Changes committed",
            StageCommitResult::NoChanges => "No changes to commit",
            StageCommitResult::StagingFailed => "Failed to stage changes",
            StageCommitResult::CommitFailed => "Failed to create commit",
            StageCommitResult::GitError => "Git error while committing",
        }
    }
}

/// Outcome of a stash operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StashResult {
    /// Changes stashed
    Stashed,
    /// Nothing to stash
    NoChanges,
    /// Stash applied and kept
    StashApplied,
    /// Stash dropped
    StashDropped,
    /// Stash applied and dropped
    StashPopSuccess,
    /// Stashes listed
    StashListSuccess,
    /// Applying the stash produced conflicts; the stash was kept
    StashPopConflict,
    /// libgit2 reported an error
    GitError,
}

impl GitOutcome for StashResult {
    fn is_successful(&self) -> bool {
        match self {
            StashResult::Stashed
            | StashResult::NoChanges
            | StashResult::StashApplied
            | StashResult::StashDropped
            | StashResult::StashPopSuccess
            | StashResult::StashListSuccess => true,
            StashResult::StashPopConflict | StashResult::GitError => false,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            StashResult::Stashed => "Changes stashed",
            StashResult::NoChanges => "No local changes to stash",
            StashResult::StashApplied => "Stash applied",
            StashResult::StashDropped => "Stash dropped",
            StashResult::StashPopSuccess => "Stash applied and dropped",
            StashResult::StashListSuccess => "Stashes listed",
            StashResult::StashPopConflict => "Stash produced conflicts",
            StashResult::GitError => "Git error during stash operation",
        }
    }
}

macro_rules! impl_display {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.description())
                }
            }
        )*
    };
}

impl_display!(CloneResult, PullResult, PushResult, StageCommitResult, StashResult);
