//! Repository handles
//!
//! A handle is opened per operation by discovering the repository from a path,
//! and is never cached or shared between threads. Native resources are freed
//! when the handle is dropped; [`RepoHandle::cleanup`] additionally clears
//! transient repository state and consumes the handle, so it runs at most once.

use std::path::{Path, PathBuf};

use git2::{ErrorCode, Oid, Repository};

use super::GitOperationConfig;
use crate::notify::OperationKind;
use crate::{Error, Result};

/// Default branch used when HEAD does not point anywhere useful
pub const DEFAULT_BRANCH: &str = "main";

/// Information about a git remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    /// Name of the remote (e.g., "origin")
    pub name: String,
    /// URL of the remote
    pub url: String,
}

/// Exclusive handle to an on-disk repository
pub struct RepoHandle {
    /// The underlying git2 repository
    repo: Repository,
    /// Path to the working tree root
    root: PathBuf,
}

impl std::fmt::Debug for RepoHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoHandle")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl RepoHandle {
    /// Open the repository rooted at or above `path`
    ///
    /// Fails with [`Error::InvalidRepository`] when no repository is found.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = Repository::discover(path).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                Error::InvalidRepository(path.to_path_buf())
            } else {
                Error::Git(e)
            }
        })?;

        let root = repo
            .workdir()
            .ok_or_else(|| Error::Config("Bare repositories are not supported".to_string()))?
            .to_path_buf();

        Ok(Self { repo, root })
    }

    /// Discover a repository, reporting unexpected failures
    ///
    /// A path that simply is not a repository yields `None` without a
    /// notification; any other failure is reported through `config`.
    pub fn discover(path: impl AsRef<Path>, config: &GitOperationConfig) -> Option<Self> {
        let path = path.as_ref();
        match Self::open(path) {
            Ok(handle) => Some(handle),
            Err(Error::InvalidRepository(_)) => {
                tracing::debug!(path = %path.display(), "No git repository found");
                None
            }
            Err(e) => {
                config.report(
                    OperationKind::Discover,
                    &format!("Failed to open repository at {}", path.display()),
                    Some(&e.to_string()),
                );
                None
            }
        }
    }

    /// Wrap an already-open repository
    pub(crate) fn from_repository(repo: Repository) -> Result<Self> {
        let root = repo
            .workdir()
            .ok_or_else(|| Error::Config("Bare repositories are not supported".to_string()))?
            .to_path_buf();
        Ok(Self { repo, root })
    }

    /// Check if the given path is inside a git repository
    pub fn is_git_repo(path: impl AsRef<Path>) -> bool {
        Repository::discover(path.as_ref()).is_ok()
    }

    /// Check if a repository is rooted exactly at `path`, without searching upwards
    pub fn exists_at(path: impl AsRef<Path>) -> bool {
        Repository::open(path.as_ref()).is_ok()
    }

    /// Get the working tree root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get access to the underlying git2 repository
    pub fn inner(&self) -> &Repository {
        &self.repo
    }

    /// Mutable access, needed by stash operations
    pub fn inner_mut(&mut self) -> &mut Repository {
        &mut self.repo
    }

    /// Whether HEAD points at a branch with no commits yet
    pub fn is_unborn(&self) -> bool {
        matches!(self.repo.head(), Err(ref e) if e.code() == ErrorCode::UnbornBranch)
    }

    /// Name of the branch HEAD points to, also for an unborn HEAD
    ///
    /// Returns `None` for a detached HEAD.
    pub fn head_branch(&self) -> Result<Option<String>> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
            Ok(_) => Ok(None),
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = self.repo.find_reference("HEAD")?;
                Ok(head
                    .symbolic_target()
                    .and_then(|target| target.strip_prefix("refs/heads/"))
                    .map(str::to_string))
            }
            Err(e) => Err(Error::Git(e)),
        }
    }

    /// Branch to operate on: the explicit one, else HEAD's, else the default
    pub fn resolve_branch(&self, branch: Option<&str>) -> Result<String> {
        if let Some(branch) = branch {
            return Ok(branch.to_string());
        }
        Ok(self
            .head_branch()?
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string()))
    }

    /// Commit id HEAD resolves to, `None` while unborn
    pub fn head_commit_id(&self) -> Result<Option<Oid>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?.id())),
            Err(e) if e.code() == ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(Error::Git(e)),
        }
    }

    /// Look up a remote, `None` if it is not configured
    pub fn remote(&self, name: &str) -> Option<RemoteInfo> {
        let remote = self.repo.find_remote(name).ok()?;
        Some(RemoteInfo {
            name: name.to_string(),
            url: remote.url().unwrap_or_default().to_string(),
        })
    }

    /// List all remotes
    pub fn list_remotes(&self) -> Result<Vec<RemoteInfo>> {
        let remotes = self.repo.remotes()?;
        Ok(remotes
            .iter()
            .flatten()
            .filter_map(|name| self.remote(name))
            .collect())
    }

    /// Clear transient state and release the repository
    ///
    /// Merge/revert/cherry-pick markers are cleared unless the index still
    /// holds unresolved conflicts, which are left for the caller to resolve.
    pub fn cleanup(self) {
        let conflicted = self
            .repo
            .index()
            .map(|index| index.has_conflicts())
            .unwrap_or(false);

        if conflicted {
            tracing::debug!(root = %self.root.display(), "Leaving conflicted repository state in place");
        } else if let Err(e) = self.repo.cleanup_state() {
            tracing::warn!(root = %self.root.display(), error = %e, "Failed to clean up repository state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testing::{commit_file, init_repo};
    use tempfile::TempDir;

    #[test]
    fn test_is_git_repo_negative() {
        let dir = TempDir::new().unwrap();
        assert!(!RepoHandle::is_git_repo(dir.path()));
    }

    #[test]
    fn test_exists_at_does_not_search_upwards() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        let nested = dir.path().join("Defs");
        std::fs::create_dir_all(&nested).unwrap();

        assert!(RepoHandle::exists_at(dir.path()));
        assert!(!RepoHandle::exists_at(&nested));
        assert!(RepoHandle::is_git_repo(&nested));
    }

    #[test]
    fn test_open_non_git_dir() {
        let dir = TempDir::new().unwrap();
        let result = RepoHandle::open(dir.path());
        assert!(matches!(result, Err(Error::InvalidRepository(_))));
    }

    #[test]
    fn test_discover_returns_none_for_plain_dir() {
        let dir = TempDir::new().unwrap();
        assert!(RepoHandle::discover(dir.path(), &GitOperationConfig::silent()).is_none());
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        let nested = dir.path().join("Textures").join("Things");
        std::fs::create_dir_all(&nested).unwrap();

        let handle = RepoHandle::discover(&nested, &GitOperationConfig::silent()).unwrap();
        assert_eq!(
            handle.root().canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_unborn_head_branch() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        let handle = RepoHandle::open(dir.path()).unwrap();

        assert!(handle.is_unborn());
        assert_eq!(handle.head_branch().unwrap().as_deref(), Some("main"));
        assert!(handle.head_commit_id().unwrap().is_none());
    }

    #[test]
    fn test_head_after_commit() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        let oid = commit_file(&repo, "About.xml", "<mod/>", "initial");

        let handle = RepoHandle::open(dir.path()).unwrap();
        assert!(!handle.is_unborn());
        assert_eq!(handle.head_commit_id().unwrap(), Some(oid));
        assert_eq!(handle.resolve_branch(None).unwrap(), "main");
        assert_eq!(handle.resolve_branch(Some("dev")).unwrap(), "dev");
    }

    #[test]
    fn test_remote_lookup() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        repo.remote("origin", "https://example.com/mods/core.git").unwrap();

        let handle = RepoHandle::open(dir.path()).unwrap();
        assert_eq!(
            handle.remote("origin").map(|r| r.url),
            Some("https://example.com/mods/core.git".to_string())
        );
        assert!(handle.remote("upstream").is_none());
        assert_eq!(handle.list_remotes().unwrap().len(), 1);
        handle.cleanup();
    }
}
