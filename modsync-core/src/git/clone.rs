//! Repository cloning and URL parsing

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use git2::build::RepoBuilder;
use git2::FetchOptions;
use globset::{Glob, GlobSet, GlobSetBuilder};

use super::guard::{run_detached, CancelFlag};
use super::{CloneResult, GitOperationConfig, RepoHandle};
use crate::notify::OperationKind;
use crate::{net, Error, Result};

/// Files kept when a destination is force-cleared: cached texture binaries
pub const DEFAULT_PRESERVE_PATTERNS: &[&str] = &["*.dds"];

/// Parsed HTTP(S) repository URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    /// Scheme and host, e.g. `https://github.com`
    pub base: String,
    /// Repository owner/organization
    pub owner: String,
    /// Repository name
    pub repo: String,
}

impl RepoUrl {
    /// Parse an `http://` or `https://` repository URL
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if !(input.starts_with("https://") || input.starts_with("http://")) {
            return Err(Error::Config(format!(
                "Invalid repository URL: {}. Expected an http(s):// URL",
                input
            )));
        }

        let url = url::Url::parse(input)
            .map_err(|e| Error::Config(format!("Invalid repository URL {}: {}", input, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::Config(format!("Repository URL has no host: {}", input)))?;
        let base = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        let mut segments = url
            .path()
            .trim_matches('/')
            .trim_end_matches(".git")
            .split('/')
            .filter(|s| !s.is_empty());

        match (segments.next(), segments.next()) {
            (Some(owner), Some(repo)) => Ok(Self {
                base,
                owner: owner.to_string(),
                repo: repo.to_string(),
            }),
            _ => Err(Error::Config(format!(
                "Repository URL must name an owner and a repository: {}",
                input
            ))),
        }
    }

    /// Clone URL of this repository
    pub fn clone_url(&self) -> String {
        format!("{}/{}/{}.git", self.base, self.owner, self.repo)
    }

    /// The same repository name under another owner (a fork)
    pub fn with_owner(&self, owner: &str) -> Self {
        Self {
            base: self.base.clone(),
            owner: owner.to_string(),
            repo: self.repo.clone(),
        }
    }
}

/// How to clone
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// Branch to check out instead of the remote's default
    pub branch: Option<String>,
    /// History depth; 0 fetches full history
    pub depth: u32,
    /// Clear a non-empty destination first
    pub force: bool,
    /// Glob patterns of files that survive a forced clear
    pub preserve: Vec<String>,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            branch: None,
            depth: 1,
            force: false,
            preserve: DEFAULT_PRESERVE_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Clone `url` into `dest`
///
/// On success the returned handle is open on the new repository.
pub fn clone_repository(
    url: &str,
    dest: &Path,
    options: &CloneOptions,
    config: &GitOperationConfig,
    cancel: &CancelFlag,
) -> (Option<RepoHandle>, CloneResult) {
    if dest.exists() && !dest.is_dir() {
        config.report(
            OperationKind::Clone,
            &format!("{} exists and is not a directory", dest.display()),
            None,
        );
        return (None, CloneResult::PathNotDir);
    }

    if is_non_empty_dir(dest) {
        if !options.force {
            config.report(
                OperationKind::Clone,
                &format!("{} is not empty", dest.display()),
                Some("Use force to replace its contents"),
            );
            return (None, CloneResult::PathNotEmpty);
        }

        let cleared = build_preserve_set(&options.preserve)
            .and_then(|preserve| clear_destination(dest, &preserve).map_err(Error::Io));
        if let Err(e) = cleared {
            config.report(
                OperationKind::Clone,
                &format!("Failed to clear {}", dest.display()),
                Some(&e.to_string()),
            );
            return (None, CloneResult::PathDeleteError);
        }
    }

    match clone_into(url, dest, options, config, cancel) {
        Ok(handle) => {
            tracing::info!(url, dest = %dest.display(), "Cloned repository");
            (Some(handle), CloneResult::Cloned)
        }
        Err(e) => {
            config.report(
                OperationKind::Clone,
                &format!("Failed to clone {}", url),
                Some(&e.to_string()),
            );
            (None, CloneResult::GitError)
        }
    }
}

fn clone_into(
    url: &str,
    dest: &Path,
    options: &CloneOptions,
    config: &GitOperationConfig,
    cancel: &CancelFlag,
) -> Result<RepoHandle> {
    net::check_reachable(url, config.connection_timeout())?;

    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    // Preserved files may still sit in the destination; libgit2 only clones
    // into empty directories, so clone next to it and move the tree in.
    let staging = if is_non_empty_dir(dest) {
        Some(
            tempfile::Builder::new()
                .prefix(".modsync-clone-")
                .tempdir_in(parent)?,
        )
    } else {
        None
    };
    let target = staging
        .as_ref()
        .map(|dir| dir.path().to_path_buf())
        .unwrap_or_else(|| dest.to_path_buf());

    let url_owned = url.to_string();
    let branch = options.branch.clone();
    let depth = options.depth;
    let clone_target = target.clone();
    run_detached("clone", config.fetch_timeout(), cancel, move |interrupt| {
        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(interrupt.callbacks());
        if depth > 0 {
            fetch_options.depth(depth as i32);
        }

        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_options);
        if let Some(ref branch) = branch {
            builder.branch(branch);
        }
        builder.clone(&url_owned, &clone_target).map(|_| ())
    })?;

    if staging.is_some() {
        move_tree(&target, dest)?;
    }

    RepoHandle::open(dest)
}

/// Whether `path` is a directory with at least one entry
fn is_non_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Compile preserve patterns
pub fn build_preserve_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Config(format!("Invalid preserve pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("Invalid preserve patterns: {}", e)))
}

/// Delete everything below `root` except files matched by `preserve`
///
/// Paths are matched relative to `root`. Directories left empty are removed.
pub fn clear_destination(root: &Path, preserve: &GlobSet) -> io::Result<()> {
    clear_dir(root, root, preserve)?;
    Ok(())
}

/// Returns whether anything was kept below `dir`
fn clear_dir(root: &Path, dir: &Path, preserve: &GlobSet) -> io::Result<bool> {
    let mut kept = false;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if clear_dir(root, &path, preserve)? {
                kept = true;
            } else {
                fs::remove_dir(&path)?;
            }
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(&path);
        if preserve.is_match(relative) {
            tracing::debug!(path = %relative.display(), "Preserving file");
            kept = true;
        } else {
            fs::remove_file(&path)?;
        }
    }

    Ok(kept)
}

/// Move every entry of `from` into `to`, replacing files of the same name
fn move_tree(from: &Path, to: &Path) -> io::Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let source = entry.path();
        let target: PathBuf = to.join(entry.file_name());

        if entry.file_type()?.is_dir() && target.is_dir() {
            move_tree(&source, &target)?;
            continue;
        }
        if target.is_dir() {
            fs::remove_dir_all(&target)?;
        } else if target.exists() {
            fs::remove_file(&target)?;
        }
        fs::rename(&source, &target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testing::remote_with_clone;
    use crate::git::GitOutcome;
    use tempfile::TempDir;

    fn full_clone() -> CloneOptions {
        CloneOptions {
            depth: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_https() {
        let url = RepoUrl::parse("https://github.com/owner/repo").unwrap();
        assert_eq!(url.owner, "owner");
        assert_eq!(url.repo, "repo");
        assert_eq!(url.clone_url(), "https://github.com/owner/repo.git");
    }

    #[test]
    fn test_parse_with_git_suffix_and_fork() {
        let url = RepoUrl::parse("https://github.com/owner/repo.git").unwrap();
        let fork = url.with_owner("me");
        assert_eq!(fork.clone_url(), "https://github.com/me/repo.git");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(RepoUrl::parse("git@github.com:owner/repo.git").is_err());
        assert!(RepoUrl::parse("https://github.com/owner").is_err());
        assert!(RepoUrl::parse("").is_err());
    }

    #[test]
    fn test_clear_destination_preserves_matches() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.dds"), "texture").unwrap();
        fs::write(dir.path().join("b.xml"), "<xml/>").unwrap();
        fs::create_dir_all(dir.path().join("Textures/Things")).unwrap();
        fs::write(dir.path().join("Textures/Things/c.dds"), "texture").unwrap();
        fs::create_dir_all(dir.path().join("Defs")).unwrap();
        fs::write(dir.path().join("Defs/d.xml"), "<Defs/>").unwrap();

        let preserve = build_preserve_set(&["*.dds".to_string()]).unwrap();
        clear_destination(dir.path(), &preserve).unwrap();

        assert!(dir.path().join("a.dds").exists());
        assert!(!dir.path().join("b.xml").exists());
        assert!(dir.path().join("Textures/Things/c.dds").exists());
        assert!(!dir.path().join("Defs").exists());
    }

    #[test]
    fn test_invalid_preserve_pattern() {
        assert!(build_preserve_set(&["[".to_string()]).is_err());
    }

    #[test]
    fn test_clone_into_file_path() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, "x").unwrap();

        let (handle, result) = clone_repository(
            "/nowhere.git",
            &file,
            &full_clone(),
            &GitOperationConfig::silent(),
            &CancelFlag::new(),
        );
        assert!(handle.is_none());
        assert_eq!(result, CloneResult::PathNotDir);
    }

    #[test]
    fn test_clone_into_non_empty_without_force() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.xml"), "<xml/>").unwrap();

        let (_, result) = clone_repository(
            "/nowhere.git",
            dir.path(),
            &full_clone(),
            &GitOperationConfig::silent(),
            &CancelFlag::new(),
        );
        assert_eq!(result, CloneResult::PathNotEmpty);
        assert!(dir.path().join("b.xml").exists());
    }

    #[test]
    fn test_clone_local_remote() {
        let base = TempDir::new().unwrap();
        let (remote, _) = remote_with_clone(base.path());
        let dest = base.path().join("fresh");

        let (handle, result) = clone_repository(
            remote.to_str().unwrap(),
            &dest,
            &full_clone(),
            &GitOperationConfig::silent(),
            &CancelFlag::new(),
        );
        assert!(result.is_successful());
        let handle = handle.unwrap();
        assert!(handle.root().join("About/About.xml").exists());
        handle.cleanup();
    }

    #[test]
    fn test_force_clone_keeps_preserved_files() {
        let base = TempDir::new().unwrap();
        let (remote, _) = remote_with_clone(base.path());
        let dest = base.path().join("mod");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("a.dds"), "texture").unwrap();
        fs::write(dest.join("b.xml"), "<stale/>").unwrap();

        let options = CloneOptions {
            force: true,
            ..full_clone()
        };
        let (handle, result) = clone_repository(
            remote.to_str().unwrap(),
            &dest,
            &options,
            &GitOperationConfig::silent(),
            &CancelFlag::new(),
        );

        assert_eq!(result, CloneResult::Cloned);
        assert!(handle.is_some());
        assert!(dest.join("a.dds").exists());
        assert!(!dest.join("b.xml").exists());
        assert!(dest.join("About/About.xml").exists());
        assert!(RepoHandle::is_git_repo(&dest));
    }

    #[test]
    fn test_clone_missing_remote_is_git_error() {
        let base = TempDir::new().unwrap();
        let (_, result) = clone_repository(
            base.path().join("missing.git").to_str().unwrap(),
            &base.path().join("dest"),
            &full_clone(),
            &GitOperationConfig::silent(),
            &CancelFlag::new(),
        );
        assert_eq!(result, CloneResult::GitError);
    }
}
