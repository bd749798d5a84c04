//! Working tree status and commit details

use chrono::{DateTime, FixedOffset, TimeZone};
use git2::{Index, Status, StatusOptions};

use super::{GitOperationConfig, RepoHandle};
use crate::notify::OperationKind;
use crate::{Error, Result};

/// Index changes of any kind
const STAGED: Status = Status::INDEX_NEW
    .union(Status::INDEX_MODIFIED)
    .union(Status::INDEX_DELETED)
    .union(Status::INDEX_RENAMED)
    .union(Status::INDEX_TYPECHANGE);

/// Unstaged changes to tracked files
const MODIFIED: Status = Status::WT_MODIFIED
    .union(Status::WT_DELETED)
    .union(Status::WT_RENAMED)
    .union(Status::WT_TYPECHANGE);

/// Snapshot of a repository's working tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoStatus {
    /// Current branch; `None` when HEAD is detached
    pub branch: Option<String>,
    /// Paths with staged changes
    pub staged: Vec<String>,
    /// Tracked paths with unstaged changes
    pub modified: Vec<String>,
    /// Paths git does not track
    pub untracked: Vec<String>,
    /// Paths with unresolved conflicts
    pub conflicted: Vec<String>,
}

impl RepoStatus {
    /// Whether anything would be lost by a hard reset
    pub fn has_uncommitted_changes(&self) -> bool {
        !self.staged.is_empty() || !self.modified.is_empty() || !self.conflicted.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        !self.has_uncommitted_changes() && self.untracked.is_empty()
    }
}

/// Details of the commit HEAD points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: String,
    pub short_id: String,
    pub summary: String,
    pub author: String,
    pub email: String,
    pub time: DateTime<FixedOffset>,
}

/// Paths of every unresolved conflict in `index`, sorted
pub(crate) fn conflicted_paths(index: &Index) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    for conflict in index.conflicts()? {
        let conflict = conflict?;
        if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
            paths.push(String::from_utf8_lossy(&entry.path).into_owned());
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

pub fn try_repo_status(handle: &RepoHandle) -> Result<RepoStatus> {
    let mut options = StatusOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false)
        .exclude_submodules(true);

    let statuses = handle.inner().statuses(Some(&mut options))?;
    let mut status = RepoStatus {
        branch: handle.head_branch()?,
        ..Default::default()
    };

    for entry in statuses.iter() {
        let Some(path) = entry.path() else {
            continue;
        };
        let flags = entry.status();
        if flags.contains(Status::CONFLICTED) {
            status.conflicted.push(path.to_string());
            continue;
        }
        if flags.intersects(STAGED) {
            status.staged.push(path.to_string());
        }
        if flags.intersects(MODIFIED) {
            status.modified.push(path.to_string());
        }
        if flags.contains(Status::WT_NEW) {
            status.untracked.push(path.to_string());
        }
    }

    Ok(status)
}

/// Working tree status, reported and `None` on failure
pub fn repo_status(handle: &RepoHandle, config: &GitOperationConfig) -> Option<RepoStatus> {
    match try_repo_status(handle) {
        Ok(status) => Some(status),
        Err(e) => {
            config.report(
                OperationKind::Status,
                &format!("Failed to read status of {}", handle.root().display()),
                Some(&e.to_string()),
            );
            None
        }
    }
}

/// Whether there are staged or unstaged changes to tracked files
///
/// Untracked and ignored files do not count: a hard reset would keep them.
pub fn try_has_uncommitted_changes(handle: &RepoHandle) -> Result<bool> {
    let mut options = StatusOptions::new();
    options
        .include_untracked(false)
        .include_ignored(false)
        .exclude_submodules(true);

    let statuses = handle.inner().statuses(Some(&mut options))?;
    Ok(statuses
        .iter()
        .any(|entry| entry.status().intersects(STAGED | MODIFIED | Status::CONFLICTED)))
}

/// [`try_has_uncommitted_changes`], reporting failures and answering `false`
pub fn has_uncommitted_changes(handle: &RepoHandle, config: &GitOperationConfig) -> bool {
    match try_has_uncommitted_changes(handle) {
        Ok(dirty) => dirty,
        Err(e) => {
            config.report(
                OperationKind::Status,
                &format!("Failed to read status of {}", handle.root().display()),
                Some(&e.to_string()),
            );
            false
        }
    }
}

fn try_head_commit_info(handle: &RepoHandle) -> Result<CommitInfo> {
    let repo = handle.inner();
    let id = handle
        .head_commit_id()?
        .ok_or_else(|| Error::Other("Repository has no commits".to_string()))?;
    let commit = repo.find_commit(id)?;
    let author = commit.author();

    let when = commit.time();
    let offset = FixedOffset::east_opt(when.offset_minutes() * 60)
        .ok_or_else(|| Error::Other(format!("Invalid commit time offset on {}", id)))?;
    let time = offset
        .timestamp_opt(when.seconds(), 0)
        .single()
        .ok_or_else(|| Error::Other(format!("Invalid commit time on {}", id)))?;

    let short_id = commit
        .as_object()
        .short_id()?
        .as_str()
        .unwrap_or_default()
        .to_string();

    Ok(CommitInfo {
        id: id.to_string(),
        short_id,
        summary: commit.summary().unwrap_or_default().to_string(),
        author: author.name().unwrap_or_default().to_string(),
        email: author.email().unwrap_or_default().to_string(),
        time,
    })
}

/// Details of HEAD's commit, reported and `None` on failure or empty history
pub fn head_commit_info(handle: &RepoHandle, config: &GitOperationConfig) -> Option<CommitInfo> {
    match try_head_commit_info(handle) {
        Ok(info) => Some(info),
        Err(e) => {
            config.report(
                OperationKind::CommitInfo,
                &format!("Failed to read the last commit of {}", handle.root().display()),
                Some(&e.to_string()),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testing::{commit_file, init_repo, write_file};
    use tempfile::TempDir;

    #[test]
    fn test_clean_repository() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "About/About.xml", "<ModMetaData/>", "initial");
        let handle = RepoHandle::open(dir.path()).unwrap();

        let status = try_repo_status(&handle).unwrap();
        assert!(status.is_clean());
        assert_eq!(status.branch.as_deref(), Some("main"));
        assert!(!try_has_uncommitted_changes(&handle).unwrap());
    }

    #[test]
    fn test_untracked_files_do_not_count_as_changes() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "About/About.xml", "<ModMetaData/>", "initial");
        write_file(&repo, "Textures/new.dds", "binary");
        let handle = RepoHandle::open(dir.path()).unwrap();

        let status = try_repo_status(&handle).unwrap();
        assert_eq!(status.untracked, vec!["Textures/new.dds".to_string()]);
        assert!(!status.has_uncommitted_changes());
        assert!(!has_uncommitted_changes(&handle, &GitOperationConfig::silent()));
    }

    #[test]
    fn test_modified_and_staged_files() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "About/About.xml", "<ModMetaData/>", "initial");
        commit_file(&repo, "Defs/Things.xml", "<Defs/>", "defs");
        write_file(&repo, "About/About.xml", "<ModMetaData>edited</ModMetaData>");
        write_file(&repo, "Defs/Things.xml", "<Defs>staged</Defs>");
        let mut index = repo.index().unwrap();
        index.add_path(std::path::Path::new("Defs/Things.xml")).unwrap();
        index.write().unwrap();

        let handle = RepoHandle::open(dir.path()).unwrap();
        let status = try_repo_status(&handle).unwrap();
        assert_eq!(status.modified, vec!["About/About.xml".to_string()]);
        assert_eq!(status.staged, vec!["Defs/Things.xml".to_string()]);
        assert!(has_uncommitted_changes(&handle, &GitOperationConfig::silent()));
    }

    #[test]
    fn test_head_commit_info() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        let oid = commit_file(&repo, "About/About.xml", "<ModMetaData/>", "Add metadata\n\nBody");
        let handle = RepoHandle::open(dir.path()).unwrap();

        let info = head_commit_info(&handle, &GitOperationConfig::silent()).unwrap();
        assert_eq!(info.id, oid.to_string());
        assert!(info.id.starts_with(&info.short_id));
        assert_eq!(info.summary, "Add metadata");
        assert_eq!(info.author, "Mod Author");
    }

    #[test]
    fn test_head_commit_info_on_empty_history() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        let handle = RepoHandle::open(dir.path()).unwrap();

        assert!(head_commit_info(&handle, &GitOperationConfig::silent()).is_none());
    }
}
