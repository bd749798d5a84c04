//! Branch and ref manipulation used by the upload workflow

use git2::build::CheckoutBuilder;
use git2::{Branch, BranchType, Oid, ResetType};

use super::RepoHandle;
use crate::{Error, Result};

/// Check a name is acceptable as a local branch name
pub fn validate_branch_name(name: &str) -> Result<()> {
    if Branch::name_is_valid(name)? {
        Ok(())
    } else {
        Err(Error::Config(format!("Invalid branch name: {:?}", name)))
    }
}

/// Turn an arbitrary label (a version, a timestamp) into a branch name
///
/// Characters git refuses in ref names become `-`; leading and trailing
/// separators and dots are trimmed.
pub fn sanitize_branch_name(raw: &str) -> String {
    let replaced: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();

    let mut name = replaced.replace("..", ".").replace("@{", "-");
    while name.contains("--") {
        name = name.replace("--", "-");
    }
    let name = name.trim_matches(|c| c == '-' || c == '.' || c == '/');
    name.strip_suffix(".lock").unwrap_or(name).to_string()
}

/// Create (or with `force`, overwrite) a local branch at `target` without switching
pub fn create_branch(handle: &RepoHandle, name: &str, target: Oid, force: bool) -> Result<()> {
    validate_branch_name(name)?;
    let repo = handle.inner();
    let commit = repo.find_commit(target)?;
    repo.branch(name, &commit, force)?;
    tracing::debug!(branch = name, %target, "Created branch");
    Ok(())
}

/// Point an existing local branch at `target` without touching the working tree
pub fn move_branch(handle: &RepoHandle, name: &str, target: Oid) -> Result<()> {
    let branch = handle.inner().find_branch(name, BranchType::Local)?;
    let mut reference = branch.into_reference();
    reference.set_target(target, &format!("modsync: move {} to {}", name, target))?;
    tracing::debug!(branch = name, %target, "Moved branch");
    Ok(())
}

/// Delete a local branch that is not checked out
pub fn delete_branch(handle: &RepoHandle, name: &str) -> Result<()> {
    let mut branch = handle.inner().find_branch(name, BranchType::Local)?;
    branch.delete()?;
    tracing::debug!(branch = name, "Deleted branch");
    Ok(())
}

/// Check out a local branch and make it HEAD
///
/// Uses a safe checkout: local modifications that would be overwritten
/// abort the switch.
pub fn switch_branch(handle: &RepoHandle, name: &str) -> Result<()> {
    if handle.head_branch()?.as_deref() == Some(name) {
        return Ok(());
    }

    let repo = handle.inner();
    let branch = repo.find_branch(name, BranchType::Local)?;
    let refname = branch
        .get()
        .name()
        .ok_or_else(|| Error::Other(format!("Branch {} has a non UTF-8 name", name)))?
        .to_string();
    let commit = branch.get().peel_to_commit()?;

    let mut checkout = CheckoutBuilder::new();
    checkout.safe();
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
    repo.set_head(&refname)?;
    tracing::debug!(branch = name, "Switched branch");
    Ok(())
}

/// Hard-reset the current branch, index and working tree to `target`
pub fn reset_hard(handle: &RepoHandle, target: Oid) -> Result<()> {
    let repo = handle.inner();
    let object = repo.find_object(target, None)?;
    repo.reset(&object, ResetType::Hard, None)?;
    tracing::debug!(%target, "Reset working tree");
    Ok(())
}

/// Point remote `name` at `url`, creating it when missing
///
/// The remote is deleted and recreated rather than edited in place.
pub fn set_remote_url(handle: &RepoHandle, name: &str, url: &str) -> Result<()> {
    let repo = handle.inner();
    if handle.remote(name).is_some() {
        repo.remote_delete(name)?;
    }
    repo.remote(name, url)?;
    tracing::info!(remote = name, url, "Remote repointed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testing::{commit_file, init_repo};
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_branch_name() {
        assert_eq!(sanitize_branch_name("1.5.2"), "1.5.2");
        assert_eq!(sanitize_branch_name("2024-05-01 12:30:00"), "2024-05-01-12-30-00");
        assert_eq!(sanitize_branch_name(" ..weird~name^ "), "weird-name");
        assert_eq!(sanitize_branch_name("release.lock"), "release");
        validate_branch_name(&sanitize_branch_name("v1 [beta]")).unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(validate_branch_name("has space").is_err());
        assert!(validate_branch_name("a..b").is_err());
        assert!(validate_branch_name("1.5.2").is_ok());
    }

    #[test]
    fn test_create_move_and_switch() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        let first = commit_file(&repo, "About/About.xml", "<ModMetaData/>", "initial");
        let second = commit_file(&repo, "Defs/Things.xml", "<Defs/>", "defs");
        let handle = RepoHandle::open(dir.path()).unwrap();

        create_branch(&handle, "1.5.2", first, false).unwrap();
        assert_eq!(handle.head_branch().unwrap().as_deref(), Some("main"));

        move_branch(&handle, "1.5.2", second).unwrap();
        switch_branch(&handle, "1.5.2").unwrap();
        assert_eq!(handle.head_branch().unwrap().as_deref(), Some("1.5.2"));
        assert_eq!(handle.head_commit_id().unwrap(), Some(second));

        move_branch(&handle, "main", first).unwrap();
        switch_branch(&handle, "main").unwrap();
        assert_eq!(handle.head_commit_id().unwrap(), Some(first));
        assert!(!dir.path().join("Defs/Things.xml").exists());
    }

    #[test]
    fn test_create_existing_branch_needs_force() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        let oid = commit_file(&repo, "About/About.xml", "<ModMetaData/>", "initial");
        let handle = RepoHandle::open(dir.path()).unwrap();

        create_branch(&handle, "feature", oid, false).unwrap();
        assert!(create_branch(&handle, "feature", oid, false).is_err());
        create_branch(&handle, "feature", oid, true).unwrap();
        delete_branch(&handle, "feature").unwrap();
        assert!(delete_branch(&handle, "feature").is_err());
    }

    #[test]
    fn test_reset_hard_discards_changes() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        let oid = commit_file(&repo, "About/About.xml", "<ModMetaData/>", "initial");
        std::fs::write(dir.path().join("About/About.xml"), "dirty").unwrap();
        let handle = RepoHandle::open(dir.path()).unwrap();

        reset_hard(&handle, oid).unwrap();
        let content = std::fs::read_to_string(dir.path().join("About/About.xml")).unwrap();
        assert_eq!(content, "<ModMetaData/>");
    }

    #[test]
    fn test_set_remote_url_recreates_remote() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        repo.remote("origin", "https://github.com/upstream/mod.git").unwrap();
        let handle = RepoHandle::open(dir.path()).unwrap();

        set_remote_url(&handle, "origin", "https://github.com/me/mod.git").unwrap();
        assert_eq!(
            handle.remote("origin").map(|r| r.url),
            Some("https://github.com/me/mod.git".to_string())
        );

        set_remote_url(&handle, "fork", "https://github.com/me/mod.git").unwrap();
        assert_eq!(handle.list_remotes().unwrap().len(), 2);
    }
}
