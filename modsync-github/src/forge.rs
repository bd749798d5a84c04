//! Fork lookup and creation, and the [`ForgeClient`] implementation

use async_trait::async_trait;
use modsync_core::git::RepoUrl;
use modsync_core::upload::{ForgeClient, Fork, NewPullRequest};
use octocrab::models::Repository;
use tracing::{debug, info};

use crate::{Error, GitHubClient, Result};

/// The parts of a GitHub repository the fork logic looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSummary {
    pub owner: String,
    pub name: String,
    pub fork: bool,
    /// `owner/repo` of the repository this one was forked from
    pub parent: Option<String>,
    pub clone_url: Option<String>,
}

impl From<&Repository> for RepoSummary {
    fn from(repo: &Repository) -> Self {
        let owner = repo
            .owner
            .as_ref()
            .map(|o| o.login.clone())
            .or_else(|| {
                repo.full_name
                    .as_deref()
                    .and_then(|f| f.split('/').next())
                    .map(str::to_string)
            })
            .unwrap_or_default();

        RepoSummary {
            owner,
            name: repo.name.clone(),
            fork: repo.fork.unwrap_or(false),
            parent: repo.parent.as_ref().and_then(|p| p.full_name.clone()),
            clone_url: repo.clone_url.as_ref().map(|u| u.to_string()),
        }
    }
}

impl RepoSummary {
    fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// This repository as a fork of `upstream`
    ///
    /// A parent GitHub did not report is accepted; a different parent is not.
    pub fn as_fork_of(&self, upstream: &RepoUrl) -> Result<Fork> {
        let upstream_name = format!("{}/{}", upstream.owner, upstream.repo);
        let parent_matches = self
            .parent
            .as_deref()
            .map_or(true, |p| p.eq_ignore_ascii_case(&upstream_name));
        if !self.fork || !parent_matches {
            return Err(Error::NotAFork(self.full_name(), upstream_name));
        }
        Ok(self.to_fork(upstream))
    }

    /// Convert without checking ancestry
    pub fn to_fork(&self, upstream: &RepoUrl) -> Fork {
        let clone_url = self.clone_url.clone().unwrap_or_else(|| {
            RepoUrl {
                base: upstream.base.clone(),
                owner: self.owner.clone(),
                repo: self.name.clone(),
            }
            .clone_url()
        });
        Fork {
            owner: self.owner.clone(),
            repo: self.name.clone(),
            clone_url,
        }
    }
}

impl GitHubClient {
    /// The fork of `upstream` owned by `owner`, if it exists
    pub async fn find_fork_of(&self, upstream: &RepoUrl, owner: &str) -> Result<Option<Fork>> {
        debug!(owner, upstream = %upstream.repo, "Looking for fork");

        let repo = match self.client().repos(owner, &upstream.repo).get().await {
            Ok(repo) => repo,
            Err(e) => {
                let err = Error::Api(e);
                if err.is_not_found() {
                    debug!(owner, "No fork found");
                    return Ok(None);
                }
                return Err(err);
            }
        };

        RepoSummary::from(&repo).as_fork_of(upstream).map(Some)
    }

    /// Fork `upstream` into the authenticated account
    pub async fn fork(&self, upstream: &RepoUrl) -> Result<Fork> {
        let repo = self
            .client()
            .repos(&upstream.owner, &upstream.repo)
            .create_fork()
            .send()
            .await
            .map_err(|e| {
                let err = Error::Api(e);
                if err.is_not_found() {
                    Error::RepoNotFound(format!("{}/{}", upstream.owner, upstream.repo))
                } else {
                    err
                }
            })?;

        let fork = RepoSummary::from(&repo).to_fork(upstream);
        info!(owner = %fork.owner, repo = %fork.repo, "Created fork");
        Ok(fork)
    }
}

#[async_trait]
impl ForgeClient for GitHubClient {
    async fn find_fork(&self, upstream: &RepoUrl, owner: &str) -> modsync_core::Result<Option<Fork>> {
        Ok(self.find_fork_of(upstream, owner).await?)
    }

    async fn create_fork(&self, upstream: &RepoUrl) -> modsync_core::Result<Fork> {
        Ok(self.fork(upstream).await?)
    }

    async fn create_pull_request(&self, request: &NewPullRequest) -> modsync_core::Result<String> {
        Ok(self.open_pull_request(request).await?.html_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream() -> RepoUrl {
        RepoUrl::parse("https://github.com/upstream/mod-data").unwrap()
    }

    fn summary(fork: bool, parent: Option<&str>) -> RepoSummary {
        RepoSummary {
            owner: "modder".to_string(),
            name: "mod-data".to_string(),
            fork,
            parent: parent.map(str::to_string),
            clone_url: None,
        }
    }

    #[test]
    fn test_fork_of_upstream() {
        let fork = summary(true, Some("Upstream/Mod-Data")).as_fork_of(&upstream()).unwrap();
        assert_eq!(fork.owner, "modder");
        assert_eq!(fork.clone_url, "https://github.com/modder/mod-data.git");
    }

    #[test]
    fn test_unreported_parent_is_accepted() {
        assert!(summary(true, None).as_fork_of(&upstream()).is_ok());
    }

    #[test]
    fn test_not_a_fork() {
        let err = summary(false, None).as_fork_of(&upstream()).unwrap_err();
        assert!(matches!(err, Error::NotAFork(_, _)));
        assert!(err.to_string().contains("modder/mod-data"));
    }

    #[test]
    fn test_fork_of_another_repository() {
        assert!(summary(true, Some("someone/else")).as_fork_of(&upstream()).is_err());
    }

    #[test]
    fn test_reported_clone_url_wins() {
        let mut repo = summary(true, None);
        repo.clone_url = Some("https://github.com/modder/renamed.git".to_string());
        assert_eq!(repo.to_fork(&upstream()).clone_url, "https://github.com/modder/renamed.git");
    }
}
