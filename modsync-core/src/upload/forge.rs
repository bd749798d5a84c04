//! Collaborators the upload workflow talks to

use async_trait::async_trait;

use crate::git::RepoUrl;
use crate::Result;

/// A user's fork of the upstream repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fork {
    /// Account owning the fork
    pub owner: String,
    /// Repository name of the fork
    pub repo: String,
    /// URL the fork is pushed to
    pub clone_url: String,
}

/// A pull request to open against the upstream repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub upstream: RepoUrl,
    /// Owner of the fork holding the branch
    pub head_owner: String,
    pub head_branch: String,
    /// Upstream branch to merge into
    pub base: String,
    pub title: String,
    pub body: String,
}

impl NewPullRequest {
    /// `owner:branch`, the form forges expect for cross-repository heads
    pub fn head(&self) -> String {
        format!("{}:{}", self.head_owner, self.head_branch)
    }
}

/// Repository host offering forks and pull requests
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// The fork of `upstream` owned by `owner`, if one exists
    async fn find_fork(&self, upstream: &RepoUrl, owner: &str) -> Result<Option<Fork>>;

    /// Fork `upstream` into the authenticated account
    async fn create_fork(&self, upstream: &RepoUrl) -> Result<Fork>;

    /// Open a pull request; returns its web URL
    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<String>;
}

/// Questions and messages for the person running the upload
pub trait Interaction: Send + Sync {
    /// Ask a yes/no question
    fn confirm(&self, question: &str) -> bool;

    /// Tell the user something that needs no answer
    fn inform(&self, message: &str);

    /// Offer to open `url` in a browser
    fn offer_open_url(&self, url: &str);
}
