//! Pull request creation

use modsync_core::upload::NewPullRequest;
use octocrab::models::pulls::PullRequest as OctocrabPR;
use tracing::{debug, info};

use crate::{Error, GitHubClient, Result};

/// A pull request as modsync reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    /// Web page of the pull request
    pub html_url: String,
    pub head_branch: String,
    pub base_branch: String,
}

impl From<OctocrabPR> for PullRequest {
    fn from(pr: OctocrabPR) -> Self {
        PullRequest {
            number: pr.number,
            title: pr.title.unwrap_or_default(),
            html_url: pr.html_url.map(|u| u.to_string()).unwrap_or_default(),
            head_branch: pr.head.ref_field,
            base_branch: pr.base.ref_field,
        }
    }
}

/// Web URL for pull request `number`, used when the API omits it
pub(crate) fn fallback_url(request: &NewPullRequest, number: u64) -> String {
    format!(
        "{}/{}/{}/pull/{}",
        request.upstream.base, request.upstream.owner, request.upstream.repo, number
    )
}

impl GitHubClient {
    /// Open a pull request from the fork branch into upstream
    pub async fn open_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest> {
        let upstream = &request.upstream;
        debug!(head = %request.head(), base = %request.base, "Opening pull request");

        let pr = self
            .client()
            .pulls(&upstream.owner, &upstream.repo)
            .create(&request.title, request.head(), &request.base)
            .body(&request.body)
            .maintainer_can_modify(true)
            .send()
            .await
            .map_err(|e| match &e {
                octocrab::Error::GitHub { source, .. } if source.message.contains("Validation Failed") => {
                    Error::Other(format!(
                        "GitHub rejected the pull request from {} (does one already exist?)",
                        request.head()
                    ))
                }
                _ => Error::Api(e),
            })?;

        let mut pr = PullRequest::from(pr);
        if pr.html_url.is_empty() {
            pr.html_url = fallback_url(request, pr.number);
        }

        info!(number = pr.number, url = %pr.html_url, "Opened pull request");
        Ok(pr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modsync_core::git::RepoUrl;

    #[test]
    fn test_fallback_url() {
        let request = NewPullRequest {
            upstream: RepoUrl::parse("https://github.com/upstream/mod-data").unwrap(),
            head_owner: "modder".to_string(),
            head_branch: "1.1".to_string(),
            base: "main".to_string(),
            title: "Update mods.json to 1.1".to_string(),
            body: String::new(),
        };
        assert_eq!(
            fallback_url(&request, 42),
            "https://github.com/upstream/mod-data/pull/42"
        );
        assert_eq!(request.head(), "modder:1.1");
    }
}
