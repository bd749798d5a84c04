//! GitHub API client using octocrab

use crate::{Error, Result};
use modsync_core::git::RepoUrl;
use modsync_core::{Credentials, Secrets};
use octocrab::Octocrab;
use tracing::{debug, info};

const GITHUB_WEB: &str = "https://github.com";

/// GitHub API client acting on behalf of one user
pub struct GitHubClient {
    client: Octocrab,
    username: String,
}

impl GitHubClient {
    /// Create a client for github.com
    pub fn new(credentials: &Credentials) -> Result<Self> {
        Self::build(credentials, None)
    }

    /// Create a client for the host serving `upstream`
    ///
    /// Hosts other than github.com are treated as GitHub Enterprise and
    /// reached through their `/api/v3` endpoint.
    pub fn for_upstream(upstream: &RepoUrl, credentials: &Credentials) -> Result<Self> {
        Self::build(credentials, api_base_for(&upstream.base))
    }

    /// Create a client from the secrets file or `GITHUB_TOKEN`
    ///
    /// Token is loaded from (in priority order):
    /// 1. GITHUB_TOKEN environment variable
    /// 2. ~/.config/modsync/secrets.toml
    pub fn from_secrets(upstream: &RepoUrl, username: Option<&str>) -> Result<Self> {
        let secrets = Secrets::load().map_err(|e| Error::Auth(e.to_string()))?;
        let credentials = secrets
            .credentials(username)
            .map_err(|e| Error::Auth(e.to_string()))?;
        Self::for_upstream(upstream, &credentials)
    }

    fn build(credentials: &Credentials, api_base: Option<String>) -> Result<Self> {
        if credentials.token.trim().is_empty() {
            return Err(Error::Auth(
                "GitHub token not found. Set GITHUB_TOKEN environment variable \
                 or add token to ~/.config/modsync/secrets.toml"
                    .to_string(),
            ));
        }

        let mut builder = Octocrab::builder().personal_token(credentials.token.clone());
        if let Some(base) = &api_base {
            builder = builder
                .base_uri(base.as_str())
                .map_err(|e| Error::Parse(format!("Invalid API URL {}: {}", base, e)))?;
        }
        let client = builder
            .build()
            .map_err(|e| Error::Auth(format!("Failed to create GitHub client: {}", e)))?;

        info!(username = %credentials.username, api = api_base.as_deref().unwrap_or("api.github.com"), "Created GitHub client");

        Ok(Self {
            client,
            username: credentials.username.clone(),
        })
    }

    /// The user forks and pull requests are created for
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get the underlying octocrab client
    pub fn client(&self) -> &Octocrab {
        &self.client
    }

    /// Check that the token is valid and belongs to the configured user
    pub async fn verify(&self) -> Result<()> {
        debug!(username = %self.username, "Verifying GitHub token");

        let user = self.client.current().user().await.map_err(|e| match e {
            octocrab::Error::GitHub { source, .. } if source.message.contains("Bad credentials") => {
                Error::Auth("Invalid GitHub token".to_string())
            }
            other => Error::Api(other),
        })?;

        if !user.login.eq_ignore_ascii_case(&self.username) {
            return Err(Error::Auth(format!(
                "Token belongs to {}, not {}",
                user.login, self.username
            )));
        }

        info!(login = %user.login, "GitHub token verified");
        Ok(())
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// API root for a web base URL, `None` for github.com
pub fn api_base_for(web_base: &str) -> Option<String> {
    let base = web_base.trim_end_matches('/');
    if base.eq_ignore_ascii_case(GITHUB_WEB) || base.eq_ignore_ascii_case("https://www.github.com") {
        None
    } else {
        Some(format!("{}/api/v3", base))
    }
}

/// Parse a GitHub repository reference into owner and repo
///
/// Supports formats:
/// - owner/repo
/// - https://github.com/owner/repo
/// - git@github.com:owner/repo.git
pub fn parse_github_url(url: &str) -> Result<(String, String)> {
    if !url.contains(':') && !url.contains('/') {
        return Err(Error::Parse(format!(
            "Invalid repository format: {}. Expected owner/repo",
            url
        )));
    }

    if !url.contains("://") && !url.contains('@') {
        let parts: Vec<&str> = url.split('/').collect();
        if parts.len() == 2 && parts.iter().all(|p| !p.is_empty()) {
            return Ok((
                parts[0].to_string(),
                parts[1].trim_end_matches(".git").to_string(),
            ));
        }
        return Err(Error::Parse(format!(
            "Invalid repository format: {}. Expected owner/repo",
            url
        )));
    }

    if url.starts_with("https://") || url.starts_with("http://") {
        let url = url::Url::parse(url).map_err(|e| Error::Parse(e.to_string()))?;
        let path = url.path().trim_start_matches('/').trim_end_matches(".git");
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() >= 2 {
            return Ok((parts[0].to_string(), parts[1].to_string()));
        }
        return Err(Error::Parse(format!("Invalid GitHub URL path: {}", path)));
    }

    if url.starts_with("git@") {
        if let Some(path) = url.split(':').nth(1) {
            let path = path.trim_end_matches(".git");
            let parts: Vec<&str> = path.split('/').collect();
            if parts.len() >= 2 {
                return Ok((parts[0].to_string(), parts[1].to_string()));
            }
        }
        return Err(Error::Parse(format!("Invalid SSH URL: {}", url)));
    }

    Err(Error::Parse(format!("Unrecognized URL format: {}", url)))
}

/// Resolve any supported reference to a [`RepoUrl`]
///
/// Web URLs keep their host; shorthand and SSH forms resolve to github.com.
pub fn resolve_upstream(reference: &str) -> Result<RepoUrl> {
    let web = if reference.starts_with("https://") || reference.starts_with("http://") {
        reference.to_string()
    } else {
        let (owner, repo) = parse_github_url(reference)?;
        format!("{}/{}/{}", GITHUB_WEB, owner, repo)
    };
    RepoUrl::parse(&web).map_err(|e| Error::Parse(e.to_string()))
}
