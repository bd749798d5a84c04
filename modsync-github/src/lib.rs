//! modsync GitHub - forks and pull requests for uploads
//!
//! Implements [`modsync_core::ForgeClient`] on top of octocrab so the upload
//! workflow can find or create the user's fork and open a pull request.

mod client;
mod error;
mod forge;
mod pr;

pub use client::{api_base_for, parse_github_url, resolve_upstream, GitHubClient};
pub use error::{Error, Result};
pub use forge::RepoSummary;
pub use pr::PullRequest;
