//! Upload command - publish a data file as a pull request

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Args;
use modsync_core::git::CloneOptions;
use modsync_core::{CliOverrides, Config, GitOperationConfig, Secrets, UploadOutcome, UploadRequest, Uploader};
use modsync_github::{resolve_upstream, GitHubClient};

use crate::console::ConsoleInteraction;

/// Publish a data file to upstream as a pull request
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Data file, relative to the local clone
    file: PathBuf,

    /// Upstream repository (URL or owner/repo)
    #[arg(long, env = "MODSYNC_UPSTREAM")]
    upstream: Option<String>,

    /// Local clone of the upstream repository
    #[arg(long)]
    local_path: Option<PathBuf>,

    /// GitHub account owning the fork
    #[arg(short, long, env = "MODSYNC_GITHUB_USER")]
    user: Option<String>,

    /// Branch the pull request targets (defaults to github.base_branch)
    #[arg(long)]
    base: Option<String>,
}

impl UploadArgs {
    /// Fold this command's options into the configuration overrides
    pub fn overrides(&self, overrides: CliOverrides) -> CliOverrides {
        CliOverrides {
            username: self.user.clone().or(overrides.username),
            upstream: self.upstream.clone().or(overrides.upstream),
            local_path: self.local_path.clone().or(overrides.local_path),
            ..overrides
        }
    }

    /// Execute the upload
    pub async fn execute(
        &self,
        config: &Config,
        git: GitOperationConfig,
        assume_yes: bool,
    ) -> anyhow::Result<()> {
        let upstream = config
            .github
            .upstream
            .as_deref()
            .context("No upstream repository; pass --upstream or set github.upstream")?;
        let upstream = resolve_upstream(upstream)?;
        let local_path = config
            .github
            .local_path
            .clone()
            .context("No local clone; pass --local-path or set github.local_path")?;

        let credentials = Secrets::load()?.credentials(config.github.username.as_deref())?;
        let client = GitHubClient::for_upstream(&upstream, &credentials)?;

        let uploader = Uploader::new(
            Arc::new(client),
            Arc::new(ConsoleInteraction::new(assume_yes)),
            git,
        )
        .with_clone_options(CloneOptions {
            depth: 0,
            preserve: config.git.preserve_patterns.clone(),
            ..Default::default()
        });

        let web_url = format!("{}/{}/{}", upstream.base, upstream.owner, upstream.repo);
        let base = self
            .base
            .clone()
            .unwrap_or_else(|| config.github.base_branch.clone());
        let request = UploadRequest::new(web_url, local_path, &self.file, credentials).with_base_branch(base);

        let upload = uploader.upload(&request);
        tokio::pin!(upload);
        let mut cancelled = false;
        let outcome = loop {
            tokio::select! {
                outcome = &mut upload => break outcome,
                _ = tokio::signal::ctrl_c(), if !cancelled => {
                    eprintln!("Cancelling upload...");
                    uploader.cancel();
                    cancelled = true;
                }
            }
        };

        match outcome {
            UploadOutcome::PullRequestOpened { branch, .. } => {
                println!("Uploaded {} on branch {}", self.file.display(), branch);
                Ok(())
            }
            UploadOutcome::NothingToUpload => Ok(()),
            UploadOutcome::Aborted { step, message } => {
                bail!("Upload failed while {}: {}", step, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(user: Option<&str>) -> UploadArgs {
        UploadArgs {
            file: PathBuf::from("Data/mods.json"),
            upstream: Some("upstream/mod-data".to_string()),
            local_path: None,
            user: user.map(str::to_string),
            base: None,
        }
    }

    #[test]
    fn test_overrides_prefer_command_options() {
        let base = CliOverrides {
            quiet_errors: true,
            username: Some("from-global".to_string()),
            local_path: Some(PathBuf::from("/mods/data")),
            ..Default::default()
        };
        let merged = args(Some("modder")).overrides(base);
        assert!(merged.quiet_errors);
        assert_eq!(merged.username.as_deref(), Some("modder"));
        assert_eq!(merged.upstream.as_deref(), Some("upstream/mod-data"));
        assert_eq!(merged.local_path, Some(PathBuf::from("/mods/data")));
    }

    #[test]
    fn test_overrides_keep_existing_when_unset() {
        let base = CliOverrides {
            username: Some("from-global".to_string()),
            ..Default::default()
        };
        assert_eq!(args(None).overrides(base).username.as_deref(), Some("from-global"));
    }
}
