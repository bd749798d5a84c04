//! Credentials used for pushing and pull requests
//!
//! Tokens never live in `config.toml`. They come from the `GITHUB_TOKEN`
//! environment variable or from `~/.config/modsync/secrets.toml`, which must
//! not be readable by group or others on Unix.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

/// Environment variable checked before the secrets file
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Secrets {
    pub github: GitHubSecrets,
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct GitHubSecrets {
    /// Personal access token
    pub token: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("github_token", &self.github.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Username and token for HTTP authentication against the forge
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Secrets {
    /// Load secrets from the default location, empty when there is no file
    pub fn load() -> Result<Self> {
        match Self::default_secrets_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load secrets from `path`, refusing files others can read
    pub fn load_from_file(path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mode = std::fs::metadata(path)?.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(Error::Config(format!(
                    "Secrets file {} has insecure permissions {:o}. Please run: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }
        }

        let contents = std::fs::read_to_string(path)?;
        let mut secrets: Secrets = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))?;
        secrets.github.token = secrets
            .github
            .token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Ok(secrets)
    }

    /// `~/.config/modsync/secrets.toml` on Unix
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("modsync").join("secrets.toml"))
    }

    /// Token from the environment, else from the secrets file
    pub fn github_token(&self) -> Option<String> {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            let token = token.trim().to_string();
            if !token.is_empty() {
                debug!("Using GitHub token from {}", TOKEN_ENV);
                return Some(token);
            }
        }
        self.github.token.clone()
    }

    /// Credentials for `username`; fails when either half is missing
    pub fn credentials(&self, username: Option<&str>) -> Result<Credentials> {
        let username = username
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Config("No GitHub username configured".to_string()))?;
        let token = self.github_token().ok_or_else(|| {
            Error::Config(format!(
                "No GitHub token found; set {} or add it to the secrets file",
                TOKEN_ENV
            ))
        })?;

        Ok(Credentials {
            username: username.to_string(),
            token,
        })
    }
}
