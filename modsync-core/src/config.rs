//! Configuration management for modsync
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (MODSYNC_*)
//! 3. Config file (~/.config/modsync/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::git::{
    GitOperationConfig, DEFAULT_BRANCH, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_PRESERVE_PATTERNS,
};
use crate::notify::{Notifier, SilentNotifier};
use crate::{Error, Result};

/// Git operation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitSettings {
    /// Route failures to the user
    pub notify_errors: bool,

    /// How long a fetch or push may run
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,

    /// How long the connectivity pre-check may take
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,

    /// History depth for new clones; 0 clones everything
    pub clone_depth: u32,

    /// Files kept when a clone destination is force-cleared
    pub preserve_patterns: Vec<String>,

    /// Batches allowed to run at the same time
    pub batch_slots: usize,

    /// Repositories processed at the same time inside one batch
    pub batch_parallelism: usize,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            notify_errors: true,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            clone_depth: 1,
            preserve_patterns: DEFAULT_PRESERVE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            batch_slots: 4,
            batch_parallelism: 1,
        }
    }
}

/// Settings of the upload workflow
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubSettings {
    /// Account owning the fork
    pub username: Option<String>,

    /// Upstream repository URL uploads are proposed to
    pub upstream: Option<String>,

    /// Local clone used for uploads
    pub local_path: Option<PathBuf>,

    /// Branch pull requests target
    pub base_branch: String,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            username: None,
            upstream: None,
            local_path: None,
            base_branch: DEFAULT_BRANCH.to_string(),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub git: GitSettings,
    pub github: GitHubSettings,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub quiet_errors: bool,
    pub fetch_timeout: Option<Duration>,
    pub username: Option<String>,
    pub upstream: Option<String>,
    pub local_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/modsync/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("modsync").join("config.toml"))
    }

    /// Reject settings no operation can run with
    pub fn validate(&self) -> Result<()> {
        if self.git.fetch_timeout.is_zero() {
            return Err(Error::Config("git.fetch_timeout must be positive".to_string()));
        }
        if self.git.batch_slots == 0 || self.git.batch_parallelism == 0 {
            return Err(Error::Config(
                "git.batch_slots and git.batch_parallelism must be at least 1".to_string(),
            ));
        }
        crate::git::build_preserve_set(&self.git.preserve_patterns)?;
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - MODSYNC_FETCH_TIMEOUT: e.g. `45s`
    /// - MODSYNC_NOTIFY_ERRORS: `true` / `false`
    /// - MODSYNC_GITHUB_USER: fork owner
    /// - MODSYNC_UPSTREAM: upstream repository URL
    /// - MODSYNC_LOCAL_PATH: local clone used for uploads
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var("MODSYNC_FETCH_TIMEOUT") {
            match humantime_serde::re::humantime::parse_duration(&value) {
                Ok(timeout) => self.git.fetch_timeout = timeout,
                Err(e) => tracing::warn!(%value, error = %e, "Ignoring MODSYNC_FETCH_TIMEOUT"),
            }
        }

        if let Ok(value) = std::env::var("MODSYNC_NOTIFY_ERRORS") {
            match value.trim().parse::<bool>() {
                Ok(notify) => self.git.notify_errors = notify,
                Err(_) => tracing::warn!(%value, "Ignoring MODSYNC_NOTIFY_ERRORS"),
            }
        }

        if let Ok(user) = std::env::var("MODSYNC_GITHUB_USER") {
            self.github.username = Some(user);
        }

        if let Ok(upstream) = std::env::var("MODSYNC_UPSTREAM") {
            self.github.upstream = Some(upstream);
        }

        if let Ok(path) = std::env::var("MODSYNC_LOCAL_PATH") {
            self.github.local_path = Some(PathBuf::from(path));
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, cli: CliOverrides) -> Self {
        if cli.quiet_errors {
            self.git.notify_errors = false;
        }
        if let Some(timeout) = cli.fetch_timeout {
            self.git.fetch_timeout = timeout;
        }
        if let Some(user) = cli.username {
            self.github.username = Some(user);
        }
        if let Some(upstream) = cli.upstream {
            self.github.upstream = Some(upstream);
        }
        if let Some(path) = cli.local_path {
            self.github.local_path = Some(path);
        }
        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(cli: CliOverrides) -> Result<Self> {
        let config = Self::load()?.with_env_overrides().with_cli_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    /// Operation configuration handed to every git operation
    ///
    /// With notifications disabled the notifier is replaced by a silent one.
    pub fn operation_config(&self, notifier: Arc<dyn Notifier>) -> GitOperationConfig {
        let notifier = if self.git.notify_errors {
            notifier
        } else {
            Arc::new(SilentNotifier)
        };

        GitOperationConfig::new()
            .with_notify_errors(self.git.notify_errors)
            .with_fetch_timeout(self.git.fetch_timeout)
            .with_connection_timeout(self.git.connection_timeout)
            .with_notifier(notifier)
    }

    /// Render as TOML, as written to the config file
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }
}
