//! Commands over many mod repositories at once

use std::path::{Path, PathBuf};

use anyhow::bail;
use clap::Args;
use modsync_core::git::PullOptions;
use modsync_core::{BatchOperation, BatchResult, BatchRunner, Config, GitOperationConfig};
use tokio::task::JoinHandle;

use super::repo::push_config;

/// Repositories to operate on
#[derive(Args, Debug)]
pub struct Targets {
    /// Repository paths
    paths: Vec<PathBuf>,

    /// Also include every directory directly under this one
    #[arg(short, long)]
    mods_dir: Option<PathBuf>,
}

impl Targets {
    /// Explicit paths first, then the sorted children of `--mods-dir`
    fn collect(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut paths = self.paths.clone();
        if let Some(dir) = &self.mods_dir {
            paths.extend(child_dirs(dir)?);
        }
        if paths.is_empty() {
            bail!("No repositories given; pass paths or --mods-dir");
        }
        Ok(paths)
    }
}

fn child_dirs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    #[command(flatten)]
    targets: Targets,

    /// Force the operation (discard local commits on pull, overwrite on push)
    #[arg(short, long)]
    force: bool,

    /// Discard uncommitted changes before pulling
    #[arg(long)]
    reset: bool,
}

impl BatchArgs {
    pub async fn pull(&self, config: &Config, git: GitOperationConfig) -> anyhow::Result<()> {
        let options = PullOptions {
            reset_working_tree: self.reset,
            force: self.force,
            ..Default::default()
        };
        self.run(config, git, BatchOperation::Pull(options)).await
    }

    pub async fn push(&self, config: &Config, git: GitOperationConfig) -> anyhow::Result<()> {
        let mut push = push_config(config)?;
        push.force = self.force;
        self.run(config, git, BatchOperation::Push(push)).await
    }

    async fn run(
        &self,
        config: &Config,
        git: GitOperationConfig,
        operation: BatchOperation,
    ) -> anyhow::Result<()> {
        let paths = self.targets.collect()?;
        let name = operation.name();
        let runner = BatchRunner::from_settings(&config.git, git);

        tracing::info!(count = paths.len(), operation = name, "Starting batch");
        let result = until_interrupted(&runner, runner.spawn(paths, operation)).await?;

        print!("{}", result);
        if !result.all_succeeded() {
            bail!("{} {}", name, summary_suffix(&result));
        }
        Ok(())
    }
}

fn summary_suffix(result: &BatchResult) -> String {
    format!("failed for {} of {} repositories", result.failure_count(), result.total())
}

#[derive(Args, Debug)]
pub struct CheckUpdatesArgs {
    #[command(flatten)]
    targets: Targets,
}

impl CheckUpdatesArgs {
    pub async fn execute(&self, config: &Config, git: GitOperationConfig) -> anyhow::Result<()> {
        let paths = self.targets.collect()?;
        let runner = BatchRunner::from_settings(&config.git, git);
        let report = until_interrupted(&runner, runner.spawn_check_updates(paths)).await?;

        for (path, messages) in &report.updates {
            println!("{} ({} new):", path.display(), messages.len());
            for message in messages {
                println!("  {}", message);
            }
        }
        for path in &report.invalid_paths {
            println!("{}: not a git repository", path.display());
        }
        for (path, error) in &report.errors {
            println!("{}: {}", path.display(), error);
        }
        if report.is_clean() {
            println!("Everything is up to date.");
        } else {
            println!("{}", report);
        }
        Ok(())
    }
}

/// Await a batch, cancelling the runner on Ctrl-C
async fn until_interrupted<T>(runner: &BatchRunner, job: JoinHandle<T>) -> anyhow::Result<T> {
    tokio::pin!(job);
    let mut cancelled = false;
    loop {
        tokio::select! {
            result = &mut job => return Ok(result?),
            _ = tokio::signal::ctrl_c(), if !cancelled => {
                eprintln!("Cancelling batch...");
                runner.cancel();
                cancelled = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_orders_explicit_then_children() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("b-mod")).unwrap();
        std::fs::create_dir(dir.path().join("a-mod")).unwrap();
        std::fs::write(dir.path().join("readme.txt"), "").unwrap();

        let targets = Targets {
            paths: vec![PathBuf::from("/mods/explicit")],
            mods_dir: Some(dir.path().to_path_buf()),
        };
        let paths = targets.collect().unwrap();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/mods/explicit"),
                dir.path().join("a-mod"),
                dir.path().join("b-mod"),
            ]
        );
    }

    #[test]
    fn test_collect_requires_something() {
        let targets = Targets {
            paths: Vec::new(),
            mods_dir: None,
        };
        assert!(targets.collect().is_err());
    }

    #[tokio::test]
    async fn test_pull_all_on_plain_directories_fails() {
        let dir = TempDir::new().unwrap();
        let args = BatchArgs {
            targets: Targets {
                paths: vec![dir.path().to_path_buf()],
                mods_dir: None,
            },
            force: false,
            reset: false,
        };
        let err = args
            .pull(&Config::default(), GitOperationConfig::silent())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed for 1 of 1"));
    }
}
