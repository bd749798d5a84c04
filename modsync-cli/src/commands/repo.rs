//! Single-repository commands, each run on a background worker

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use modsync_core::git::{
    head_commit_info, list_stashes, repo_status, CloneOptions, PullOptions, PushConfig, StashAction,
    Staging,
};
use modsync_core::{Config, GitOperationConfig, RepoHandle, RepoTask, RepoWorker, Secrets, WorkerEvent};

#[derive(Subcommand, Debug)]
pub enum RepoCommand {
    /// Clone a mod repository
    Clone {
        /// Repository URL
        url: String,

        /// Destination directory
        path: PathBuf,

        /// Branch to check out
        #[arg(short, long)]
        branch: Option<String>,

        /// History depth, 0 for full history (defaults to git.clone_depth)
        #[arg(long)]
        depth: Option<u32>,

        /// Replace the contents of a non-empty destination
        #[arg(short, long)]
        force: bool,
    },

    /// Pull the current branch from its remote
    Pull {
        /// Repository path
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Remote to pull from
        #[arg(short, long)]
        remote: Option<String>,

        /// Branch to pull (defaults to the current one)
        #[arg(short, long)]
        branch: Option<String>,

        /// Discard local commits and take the remote branch as is
        #[arg(short, long)]
        force: bool,

        /// Discard uncommitted changes first
        #[arg(long)]
        reset: bool,
    },

    /// Push the current branch
    Push {
        /// Repository path
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Remote to push to
        #[arg(short, long)]
        remote: Option<String>,

        /// Branch to push (defaults to the current one)
        #[arg(short, long)]
        branch: Option<String>,

        /// Overwrite the remote branch
        #[arg(short, long)]
        force: bool,
    },

    /// Stage and commit changes
    Commit {
        /// Repository path
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Commit message
        #[arg(short, long)]
        message: String,

        /// Commit only what is already staged
        #[arg(long, conflicts_with = "files")]
        index: bool,

        /// Files to stage; every change when omitted
        files: Vec<PathBuf>,
    },

    /// Save, restore or list stashed changes
    Stash(StashArgs),

    /// Show branch, changes and HEAD commit
    Status {
        /// Repository path
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct StashArgs {
    /// Repository path
    #[arg(short, long, default_value = ".")]
    path: PathBuf,

    #[command(subcommand)]
    action: StashCommand,
}

#[derive(Subcommand, Debug)]
pub enum StashCommand {
    /// Stash uncommitted changes
    Save {
        /// Stash message
        #[arg(short, long)]
        message: Option<String>,

        /// Include untracked files
        #[arg(short = 'u', long)]
        include_untracked: bool,
    },
    /// Apply a stash and drop it
    Pop {
        #[arg(default_value_t = 0)]
        index: usize,
    },
    /// Apply a stash and keep it
    Apply {
        #[arg(default_value_t = 0)]
        index: usize,
    },
    /// Delete a stash
    Drop {
        #[arg(default_value_t = 0)]
        index: usize,
    },
    /// List stashes
    List,
}

impl StashCommand {
    fn action(&self) -> StashAction {
        match self {
            StashCommand::Save {
                message,
                include_untracked,
            } => StashAction::Save {
                message: message.clone(),
                include_untracked: *include_untracked,
            },
            StashCommand::Pop { index } => StashAction::Pop { index: *index },
            StashCommand::Apply { index } => StashAction::Apply { index: *index },
            StashCommand::Drop { index } => StashAction::Drop { index: *index },
            StashCommand::List => StashAction::List,
        }
    }
}

impl RepoCommand {
    /// Execute the repository command
    pub async fn execute(&self, config: &Config, git: GitOperationConfig) -> anyhow::Result<()> {
        match self {
            RepoCommand::Clone {
                url,
                path,
                branch,
                depth,
                force,
            } => {
                let options = CloneOptions {
                    branch: branch.clone(),
                    depth: depth.unwrap_or(config.git.clone_depth),
                    force: *force,
                    preserve: config.git.preserve_patterns.clone(),
                };
                let task = RepoTask::Clone {
                    url: url.clone(),
                    options,
                };
                run_worker(RepoWorker::new(path, task, git)).await
            }
            RepoCommand::Pull {
                path,
                remote,
                branch,
                force,
                reset,
            } => {
                let options = PullOptions {
                    remote: remote.clone(),
                    branch: branch.clone(),
                    reset_working_tree: *reset,
                    force: *force,
                };
                run_worker(RepoWorker::new(path, RepoTask::Pull(options), git)).await
            }
            RepoCommand::Push {
                path,
                remote,
                branch,
                force,
            } => {
                let mut push = push_config(config)?;
                push.remote = remote.clone();
                push.branch = branch.clone();
                push.force = *force;
                run_worker(RepoWorker::new(path, RepoTask::Push(push), git)).await
            }
            RepoCommand::Commit {
                path,
                message,
                index,
                files,
            } => {
                let staging = if *index {
                    Staging::Index
                } else if files.is_empty() {
                    Staging::All
                } else {
                    Staging::Paths(files.clone())
                };
                let task = RepoTask::Commit {
                    message: message.clone(),
                    staging,
                };
                run_worker(RepoWorker::new(path, task, git)).await
            }
            RepoCommand::Stash(args) => match args.action {
                StashCommand::List => print_stashes(&args.path),
                ref action => {
                    let task = RepoTask::Stash(action.action());
                    run_worker(RepoWorker::new(&args.path, task, git)).await
                }
            },
            RepoCommand::Status { path } => print_status(path, &git),
        }
    }
}

/// Push settings with credentials when both a username and token are known
pub(crate) fn push_config(config: &Config) -> anyhow::Result<PushConfig> {
    let secrets = Secrets::load()?;
    Ok(PushConfig {
        username: config.github.username.clone(),
        token: secrets.github_token(),
        ..Default::default()
    })
}

/// Run a worker to completion, cancelling it on Ctrl-C
pub(crate) async fn run_worker(worker: RepoWorker) -> anyhow::Result<()> {
    let name = worker.task().name();
    let mut handle = worker.spawn();
    let mut succeeded = None;
    let mut failure = None;

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(WorkerEvent::Progress(text)) => tracing::info!("{}", text),
                Some(WorkerEvent::Success { message, path }) => {
                    println!("{}: {}", path.display(), message);
                }
                Some(WorkerEvent::Error(message)) => failure = Some(message),
                Some(WorkerEvent::Finished { success, .. }) => succeeded = Some(success),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !handle.is_cancelled() => {
                eprintln!("Cancelling {}...", name);
                handle.cancel();
            }
        }
    }

    match succeeded {
        Some(true) => Ok(()),
        Some(false) => bail!("{} failed: {}", name, failure.unwrap_or_default()),
        None if handle.is_cancelled() => bail!("{} cancelled", name),
        None => bail!("{} stopped without reporting a result", name),
    }
}

fn print_stashes(path: &Path) -> anyhow::Result<()> {
    let mut handle = RepoHandle::open(path)?;
    let stashes = list_stashes(&mut handle)?;
    if stashes.is_empty() {
        println!("No stashes.");
    }
    for entry in &stashes {
        println!("stash@{{{}}}: {}", entry.index, entry.message);
    }
    handle.cleanup();
    Ok(())
}

fn print_status(path: &Path, git: &GitOperationConfig) -> anyhow::Result<()> {
    let handle = RepoHandle::open(path)?;
    let status = repo_status(&handle, git)
        .with_context(|| format!("Could not read the status of {}", path.display()))?;

    println!("Repository: {}", handle.root().display());
    println!("Branch: {}", status.branch.as_deref().unwrap_or("(detached)"));
    if let Some(commit) = head_commit_info(&handle, git) {
        println!(
            "HEAD: {} {} ({}, {})",
            commit.short_id, commit.summary, commit.author, commit.time
        );
    }

    if status.is_clean() {
        println!("Working tree clean");
    }
    for (label, paths) in [
        ("Staged", &status.staged),
        ("Modified", &status.modified),
        ("Untracked", &status.untracked),
        ("Conflicted", &status.conflicted),
    ] {
        if !paths.is_empty() {
            println!("{}:", label);
            for p in paths {
                println!("  {}", p);
            }
        }
    }

    handle.cleanup();
    Ok(())
}
