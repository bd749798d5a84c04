//! Background workers running one git operation on one repository
//!
//! A worker runs on tokio's blocking pool, never on the caller's task, and
//! reports through a channel of [`WorkerEvent`]s: progress text at milestones,
//! then exactly one terminal pair, `Success` + `Finished(true)` or
//! `Error` + `Finished(false)`. Once cancelled a worker emits nothing more.

use std::fmt;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::git::{
    clone_repository, pull, push, stage_commit, stash, try_check_updates, CancelFlag, CloneOptions,
    GitOperationConfig, GitOutcome, PullOptions, PushConfig, RepoHandle, StashAction, Staging,
};
use crate::notify::OperationKind;
use crate::{Error, Result};

/// The operation a worker performs
#[derive(Debug, Clone)]
pub enum RepoTask {
    /// Clone `url` into the worker's path
    Clone { url: String, options: CloneOptions },
    Pull(PullOptions),
    Push(PushConfig),
    Commit { message: String, staging: Staging },
    Stash(StashAction),
    /// Look for commits on `origin` the local branch lacks
    CheckUpdates,
}

impl RepoTask {
    pub fn name(&self) -> &'static str {
        match self {
            RepoTask::Clone { .. } => "clone",
            RepoTask::Pull(_) => "pull",
            RepoTask::Push(_) => "push",
            RepoTask::Commit { .. } => "commit",
            RepoTask::Stash(_) => "stash",
            RepoTask::CheckUpdates => "check-updates",
        }
    }
}

/// Signals emitted by a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Progress(String),
    Success { message: String, path: PathBuf },
    Error(String),
    Finished {
        success: bool,
        message: String,
        path: PathBuf,
    },
}

impl WorkerEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerEvent::Finished { .. })
    }
}

impl fmt::Display for WorkerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerEvent::Progress(text) => write!(f, "{}", text),
            WorkerEvent::Success { message, path } => write!(f, "{}: {}", path.display(), message),
            WorkerEvent::Error(message) => write!(f, "error: {}", message),
            WorkerEvent::Finished {
                success, message, ..
            } => write!(f, "finished ({}): {}", if *success { "ok" } else { "failed" }, message),
        }
    }
}

/// Sends events until the worker is cancelled
struct Emitter {
    tx: mpsc::UnboundedSender<WorkerEvent>,
    cancel: CancelFlag,
}

impl Emitter {
    fn emit(&self, event: WorkerEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        // The receiver may have been dropped; the worker still runs to completion.
        let _ = self.tx.send(event);
    }

    fn progress(&self, text: impl Into<String>) {
        self.emit(WorkerEvent::Progress(text.into()));
    }
}

/// One git operation bound to one repository path
#[derive(Debug, Clone)]
pub struct RepoWorker {
    repo_path: PathBuf,
    task: RepoTask,
    config: GitOperationConfig,
}

impl RepoWorker {
    pub fn new(repo_path: impl Into<PathBuf>, task: RepoTask, config: GitOperationConfig) -> Self {
        Self {
            repo_path: repo_path.into(),
            task,
            config,
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn task(&self) -> &RepoTask {
        &self.task
    }

    /// Start the worker on the blocking pool
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> WorkerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancelFlag::new();
        let path = self.repo_path.clone();
        let emitter = Emitter {
            tx,
            cancel: cancel.clone(),
        };

        let join = tokio::task::spawn_blocking(move || self.run(&emitter));

        WorkerHandle {
            path,
            events: rx,
            cancel,
            join,
        }
    }

    fn run(self, emitter: &Emitter) {
        let cancel = emitter.cancel.clone();
        if cancel.is_cancelled() {
            return;
        }

        tracing::debug!(path = %self.repo_path.display(), task = self.task.name(), "Worker started");
        let outcome = self.execute(emitter, &cancel);
        if cancel.is_cancelled() {
            tracing::debug!(path = %self.repo_path.display(), "Worker cancelled");
            return;
        }

        let path = self.repo_path;
        match outcome {
            Ok(message) => {
                emitter.emit(WorkerEvent::Success {
                    message: message.clone(),
                    path: path.clone(),
                });
                emitter.emit(WorkerEvent::Finished {
                    success: true,
                    message,
                    path,
                });
            }
            Err(message) => {
                emitter.emit(WorkerEvent::Error(message.clone()));
                emitter.emit(WorkerEvent::Finished {
                    success: false,
                    message,
                    path,
                });
            }
        }
    }

    /// Run the task; `Ok` carries the success message, `Err` the failure message
    fn execute(&self, emitter: &Emitter, cancel: &CancelFlag) -> std::result::Result<String, String> {
        let config = &self.config;

        match &self.task {
            RepoTask::Clone { url, options } => {
                emitter.progress(format!("Cloning {}", url));
                let (handle, result) =
                    clone_repository(url, &self.repo_path, options, config, cancel);
                if let Some(handle) = handle {
                    handle.cleanup();
                }
                outcome(result)
            }
            RepoTask::Pull(options) => self.with_repo(emitter, cancel, |handle| {
                emitter.progress(format!("Pulling from {}", options.remote_name()));
                outcome(pull(handle, options, config, cancel))
            }),
            RepoTask::Push(push_config) => self.with_repo(emitter, cancel, |handle| {
                emitter.progress(format!("Pushing to {}", push_config.remote_name()));
                outcome(push(handle, push_config, config, cancel))
            }),
            RepoTask::Commit { message, staging } => self.with_repo(emitter, cancel, |handle| {
                emitter.progress("Committing changes");
                outcome(stage_commit(handle, message, staging, config))
            }),
            RepoTask::Stash(action) => self.with_repo(emitter, cancel, |handle| {
                emitter.progress("Updating stash");
                outcome(stash(handle, action, config))
            }),
            RepoTask::CheckUpdates => self.with_repo(emitter, cancel, |handle| {
                emitter.progress("Checking for updates");
                match try_check_updates(handle, config, cancel) {
                    Ok(Some(commits)) if !commits.is_empty() => {
                        Ok(format!("{} new commit(s) available", commits.len()))
                    }
                    Ok(_) => Ok("Up to date".to_string()),
                    Err(e) => {
                        config.report(
                            OperationKind::Pull,
                            &format!("Failed to check {} for updates", handle.root().display()),
                            Some(&e.to_string()),
                        );
                        Err(e.to_string())
                    }
                }
            }),
        }
    }

    /// Open the worker's repository, run `f` on it and release it
    fn with_repo<F>(&self, emitter: &Emitter, cancel: &CancelFlag, f: F) -> std::result::Result<String, String>
    where
        F: FnOnce(&mut RepoHandle) -> std::result::Result<String, String>,
    {
        emitter.progress(format!("Opening {}", self.repo_path.display()));
        let Some(mut handle) = RepoHandle::discover(&self.repo_path, &self.config) else {
            return Err(Error::InvalidRepository(self.repo_path.clone()).to_string());
        };
        if cancel.is_cancelled() {
            handle.cleanup();
            return Err(Error::Cancelled.to_string());
        }

        let result = f(&mut handle);
        handle.cleanup();
        result
    }
}

fn outcome<R: GitOutcome + fmt::Display>(result: R) -> std::result::Result<String, String> {
    if result.is_successful() {
        Ok(result.to_string())
    } else {
        Err(result.to_string())
    }
}

/// Caller's side of a running worker
#[derive(Debug)]
pub struct WorkerHandle {
    path: PathBuf,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    cancel: CancelFlag,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ask the worker to stop; takes effect at its next safe point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Next event, `None` once the worker is done and all events were read
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Drain every event and wait for the worker to finish
    pub async fn collect(mut self) -> Result<Vec<WorkerEvent>> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        self.join
            .await
            .map_err(|e| Error::Other(format!("Worker for {} failed: {}", self.path.display(), e)))?;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testing::{advance_remote, remote_with_clone, write_file};
    use tempfile::TempDir;

    fn terminal(events: &[WorkerEvent]) -> &[WorkerEvent] {
        &events[events.len().saturating_sub(2)..]
    }

    #[tokio::test]
    async fn test_pull_worker_success_sequence() {
        let base = TempDir::new().unwrap();
        let (remote, clone) = remote_with_clone(base.path());
        advance_remote(base.path(), &remote, "Defs/New.xml", "<Defs/>");

        let worker = RepoWorker::new(&clone, RepoTask::Pull(PullOptions::default()), GitOperationConfig::silent());
        let events = worker.spawn().collect().await.unwrap();

        assert!(matches!(events[0], WorkerEvent::Progress(_)));
        match terminal(&events) {
            [WorkerEvent::Success { message, path }, WorkerEvent::Finished { success: true, path: finished_path, .. }] =>
            {
                assert_eq!(message, "Fast-forwarded to remote");
                assert_eq!(path, &clone);
                assert_eq!(finished_path, &clone);
            }
            other => panic!("unexpected terminal events: {:?}", other),
        }
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_path_reports_error() {
        let dir = TempDir::new().unwrap();
        let worker = RepoWorker::new(dir.path(), RepoTask::CheckUpdates, GitOperationConfig::silent());
        let events = worker.spawn().collect().await.unwrap();

        match terminal(&events) {
            [WorkerEvent::Error(message), WorkerEvent::Finished { success: false, .. }] => {
                assert!(message.contains("Invalid git repository"));
            }
            other => panic!("unexpected terminal events: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_check_updates_with_missing_origin_fails() {
        let base = TempDir::new().unwrap();
        let (_, clone) = remote_with_clone(base.path());
        let repo = git2::Repository::open(&clone).unwrap();
        let gone = base.path().join("gone.git");
        repo.remote_set_url("origin", gone.to_str().unwrap()).unwrap();

        let worker = RepoWorker::new(&clone, RepoTask::CheckUpdates, GitOperationConfig::silent());
        let events = worker.spawn().collect().await.unwrap();

        match terminal(&events) {
            [WorkerEvent::Error(_), WorkerEvent::Finished { success: false, .. }] => {}
            other => panic!("unexpected terminal events: {:?}", other),
        }
        assert!(!events.iter().any(|e| matches!(e, WorkerEvent::Success { .. })));
    }

    #[tokio::test]
    async fn test_commit_worker() {
        let base = TempDir::new().unwrap();
        let (_, clone) = remote_with_clone(base.path());
        let repo = git2::Repository::open(&clone).unwrap();
        write_file(&repo, "Defs/New.xml", "<Defs/>");

        let task = RepoTask::Commit {
            message: "add defs".to_string(),
            staging: Staging::All,
        };
        let events = RepoWorker::new(&clone, task, GitOperationConfig::silent())
            .spawn()
            .collect()
            .await
            .unwrap();
        assert!(matches!(
            events.last(),
            Some(WorkerEvent::Finished { success: true, .. })
        ));
    }

    #[test]
    fn test_cancelled_worker_is_silent() {
        let base = TempDir::new().unwrap();
        let (_, clone) = remote_with_clone(base.path());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = Emitter {
            tx,
            cancel: CancelFlag::new(),
        };
        emitter.cancel.cancel();

        RepoWorker::new(&clone, RepoTask::CheckUpdates, GitOperationConfig::silent()).run(&emitter);
        drop(emitter);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_after_spawn_never_sees_events_past_terminal() {
        let base = TempDir::new().unwrap();
        let (_, clone) = remote_with_clone(base.path());

        let handle = RepoWorker::new(&clone, RepoTask::CheckUpdates, GitOperationConfig::silent()).spawn();
        handle.cancel();
        assert!(handle.is_cancelled());

        // Depending on timing the worker stops before or after finishing; it
        // never emits more than one terminal event either way.
        let events = handle.collect().await.unwrap();
        assert!(events.iter().filter(|e| e.is_terminal()).count() <= 1);
    }

    #[tokio::test]
    async fn test_clone_worker() {
        let base = TempDir::new().unwrap();
        let (remote, _) = remote_with_clone(base.path());
        let dest = base.path().join("worker-clone");

        let task = RepoTask::Clone {
            url: remote.to_str().unwrap().to_string(),
            options: CloneOptions {
                depth: 0,
                ..Default::default()
            },
        };
        let events = RepoWorker::new(&dest, task, GitOperationConfig::silent())
            .spawn()
            .collect()
            .await
            .unwrap();

        assert!(matches!(
            events.last(),
            Some(WorkerEvent::Finished { success: true, .. })
        ));
        assert!(dest.join("About/About.xml").exists());
    }
}
