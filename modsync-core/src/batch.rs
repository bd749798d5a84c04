//! Running one operation over many repositories
//!
//! A batch holds one slot of the runner's shared pool for its whole run, so
//! the number of batches in flight is bounded. Inside a batch, repositories
//! are started in the order given, at most `parallelism` at a time, and the
//! aggregate lists them in that same order.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::GitSettings;
use crate::git::{
    pull, push, CancelFlag, GitOperationConfig, GitOutcome, PullOptions, PushConfig, RepoHandle,
};
use crate::updates::{classify_repository, UpdateReport, UpdateStatus};
use crate::Error;

/// Message recorded for a path that is not a repository
pub const INVALID_REPOSITORY: &str = "Invalid git repository";

/// Batches in flight by default
pub const DEFAULT_BATCH_SLOTS: usize = 4;

/// Operation applied to every repository of a batch
#[derive(Debug, Clone)]
pub enum BatchOperation {
    Pull(PullOptions),
    Push(PushConfig),
}

impl BatchOperation {
    pub fn name(&self) -> &'static str {
        match self {
            BatchOperation::Pull(_) => "pull",
            BatchOperation::Push(_) => "push",
        }
    }
}

/// Aggregate outcome of a batch
///
/// Every input path lands in exactly one of the two lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub successful: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    pub fn success_count(&self) -> usize {
        self.successful.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// One line suitable for a status bar
    pub fn summary(&self) -> String {
        format!(
            "{} of {} succeeded, {} failed",
            self.success_count(),
            self.total(),
            self.failure_count()
        )
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for (path, message) in &self.failed {
            writeln!(f, "  {}: {}", path.display(), message)?;
        }
        Ok(())
    }
}

/// Shared pool running batches
#[derive(Debug, Clone)]
pub struct BatchRunner {
    slots: Arc<Semaphore>,
    parallelism: usize,
    config: GitOperationConfig,
    cancel: CancelFlag,
}

impl BatchRunner {
    /// A runner with the default pool size, processing repositories one by one
    pub fn new(config: GitOperationConfig) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(DEFAULT_BATCH_SLOTS)),
            parallelism: 1,
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// A runner sized from the `[git]` settings
    pub fn from_settings(settings: &GitSettings, config: GitOperationConfig) -> Self {
        Self::new(config)
            .with_slots(settings.batch_slots)
            .with_parallelism(settings.batch_parallelism)
    }

    /// Number of batches allowed in flight
    pub fn with_slots(mut self, slots: usize) -> Self {
        self.slots = Arc::new(Semaphore::new(slots.max(1)));
        self
    }

    /// Number of repositories processed at once inside a batch
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn config(&self) -> &GitOperationConfig {
        &self.config
    }

    /// Stop starting new repositories; in-flight ones finish
    ///
    /// Repositories not started yet are recorded as failed, so the aggregate
    /// still accounts for every input path.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run `operation` on every path
    pub async fn run(&self, paths: Vec<PathBuf>, operation: BatchOperation) -> BatchResult {
        let _slot = self.slots.clone().acquire_owned().await.ok();
        tracing::info!(operation = operation.name(), repositories = paths.len(), "Batch started");

        let config = self.config.clone();
        let cancel = self.cancel.clone();
        let outcomes = self
            .for_each_ordered(paths, move |path| run_one(path, &operation, &config, &cancel))
            .await;

        let mut result = BatchResult::default();
        for (path, outcome) in outcomes {
            match outcome.and_then(|r| r) {
                Ok(()) => result.successful.push(path),
                Err(message) => {
                    tracing::warn!(path = %path.display(), error = %message, "Batch item failed");
                    result.failed.push((path, message));
                }
            }
        }

        tracing::info!(summary = %result.summary(), "Batch finished");
        result
    }

    /// Check every path for incoming commits
    pub async fn check_updates(&self, paths: Vec<PathBuf>) -> UpdateReport {
        let _slot = self.slots.clone().acquire_owned().await.ok();
        tracing::info!(repositories = paths.len(), "Update check started");

        let config = self.config.clone();
        let cancel = self.cancel.clone();
        let outcomes = self
            .for_each_ordered(paths, move |path| {
                if cancel.is_cancelled() {
                    return UpdateStatus::Errored(Error::Cancelled.to_string());
                }
                classify_repository(path, &config, &cancel)
            })
            .await;

        let mut report = UpdateReport::new();
        for (path, outcome) in outcomes {
            let status = outcome.unwrap_or_else(UpdateStatus::Errored);
            report.record(path, status);
        }

        tracing::info!(%report, "Update check finished");
        report
    }

    /// [`BatchRunner::run`] in the background; the join handle is the terminal signal
    pub fn spawn(&self, paths: Vec<PathBuf>, operation: BatchOperation) -> JoinHandle<BatchResult> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(paths, operation).await })
    }

    /// [`BatchRunner::check_updates`] in the background
    pub fn spawn_check_updates(&self, paths: Vec<PathBuf>) -> JoinHandle<UpdateReport> {
        let runner = self.clone();
        tokio::spawn(async move { runner.check_updates(paths).await })
    }

    /// Apply blocking `f` to every path, `parallelism` at a time
    ///
    /// Items start in input order and come back in input order. A panicking
    /// item yields `Err` with the panic message instead of aborting the batch.
    async fn for_each_ordered<T, F>(&self, paths: Vec<PathBuf>, f: F) -> Vec<(PathBuf, std::result::Result<T, String>)>
    where
        T: Send + 'static,
        F: Fn(&Path) -> T + Send + Sync + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.parallelism));
        let f = Arc::new(f);
        let mut tasks = Vec::with_capacity(paths.len());

        for path in paths {
            let permit = permits.clone().acquire_owned().await.ok();
            let f = f.clone();
            let item = path.clone();
            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                f(&item)
            });
            tasks.push((path, task));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (path, task) in tasks {
            let outcome = task
                .await
                .map_err(|e| format!("Worker for {} failed: {}", path.display(), e));
            outcomes.push((path, outcome));
        }
        outcomes
    }
}

/// Open, operate, release; `Err` carries the failure message
fn run_one(
    path: &Path,
    operation: &BatchOperation,
    config: &GitOperationConfig,
    cancel: &CancelFlag,
) -> std::result::Result<(), String> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled.to_string());
    }

    let handle = RepoHandle::open(path).map_err(|e| {
        tracing::debug!(path = %path.display(), error = %e, "Cannot open repository");
        INVALID_REPOSITORY.to_string()
    })?;

    let (successful, description) = match operation {
        BatchOperation::Pull(options) => {
            let result = pull(&handle, options, config, cancel);
            (result.is_successful(), result.description())
        }
        BatchOperation::Push(push_config) => {
            let result = push(&handle, push_config, config, cancel);
            (result.is_successful(), result.description())
        }
    };
    handle.cleanup();

    if successful {
        Ok(())
    } else {
        Err(description.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testing::{advance_remote, commit_file, remote_with_clone};
    use tempfile::TempDir;

    fn runner() -> BatchRunner {
        BatchRunner::new(GitOperationConfig::silent())
    }

    #[test]
    fn test_counts_and_summary() {
        let result = BatchResult {
            successful: vec![PathBuf::from("/a"), PathBuf::from("/b")],
            failed: vec![(PathBuf::from("/c"), "offline".to_string())],
        };
        assert_eq!(result.total(), 3);
        assert_eq!(result.summary(), "2 of 3 succeeded, 1 failed");
        assert!(!result.all_succeeded());
        assert!(result.to_string().contains("/c: offline"));
    }

    #[tokio::test]
    async fn test_pull_batch_with_invalid_path() {
        let base = TempDir::new().unwrap();
        let (remote, clone) = remote_with_clone(base.path());
        advance_remote(base.path(), &remote, "Defs/New.xml", "<Defs/>");
        let not_repo = TempDir::new().unwrap();

        let paths = vec![clone.clone(), not_repo.path().to_path_buf()];
        let result = runner()
            .run(paths.clone(), BatchOperation::Pull(PullOptions::default()))
            .await;

        assert_eq!(result.total(), paths.len());
        assert_eq!(result.successful, vec![clone]);
        assert_eq!(
            result.failed,
            vec![(not_repo.path().to_path_buf(), INVALID_REPOSITORY.to_string())]
        );
    }

    #[tokio::test]
    async fn test_every_path_lands_in_exactly_one_list() {
        let base = TempDir::new().unwrap();
        let (_, clone) = remote_with_clone(base.path());
        let missing = base.path().join("missing");

        let paths = vec![missing.clone(), clone.clone()];
        let result = runner()
            .run(paths.clone(), BatchOperation::Pull(PullOptions::default()))
            .await;

        assert_eq!(result.successful.len() + result.failed.len(), paths.len());
        assert_eq!(result.successful, vec![clone]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].0, missing);
        assert_eq!(result.summary(), "1 of 2 succeeded, 1 failed");
    }

    #[tokio::test]
    async fn test_push_batch_failure_message() {
        let base = TempDir::new().unwrap();
        let (remote, clone) = remote_with_clone(base.path());
        advance_remote(base.path(), &remote, "Defs/Remote.xml", "<Defs/>");
        let repo = git2::Repository::open(&clone).unwrap();
        commit_file(&repo, "Defs/Local.xml", "<Defs/>", "local");

        let result = runner()
            .run(vec![clone.clone()], BatchOperation::Push(PushConfig::default()))
            .await;

        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.failed[0].1, "Rejected: remote contains work you do not have");
    }

    #[tokio::test]
    async fn test_order_preserved_with_parallelism() {
        let dirs: Vec<TempDir> = (0..6).map(|_| TempDir::new().unwrap()).collect();
        let paths: Vec<PathBuf> = dirs.iter().map(|d| d.path().to_path_buf()).collect();

        let result = runner()
            .with_parallelism(3)
            .run(paths.clone(), BatchOperation::Pull(PullOptions::default()))
            .await;

        let failed: Vec<PathBuf> = result.failed.into_iter().map(|(p, _)| p).collect();
        assert_eq!(failed, paths);
    }

    #[tokio::test]
    async fn test_check_updates_four_way() {
        let base = TempDir::new().unwrap();
        let (remote, clone) = remote_with_clone(base.path());
        advance_remote(base.path(), &remote, "Defs/New.xml", "<Defs/>");
        let not_repo = TempDir::new().unwrap();

        let report = runner()
            .check_updates(vec![clone.clone(), not_repo.path().to_path_buf()])
            .await;

        assert_eq!(report.updates.len(), 1);
        assert_eq!(report.updates[&clone], vec!["update Defs/New.xml".to_string()]);
        assert_eq!(report.invalid_paths, vec![not_repo.path().to_path_buf()]);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_batch_still_accounts_for_every_path() {
        let dirs: Vec<TempDir> = (0..3).map(|_| TempDir::new().unwrap()).collect();
        let paths: Vec<PathBuf> = dirs.iter().map(|d| d.path().to_path_buf()).collect();
        let runner = runner();
        runner.cancel();

        let result = runner
            .spawn(paths.clone(), BatchOperation::Pull(PullOptions::default()))
            .await
            .unwrap();
        assert_eq!(result.total(), 3);
        assert!(result.failed.iter().all(|(_, m)| m == "Operation cancelled"));
    }
}
