//! modsync core - git orchestration for a game mod manager
//!
//! Wraps libgit2 behind typed operation outcomes, runs them on background
//! workers (one repository or a batch), classifies mod folders by update
//! status and publishes data-file changes as pull requests.

pub mod batch;
pub mod config;
pub mod error;
pub mod git;
pub mod net;
pub mod notify;
pub mod secrets;
pub mod updates;
pub mod upload;
pub mod worker;

pub use batch::{BatchOperation, BatchResult, BatchRunner};
pub use config::{CliOverrides, Config};
pub use error::{Error, Result};
pub use git::{GitOperationConfig, GitOutcome, RepoHandle};
pub use notify::{LogNotifier, Notifier, OperationKind, SilentNotifier};
pub use secrets::{Credentials, Secrets};
pub use updates::{UpdateReport, UpdateStatus};
pub use upload::{ForgeClient, Interaction, UploadOutcome, UploadRequest, Uploader};
pub use worker::{RepoTask, RepoWorker, WorkerEvent, WorkerHandle};
