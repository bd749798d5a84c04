//! Timeout-guarded network calls
//!
//! Fetch and push are blocking libgit2 calls that can hang on a bad network.
//! The guarded call runs on its own thread against its own repository
//! instance; the caller waits at most the configured timeout. When the timeout
//! elapses the call is abandoned and asked to stop through libgit2's progress
//! callbacks, which abort the transfer the next time they fire. The caller's
//! own handle is never touched by the abandoned thread.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use git2::{ErrorCode, RemoteCallbacks, Repository};

use crate::{Error, Result};

/// Shared cooperative cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; observed at the next safe point
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stop signal seen by a guarded call
///
/// Set either by the call's owner (cancellation) or by the guard itself once
/// the timeout has elapsed.
#[derive(Debug, Clone)]
pub struct Interrupt {
    owner: CancelFlag,
    abandoned: CancelFlag,
}

impl Interrupt {
    fn new(owner: CancelFlag) -> Self {
        Self {
            owner,
            abandoned: CancelFlag::new(),
        }
    }

    /// Whether the running transfer should give up
    pub fn should_stop(&self) -> bool {
        self.owner.is_cancelled() || self.abandoned.is_cancelled()
    }

    /// Remote callbacks that abort the transfer once a stop is requested
    pub fn callbacks<'a>(&self) -> RemoteCallbacks<'a> {
        let mut callbacks = RemoteCallbacks::new();

        let transfer = self.clone();
        callbacks.transfer_progress(move |_| !transfer.should_stop());

        let sideband = self.clone();
        callbacks.sideband_progress(move |_| !sideband.should_stop());

        callbacks
    }
}

/// Run a network operation against the repository at `root` with a hard timeout
///
/// `f` receives a repository opened from `root` on a background thread. An
/// error raised by `f` inside the timeout window is returned to the caller;
/// a timeout returns [`Error::Timeout`].
pub fn run_guarded<T, F>(
    root: &Path,
    operation: &'static str,
    timeout: Duration,
    cancel: &CancelFlag,
    f: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Repository, &Interrupt) -> std::result::Result<T, git2::Error> + Send + 'static,
{
    let root = root.to_path_buf();
    run_detached(operation, timeout, cancel, move |interrupt| {
        let repo = Repository::open(&root)?;
        f(&repo, interrupt)
    })
}

/// Run a network operation that needs no existing repository (clone)
pub fn run_detached<T, F>(
    operation: &'static str,
    timeout: Duration,
    cancel: &CancelFlag,
    f: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Interrupt) -> std::result::Result<T, git2::Error> + Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let interrupt = Interrupt::new(cancel.clone());
    let unit_interrupt = interrupt.clone();
    let (tx, rx) = mpsc::sync_channel(1);

    thread::Builder::new()
        .name(format!("modsync-{}", operation))
        .spawn(move || {
            let result = f(&unit_interrupt);
            // The receiver is gone when the caller already timed out.
            let _ = tx.send(result);
        })?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.code() == ErrorCode::User && cancel.is_cancelled() => Err(Error::Cancelled),
        Ok(Err(e)) => Err(Error::Git(e)),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            interrupt.abandoned.cancel();
            tracing::warn!(
                operation,
                timeout_secs = timeout.as_secs(),
                "Network operation timed out, abandoning it"
            );
            Err(Error::Timeout {
                operation,
                after: timeout,
            })
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::Other(format!(
            "{} terminated unexpectedly",
            operation
        ))),
    }
}
