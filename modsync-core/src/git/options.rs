//! Configuration injected into every git operation

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::notify::{LogNotifier, Notifier, OperationKind, SilentNotifier};

/// Default time a fetch or push may take before it is abandoned
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed for the connectivity pre-check
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Error-notification and timeout behaviour shared by git operations
///
/// Immutable once built. Cloning shares the notification handler, so one value
/// can be handed to any number of concurrent operations.
#[derive(Clone)]
pub struct GitOperationConfig {
    notify_errors: bool,
    fetch_timeout: Duration,
    connection_timeout: Duration,
    notifier: Arc<dyn Notifier>,
}

impl fmt::Debug for GitOperationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitOperationConfig")
            .field("notify_errors", &self.notify_errors)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("connection_timeout", &self.connection_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for GitOperationConfig {
    fn default() -> Self {
        Self {
            notify_errors: true,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            notifier: Arc::new(LogNotifier),
        }
    }
}

impl GitOperationConfig {
    /// Create a configuration with default timeouts and the log notifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for background checks: nothing reaches the user
    pub fn silent() -> Self {
        Self::default()
            .with_notify_errors(false)
            .with_notifier(Arc::new(SilentNotifier))
    }

    /// Enable or disable user notification of failures
    pub fn with_notify_errors(mut self, notify: bool) -> Self {
        self.notify_errors = notify;
        self
    }

    /// Set the fetch/push timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the connectivity pre-check timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Replace the notification handler
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn notify_errors(&self) -> bool {
        self.notify_errors
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Log a failure and, when enabled, hand it to the notifier
    pub fn report(&self, kind: OperationKind, message: &str, details: Option<&str>) {
        tracing::warn!(
            operation = ?kind,
            details = details.unwrap_or(""),
            "{}",
            message
        );

        if self.notify_errors {
            self.notifier.show_error(kind.title(), message, details);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;

    #[test]
    fn test_defaults() {
        let config = GitOperationConfig::default();
        assert!(config.notify_errors());
        assert_eq!(config.fetch_timeout(), DEFAULT_FETCH_TIMEOUT);
        assert_eq!(config.connection_timeout(), DEFAULT_CONNECTION_TIMEOUT);
    }

    #[test]
    fn test_report_uses_kind_title() {
        let recorder = Arc::new(RecordingNotifier::default());
        let config = GitOperationConfig::new().with_notifier(recorder.clone());

        config.report(OperationKind::Push, "push failed", Some("denied"));

        let last = recorder.last().unwrap();
        assert_eq!(last.title, "Git Push Error");
        assert_eq!(last.message, "push failed");
        assert_eq!(last.details.as_deref(), Some("denied"));
    }

    #[test]
    fn test_report_gated_by_notify_errors() {
        let recorder = Arc::new(RecordingNotifier::default());
        let config = GitOperationConfig::new()
            .with_notifier(recorder.clone())
            .with_notify_errors(false);

        config.report(OperationKind::Pull, "pull failed", None);

        assert!(recorder.titles().is_empty());
    }

    #[test]
    fn test_silent() {
        assert!(!GitOperationConfig::silent().notify_errors());
    }
}
