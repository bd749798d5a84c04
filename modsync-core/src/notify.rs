//! User-facing error notifications
//!
//! Git operations never talk to the user directly. A failure is routed through
//! a [`Notifier`] chosen by whoever builds the operation configuration: the UI
//! plugs in a modal, background checks plug in [`SilentNotifier`].

use std::fmt;

/// Kind of operation a notification is about; selects the title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Discover,
    Clone,
    Pull,
    Push,
    StageCommit,
    Stash,
    Status,
    CommitInfo,
    /// The multi-step upload workflow
    Upload,
}

impl OperationKind {
    /// Fixed title shown with every notification of this kind
    pub fn title(&self) -> &'static str {
        match self {
            OperationKind::Discover => "Git Repository Error",
            OperationKind::Clone => "Git Clone Error",
            OperationKind::Pull => "Git Pull Error",
            OperationKind::Push => "Git Push Error",
            OperationKind::StageCommit => "Git Commit Error",
            OperationKind::Stash => "Git Stash Error",
            OperationKind::Status => "Git Status Error",
            OperationKind::CommitInfo => "Git Commit Info Error",
            OperationKind::Upload => "Upload Error",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Capability for showing an error to the user
pub trait Notifier: Send + Sync {
    /// Show an error with a title, a short message and optional details
    fn show_error(&self, title: &str, message: &str, details: Option<&str>);
}

/// Default handler: records the notification as a tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show_error(&self, title: &str, message: &str, details: Option<&str>) {
        tracing::error!(title, details = details.unwrap_or(""), "{}", message);
    }
}

/// Handler that suppresses all notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn show_error(&self, _title: &str, _message: &str, _details: Option<&str>) {}
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_titles_are_distinct() {
        let kinds = [
            OperationKind::Discover,
            OperationKind::Clone,
            OperationKind::Pull,
            OperationKind::Push,
            OperationKind::StageCommit,
            OperationKind::Stash,
            OperationKind::Status,
            OperationKind::CommitInfo,
            OperationKind::Upload,
        ];
        let mut titles: Vec<_> = kinds.iter().map(OperationKind::title).collect();
        titles.sort_unstable();
        titles.dedup();
        assert_eq!(titles.len(), kinds.len());
    }

    #[test]
    fn test_recording_notifier() {
        let notifier = testing::RecordingNotifier::default();
        notifier.show_error("t", "m", Some("d"));
        let last = notifier.last().unwrap();
        assert_eq!(last.title, "t");
        assert_eq!(last.details.as_deref(), Some("d"));
    }
}
