//! Terminal implementations of the notifier and upload interaction

use std::io::{self, BufRead, Write};
use std::process::Command;

use modsync_core::{Interaction, Notifier};

/// Prints error notices to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn show_error(&self, title: &str, message: &str, details: Option<&str>) {
        eprintln!("{}", format_notice(title, message, details));
    }
}

fn format_notice(title: &str, message: &str, details: Option<&str>) -> String {
    match details.filter(|d| !d.trim().is_empty()) {
        Some(details) => format!("[{}] {}\n  {}", title, message, details.trim()),
        None => format!("[{}] {}", title, message),
    }
}

/// Asks questions on stdin; `assume_yes` answers them all with yes
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleInteraction {
    pub assume_yes: bool,
}

impl ConsoleInteraction {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Interaction for ConsoleInteraction {
    fn confirm(&self, question: &str) -> bool {
        if self.assume_yes {
            println!("{} [y/N] y", question);
            return true;
        }

        print!("{} [y/N] ", question);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read answer, assuming no");
                false
            }
        }
    }

    fn inform(&self, message: &str) {
        println!("{}", message);
    }

    fn offer_open_url(&self, url: &str) {
        println!("Pull request opened: {}", url);
        // Unattended runs never start a browser
        if self.assume_yes || !self.confirm("Open it in your browser?") {
            return;
        }

        let (program, args) = browser_command(url);
        // The openers hand off to the browser and exit right away
        match Command::new(program).args(&args).status() {
            Ok(status) if status.success() => tracing::debug!(program, %url, "Launched browser"),
            Ok(status) => {
                tracing::warn!(program, %status, "Browser launcher failed");
                println!("Open {} manually to review and submit.", url);
            }
            Err(e) => {
                tracing::warn!(program, error = %e, "Could not launch a browser");
                println!("Open {} manually to review and submit.", url);
            }
        }
    }
}

/// Platform command that opens `url` in the default browser
fn browser_command(url: &str) -> (&'static str, Vec<String>) {
    if cfg!(target_os = "macos") {
        ("open", vec![url.to_string()])
    } else if cfg!(windows) {
        (
            "cmd",
            vec!["/C".to_string(), "start".to_string(), String::new(), url.to_string()],
        )
    } else {
        ("xdg-open", vec![url.to_string()])
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
