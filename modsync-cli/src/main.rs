//! modsync CLI - git operations for game mod folders
//!
//! Clone, update and publish mods kept in git repositories.

mod commands;
mod console;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use modsync_core::{CliOverrides, Config, Secrets};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{BatchArgs, CheckUpdatesArgs, RepoCommand, UploadArgs};
use console::ConsoleNotifier;

/// modsync: git operations for game mod folders
#[derive(Parser, Debug)]
#[command(name = "modsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log failures instead of printing error notices
    #[arg(long, global = true)]
    quiet_errors: bool,

    /// How long a fetch or push may run (e.g. "30s", "2m")
    #[arg(long, global = true, env = "MODSYNC_FETCH_TIMEOUT", value_parser = parse_duration)]
    fetch_timeout: Option<Duration>,

    /// Answer yes to every question
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    #[command(flatten)]
    Repo(RepoCommand),

    /// Pull every repository given
    PullAll(BatchArgs),

    /// Push every repository given
    PushAll(BatchArgs),

    /// Report which repositories have incoming commits
    #[command(visible_alias = "cu")]
    CheckUpdates(CheckUpdatesArgs),

    /// Publish a data file to upstream as a pull request
    Upload(UploadArgs),

    /// Show current configuration
    Config,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let overrides = CliOverrides {
        quiet_errors: cli.quiet_errors,
        fetch_timeout: cli.fetch_timeout,
        ..Default::default()
    };
    let overrides = match &cli.command {
        Some(Commands::Upload(args)) => args.overrides(overrides),
        _ => overrides,
    };
    let config = Config::load_with_overrides(overrides)?;

    if cli.verbose {
        tracing::info!(
            fetch_timeout = ?config.git.fetch_timeout,
            notify_errors = config.git.notify_errors,
            "Configuration loaded"
        );
    }

    let git = config.operation_config(Arc::new(ConsoleNotifier));

    match cli.command {
        Some(Commands::Version) => {
            println!("modsync {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Repo(args)) => {
            args.execute(&config, git).await?;
        }
        Some(Commands::PullAll(args)) => {
            args.pull(&config, git).await?;
        }
        Some(Commands::PushAll(args)) => {
            args.push(&config, git).await?;
        }
        Some(Commands::CheckUpdates(args)) => {
            args.execute(&config, git).await?;
        }
        Some(Commands::Upload(args)) => {
            args.execute(&config, git, cli.yes).await?;
        }
        Some(Commands::Config) => {
            println!("modsync Configuration");
            println!("=====================");
            println!();
            print!("{}", config.to_toml()?);
            println!();
            if let Some(path) = Config::default_config_path() {
                println!("Config file: {}", path.display());
                if path.exists() {
                    println!("  (exists)");
                } else {
                    println!("  (not found - using defaults)");
                }
            }
            if let Some(path) = Secrets::default_secrets_path() {
                println!("Secrets file: {}", path.display());
            }
        }
        None => {
            println!("modsync - git operations for game mod folders");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_timeout() {
        let cli = Cli::try_parse_from(["modsync", "--fetch-timeout", "2m", "version"]).unwrap();
        assert_eq!(cli.fetch_timeout, Some(Duration::from_secs(120)));
        assert!(Cli::try_parse_from(["modsync", "--fetch-timeout", "soon", "version"]).is_err());
    }

    #[test]
    fn test_parse_repo_subcommands() {
        let cli = Cli::try_parse_from(["modsync", "stash", "--path", "/mods/a", "pop", "1"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Repo(_))));

        let cli = Cli::try_parse_from(["modsync", "pull-all", "/mods/a", "/mods/b"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::PullAll(_))));
    }
}
