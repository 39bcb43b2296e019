//! docwatch CLI - selective documentation rebuilds for multi-package workspaces

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use docwatch::{RuntimeConfig, config::Config, dirs};

mod commands;
mod logging;

use commands::{BuildSelection, cmd_build, cmd_config_init, cmd_config_show, cmd_resolve, cmd_watch};
use logging::{init_cli_logging, init_watch_logging};

#[derive(Parser)]
#[command(name = "docwatch")]
#[command(about = "Watch a documentation workspace and rebuild only what changed")]
#[command(after_help = "\
QUICK START:
  docwatch config init            # Write .docwatch.toml with discovered packages
  docwatch watch                  # Rebuild affected targets on change

COMMON WORKFLOWS:
  docwatch watch --initial-build  # Full clean build first, then watch
  docwatch build core             # Build one package now
  docwatch resolve docs/index.rst # Which target owns this path?")]
struct Cli {
  /// Workspace root (default: current directory)
  #[arg(short, long, global = true, value_name = "DIR")]
  root: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `docwatch config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show current effective configuration
  #[command(long_about = "Show the current effective configuration.\n\n\
    Displays which config file is being used and its contents as TOML.")]
  Show,

  /// Initialize workspace config file (.docwatch.toml)
  Init {
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },
}

#[derive(Subcommand)]
enum Commands {
  /// Watch the workspace and rebuild affected targets
  #[command(after_help = "\
SIGNALS:
  SIGINT/SIGTERM  stop after in-flight builds finish (or the grace period ends)
  SIGHUP          request a full clean rebuild")]
  Watch {
    /// Request a full clean rebuild once the watch is established
    #[arg(long)]
    initial_build: bool,
    /// Log to rolling files in DIR instead of the console (default DIR: data dir/logs)
    #[arg(long, value_name = "DIR", num_args = 0..=1)]
    log_dir: Option<Option<PathBuf>>,
  },
  /// Build one target now and exit with its outcome
  #[command(group(ArgGroup::new("selection").required(true).args(["package", "root_docs", "all"])))]
  Build {
    /// Package id to build
    package: Option<String>,
    /// Build the root documentation aggregate
    #[arg(long)]
    root_docs: bool,
    /// Clean rebuild of everything
    #[arg(long)]
    all: bool,
  },
  /// Print the target each path would rebuild
  Resolve {
    /// Paths to classify
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Manage configuration
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let root = match cli.root {
    Some(root) => root,
    None => std::env::current_dir().context("Failed to read current directory")?,
  };

  // Config init writes the config, so it must not require one
  if let Commands::Config {
    command: ConfigCommand::Init { force },
  } = cli.command
  {
    init_cli_logging();
    return cmd_config_init(&root, force).await;
  }

  // File logging for watch (when asked), console-only for everything else
  let _guard = match &cli.command {
    Commands::Watch { log_dir, .. } => {
      let log_config = Config::load_for_workspace(&root).log;
      let log_dir = log_dir.clone().map(|dir| dir.unwrap_or_else(dirs::default_log_dir));
      init_watch_logging(&log_config, log_dir)
    }
    _ => {
      init_cli_logging();
      None
    }
  };

  let runtime = RuntimeConfig::load(&root)?;

  match cli.command {
    Commands::Watch { initial_build, .. } => cmd_watch(runtime, initial_build).await,
    Commands::Build {
      package,
      root_docs,
      all: _,
    } => {
      let selection = match (package, root_docs) {
        (Some(id), _) => BuildSelection::Package(id),
        (None, true) => BuildSelection::RootDocs,
        (None, false) => BuildSelection::All,
      };
      cmd_build(runtime, selection).await
    }
    Commands::Resolve { paths, json } => cmd_resolve(runtime, paths, json).await,
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show(runtime).await,
      ConfigCommand::Init { force } => cmd_config_init(&root, force).await,
    },
  }
}
