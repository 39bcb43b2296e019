//! Shell-command builder and fixer.
//!
//! Commands come from `[builder]` in the config and run through `shell -c`
//! with the workspace root as working directory. Besides the template
//! placeholders, every command sees `DOCWATCH_TARGET`, `DOCWATCH_CLEAN` and,
//! for packages, `DOCWATCH_PACKAGE` in its environment.

use std::{
  path::{Path, PathBuf},
  process::Stdio,
};

use async_trait::async_trait;
use docwatch_core::{Target, config::BuilderConfig};
use tokio::process::Command;
use tracing::{debug, trace};

use super::{AutoFixer, BuildError, Builder};

/// Lines of output kept in a failure message
const FAILURE_TAIL_LINES: usize = 20;

// ============================================================================
// Builder
// ============================================================================

/// Builds targets by running the configured shell commands
#[derive(Debug, Clone)]
pub struct CommandBuilder {
  workspace_root: PathBuf,
  config: BuilderConfig,
}

impl CommandBuilder {
  pub fn new(workspace_root: &Path, config: BuilderConfig) -> Self {
    Self {
      workspace_root: workspace_root.to_path_buf(),
      config,
    }
  }

  /// The command line that builds `target`, placeholders substituted
  pub fn command_for(&self, target: &Target) -> String {
    let template = match target {
      Target::Package(_) => &self.config.package_command,
      Target::RootAggregate => &self.config.root_command,
      Target::Full => &self.config.full_command,
    };

    let command = template.replace("{root}", &shell_quote(&self.workspace_root.to_string_lossy()));
    match target {
      Target::Package(id) => command.replace("{package}", id),
      _ => command,
    }
  }
}

#[async_trait]
impl Builder for CommandBuilder {
  async fn build(&self, target: &Target, clean: bool) -> Result<String, BuildError> {
    let command = self.command_for(target);
    debug!(target = %target, clean, command = %command, "Running build command");

    let mut envs = vec![
      ("DOCWATCH_TARGET", target.to_string()),
      ("DOCWATCH_CLEAN", if clean { "1" } else { "0" }.to_string()),
    ];
    if let Target::Package(id) = target {
      envs.push(("DOCWATCH_PACKAGE", id.clone()));
    }

    let stdout = run_shell(&self.config.shell, &command, &self.workspace_root, &envs).await?;
    Ok(if stdout.is_empty() { format!("built {}", target) } else { stdout })
  }
}

// ============================================================================
// Fixer
// ============================================================================

/// Runs the configured fix command on a changed file
#[derive(Debug, Clone)]
pub struct CommandFixer {
  workspace_root: PathBuf,
  shell: String,
  template: String,
}

impl CommandFixer {
  /// Create a fixer if `fix_command` is configured
  pub fn from_config(workspace_root: &Path, config: &BuilderConfig) -> Option<Self> {
    let template = config.fix_command.as_ref()?.trim();
    if template.is_empty() {
      return None;
    }
    Some(Self {
      workspace_root: workspace_root.to_path_buf(),
      shell: config.shell.clone(),
      template: template.to_string(),
    })
  }

  pub fn command_for(&self, path: &Path) -> String {
    self.template.replace("{path}", &shell_quote(&path.to_string_lossy()))
  }
}

#[async_trait]
impl AutoFixer for CommandFixer {
  async fn fix(&self, path: &Path) -> Result<(), BuildError> {
    let command = self.command_for(path);
    trace!(command = %command, "Running fix command");
    let envs = [("DOCWATCH_PATH", path.to_string_lossy().into_owned())];
    run_shell(&self.shell, &command, &self.workspace_root, &envs).await?;
    Ok(())
  }
}

// ============================================================================
// Helpers
// ============================================================================

/// Run `shell -c command`, returning the last line of stdout on success
async fn run_shell(shell: &str, command: &str, cwd: &Path, envs: &[(&str, String)]) -> Result<String, BuildError> {
  let output = Command::new(shell)
    .arg("-c")
    .arg(command)
    .current_dir(cwd)
    .envs(envs.iter().map(|(k, v)| (*k, v.as_str())))
    .stdin(Stdio::null())
    .kill_on_drop(true)
    .output()
    .await
    .map_err(|source| BuildError::Spawn {
      command: command.to_string(),
      source,
    })?;

  if output.status.success() {
    return Ok(tail(&output.stdout, 1));
  }

  let stderr = tail(&output.stderr, FAILURE_TAIL_LINES);
  Err(BuildError::Failed {
    command: command.to_string(),
    status: output.status.to_string(),
    output: if stderr.is_empty() {
      tail(&output.stdout, FAILURE_TAIL_LINES)
    } else {
      stderr
    },
  })
}

/// Last `n` non-blank lines of process output
fn tail(bytes: &[u8], n: usize) -> String {
  let text = String::from_utf8_lossy(bytes);
  let lines: Vec<&str> = text.lines().map(str::trim_end).filter(|l| !l.trim().is_empty()).collect();
  lines[lines.len().saturating_sub(n)..].join("\n")
}

/// Quote a string for POSIX shells
fn shell_quote(s: &str) -> String {
  format!("'{}'", s.replace('\'', "'\\''"))
}
