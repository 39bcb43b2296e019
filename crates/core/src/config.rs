//! Configuration system for docwatch with per-workspace overrides.
//!
//! Config priority: workspace-relative (.docwatch.toml) > user (~/.config/docwatch/config.toml) > defaults

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Workspace-relative config file name
pub const PROJECT_CONFIG_FILE: &str = ".docwatch.toml";

/// File extensions that can affect documentation output
pub const DEFAULT_EXTENSIONS: &[&str] = &["py", "rst", "md", "css", "js", "html", "yaml"];

/// Path segments that mark a file as part of a documentation source tree
pub const DEFAULT_DIRECTORY_MARKERS: &[&str] = &["docs", "source", "_static", "_templates", "src", "packages"];

/// Path segments that are never watched (build output, VCS, environments)
pub const DEFAULT_IGNORED_DIRS: &[&str] = &["_build", "build", ".git", "node_modules", "__pycache__", ".venv", ".tox"];

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config {path:?}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to parse config {path:?}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("Failed to serialize config: {0}")]
  Serialize(#[from] toml::ser::Error),
}

// ============================================================================
// Workspace Configuration
// ============================================================================

/// Static description of the workspace layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
  /// Known package identifiers, in build order.
  /// When empty, any directory under `packages/` is accepted as a package.
  pub packages: Vec<String>,

  /// Top-level documentation directories that make up the root aggregate (default: ["docs"])
  pub docs_dirs: Vec<String>,
}

impl Default for WorkspaceConfig {
  fn default() -> Self {
    Self {
      packages: Vec::new(),
      docs_dirs: vec!["docs".to_string()],
    }
  }
}

// ============================================================================
// Watch Configuration
// ============================================================================

/// Change detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
  /// Directories to watch recursively, relative to the workspace root.
  /// Absolute paths must still lie inside the workspace root.
  /// Empty means the workspace root itself.
  pub roots: Vec<PathBuf>,

  /// Recognized file extensions (leading dot optional)
  pub extensions: Vec<String>,

  /// A path qualifies if any of its segments equals one of these
  pub directory_markers: Vec<String>,

  /// Path segments that are always skipped
  pub ignore: Vec<String>,

  /// Also skip paths matched by the workspace .gitignore (default: true)
  pub respect_gitignore: bool,

  /// Hash every qualifying file before watching so existing content
  /// is not reported as a change (default: true)
  pub startup_scan: bool,

  /// Capacity of the channel between the OS watcher and the watcher task (default: 256)
  pub event_buffer: usize,
}

impl Default for WatchConfig {
  fn default() -> Self {
    Self {
      roots: Vec::new(),
      extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
      directory_markers: DEFAULT_DIRECTORY_MARKERS.iter().map(|s| s.to_string()).collect(),
      ignore: DEFAULT_IGNORED_DIRS.iter().map(|s| s.to_string()).collect(),
      respect_gitignore: true,
      startup_scan: true,
      event_buffer: 256,
    }
  }
}

impl WatchConfig {
  /// Extensions without their leading dot, lowercased
  pub fn normalized_extensions(&self) -> HashSet<String> {
    self
      .extensions
      .iter()
      .map(|e| e.trim().trim_start_matches('.').to_lowercase())
      .filter(|e| !e.is_empty())
      .collect()
  }

  /// Absolute watch roots for a workspace
  pub fn watch_roots(&self, workspace_root: &Path) -> Vec<PathBuf> {
    if self.roots.is_empty() {
      return vec![workspace_root.to_path_buf()];
    }
    self
      .roots
      .iter()
      .map(|r| if r.is_absolute() { r.clone() } else { workspace_root.join(r) })
      .collect()
  }
}

// ============================================================================
// Scheduler Configuration
// ============================================================================

/// Debounce and build concurrency settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
  /// How often the flush decision is evaluated in milliseconds (default: 1000)
  pub poll_interval_ms: u64,

  /// Idle time after the last accepted change before a flush is allowed (default: 2500)
  pub quiet_window_ms: u64,

  /// Maximum number of targets building at once (default: 1, 0 = unbounded)
  pub max_concurrent_builds: usize,

  /// How long shutdown waits for in-flight builds in milliseconds (default: 10000)
  pub shutdown_grace_ms: u64,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      poll_interval_ms: 1000,
      quiet_window_ms: 2500,
      max_concurrent_builds: 1,
      shutdown_grace_ms: 10_000,
    }
  }
}

impl SchedulerConfig {
  pub fn poll_interval(&self) -> Duration {
    // A zero period would make tokio's interval panic
    Duration::from_millis(self.poll_interval_ms.max(1))
  }

  pub fn quiet_window(&self) -> Duration {
    Duration::from_millis(self.quiet_window_ms)
  }

  pub fn shutdown_grace(&self) -> Duration {
    Duration::from_millis(self.shutdown_grace_ms)
  }

  /// Concurrency cap, `None` when unbounded
  pub fn concurrency_limit(&self) -> Option<usize> {
    match self.max_concurrent_builds {
      0 => None,
      n => Some(n),
    }
  }
}

// ============================================================================
// Builder Configuration
// ============================================================================

/// Commands used by the shell builder and auto-fixer.
///
/// Placeholders: `{package}` (package id), `{root}` (workspace root), `{path}` (fixer only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
  /// Builds a single package
  pub package_command: String,

  /// Builds the root aggregate documentation
  pub root_command: String,

  /// Clean rebuild of everything
  pub full_command: String,

  /// Optional auto-fixer run on each changed file before its target is queued
  #[serde(skip_serializing_if = "Option::is_none")]
  pub fix_command: Option<String>,

  /// Shell used to run commands (default: "sh")
  pub shell: String,
}

impl Default for BuilderConfig {
  fn default() -> Self {
    Self {
      package_command: "sphinx-build -b html packages/{package}/docs/source packages/{package}/docs/_build/html"
        .to_string(),
      root_command: "sphinx-build -b html docs/source docs/_build/html".to_string(),
      full_command: "sphinx-build -E -a -b html docs/source docs/_build/html".to_string(),
      fix_command: None,
      shell: "sh".to_string(),
    }
  }
}

// ============================================================================
// Log Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  /// Default: "info"
  pub level: String,

  /// Log file rotation when logging to a directory: "daily", "hourly", "never"
  /// Default: "daily"
  pub rotation: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      rotation: "daily".to_string(),
    }
  }
}

// ============================================================================
// Root Configuration
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
  /// Workspace layout
  #[serde(default)]
  pub workspace: WorkspaceConfig,

  /// Change detection settings
  #[serde(default)]
  pub watch: WatchConfig,

  /// Debounce and concurrency
  #[serde(default)]
  pub scheduler: SchedulerConfig,

  /// Build and fix commands
  #[serde(default)]
  pub builder: BuilderConfig,

  /// Logging
  #[serde(default)]
  pub log: LogConfig,
}

impl Config {
  /// Load config for a workspace, with fallback to user config and then defaults.
  ///
  /// Unreadable or malformed files are logged and skipped.
  pub fn load_for_workspace(workspace_root: &Path) -> Self {
    let project_config = Self::project_config_path(workspace_root);
    if project_config.exists() {
      match Self::load_from(&project_config) {
        Ok(config) => return config,
        Err(e) => warn!(error = %e, "Ignoring workspace config"),
      }
    }

    if let Some(user_config_path) = Self::user_config_path()
      && user_config_path.exists()
    {
      match Self::load_from(&user_config_path) {
        Ok(config) => return config,
        Err(e) => warn!(error = %e, "Ignoring user config"),
      }
    }

    Self::default()
  }

  /// Load and parse a specific config file
  pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("docwatch").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("docwatch").join("config.toml"))
  }

  /// Get the workspace-relative config path
  pub fn project_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(PROJECT_CONFIG_FILE)
  }

  /// Render the effective configuration as TOML
  pub fn to_toml(&self) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(self)?)
  }

  /// Generate a default config file as a string
  pub fn generate_template(packages: &[String]) -> String {
    let package_list = packages
      .iter()
      .map(|p| format!("\"{}\"", p))
      .collect::<Vec<_>>()
      .join(", ");
    let defaults = Self::default();

    format!(
      r#"# docwatch configuration
# Place in {config_file} (workspace root) or ~/.config/docwatch/config.toml (user)

# ============================================================================
# Workspace
# ============================================================================

[workspace]
# Package identifiers; a change under packages/<id>/ rebuilds only that package
packages = [{package_list}]

# Top-level documentation directories rebuilt as the root aggregate
docs_dirs = ["docs"]

# ============================================================================
# Change Detection
# ============================================================================

[watch]
# Directories to watch, relative to the workspace root (empty = workspace root)
roots = []

extensions = [{extensions}]
directory_markers = [{markers}]
ignore = [{ignore}]

# Skip files matched by .gitignore
respect_gitignore = true

# Hash existing files at startup so they are not reported as changes
startup_scan = true

# ============================================================================
# Scheduler
# ============================================================================

[scheduler]
poll_interval_ms = {poll}
quiet_window_ms = {quiet}

# 0 = unbounded
max_concurrent_builds = {limit}

shutdown_grace_ms = {grace}

# ============================================================================
# Builder
# ============================================================================

[builder]
# Placeholders: {{package}}, {{root}}
package_command = "{package_command}"
root_command = "{root_command}"
full_command = "{full_command}"

# Run on each changed file before it is queued; placeholder: {{path}}
# fix_command = "ruff format {{path}}"

shell = "sh"

# ============================================================================
# Logging
# ============================================================================

[log]
level = "info"
rotation = "daily"
"#,
      config_file = PROJECT_CONFIG_FILE,
      package_list = package_list,
      extensions = quoted(&defaults.watch.extensions),
      markers = quoted(&defaults.watch.directory_markers),
      ignore = quoted(&defaults.watch.ignore),
      poll = defaults.scheduler.poll_interval_ms,
      quiet = defaults.scheduler.quiet_window_ms,
      limit = defaults.scheduler.max_concurrent_builds,
      grace = defaults.scheduler.shutdown_grace_ms,
      package_command = defaults.builder.package_command,
      root_command = defaults.builder.root_command,
      full_command = defaults.builder.full_command,
    )
  }
}

fn quoted(items: &[String]) -> String {
  items.iter().map(|s| format!("\"{}\"", s)).collect::<Vec<_>>().join(", ")
}
