//! External collaborators: the documentation builder and the optional auto-fixer.
//!
//! The scheduler never builds anything itself. It hands a [`Target`] to a
//! [`Builder`] through the dispatcher and records what comes back. Concrete
//! implementations run configured shell commands (see [`command`]).

use std::path::Path;

use async_trait::async_trait;
use docwatch_core::Target;

mod command;

pub use command::{CommandBuilder, CommandFixer};

/// Errors reported by a builder or fixer
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
  #[error("Failed to spawn `{command}`: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  #[error("`{command}` exited with {status}: {output}")]
  Failed {
    command: String,
    status: String,
    output: String,
  },

  #[error("Builder panicked: {0}")]
  Panicked(String),
}

/// Performs the actual documentation build for a target.
///
/// Any timeout is the builder's own responsibility.
#[async_trait]
pub trait Builder: Send + Sync {
  /// Build `target`, starting from a clean output tree when `clean` is set.
  ///
  /// Returns a short human-readable summary on success.
  async fn build(&self, target: &Target, clean: bool) -> Result<String, BuildError>;
}

/// Best-effort correction of a changed file before its target is queued
#[async_trait]
pub trait AutoFixer: Send + Sync {
  async fn fix(&self, path: &Path) -> Result<(), BuildError>;
}
