//! Rebuild targets and their per-target build state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An independently buildable unit of the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
  /// A single package under `packages/<id>`
  Package(String),
  /// The workspace's top-level documentation view
  RootAggregate,
  /// Everything, built clean
  Full,
}

impl Target {
  pub fn package(id: impl Into<String>) -> Self {
    Self::Package(id.into())
  }

  pub fn is_full(&self) -> bool {
    matches!(self, Self::Full)
  }

  /// Whether a build of this target starts from a clean output tree.
  ///
  /// Selective rebuilds reuse previous output; only a full rebuild wipes it.
  pub fn clean_by_default(&self) -> bool {
    self.is_full()
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Target::Package(id) => write!(f, "package:{}", id),
      Target::RootAggregate => write!(f, "root"),
      Target::Full => write!(f, "full"),
    }
  }
}

/// Lifecycle of a target inside the scheduler.
///
/// `Idle -> PendingChange -> Building -> Idle`. `PendingChange` absorbs further
/// changes without transitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
  #[default]
  Idle,
  PendingChange,
  Building,
}

impl fmt::Display for TargetStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      TargetStatus::Idle => "idle",
      TargetStatus::PendingChange => "pending",
      TargetStatus::Building => "building",
    };
    f.write_str(s)
  }
}

/// Outcome of the most recent build of a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "message", rename_all = "snake_case")]
pub enum BuildOutcome {
  Success(String),
  Failure(String),
}

impl BuildOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, Self::Success(_))
  }

  pub fn message(&self) -> &str {
    match self {
      Self::Success(m) | Self::Failure(m) => m,
    }
  }
}

/// Record of a finished build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
  pub finished_at: DateTime<Utc>,
  pub duration_ms: u64,
  pub outcome: BuildOutcome,
}

/// Scheduler-owned state for one target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
  pub status: TargetStatus,
  /// Most recent completed build, if any
  pub last_build: Option<BuildRecord>,
  /// Number of completed builds (success or failure)
  pub builds: u64,
}

impl TargetState {
  pub fn last_outcome(&self) -> Option<&BuildOutcome> {
    self.last_build.as_ref().map(|r| &r.outcome)
  }
}
