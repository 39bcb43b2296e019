//! Actor message types for the rebuild pipeline
//!
//! The watcher talks to the scheduler with [`SchedulerMessage`]; build workers
//! report back with [`BuildCompletion`]. Requests that need an answer carry a
//! `oneshot::Sender` for the reply.

use std::time::Duration;

use docwatch_core::{Target, TargetState};
use serde::Serialize;
use tokio::sync::oneshot;

// ============================================================================
// Scheduler Messages
// ============================================================================

/// A message sent to the RebuildScheduler
#[derive(Debug)]
pub enum SchedulerMessage {
  /// A change was accepted for this target
  Enqueue { target: Target },
  /// Request a clean rebuild of everything
  RebuildAll,
  /// Snapshot the scheduler state
  Status { reply: oneshot::Sender<SchedulerStatus> },
}

/// Sent by a build worker when its dispatch returns
#[derive(Debug)]
pub struct BuildCompletion {
  pub target: Target,
  pub report: BuildReport,
}

// ============================================================================
// Reports
// ============================================================================

/// Normalized result of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
  pub success: bool,
  pub message: String,
  pub duration: Duration,
}

/// State of one known target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSnapshot {
  pub target: Target,
  pub state: TargetState,
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStatus {
  /// Every target the scheduler has seen, in order
  pub targets: Vec<TargetSnapshot>,
  /// Targets waiting for the next flush
  pub pending: Vec<Target>,
  /// Targets currently building
  pub in_flight: usize,
  /// Flushed targets waiting for a build slot
  pub waiting: usize,
  /// Flushes performed so far
  pub flushes: u64,
  /// Builds handed to the dispatcher so far
  pub builds_dispatched: u64,
}

impl SchedulerStatus {
  pub fn state_of(&self, target: &Target) -> Option<&TargetState> {
    self.targets.iter().find(|s| &s.target == target).map(|s| &s.state)
  }

  /// True when nothing is pending, waiting or building
  pub fn is_quiescent(&self) -> bool {
    self.pending.is_empty() && self.in_flight == 0 && self.waiting == 0
  }
}
