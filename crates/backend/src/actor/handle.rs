//! Handle for communicating with the RebuildScheduler
//!
//! The handle is cheap to clone and wraps the scheduler's channel sender.

use docwatch_core::Target;
use tokio::sync::{mpsc, oneshot};

use super::message::{SchedulerMessage, SchedulerStatus};

// ============================================================================
// Scheduler Handle
// ============================================================================

/// Handle to communicate with a RebuildScheduler
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
  pub tx: mpsc::Sender<SchedulerMessage>,
}

impl SchedulerHandle {
  /// Create a new handle from a sender
  pub fn new(tx: mpsc::Sender<SchedulerMessage>) -> Self {
    Self { tx }
  }

  /// Record an accepted change for `target`
  pub async fn enqueue(&self, target: Target) -> Result<(), SendError> {
    self.send(SchedulerMessage::Enqueue { target }).await
  }

  /// Request a clean rebuild of everything at the next flush
  pub async fn rebuild_all(&self) -> Result<(), SendError> {
    self.send(SchedulerMessage::RebuildAll).await
  }

  /// Ask the scheduler for a snapshot of its state
  pub async fn status(&self) -> Result<SchedulerStatus, SendError> {
    let (reply, rx) = oneshot::channel();
    self.send(SchedulerMessage::Status { reply }).await?;
    rx.await.map_err(|_| SendError::ActorGone)
  }

  async fn send(&self, msg: SchedulerMessage) -> Result<(), SendError> {
    self.tx.send(msg).await.map_err(|_| SendError::ActorGone)
  }
}

// ============================================================================
// Errors
// ============================================================================

/// Error when sending to an actor
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
  #[error("Actor has shut down")]
  ActorGone,
}
