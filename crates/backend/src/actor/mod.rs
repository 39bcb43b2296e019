//! Actor-based rebuild pipeline
//!
//! Components communicate via message passing instead of shared state:
//!
//! ```text
//! notify thread ──blocking_send──▶ WatcherTask ──enqueue──▶ RebuildScheduler ──spawn──▶ build worker
//!                                  (detector,                (pending set,               │
//!                                   resolver)                 target states) ◀──BuildCompletion
//! ```
//!
//! # Actors
//!
//! - [`WatcherTask`]: Owns the change detector and resolver; feeds the scheduler
//! - [`RebuildScheduler`]: Owns the pending set and every target's state;
//!   decides when to flush and starts builds
//! - Build workers: short-lived tasks that run one [`BuildDispatcher`] call and
//!   report back
//!
//! State is owned, not shared. Nothing here takes a lock.

mod dispatcher;
mod handle;
mod message;
mod scheduler;
mod watcher;

#[cfg(test)]
mod __tests__;

pub use dispatcher::BuildDispatcher;
pub use handle::{SchedulerHandle, SendError};
pub use message::{BuildReport, SchedulerStatus, TargetSnapshot};
pub use scheduler::RebuildScheduler;
pub use watcher::{WatcherConfig, WatcherError, WatcherTask};
