mod actor;
mod daemon;
mod domain;

pub mod builder;
pub mod dirs;

pub use actor::{
  BuildDispatcher, BuildReport, RebuildScheduler, SchedulerHandle, SchedulerStatus, SendError, TargetSnapshot,
  WatcherConfig, WatcherError, WatcherTask,
};
pub use daemon::{Daemon, DaemonError, RuntimeConfig, shutdown_signal};
pub use docwatch_core::{config, target};
pub use domain::{
  ChangeDetector, ChangeEvent, ChangeKind, PathFilter, Resolution, TargetResolver, build_gitignore,
  compute_content_hash,
};
