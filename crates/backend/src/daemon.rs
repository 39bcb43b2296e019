//! Daemon lifecycle for the `watch` command.
//!
//! # Architecture
//!
//! ```text
//! Daemon (Supervisor)
//!   ├── RebuildScheduler (pending set, target states, build workers)
//!   ├── WatcherTask (notify bridge, change detector, resolver)
//!   └── SIGHUP listener (unix only, requests a full rebuild)
//! ```
//!
//! # Lifecycle
//!
//! 1. Create master `CancellationToken`
//! 2. Spawn `RebuildScheduler` with a child token
//! 3. Spawn `WatcherTask`; failing to establish the watch is fatal
//! 4. Optionally request an initial full rebuild
//! 5. Wait for the shutdown future (ctrl-c / SIGTERM by default)
//! 6. Cancel children, give in-flight builds their grace period, return the
//!    final scheduler status

use std::{
  future::Future,
  path::{Path, PathBuf},
  sync::Arc,
};

use docwatch_core::Config;
use tokio::{signal, task::JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
  actor::{BuildDispatcher, RebuildScheduler, SchedulerHandle, SchedulerStatus, WatcherConfig, WatcherError, WatcherTask},
  builder::{AutoFixer, Builder, CommandBuilder, CommandFixer},
};

// ============================================================================
// Configuration
// ============================================================================

/// Daemon runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
  /// Canonical workspace root
  pub workspace_root: PathBuf,
  /// Request a full rebuild as soon as the watch is established
  pub initial_build: bool,
  pub config: Config,
}

impl RuntimeConfig {
  /// Resolve the workspace root and load its configuration
  pub fn load(workspace_root: &Path) -> Result<Self, DaemonError> {
    let workspace_root = workspace_root.canonicalize().map_err(|source| DaemonError::Workspace {
      path: workspace_root.to_path_buf(),
      source,
    })?;
    let config = Config::load_for_workspace(&workspace_root);

    Ok(Self {
      workspace_root,
      initial_build: false,
      config,
    })
  }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
  #[error("Workspace root {} is not accessible: {source}", path.display())]
  Workspace {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Watcher(#[from] WatcherError),

  #[error("Scheduler task failed: {0}")]
  Scheduler(#[from] JoinError),
}

// ============================================================================
// Daemon
// ============================================================================

/// Supervises the watcher and scheduler for one workspace
pub struct Daemon {
  runtime_config: RuntimeConfig,
  builder: Arc<dyn Builder>,
  fixer: Option<Arc<dyn AutoFixer>>,
}

impl Daemon {
  /// Create a daemon that builds with the configured shell commands
  pub fn new(runtime_config: RuntimeConfig) -> Self {
    let root = &runtime_config.workspace_root;
    let builder = Arc::new(CommandBuilder::new(root, runtime_config.config.builder.clone()));
    let fixer = CommandFixer::from_config(root, &runtime_config.config.builder).map(|f| Arc::new(f) as Arc<dyn AutoFixer>);

    Self {
      runtime_config,
      builder,
      fixer,
    }
  }

  /// Replace the builder
  pub fn with_builder(mut self, builder: Arc<dyn Builder>) -> Self {
    self.builder = builder;
    self
  }

  /// Replace (or remove) the auto-fixer
  pub fn with_fixer(mut self, fixer: Option<Arc<dyn AutoFixer>>) -> Self {
    self.fixer = fixer;
    self
  }

  /// Run until ctrl-c or SIGTERM
  pub async fn run(self) -> Result<SchedulerStatus, DaemonError> {
    self.run_until(shutdown_signal()).await
  }

  /// Run until `shutdown` resolves, returning the final scheduler status
  pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<SchedulerStatus, DaemonError> {
    let Self {
      runtime_config,
      builder,
      fixer,
    } = self;
    let config = &runtime_config.config;

    info!(root = %runtime_config.workspace_root.display(), "Starting docwatch");
    info!(
      packages = config.workspace.packages.len(),
      docs_dirs = ?config.workspace.docs_dirs,
      auto_fix = fixer.is_some(),
      "Workspace configured"
    );

    // Master cancellation token - propagates to all children
    let cancel = CancellationToken::new();

    let (handle, scheduler_task) = RebuildScheduler::spawn(
      config.scheduler.clone(),
      BuildDispatcher::new(builder),
      cancel.child_token(),
    );

    let watcher_config = WatcherConfig {
      workspace_root: runtime_config.workspace_root.clone(),
      workspace: config.workspace.clone(),
      watch: config.watch.clone(),
    };
    let watcher_task = match WatcherTask::spawn(watcher_config, handle.clone(), fixer, cancel.child_token()) {
      Ok(task) => task,
      Err(e) => {
        error!(error = %e, "Failed to establish filesystem watch");
        cancel.cancel();
        let _ = scheduler_task.await;
        return Err(e.into());
      }
    };

    if runtime_config.initial_build && handle.rebuild_all().await.is_err() {
      warn!("Scheduler stopped before the initial build was requested");
    }

    #[cfg(unix)]
    spawn_rebuild_listener(handle.clone(), cancel.child_token());

    shutdown.await;

    info!("Shutting down...");
    cancel.cancel();

    if let Err(e) = watcher_task.await {
      warn!(error = %e, "Watcher task failed");
    }
    let status = scheduler_task.await?;

    info!(
      flushes = status.flushes,
      builds = status.builds_dispatched,
      abandoned = status.in_flight,
      "Daemon shutdown complete"
    );
    Ok(status)
  }
}

/// Request a full rebuild on every SIGHUP
#[cfg(unix)]
fn spawn_rebuild_listener(handle: SchedulerHandle, cancel: CancellationToken) {
  use tokio::signal::unix::{SignalKind, signal};

  let mut hangup = match signal(SignalKind::hangup()) {
    Ok(s) => s,
    Err(e) => {
      warn!("Failed to listen for SIGHUP: {}", e);
      return;
    }
  };

  tokio::spawn(async move {
    loop {
      tokio::select! {
          _ = cancel.cancelled() => break,
          received = hangup.recv() => {
              if received.is_none() {
                  break;
              }
              info!("Received SIGHUP, requesting full rebuild");
              if handle.rebuild_all().await.is_err() {
                  break;
              }
          }
      }
    }
  });
}

/// Resolves on ctrl-c, or SIGTERM on unix
pub async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = signal::ctrl_c().await {
      warn!("Failed to listen for ctrl-c: {}", e);
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
      Ok(mut s) => {
        s.recv().await;
      }
      Err(e) => {
        warn!("Failed to listen for SIGTERM: {}", e);
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
      _ = ctrl_c => info!("Received ctrl-c"),
      _ = terminate => info!("Received SIGTERM"),
  }
}
