//! WatcherTask - Async file watcher that feeds the RebuildScheduler
//!
//! # Design
//!
//! The watcher bridges the sync notify callbacks with the async actor system:
//! 1. notify's sync callback uses `blocking_send` to forward events to a channel
//! 2. The async task consumes events from that channel
//! 3. Each path goes through the [`ChangeDetector`], which drops anything that
//!    is filtered out or whose content did not actually change
//! 4. Real changes are mapped to a target by the [`TargetResolver`] and
//!    enqueued on the scheduler
//!
//! Debouncing is not done here; the scheduler's quiet window coalesces bursts.
//!
//! # Auto-fix
//!
//! When a fixer is configured it runs on every changed (not deleted) file
//! before the target is enqueued. The file is re-hashed afterwards so the
//! fixer's own write is not reported as another change. Fixer failures are
//! logged and the target is enqueued anyway.
//!
//! # Lifecycle
//!
//! The watcher runs until:
//! - The `CancellationToken` is triggered
//! - The event channel closes (notify watcher dropped)
//! - The scheduler goes away

use std::{path::PathBuf, sync::Arc};

use docwatch_core::config::{WatchConfig, WorkspaceConfig};
use notify::{
  Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
  event::{ModifyKind, RenameMode},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::handle::{SchedulerHandle, SendError};
use crate::{
  builder::AutoFixer,
  domain::{ChangeDetector, ChangeKind, PathFilter, TargetResolver, build_gitignore},
};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the WatcherTask
#[derive(Debug, Clone)]
pub struct WatcherConfig {
  /// Canonical workspace root
  pub workspace_root: PathBuf,
  pub workspace: WorkspaceConfig,
  pub watch: WatchConfig,
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while setting up the watcher
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
  #[error("Failed to initialize watcher: {0}")]
  Init(#[source] notify::Error),

  #[error("Failed to watch {}: {source}", path.display())]
  Watch {
    path: PathBuf,
    #[source]
    source: notify::Error,
  },

  #[error("Failed to build gitignore: {0}")]
  Gitignore(#[source] ignore::Error),

  #[error("Watch root {} is outside the workspace root", path.display())]
  OutsideWorkspace { path: PathBuf },
}

// ============================================================================
// Watcher Task
// ============================================================================

/// Async task that turns filesystem events into scheduler enqueues
pub struct WatcherTask {
  config: WatcherConfig,
  scheduler: SchedulerHandle,
  fixer: Option<Arc<dyn AutoFixer>>,
  cancel: CancellationToken,
  detector: ChangeDetector,
  resolver: TargetResolver,
  // The notify watcher must be held to keep it alive
  _watcher: RecommendedWatcher,
  // Channel receiving events from notify's sync callback
  event_rx: mpsc::Receiver<Result<Event, notify::Error>>,
}

impl WatcherTask {
  /// Create a new WatcherTask
  ///
  /// Establishes the watch on every root and, if enabled, seeds the detector
  /// with the current content of every qualifying file. Every root must lie
  /// inside the workspace root, and failing to watch any root is an error. The task is not started until `run()` is called.
  pub fn new(
    config: WatcherConfig,
    scheduler: SchedulerHandle,
    fixer: Option<Arc<dyn AutoFixer>>,
    cancel: CancellationToken,
  ) -> Result<Self, WatcherError> {
    let root = &config.workspace_root;
    info!(root = %root.display(), "Initializing file watcher");

    let gitignore = if config.watch.respect_gitignore {
      build_gitignore(root).map_err(WatcherError::Gitignore)?
    } else {
      None
    };
    let filter = PathFilter::new(root, &config.watch, gitignore);

    // Paths outside the workspace never resolve to a target
    for path in filter.roots() {
      let resolved = path.canonicalize().unwrap_or_else(|_| path.clone());
      if !resolved.starts_with(root) {
        return Err(WatcherError::OutsideWorkspace { path: path.clone() });
      }
    }

    let (event_tx, event_rx) = mpsc::channel::<Result<Event, notify::Error>>(config.watch.event_buffer.max(1));

    let mut watcher = RecommendedWatcher::new(
      move |res| {
        // This runs on notify's thread; it blocks while the channel is full
        let _ = event_tx.blocking_send(res);
      },
      Config::default(),
    )
    .map_err(WatcherError::Init)?;

    for path in filter.roots() {
      watcher
        .watch(path, RecursiveMode::Recursive)
        .map_err(|source| WatcherError::Watch {
          path: path.clone(),
          source,
        })?;
      debug!(root = %path.display(), "Watching");
    }

    let mut detector = ChangeDetector::new(filter);
    if config.watch.startup_scan {
      let seeded = detector.scan();
      info!(files = seeded, "Seeded content hashes");
    }

    let resolver = TargetResolver::new(root, &config.workspace);

    info!(root = %root.display(), "File watcher initialized");

    Ok(Self {
      config,
      scheduler,
      fixer,
      cancel,
      detector,
      resolver,
      _watcher: watcher,
      event_rx,
    })
  }

  /// Create the watcher and spawn its task
  pub fn spawn(
    config: WatcherConfig,
    scheduler: SchedulerHandle,
    fixer: Option<Arc<dyn AutoFixer>>,
    cancel: CancellationToken,
  ) -> Result<tokio::task::JoinHandle<()>, WatcherError> {
    let task = Self::new(config, scheduler, fixer, cancel)?;
    Ok(tokio::spawn(task.run()))
  }

  /// Run the watcher task
  pub async fn run(mut self) {
    info!(root = %self.config.workspace_root.display(), "WatcherTask started");

    loop {
      tokio::select! {
          // Check cancellation first (biased)
          biased;

          _ = self.cancel.cancelled() => {
              info!("WatcherTask shutting down (cancelled)");
              break;
          }

          event = self.event_rx.recv() => {
              match event {
                  Some(Ok(event)) => {
                      if self.process_event(event).await.is_err() {
                          info!("WatcherTask shutting down (scheduler gone)");
                          break;
                      }
                  }
                  Some(Err(e)) => {
                      warn!(error = %e, "Watcher error");
                  }
                  None => {
                      info!("WatcherTask shutting down (channel closed)");
                      break;
                  }
              }
          }
      }
    }

    info!(
      root = %self.config.workspace_root.display(),
      tracked = self.detector.tracked(),
      "WatcherTask stopped"
    );
  }

  async fn process_event(&mut self, event: Event) -> Result<(), SendError> {
    for (path, kind) in classify(&event) {
      self.process_change(path, kind).await?;
    }
    Ok(())
  }

  async fn process_change(&mut self, path: PathBuf, kind: ChangeKind) -> Result<(), SendError> {
    let Some(change) = self.detector.observe(&path, kind) else {
      return Ok(());
    };

    let Some(target) = self.resolver.resolve(&change.path).into_target() else {
      debug!(path = %change.path.display(), "No target owns this path, dropping");
      return Ok(());
    };

    if change.kind != ChangeKind::Deleted
      && let Some(fixer) = &self.fixer
    {
      match fixer.fix(&change.path).await {
        Ok(()) => self.detector.rehash(&change.path),
        Err(e) => warn!(path = %change.path.display(), error = %e, "Auto-fix failed"),
      }
    }

    debug!(target = %target, path = %change.path.display(), kind = ?change.kind, "Change accepted");
    self.scheduler.enqueue(target).await
  }
}

/// Split a notify event into per-path changes.
///
/// Renames become a delete of the old path plus a create of the new one.
/// Access and other metadata-free events yield nothing.
fn classify(event: &Event) -> Vec<(PathBuf, ChangeKind)> {
  let all = |kind: ChangeKind| event.paths.iter().map(|p| (p.clone(), kind)).collect::<Vec<_>>();

  match event.kind {
    EventKind::Create(_) => all(ChangeKind::Created),
    EventKind::Remove(_) => all(ChangeKind::Deleted),
    EventKind::Modify(ModifyKind::Name(mode)) => match mode {
      RenameMode::Both if event.paths.len() >= 2 => vec![
        (event.paths[0].clone(), ChangeKind::Deleted),
        (event.paths[1].clone(), ChangeKind::Created),
      ],
      RenameMode::From => all(ChangeKind::Deleted),
      RenameMode::To => all(ChangeKind::Created),
      // Platforms that do not pair renames: decide by what is on disk now
      _ => event
        .paths
        .iter()
        .map(|p| {
          let kind = if p.exists() {
            ChangeKind::Created
          } else {
            ChangeKind::Deleted
          };
          (p.clone(), kind)
        })
        .collect(),
    },
    EventKind::Modify(_) | EventKind::Any => all(ChangeKind::Modified),
    EventKind::Access(_) | EventKind::Other => {
      trace!(kind = ?event.kind, "Ignoring event");
      Vec::new()
    }
  }
}
