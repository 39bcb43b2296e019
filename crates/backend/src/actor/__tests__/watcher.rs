//! WatcherTask integration tests against a real filesystem watch.

use std::{
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use docwatch_core::Target;
use tokio::{
  sync::mpsc,
  time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

use super::helpers::TestWorkspace;
use crate::{
  actor::{
    SchedulerHandle,
    message::SchedulerMessage,
    watcher::{WatcherConfig, WatcherError, WatcherTask},
  },
  builder::{AutoFixer, BuildError},
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
const QUIET_PERIOD: Duration = Duration::from_millis(750);

struct Harness {
  rx: mpsc::Receiver<SchedulerMessage>,
  cancel: CancellationToken,
}

impl Harness {
  async fn start(ws: &TestWorkspace, fixer: Option<Arc<dyn AutoFixer>>) -> Self {
    let (tx, rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let config = ws.config();
    let watcher_config = WatcherConfig {
      workspace_root: ws.root.clone(),
      workspace: config.workspace,
      watch: config.watch,
    };

    WatcherTask::spawn(watcher_config, SchedulerHandle::new(tx), fixer, cancel.clone()).expect("create watcher");

    // Give the watcher time to initialize
    sleep(Duration::from_millis(200)).await;
    Self { rx, cancel }
  }

  /// Next enqueued target
  async fn next_target(&mut self) -> Target {
    match timeout(EVENT_TIMEOUT, self.rx.recv()).await {
      Ok(Some(SchedulerMessage::Enqueue { target })) => target,
      Ok(other) => panic!("expected Enqueue, got {:?}", other),
      Err(_) => panic!("timed out waiting for enqueue"),
    }
  }

  /// Assert nothing is enqueued for a while
  async fn assert_silent(&mut self) {
    if let Ok(msg) = timeout(QUIET_PERIOD, self.rx.recv()).await {
      panic!("expected no enqueue, got {:?}", msg);
    }
  }

  /// Drain duplicate enqueues caused by multi-event writes
  async fn drain(&mut self) {
    while timeout(QUIET_PERIOD, self.rx.recv()).await.is_ok() {}
  }
}

impl Drop for Harness {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

#[tokio::test]
async fn test_package_edit_enqueues_only_that_package() {
  let ws = TestWorkspace::new();
  let mut h = Harness::start(&ws, None).await;

  ws.write("packages/a/docs/source/x.rst", "Package A\n=========\n\nEdited.\n");

  assert_eq!(h.next_target().await, Target::package("a"));
  h.drain().await;
}

#[tokio::test]
async fn test_identical_rewrite_is_ignored() {
  let ws = TestWorkspace::new();
  let mut h = Harness::start(&ws, None).await;

  // Seeded by the startup scan, so the same bytes are not a change
  ws.write("docs/index.rst", "Root\n====\n");
  h.assert_silent().await;

  ws.write("docs/index.rst", "Root\n====\n\nNew section.\n");
  assert_eq!(h.next_target().await, Target::RootAggregate);
}

#[tokio::test]
async fn test_irrelevant_paths_are_dropped() {
  let ws = TestWorkspace::new();
  let mut h = Harness::start(&ws, None).await;

  ws.write("scripts/gen.py", "print('hi')\n");
  ws.write("docs/_build/html/index.html", "<html></html>\n");
  ws.write("docs/notes.bin", "binary\n");
  h.assert_silent().await;
}

#[tokio::test]
async fn test_delete_enqueues_owner() {
  let ws = TestWorkspace::new();
  let mut h = Harness::start(&ws, None).await;

  ws.remove("packages/b/docs/y.md");

  assert_eq!(h.next_target().await, Target::package("b"));
}

#[tokio::test]
async fn test_rename_enqueues_owner() {
  let ws = TestWorkspace::new();
  let mut h = Harness::start(&ws, None).await;

  std::fs::rename(ws.path("docs/index.rst"), ws.path("docs/home.rst")).unwrap();

  assert_eq!(h.next_target().await, Target::RootAggregate);
  h.drain().await;
}

struct CountingFixer {
  calls: AtomicUsize,
}

#[async_trait]
impl AutoFixer for CountingFixer {
  async fn fix(&self, path: &Path) -> Result<(), BuildError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    std::fs::write(path, "fixed\n").map_err(|source| BuildError::Spawn {
      command: "fix".into(),
      source,
    })
  }
}

#[tokio::test]
async fn test_fixer_write_is_not_a_new_change() {
  let ws = TestWorkspace::new();
  let fixer = Arc::new(CountingFixer {
    calls: AtomicUsize::new(0),
  });
  let mut h = Harness::start(&ws, Some(fixer.clone())).await;

  ws.write("packages/a/docs/source/x.rst", "needs fixing\n");

  assert_eq!(h.next_target().await, Target::package("a"));
  h.drain().await;

  assert!(fixer.calls.load(Ordering::SeqCst) >= 1);
  assert_eq!(ws.read("packages/a/docs/source/x.rst"), "fixed\n");

  // Re-writing the fixed content is not a change either
  let calls = fixer.calls.load(Ordering::SeqCst);
  ws.write("packages/a/docs/source/x.rst", "fixed\n");
  h.assert_silent().await;
  assert_eq!(fixer.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn test_missing_root_is_fatal() {
  let ws = TestWorkspace::new();
  let mut config = ws.config();
  config.watch.roots = vec!["does-not-exist".into()];

  let (tx, _rx) = mpsc::channel(1);
  let result = WatcherTask::new(
    WatcherConfig {
      workspace_root: ws.root.clone(),
      workspace: config.workspace,
      watch: config.watch,
    },
    SchedulerHandle::new(tx),
    None,
    CancellationToken::new(),
  );

  assert!(matches!(result, Err(WatcherError::Watch { .. })));
}

#[tokio::test]
async fn test_root_outside_workspace_is_rejected() {
  let ws = TestWorkspace::new();
  let elsewhere = tempfile::TempDir::new().unwrap();
  let mut config = ws.config();
  config.watch.roots = vec![elsewhere.path().to_path_buf(), "docs".into()];

  let (tx, _rx) = mpsc::channel(1);
  let result = WatcherTask::new(
    WatcherConfig {
      workspace_root: ws.root.clone(),
      workspace: config.workspace,
      watch: config.watch,
    },
    SchedulerHandle::new(tx),
    None,
    CancellationToken::new(),
  );

  assert!(matches!(result, Err(WatcherError::OutsideWorkspace { .. })));
}

#[tokio::test]
async fn test_absolute_root_inside_workspace_is_accepted() {
  let ws = TestWorkspace::new();
  let mut config = ws.config();
  config.watch.roots = vec![ws.path("docs")];

  let (tx, _rx) = mpsc::channel(1);
  let result = WatcherTask::new(
    WatcherConfig {
      workspace_root: ws.root.clone(),
      workspace: config.workspace,
      watch: config.watch,
    },
    SchedulerHandle::new(tx),
    None,
    CancellationToken::new(),
  );

  assert!(result.is_ok());
}
