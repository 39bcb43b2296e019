//! Test helpers for actor integration tests.
//!
//! Provides a recording [`Builder`] that can be gated to hold builds open, and
//! a temporary workspace with the usual `packages/` + `docs/` layout.

use std::{
  collections::HashSet,
  path::PathBuf,
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use async_trait::async_trait;
use docwatch_core::{Config, Target, config::SchedulerConfig};
use tempfile::TempDir;
use tokio::sync::{Semaphore, mpsc};

use crate::builder::{BuildError, Builder};

/// Builder fake that records every call.
///
/// Each started build is announced on the `started` channel. When gated, a
/// build holds until the test adds a permit to the gate.
pub struct RecordingBuilder {
  calls: Mutex<Vec<(Target, bool)>>,
  started: mpsc::UnboundedSender<Target>,
  gate: Option<Arc<Semaphore>>,
  failing: HashSet<Target>,
  active: AtomicUsize,
  max_active: AtomicUsize,
}

impl RecordingBuilder {
  pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Target>) {
    Self::with(None, &[])
  }

  /// Builds block until the returned semaphore gets a permit
  pub fn gated() -> (Arc<Self>, mpsc::UnboundedReceiver<Target>, Arc<Semaphore>) {
    let gate = Arc::new(Semaphore::new(0));
    let (builder, started) = Self::with(Some(gate.clone()), &[]);
    (builder, started, gate)
  }

  /// Builds of `targets` fail
  pub fn failing(targets: &[Target]) -> (Arc<Self>, mpsc::UnboundedReceiver<Target>) {
    Self::with(None, targets)
  }

  fn with(gate: Option<Arc<Semaphore>>, failing: &[Target]) -> (Arc<Self>, mpsc::UnboundedReceiver<Target>) {
    let (started, rx) = mpsc::unbounded_channel();
    let builder = Self {
      calls: Mutex::new(Vec::new()),
      started,
      gate,
      failing: failing.iter().cloned().collect(),
      active: AtomicUsize::new(0),
      max_active: AtomicUsize::new(0),
    };
    (Arc::new(builder), rx)
  }

  pub fn calls(&self) -> Vec<(Target, bool)> {
    self.calls.lock().unwrap().clone()
  }

  pub fn targets(&self) -> Vec<Target> {
    self.calls().into_iter().map(|(t, _)| t).collect()
  }

  /// Highest number of builds that ran at the same time
  pub fn max_active(&self) -> usize {
    self.max_active.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Builder for RecordingBuilder {
  async fn build(&self, target: &Target, clean: bool) -> Result<String, BuildError> {
    self.calls.lock().unwrap().push((target.clone(), clean));
    let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_active.fetch_max(active, Ordering::SeqCst);
    let _ = self.started.send(target.clone());

    if let Some(gate) = &self.gate {
      gate.acquire().await.expect("gate closed").forget();
    }
    self.active.fetch_sub(1, Ordering::SeqCst);

    if self.failing.contains(target) {
      return Err(BuildError::Failed {
        command: format!("build {}", target),
        status: "exit status: 1".into(),
        output: "broken reference".into(),
      });
    }
    Ok(format!("built {}", target))
  }
}

/// Default timings with the given concurrency limit
pub fn scheduler_config(max_concurrent_builds: usize) -> SchedulerConfig {
  SchedulerConfig {
    max_concurrent_builds,
    ..Default::default()
  }
}

/// Temporary workspace rooted at a canonical path.
pub struct TestWorkspace {
  _dir: TempDir,
  pub root: PathBuf,
}

impl TestWorkspace {
  /// Workspace with packages `a` and `b` and a root docs directory
  pub fn new() -> Self {
    let dir = TempDir::new().expect("create workspace dir");
    let root = dir.path().canonicalize().expect("canonicalize workspace");
    let ws = Self { _dir: dir, root };

    ws.write("packages/a/docs/source/x.rst", "Package A\n=========\n");
    ws.write("packages/b/docs/y.md", "# Package B\n");
    ws.write("docs/index.rst", "Root\n====\n");
    ws
  }

  /// Config listing packages `a` and `b`, with fast scheduler timings
  pub fn config(&self) -> Config {
    let mut config = Config::default();
    config.workspace.packages = vec!["a".to_string(), "b".to_string()];
    config.scheduler.poll_interval_ms = 50;
    config.scheduler.quiet_window_ms = 200;
    config
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.root.join(relative)
  }

  pub fn write(&self, relative: &str, content: &str) {
    let path = self.path(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(&path, content).expect("write file");
  }

  pub fn remove(&self, relative: &str) {
    std::fs::remove_file(self.path(relative)).expect("remove file");
  }

  pub fn read(&self, relative: &str) -> String {
    std::fs::read_to_string(self.path(relative)).expect("read file")
  }
}
