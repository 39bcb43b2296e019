//! RebuildScheduler - owns the pending set and per-target state
//!
//! The scheduler is the single owner of the PendingSet and of every
//! [`TargetState`]. Everything reaches it through its channel: enqueues from the
//! watcher, status queries from the daemon, and [`BuildCompletion`]s from the
//! build workers it spawns.
//!
//! # Flushing
//!
//! A poll timer fires every `poll_interval`. A flush happens on a tick when
//! all of the following hold:
//!
//! - the pending set is non-empty
//! - the previous flush is finished (nothing waiting for a slot or building)
//! - `quiet_window` has passed since the last accepted change
//!
//! A flush takes the whole pending set at once. `Full` supersedes everything
//! else in the same flush.
//!
//! # Single flight
//!
//! A target never has two builds at once. A change to a building target stays
//! in the pending set; since the next flush waits for the current one, it is
//! built after the running build returns.

use std::{
  collections::{BTreeMap, HashSet, VecDeque},
  time::Duration,
};

use chrono::Utc;
use docwatch_core::{BuildOutcome, BuildRecord, Target, TargetState, TargetStatus, config::SchedulerConfig};
use tokio::{
  sync::mpsc,
  task::{JoinHandle, JoinSet},
  time::{Instant, MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
  dispatcher::BuildDispatcher,
  handle::SchedulerHandle,
  message::{BuildCompletion, BuildReport, SchedulerMessage, SchedulerStatus, TargetSnapshot},
};

/// Capacity of the scheduler's request channel
const SCHEDULER_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// State
// ============================================================================

/// Pure scheduler bookkeeping, driven by the actor loop
#[derive(Debug, Default)]
struct SchedulerState {
  /// Targets waiting for the next flush, in first-enqueued order
  pending: Vec<Target>,
  states: BTreeMap<Target, TargetState>,
  /// Flushed targets waiting for a build slot
  ready: VecDeque<Target>,
  building: HashSet<Target>,
  last_change: Option<Instant>,
  flushes: u64,
  dispatched: u64,
}

impl SchedulerState {
  fn enqueue(&mut self, target: Target, now: Instant) {
    self.last_change = Some(now);

    // Already flushed and not started yet: the coming build covers this change
    if self.ready.contains(&target) {
      return;
    }

    if !self.pending.contains(&target) {
      self.pending.push(target.clone());
    }

    let state = self.states.entry(target).or_default();
    if state.status == TargetStatus::Idle {
      state.status = TargetStatus::PendingChange;
    }
  }

  fn flush_in_progress(&self) -> bool {
    !self.ready.is_empty() || !self.building.is_empty()
  }

  fn should_flush(&self, now: Instant, quiet_window: Duration) -> bool {
    if self.pending.is_empty() || self.flush_in_progress() {
      return false;
    }
    self
      .last_change
      .is_none_or(|last| now.saturating_duration_since(last) >= quiet_window)
  }

  /// Snapshot and clear the pending set. Returns the targets to build.
  fn flush(&mut self) -> Vec<Target> {
    let snapshot = std::mem::take(&mut self.pending);
    self.flushes += 1;

    let batch = if snapshot.contains(&Target::Full) {
      for target in snapshot.iter().filter(|t| !t.is_full()) {
        if let Some(state) = self.states.get_mut(target) {
          state.status = TargetStatus::Idle;
        }
      }
      vec![Target::Full]
    } else {
      snapshot
    };

    self.ready.extend(batch.iter().cloned());
    batch
  }

  /// Take the next flushed target if a build slot is free
  fn next_ready(&mut self, limit: Option<usize>) -> Option<Target> {
    if limit.is_some_and(|limit| self.building.len() >= limit) {
      return None;
    }

    let target = self.ready.pop_front()?;
    self.states.entry(target.clone()).or_default().status = TargetStatus::Building;
    self.building.insert(target.clone());
    self.dispatched += 1;
    Some(target)
  }

  fn complete(&mut self, target: &Target, report: &BuildReport) {
    self.building.remove(target);

    let outcome = if report.success {
      BuildOutcome::Success(report.message.clone())
    } else {
      BuildOutcome::Failure(report.message.clone())
    };

    let rearmed = self.pending.contains(target);
    let state = self.states.entry(target.clone()).or_default();
    state.last_build = Some(BuildRecord {
      finished_at: Utc::now(),
      duration_ms: millis(report.duration),
      outcome,
    });
    state.builds += 1;
    state.status = if rearmed {
      TargetStatus::PendingChange
    } else {
      TargetStatus::Idle
    };
  }

  fn status(&self) -> SchedulerStatus {
    SchedulerStatus {
      targets: self
        .states
        .iter()
        .map(|(target, state)| TargetSnapshot {
          target: target.clone(),
          state: state.clone(),
        })
        .collect(),
      pending: self.pending.clone(),
      in_flight: self.building.len(),
      waiting: self.ready.len(),
      flushes: self.flushes,
      builds_dispatched: self.dispatched,
    }
  }
}

// ============================================================================
// Actor
// ============================================================================

/// Debounces accepted changes into flushes and runs their builds
pub struct RebuildScheduler {
  config: SchedulerConfig,
  dispatcher: BuildDispatcher,
  rx: mpsc::Receiver<SchedulerMessage>,
  cancel: CancellationToken,
  state: SchedulerState,
}

impl RebuildScheduler {
  /// Create a scheduler and the handle used to reach it
  pub fn new(config: SchedulerConfig, dispatcher: BuildDispatcher, cancel: CancellationToken) -> (Self, SchedulerHandle) {
    let (tx, rx) = mpsc::channel(SCHEDULER_CHANNEL_CAPACITY);
    let scheduler = Self {
      config,
      dispatcher,
      rx,
      cancel,
      state: SchedulerState::default(),
    };
    (scheduler, SchedulerHandle::new(tx))
  }

  /// Spawn the scheduler task.
  ///
  /// The join handle resolves to the final status once the scheduler stops.
  pub fn spawn(
    config: SchedulerConfig,
    dispatcher: BuildDispatcher,
    cancel: CancellationToken,
  ) -> (SchedulerHandle, JoinHandle<SchedulerStatus>) {
    let (scheduler, handle) = Self::new(config, dispatcher, cancel);
    (handle, tokio::spawn(scheduler.run()))
  }

  /// Run until cancelled or until every handle is dropped
  pub async fn run(mut self) -> SchedulerStatus {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<BuildCompletion>();
    let mut workers = JoinSet::new();

    let mut poll = interval(self.config.poll_interval());
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate tick
    poll.tick().await;

    info!(
      poll_ms = self.config.poll_interval_ms,
      quiet_ms = self.config.quiet_window_ms,
      max_concurrent = self.config.max_concurrent_builds,
      "RebuildScheduler started"
    );

    loop {
      tokio::select! {
          biased;

          _ = self.cancel.cancelled() => {
              info!("RebuildScheduler shutting down (cancelled)");
              break;
          }

          Some(done) = done_rx.recv() => {
              self.handle_completion(done);
              while workers.try_join_next().is_some() {}
              self.start_ready(&done_tx, &mut workers);
          }

          msg = self.rx.recv() => {
              match msg {
                  Some(msg) => self.handle_message(msg),
                  None => {
                      info!("RebuildScheduler shutting down (all handles dropped)");
                      break;
                  }
              }
          }

          _ = poll.tick() => {
              if self.state.should_flush(Instant::now(), self.config.quiet_window()) {
                  let batch = self.state.flush();
                  info!(flush = self.state.flushes, targets = %join_targets(&batch), "Flushing pending targets");
                  self.start_ready(&done_tx, &mut workers);
              }
          }
      }
    }

    self.drain(&mut done_rx, &mut workers).await;
    let status = self.state.status();
    info!(
      flushes = status.flushes,
      builds = status.builds_dispatched,
      pending = status.pending.len(),
      "RebuildScheduler stopped"
    );
    status
  }

  fn handle_message(&mut self, msg: SchedulerMessage) {
    match msg {
      SchedulerMessage::Enqueue { target } => {
        debug!(target = %target, "Enqueued");
        self.state.enqueue(target, Instant::now());
      }
      SchedulerMessage::RebuildAll => {
        info!("Full rebuild requested");
        self.state.enqueue(Target::Full, Instant::now());
      }
      SchedulerMessage::Status { reply } => {
        let _ = reply.send(self.state.status());
      }
    }
  }

  fn handle_completion(&mut self, done: BuildCompletion) {
    let BuildCompletion { target, report } = done;
    if report.success {
      info!(target = %target, duration_ms = millis(report.duration), "Build succeeded");
    } else {
      warn!(target = %target, duration_ms = millis(report.duration), error = %report.message, "Build failed");
    }
    self.state.complete(&target, &report);
  }

  /// Start builds for flushed targets while slots are free
  fn start_ready(&mut self, done_tx: &mpsc::UnboundedSender<BuildCompletion>, workers: &mut JoinSet<()>) {
    while let Some(target) = self.state.next_ready(self.config.concurrency_limit()) {
      debug!(target = %target, in_flight = self.state.building.len(), "Starting build");
      let dispatcher = self.dispatcher.clone();
      let done_tx = done_tx.clone();
      workers.spawn(async move {
        let report = dispatcher.dispatch_target(&target).await;
        let _ = done_tx.send(BuildCompletion { target, report });
      });
    }
  }

  /// Give in-flight builds the grace period to report, then abandon them
  async fn drain(&mut self, done_rx: &mut mpsc::UnboundedReceiver<BuildCompletion>, workers: &mut JoinSet<()>) {
    if self.state.building.is_empty() {
      return;
    }

    let grace = self.config.shutdown_grace();
    info!(
      in_flight = self.state.building.len(),
      grace_ms = millis(grace),
      "Waiting for in-flight builds"
    );

    let deadline = tokio::time::sleep(grace);
    tokio::pin!(deadline);

    while !self.state.building.is_empty() {
      tokio::select! {
          Some(done) = done_rx.recv() => self.handle_completion(done),
          _ = &mut deadline => {
              warn!(targets = %join_targets(self.state.building.iter()), "Abandoning in-flight builds");
              break;
          }
      }
    }

    workers.abort_all();
  }
}

fn join_targets<'a>(targets: impl IntoIterator<Item = &'a Target>) -> String {
  targets.into_iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

/// Whole milliseconds, saturating at `u64::MAX`
fn millis(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
