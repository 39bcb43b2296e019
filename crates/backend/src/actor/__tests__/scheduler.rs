//! RebuildScheduler timing tests on a paused clock.
//!
//! Defaults: poll every 1s, 2.5s quiet window. With no other activity the
//! first flush after an enqueue at t=0 happens on the t=3s tick.

use std::{sync::Arc, time::Duration};

use docwatch_core::{BuildOutcome, Target, TargetStatus};
use pretty_assertions::assert_eq;
use tokio::{
  sync::mpsc::error::TryRecvError,
  task::JoinHandle,
  time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

use super::helpers::{RecordingBuilder, scheduler_config};
use crate::actor::{BuildDispatcher, RebuildScheduler, SchedulerHandle, SchedulerStatus};

fn spawn_scheduler(
  builder: Arc<RecordingBuilder>,
  max_concurrent: usize,
) -> (SchedulerHandle, JoinHandle<SchedulerStatus>, CancellationToken) {
  let cancel = CancellationToken::new();
  let (handle, task) = RebuildScheduler::spawn(
    scheduler_config(max_concurrent),
    BuildDispatcher::new(builder),
    cancel.clone(),
  );
  (handle, task, cancel)
}

#[tokio::test(start_paused = true)]
async fn test_burst_coalesces_into_one_flush() {
  let (builder, _started) = RecordingBuilder::new();
  let (handle, _task, _cancel) = spawn_scheduler(builder.clone(), 1);

  // packages/a/foo.py + packages/b/bar.rst + another edit to a, all within one window
  handle.enqueue(Target::package("a")).await.unwrap();
  sleep(Duration::from_millis(500)).await;
  handle.enqueue(Target::package("b")).await.unwrap();
  sleep(Duration::from_millis(500)).await;
  handle.enqueue(Target::package("a")).await.unwrap();

  sleep(Duration::from_secs(5)).await;

  assert_eq!(
    builder.calls(),
    vec![(Target::package("a"), false), (Target::package("b"), false)]
  );
  let status = handle.status().await.unwrap();
  assert_eq!(status.flushes, 1);
  assert!(status.is_quiescent());
}

#[tokio::test(start_paused = true)]
async fn test_quiet_window_delays_flush() {
  let (builder, _started) = RecordingBuilder::new();
  let (handle, _task, _cancel) = spawn_scheduler(builder.clone(), 1);

  handle.enqueue(Target::package("a")).await.unwrap();

  sleep(Duration::from_secs(2)).await;
  assert!(builder.calls().is_empty());
  let status = handle.status().await.unwrap();
  assert_eq!(status.pending, vec![Target::package("a")]);
  assert_eq!(
    status.state_of(&Target::package("a")).map(|s| s.status),
    Some(TargetStatus::PendingChange)
  );

  sleep(Duration::from_secs(2)).await;
  assert_eq!(builder.targets(), vec![Target::package("a")]);
}

#[tokio::test(start_paused = true)]
async fn test_change_during_build_is_deferred() {
  let (builder, mut started, gate) = RecordingBuilder::gated();
  let (handle, _task, _cancel) = spawn_scheduler(builder.clone(), 1);
  let a = Target::package("a");

  handle.enqueue(a.clone()).await.unwrap();
  assert_eq!(started.recv().await, Some(a.clone()));

  // Edit while building: no second build may start
  handle.enqueue(a.clone()).await.unwrap();
  sleep(Duration::from_secs(10)).await;
  assert!(matches!(started.try_recv(), Err(TryRecvError::Empty)));

  let status = handle.status().await.unwrap();
  assert_eq!(status.state_of(&a).map(|s| s.status), Some(TargetStatus::Building));
  assert_eq!(status.pending, vec![a.clone()]);

  // The deferred change is built after the first build returns
  gate.add_permits(1);
  assert_eq!(started.recv().await, Some(a.clone()));
  gate.add_permits(1);
  sleep(Duration::from_secs(1)).await;

  let status = handle.status().await.unwrap();
  let state = status.state_of(&a).unwrap();
  assert_eq!(state.status, TargetStatus::Idle);
  assert_eq!(state.builds, 2);
  assert_eq!(status.flushes, 2);
  assert_eq!(builder.max_active(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_full_supersedes_partial() {
  let (builder, _started) = RecordingBuilder::new();
  let (handle, _task, _cancel) = spawn_scheduler(builder.clone(), 1);

  handle.enqueue(Target::package("a")).await.unwrap();
  handle.enqueue(Target::RootAggregate).await.unwrap();
  handle.rebuild_all().await.unwrap();

  sleep(Duration::from_secs(5)).await;

  assert_eq!(builder.calls(), vec![(Target::Full, true)]);
  let status = handle.status().await.unwrap();
  assert_eq!(
    status.state_of(&Target::package("a")).map(|s| s.status),
    Some(TargetStatus::Idle)
  );
  assert_eq!(status.state_of(&Target::package("a")).map(|s| s.builds), Some(0));
  assert_eq!(status.state_of(&Target::Full).map(|s| s.builds), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_failure_is_not_retried() {
  let a = Target::package("a");
  let (builder, _started) = RecordingBuilder::failing(&[a.clone()]);
  let (handle, _task, _cancel) = spawn_scheduler(builder.clone(), 1);

  handle.enqueue(a.clone()).await.unwrap();
  sleep(Duration::from_secs(30)).await;

  assert_eq!(builder.targets(), vec![a.clone()]);
  let status = handle.status().await.unwrap();
  let state = status.state_of(&a).unwrap();
  assert_eq!(state.status, TargetStatus::Idle);
  assert!(matches!(state.last_outcome(), Some(BuildOutcome::Failure(m)) if m.contains("broken reference")));

  // A new change re-arms it
  handle.enqueue(a.clone()).await.unwrap();
  sleep(Duration::from_secs(5)).await;
  assert_eq!(builder.targets(), vec![a.clone(), a]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_limit_bounds_builds() {
  let (builder, mut started, gate) = RecordingBuilder::gated();
  let (handle, _task, _cancel) = spawn_scheduler(builder.clone(), 2);

  for id in ["a", "b", "c"] {
    handle.enqueue(Target::package(id)).await.unwrap();
  }

  assert_eq!(started.recv().await, Some(Target::package("a")));
  assert_eq!(started.recv().await, Some(Target::package("b")));
  sleep(Duration::from_secs(1)).await;
  assert!(matches!(started.try_recv(), Err(TryRecvError::Empty)));

  let status = handle.status().await.unwrap();
  assert_eq!(status.in_flight, 2);
  assert_eq!(status.waiting, 1);

  gate.add_permits(3);
  assert_eq!(started.recv().await, Some(Target::package("c")));
  sleep(Duration::from_secs(1)).await;

  assert_eq!(builder.max_active(), 2);
  assert!(handle.status().await.unwrap().is_quiescent());
}

#[tokio::test(start_paused = true)]
async fn test_zero_limit_is_unbounded() {
  let (builder, mut started, gate) = RecordingBuilder::gated();
  let (handle, _task, _cancel) = spawn_scheduler(builder.clone(), 0);

  for id in ["a", "b", "c"] {
    handle.enqueue(Target::package(id)).await.unwrap();
  }
  for _ in 0..3 {
    started.recv().await.unwrap();
  }

  assert_eq!(builder.max_active(), 3);
  gate.add_permits(3);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_in_flight_build() {
  let (builder, mut started, gate) = RecordingBuilder::gated();
  let (handle, task, cancel) = spawn_scheduler(builder.clone(), 1);

  handle.enqueue(Target::RootAggregate).await.unwrap();
  started.recv().await.unwrap();

  cancel.cancel();
  tokio::spawn(async move {
    sleep(Duration::from_secs(1)).await;
    gate.add_permits(1);
  });

  let status = task.await.unwrap();
  assert_eq!(status.in_flight, 0);
  assert_eq!(status.state_of(&Target::RootAggregate).map(|s| s.builds), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_after_grace() {
  let (builder, mut started, _gate) = RecordingBuilder::gated();
  let (handle, task, cancel) = spawn_scheduler(builder, 1);

  handle.enqueue(Target::package("a")).await.unwrap();
  started.recv().await.unwrap();

  cancel.cancel();
  let status = timeout(Duration::from_secs(60), task).await.unwrap().unwrap();
  assert_eq!(status.in_flight, 1);
  assert_eq!(
    status.state_of(&Target::package("a")).map(|s| s.status),
    Some(TargetStatus::Building)
  );
}

#[tokio::test(start_paused = true)]
async fn test_stops_when_handles_dropped() {
  let (builder, _started) = RecordingBuilder::new();
  let (handle, task, _cancel) = spawn_scheduler(builder, 1);

  handle.enqueue(Target::package("a")).await.unwrap();
  drop(handle);

  let status = task.await.unwrap();
  assert_eq!(status.pending, vec![Target::package("a")]);
  assert_eq!(status.flushes, 0);
}
