//! BuildDispatcher - hands a target to the builder and normalizes the result
//!
//! The dispatcher is stateless. It never retries and never imposes a timeout;
//! builder errors and panics both come back as a failed [`BuildReport`].

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use docwatch_core::Target;
use futures::FutureExt;
use tokio::time::Instant;
use tracing::debug;

use super::message::BuildReport;
use crate::builder::{BuildError, Builder};

#[derive(Clone)]
pub struct BuildDispatcher {
  builder: Arc<dyn Builder>,
}

impl std::fmt::Debug for BuildDispatcher {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BuildDispatcher").finish_non_exhaustive()
  }
}

impl BuildDispatcher {
  pub fn new(builder: Arc<dyn Builder>) -> Self {
    Self { builder }
  }

  /// Build `target` once
  pub async fn dispatch(&self, target: &Target, clean: bool) -> BuildReport {
    debug!(target = %target, clean, "Dispatching build");
    let started = Instant::now();

    let result = AssertUnwindSafe(self.builder.build(target, clean)).catch_unwind().await;
    let duration = started.elapsed();

    let (success, message) = match result {
      Ok(Ok(message)) => (true, message),
      Ok(Err(e)) => (false, e.to_string()),
      Err(panic) => (false, BuildError::Panicked(panic_message(panic.as_ref())).to_string()),
    };

    BuildReport {
      success,
      message,
      duration,
    }
  }

  /// Build `target` with its default clean flag (only `Full` builds clean)
  pub async fn dispatch_target(&self, target: &Target) -> BuildReport {
    self.dispatch(target, target.clean_by_default()).await
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}
