//! Watch command: run the rebuild loop until interrupted

use anyhow::{Context, Result};
use docwatch::{Daemon, RuntimeConfig};
use tracing::info;

/// Watch the workspace and rebuild affected documentation targets
///
/// # Arguments
/// * `runtime` - Loaded workspace configuration
/// * `initial_build` - Request a full rebuild once the watch is established
pub async fn cmd_watch(mut runtime: RuntimeConfig, initial_build: bool) -> Result<()> {
  runtime.initial_build = initial_build;
  let root = runtime.workspace_root.clone();

  let status = Daemon::new(runtime)
    .run()
    .await
    .with_context(|| format!("Failed to watch {}", root.display()))?;

  info!(
    flushes = status.flushes,
    builds = status.builds_dispatched,
    pending = status.pending.len(),
    "Watch finished"
  );
  for snapshot in &status.targets {
    if let Some(outcome) = snapshot.state.last_outcome() {
      info!(
        target = %snapshot.target,
        builds = snapshot.state.builds,
        ok = outcome.is_success(),
        "Last build: {}",
        outcome.message()
      );
    }
  }

  Ok(())
}
