//! Build command: one-shot dispatch of a single target

use std::sync::Arc;

use anyhow::{Result, bail};
use docwatch::{BuildDispatcher, RuntimeConfig, builder::CommandBuilder, target::Target};

/// Which target `docwatch build` was asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildSelection {
  Package(String),
  RootDocs,
  All,
}

impl BuildSelection {
  /// Map the selection to a target, validating package ids against the config
  pub fn into_target(self, known_packages: &[String]) -> Result<Target> {
    Ok(match self {
      BuildSelection::Package(id) => {
        if !known_packages.is_empty() && !known_packages.contains(&id) {
          bail!("Unknown package '{}'. Configured packages: {}", id, known_packages.join(", "));
        }
        Target::Package(id)
      }
      BuildSelection::RootDocs => Target::RootAggregate,
      BuildSelection::All => Target::Full,
    })
  }
}

/// Build one target now, without watching
pub async fn cmd_build(runtime: RuntimeConfig, selection: BuildSelection) -> Result<()> {
  let target = selection.into_target(&runtime.config.workspace.packages)?;

  let builder = Arc::new(CommandBuilder::new(&runtime.workspace_root, runtime.config.builder.clone()));
  let report = BuildDispatcher::new(builder).dispatch_target(&target).await;

  if !report.success {
    bail!("Build of {} failed: {}", target, report.message);
  }

  println!(
    "Built {} in {:.1}s: {}",
    target,
    report.duration.as_secs_f64(),
    report.message
  );
  Ok(())
}
