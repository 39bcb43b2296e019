//! Config commands

use std::path::Path;

use anyhow::{Context, Result, bail};
use docwatch::{RuntimeConfig, config::Config};

/// Show the effective configuration and where it came from
pub async fn cmd_config_show(runtime: RuntimeConfig) -> Result<()> {
  let root = &runtime.workspace_root;
  let project_config = Config::project_config_path(root);
  let user_config = Config::user_config_path();

  println!("Effective configuration for: {}", root.display());
  println!();

  if project_config.exists() {
    println!("Using workspace config: {}", project_config.display());
  } else if let Some(user_path) = user_config.as_ref().filter(|p| p.exists()) {
    println!("Using user config: {}", user_path.display());
  } else {
    println!("Using default configuration (no config file found)");
  }
  println!();

  println!("{}", runtime.config.to_toml()?);
  Ok(())
}

/// Write a starter `.docwatch.toml` listing the packages found on disk
pub async fn cmd_config_init(root: &Path, force: bool) -> Result<()> {
  let config_path = Config::project_config_path(root);
  if config_path.exists() && !force {
    bail!(
      "Config file already exists: {} (pass --force to overwrite)",
      config_path.display()
    );
  }

  let packages = discover_packages(root)?;
  let template = Config::generate_template(&packages);
  std::fs::write(&config_path, template).with_context(|| format!("Failed to write {}", config_path.display()))?;

  println!("Created workspace config: {}", config_path.display());
  if packages.is_empty() {
    println!("No packages/ directory found; every package id will be accepted.");
  } else {
    println!("Packages: {}", packages.join(", "));
  }
  println!("Edit the file to set the build commands.");
  Ok(())
}

/// Sorted directory names under `<root>/packages`
fn discover_packages(root: &Path) -> Result<Vec<String>> {
  let packages_dir = root.join("packages");
  if !packages_dir.is_dir() {
    return Ok(Vec::new());
  }

  let mut packages = Vec::new();
  for entry in std::fs::read_dir(&packages_dir).with_context(|| format!("Failed to list {}", packages_dir.display()))? {
    let entry = entry?;
    if entry.file_type()?.is_dir()
      && let Some(name) = entry.file_name().to_str()
      && !name.starts_with('.')
    {
      packages.push(name.to_string());
    }
  }
  packages.sort();
  Ok(packages)
}
