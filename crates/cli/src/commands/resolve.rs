//! Resolve command: show which target each path would rebuild

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use docwatch::{PathFilter, RuntimeConfig, TargetResolver, build_gitignore};

/// Print the owning target of each path
///
/// Relative paths are taken from the current directory. Paths the watcher
/// would filter out are marked as such.
pub async fn cmd_resolve(runtime: RuntimeConfig, paths: Vec<PathBuf>, json: bool) -> Result<()> {
  let cwd = std::env::current_dir().context("Failed to read current directory")?;
  let root = &runtime.workspace_root;

  let gitignore = if runtime.config.watch.respect_gitignore {
    build_gitignore(root).context("Failed to read .gitignore")?
  } else {
    None
  };
  let filter = PathFilter::new(root, &runtime.config.watch, gitignore);
  let resolver = TargetResolver::new(root, &runtime.config.workspace);

  let mut rows = Vec::with_capacity(paths.len());
  for path in paths {
    let absolute = absolutize(&cwd, &path);
    let target = resolver.resolve(&absolute).into_target().map(|t| t.to_string());
    rows.push((path, target, filter.is_relevant(&absolute)));
  }

  if json {
    let items: Vec<_> = rows
      .iter()
      .map(|(path, target, watched)| {
        serde_json::json!({
          "path": path.display().to_string(),
          "target": target,
          "watched": watched,
        })
      })
      .collect();
    println!("{}", serde_json::to_string_pretty(&items)?);
    return Ok(());
  }

  for (path, target, watched) in rows {
    let target = target.as_deref().unwrap_or("unresolved");
    let note = if watched { "" } else { " (filtered)" };
    println!("{}\t{}{}", path.display(), target, note);
  }
  Ok(())
}

/// Make a path absolute and canonical where it exists.
///
/// Deleted files cannot be canonicalized, so their parent is resolved instead.
fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
  let joined = if path.is_absolute() { path.to_path_buf() } else { cwd.join(path) };
  if let Ok(canonical) = joined.canonicalize() {
    return canonical;
  }
  match (joined.parent().and_then(|p| p.canonicalize().ok()), joined.file_name()) {
    (Some(parent), Some(name)) => parent.join(name),
    _ => joined,
  }
}
