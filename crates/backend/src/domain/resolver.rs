//! Maps a changed path to the rebuild target that owns it.

use std::{
  collections::HashSet,
  path::{Component, Path, PathBuf},
};

use docwatch_core::{Target, config::WorkspaceConfig};

/// Segment under which each package lives
const PACKAGES_DIR: &str = "packages";

/// Classification of a single path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  Package(String),
  RootAggregate,
  Unresolved,
}

impl Resolution {
  /// The target to enqueue, if any.
  ///
  /// Never yields `Target::Full`; a full rebuild is only ever requested explicitly.
  pub fn into_target(self) -> Option<Target> {
    match self {
      Resolution::Package(id) => Some(Target::Package(id)),
      Resolution::RootAggregate => Some(Target::RootAggregate),
      Resolution::Unresolved => None,
    }
  }
}

/// Pure path classifier for one workspace
#[derive(Debug, Clone)]
pub struct TargetResolver {
  workspace_root: PathBuf,
  docs_dirs: HashSet<String>,
  packages: HashSet<String>,
}

impl TargetResolver {
  pub fn new(workspace_root: &Path, config: &WorkspaceConfig) -> Self {
    Self {
      workspace_root: workspace_root.to_path_buf(),
      docs_dirs: config.docs_dirs.iter().cloned().collect(),
      packages: config.packages.iter().cloned().collect(),
    }
  }

  pub fn workspace_root(&self) -> &Path {
    &self.workspace_root
  }

  /// Classify a path.
  ///
  /// Rules, in order:
  /// 1. `.../packages/<id>/<anything>` → `Package(id)` (id must be a known package
  ///    when a package list is configured, otherwise the remaining rules apply)
  /// 2. a file inside a top-level docs directory, or directly in the workspace root → `RootAggregate`
  /// 3. everything else → `Unresolved`
  pub fn resolve(&self, path: &Path) -> Resolution {
    let Ok(relative) = path.strip_prefix(&self.workspace_root) else {
      return Resolution::Unresolved;
    };

    let mut segments = Vec::new();
    for component in relative.components() {
      match component {
        Component::Normal(s) => match s.to_str() {
          Some(s) => segments.push(s),
          None => return Resolution::Unresolved,
        },
        Component::CurDir => {}
        _ => return Resolution::Unresolved,
      }
    }

    // The package id must be a directory, not the changed file itself
    let package = segments
      .windows(3)
      .find(|w| w[0] == PACKAGES_DIR)
      .map(|w| w[1]);

    // An unknown id may still sit inside the root docs tree
    if let Some(id) = package
      && (self.packages.is_empty() || self.packages.contains(id))
    {
      return Resolution::Package(id.to_string());
    }

    match segments.as_slice() {
      [_file] => Resolution::RootAggregate,
      [first, _, ..] if self.docs_dirs.contains(*first) => Resolution::RootAggregate,
      _ => Resolution::Unresolved,
    }
  }
}
