//! Change detection: path filtering and content-hash deduplication.
//!
//! The detector owns the map of watched files to their last-known content hash.
//! A change is only reported when a qualifying file's content actually differs
//! from what was last seen, so editor touches, atomic-save artifacts and
//! byte-identical rewrites never reach the scheduler.

use std::{
  collections::{HashMap, HashSet},
  path::{Component, Path, PathBuf},
};

use docwatch_core::config::WatchConfig;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

/// Compute a content hash for change detection
///
/// Uses SHA-256 truncated to 16 hex chars; collisions between two successive
/// versions of one file are not a practical concern.
pub fn compute_content_hash(content: &[u8]) -> String {
  let digest = Sha256::digest(content);
  hex::encode(&digest[..8])
}

// ============================================================================
// Change Events
// ============================================================================

/// The kind of filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
  Created,
  Modified,
  Deleted,
}

/// A normalized change to a watched file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
  pub path: PathBuf,
  pub kind: ChangeKind,
}

// ============================================================================
// Path Filter
// ============================================================================

/// Decides whether a path is relevant to documentation builds.
///
/// A path qualifies when it carries a recognized extension, has a directory
/// marker among its segments (relative to the workspace or watch root), and
/// is not ignored.
#[derive(Debug)]
pub struct PathFilter {
  workspace_root: PathBuf,
  roots: Vec<PathBuf>,
  extensions: HashSet<String>,
  markers: HashSet<String>,
  ignored: HashSet<String>,
  gitignore: Option<Gitignore>,
}

impl PathFilter {
  pub fn new(workspace_root: &Path, config: &WatchConfig, gitignore: Option<Gitignore>) -> Self {
    Self {
      workspace_root: workspace_root.to_path_buf(),
      roots: config.watch_roots(workspace_root),
      extensions: config.normalized_extensions(),
      markers: config.directory_markers.iter().cloned().collect(),
      ignored: config.ignore.iter().cloned().collect(),
      gitignore,
    }
  }

  /// Watch roots this filter was built for
  pub fn roots(&self) -> &[PathBuf] {
    &self.roots
  }

  /// Check whether a file path should be tracked
  pub fn is_relevant(&self, path: &Path) -> bool {
    let has_extension = path
      .extension()
      .and_then(|e| e.to_str())
      .is_some_and(|e| self.extensions.contains(&e.to_lowercase()));
    if !has_extension {
      return false;
    }

    let segments = self.relative_segments(path);
    if segments.iter().any(|s| self.ignored.contains(*s)) {
      return false;
    }

    // An empty marker list disables the directory restriction
    if !self.markers.is_empty() && !segments.iter().any(|s| self.markers.contains(*s)) {
      return false;
    }

    !self.is_gitignored(path)
  }

  /// Check whether a directory should be descended into during a scan
  fn is_ignored_dir(&self, path: &Path) -> bool {
    let ignored_name = path
      .file_name()
      .and_then(|n| n.to_str())
      .is_some_and(|n| self.ignored.contains(n));
    ignored_name || self.is_gitignored_dir(path)
  }

  fn relative_segments<'a>(&self, path: &'a Path) -> Vec<&'a str> {
    let relative = path
      .strip_prefix(&self.workspace_root)
      .ok()
      .or_else(|| self.roots.iter().find_map(|r| path.strip_prefix(r).ok()))
      .unwrap_or(path);

    relative
      .components()
      .filter_map(|c| match c {
        Component::Normal(s) => s.to_str(),
        _ => None,
      })
      .collect()
  }

  fn is_gitignored(&self, path: &Path) -> bool {
    match &self.gitignore {
      // The matcher panics on paths outside its root
      Some(gi) if path.starts_with(gi.path()) => gi.matched_path_or_any_parents(path, false).is_ignore(),
      _ => false,
    }
  }

  fn is_gitignored_dir(&self, path: &Path) -> bool {
    match &self.gitignore {
      Some(gi) if path.starts_with(gi.path()) => gi.matched(path, true).is_ignore(),
      _ => false,
    }
  }
}

/// Build a gitignore matcher for the given workspace root.
///
/// Returns `Ok(None)` when the workspace has no .gitignore.
pub fn build_gitignore(root: &Path) -> Result<Option<Gitignore>, ignore::Error> {
  let gitignore_path = root.join(".gitignore");

  if !gitignore_path.exists() {
    debug!(root = %root.display(), "No .gitignore found, only configured ignores apply");
    return Ok(None);
  }

  let mut builder = GitignoreBuilder::new(root);
  if let Some(err) = builder.add(&gitignore_path) {
    warn!(error = %err, "Error parsing .gitignore, continuing with partial rules");
  }

  builder.build().map(Some)
}

// ============================================================================
// Change Detector
// ============================================================================

/// Filters raw filesystem changes down to real content changes.
///
/// Owns the watched-file hash map; it must only ever be driven from one task.
#[derive(Debug)]
pub struct ChangeDetector {
  filter: PathFilter,
  hashes: HashMap<PathBuf, String>,
}

impl ChangeDetector {
  pub fn new(filter: PathFilter) -> Self {
    Self {
      filter,
      hashes: HashMap::new(),
    }
  }

  pub fn filter(&self) -> &PathFilter {
    &self.filter
  }

  /// Number of files with a known hash
  pub fn tracked(&self) -> usize {
    self.hashes.len()
  }

  /// Last-known hash of a file
  pub fn hash_of(&self, path: &Path) -> Option<&str> {
    self.hashes.get(path).map(String::as_str)
  }

  /// Hash every qualifying file under the watch roots.
  ///
  /// Returns the number of files seeded.
  pub fn scan(&mut self) -> usize {
    let mut seeded = 0;

    for root in self.filter.roots() {
      let walker = walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_type().is_dir() || !self.filter.is_ignored_dir(e.path()));

      for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() || !self.filter.is_relevant(entry.path()) {
          continue;
        }
        if let Ok(content) = std::fs::read(entry.path()) {
          self.hashes.insert(entry.path().to_path_buf(), compute_content_hash(&content));
          seeded += 1;
        }
      }
    }

    debug!(files = seeded, "Startup scan complete");
    seeded
  }

  /// Feed one raw change; returns an event only for a real content change.
  pub fn observe(&mut self, path: &Path, kind: ChangeKind) -> Option<ChangeEvent> {
    if !self.filter.is_relevant(path) {
      trace!(path = %path.display(), "Skipping irrelevant path");
      return None;
    }

    match kind {
      ChangeKind::Deleted => {
        // Nothing to compare against; a delete always counts
        self.hashes.remove(path);
        debug!(path = %path.display(), "File deleted");
        Some(ChangeEvent {
          path: path.to_path_buf(),
          kind,
        })
      }
      ChangeKind::Created | ChangeKind::Modified => {
        let content = match std::fs::read(path) {
          Ok(content) => content,
          Err(e) => {
            // Retried on the next notification for this path
            debug!(path = %path.display(), error = %e, "Unreadable file, keeping previous hash");
            return None;
          }
        };

        let hash = compute_content_hash(&content);
        if self.hashes.get(path) == Some(&hash) {
          trace!(path = %path.display(), "Content unchanged");
          return None;
        }

        debug!(path = %path.display(), ?kind, "Content changed");
        self.hashes.insert(path.to_path_buf(), hash);
        Some(ChangeEvent {
          path: path.to_path_buf(),
          kind,
        })
      }
    }
  }

  /// Re-read a file and store its current hash without reporting a change.
  ///
  /// Used after an auto-fixer rewrites a file so its own write is not seen
  /// as a new edit.
  pub fn rehash(&mut self, path: &Path) {
    if let Ok(content) = std::fs::read(path) {
      self.hashes.insert(path.to_path_buf(), compute_content_hash(&content));
    }
  }
}
