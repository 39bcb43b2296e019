//! Domain logic - change detection and target resolution
//!
//! Both components are synchronous and free of channels so they can be
//! exercised directly in unit tests; the actors in [`crate::actor`] drive them.

mod detector;
mod resolver;

pub use detector::{ChangeDetector, ChangeEvent, ChangeKind, PathFilter, build_gitignore, compute_content_hash};
pub use resolver::{Resolution, TargetResolver};
