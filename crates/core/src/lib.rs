pub mod config;
pub mod target;

pub use config::{Config, ConfigError};
pub use target::{BuildOutcome, BuildRecord, Target, TargetState, TargetStatus};
