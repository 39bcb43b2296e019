//! CLI command implementations

mod build;
mod config;
mod resolve;
mod watch;

pub use build::{BuildSelection, cmd_build};
pub use config::{cmd_config_init, cmd_config_show};
pub use resolve::cmd_resolve;
pub use watch::cmd_watch;
