//! Logging setup for CLI commands and the watch loop

use std::path::PathBuf;

use docwatch::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Log file name inside the log directory
const LOG_FILE: &str = "docwatch.log";

/// Initialize logging for one-shot commands (console only)
pub fn init_cli_logging() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
    .with_writer(std::io::stderr)
    .init();
}

/// Parse log level from config string
fn parse_log_level(level: &str) -> tracing::Level {
  match level.to_lowercase().as_str() {
    "off" | "error" => tracing::Level::ERROR,
    "warn" => tracing::Level::WARN,
    "info" => tracing::Level::INFO,
    "debug" => tracing::Level::DEBUG,
    "trace" => tracing::Level::TRACE,
    _ => tracing::Level::INFO,
  }
}

/// Initialize logging for `watch` with config-driven settings.
///
/// Without a log directory: console only with colors.
/// With a log directory: rolling file only (no ANSI).
///
/// Returns the guard that must be kept alive for the duration of the program
pub fn init_watch_logging(config: &LogConfig, log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
  let level = parse_log_level(&config.level);

  // Build env filter (allows RUST_LOG override)
  let env_filter = EnvFilter::builder()
    .with_default_directive(level.into())
    .from_env_lossy();

  let Some(log_dir) = log_dir else {
    tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_ansi(true)
      .init();
    return None;
  };

  if let Err(e) = std::fs::create_dir_all(&log_dir) {
    // Fall back to console-only logging
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::warn!(dir = %log_dir.display(), error = %e, "Cannot create log directory, logging to console");
    return None;
  }

  let file_appender = match config.rotation.as_str() {
    "hourly" => tracing_appender::rolling::hourly(&log_dir, LOG_FILE),
    "never" => tracing_appender::rolling::never(&log_dir, LOG_FILE),
    _ => tracing_appender::rolling::daily(&log_dir, LOG_FILE),
  };

  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .init();

  Some(guard)
}
