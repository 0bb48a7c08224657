//! Log setup. Output goes to a daily-rotated file; stdout belongs to the user.

use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Default log file location.
pub fn default_log_file() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("fieldq").join("logs").join("fieldq.log"))
}

/// `RUST_LOG` wins over the configured level.
fn build_filter(level: &str) -> EnvFilter {
  EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(level))
    .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn split_path(path: &Path) -> Result<(PathBuf, String)> {
  let dir = path
    .parent()
    .map(Path::to_path_buf)
    .unwrap_or_else(|| PathBuf::from("."));
  let file = path
    .file_name()
    .and_then(|f| f.to_str())
    .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?
    .to_string();
  Ok((dir, file))
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the program or buffered lines are lost.
pub fn init(config: &Config) -> Result<WorkerGuard> {
  let path = match &config.log.file {
    Some(p) => p.clone(),
    None => default_log_file()?,
  };
  let (dir, file) = split_path(&path)?;

  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(dir, file);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(build_filter(config.log_level()))
    .with(
      fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(config.debug_mode()),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}
