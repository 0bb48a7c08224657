mod api;
mod app;
mod cache;
mod classify;
mod config;
mod error;
mod logging;
mod net;
mod queue;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::app::ConsolePresenter;
use crate::cache::{MemoryStorage, SqliteStorage};

#[derive(Parser, Debug)]
#[command(name = "fieldq")]
#[command(about = "Offline-first client for field technician assignments")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/fieldq/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Treat the network as unavailable: serve cached data, queue changes
  #[arg(long)]
  offline: bool,

  /// Keep all state in memory for this run only
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Sign in (technicians only)
  Login {
    #[arg(short, long)]
    email: String,
    #[arg(short, long, env = "FIELDQ_PASSWORD", hide_env_values = true)]
    password: Option<String>,
  },
  /// Forget the stored session
  Logout,
  /// Show the signed-in user
  Whoami,
  /// List the team's open assignments
  #[command(alias = "queue")]
  Assignments,
  /// Show one assignment and its tasks
  Show { assignment_id: String },
  /// Mark an assignment as in progress
  Start { assignment_id: String },
  /// Mark a task as completed
  Complete { task_id: String },
  /// List actions waiting to be sent
  Pending,
  /// Send pending actions to the server
  Sync {
    /// Keep running and sync whenever the connection comes back
    #[arg(short, long)]
    watch: bool,
  },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config)?;

  tracing::debug!(api = config.api_url(), offline = args.offline, "Starting");

  let ok = if args.ephemeral {
    let app = app::App::new(config, MemoryStorage::new(), args.offline, ConsolePresenter)?;
    app.run(args.command).await?
  } else {
    let storage = SqliteStorage::open(config.cache.path.as_deref())?;
    let app = app::App::new(config, storage, args.offline, ConsolePresenter)?;
    app.run(args.command).await?
  };

  Ok(if ok {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}
