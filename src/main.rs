mod app;
mod auth;
mod cache;
mod commands;
mod config;
mod db;
mod featured;
mod query;
mod session;
mod spotify;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::{NoopStorage, SqliteStorage};
use crate::session::SqliteSession;

#[derive(Parser, Debug)]
#[command(name = "sp9s")]
#[command(about = "A terminal companion for your Spotify listening session")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/sp9s/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

/// Log to a file in the data directory so command output stays clean.
fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let file_appender = tracing_appender::rolling::never(log_dir, "sp9s.log");
  let (writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_env("SP9S_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false),
    )
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(&db::data_dir()?)?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let db_path = match &config.cache.path {
    Some(path) => path.clone(),
    None => db::default_path()?,
  };
  let session = Box::new(SqliteSession::new(db::open(&db_path)?));
  let mut stdout = std::io::stdout().lock();

  if config.cache.enabled {
    let storage = SqliteStorage::new(db::open(&db_path)?);
    app::App::new(config, storage, session)?
      .run(args.command, &mut stdout)
      .await
  } else {
    tracing::info!("response cache disabled");
    app::App::new(config, NoopStorage, session)?
      .run(args.command, &mut stdout)
      .await
  }
}
