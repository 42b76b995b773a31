//! worldcount server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, starts the sampling loops and serves the JSON API over HTTP.
//! `--mode` runs only one of the two halves, e.g. to keep the scraper and the
//! API in separate processes on the same database file.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use worldcount_scrape::Scraper;
use worldcount_server::{ServerConfig, ingest::Ingestor};
use worldcount_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "World population tracker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Which parts of the service to run.
  #[arg(long, value_enum, default_value_t = Mode::All)]
  mode: Mode,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
  /// Sample the site and serve the API.
  All,
  /// Serve the API only.
  Api,
  /// Sample the site only.
  Ingest,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&cfg.store_path);

  if cli.mode != Mode::Api {
    // The writer opens first so the schema exists before any reader.
    let writer = SqliteStore::open(&store_path)
      .await
      .with_context(|| format!("failed to open store at {store_path:?}"))?;
    let scraper =
      Scraper::new(cfg.scrape_config()).context("failed to build HTTP client")?;
    let ingestor = Arc::new(Ingestor::new(scraper, writer, store_path.clone()));

    tracing::info!(
      global_every = ?cfg.global_interval(),
      worlds_every = ?cfg.world_interval(),
      "sampling started"
    );
    tokio::spawn(Arc::clone(&ingestor).run_global(cfg.global_interval()));
    tokio::spawn(ingestor.run_worlds(cfg.world_interval()));
  }

  if cli.mode == Mode::Ingest {
    tokio::signal::ctrl_c()
      .await
      .context("failed to listen for shutdown signal")?;
    return Ok(());
  }

  let reader = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let app = worldcount_server::router(Arc::new(reader));
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
