//! worldcount server: the JSON API plus the ingestion scheduler.
//!
//! The binary in `main.rs` wires these together; everything here is also
//! usable on its own, e.g. to mount the API inside another router.

pub mod ingest;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::Router;
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use worldcount_core::store::SampleStore;
use worldcount_scrape::ScrapeConfig;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `WORLDCOUNT_*` environment variables. Every field has a default.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                 String,
  pub port:                 u16,
  pub store_path:           PathBuf,
  /// Page carrying the global "people playing" counter.
  pub global_url:           String,
  /// Page carrying the world list.
  pub worlds_url:           String,
  pub global_interval_secs: u64,
  pub world_interval_secs:  u64,
  pub request_timeout_secs: u64,
  pub user_agent:           String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                 "127.0.0.1".to_owned(),
      port:                 5000,
      store_path:           PathBuf::from("worldcount.db"),
      global_url:           "https://oldschool.runescape.com/".to_owned(),
      worlds_url:           "https://oldschool.runescape.com/slu".to_owned(),
      global_interval_secs: 300,
      world_interval_secs:  1800,
      request_timeout_secs: 15,
      user_agent:           "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                             AppleWebKit/537.36 (KHTML, like Gecko) \
                             Chrome/124.0 Safari/537.36"
        .to_owned(),
    }
  }
}

impl ServerConfig {
  /// Read `file` if it exists, then apply `WORLDCOUNT_*` overrides.
  pub fn load(file: impl Into<PathBuf>) -> Result<Self, config::ConfigError> {
    Self::from_sources(
      file.into(),
      config::Environment::with_prefix("WORLDCOUNT").try_parsing(true),
    )
  }

  fn from_sources(
    file: PathBuf,
    env: config::Environment,
  ) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(file).required(false))
      .add_source(env)
      .build()?
      .try_deserialize()
  }

  pub fn scrape_config(&self) -> ScrapeConfig {
    ScrapeConfig {
      global_url: self.global_url.clone(),
      worlds_url: self.worlds_url.clone(),
      user_agent: self.user_agent.clone(),
      timeout:    Duration::from_secs(self.request_timeout_secs),
    }
  }

  /// Period of the global count loop, at least one second.
  pub fn global_interval(&self) -> Duration {
    Duration::from_secs(self.global_interval_secs.max(1))
  }

  pub fn world_interval(&self) -> Duration {
    Duration::from_secs(self.world_interval_secs.max(1))
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The public HTTP surface: the JSON API under `/api`, with request tracing
/// and permissive CORS so dashboards on other origins can read it.
pub fn router<S>(store: Arc<S>) -> Router
where
  S: SampleStore + 'static,
{
  Router::new()
    .nest("/api", worldcount_api::api_router(store))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
}
