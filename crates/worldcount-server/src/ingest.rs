//! The ingestion scheduler.
//!
//! Two independent interval loops sample the site: the global counter every
//! few minutes and the world list less often. Each tick scrapes, stamps the
//! result with the current time and writes its half of a cycle. A failed
//! tick is logged and skipped; it never stops the loop.

use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
  sync::RwLock,
  time::{Interval, MissedTickBehavior},
};
use worldcount_core::{sample::WriteOutcome, store::SampleStore};
use worldcount_scrape::Scraper;
use worldcount_store_sqlite::SqliteStore;

/// Owns the writer connection and the scraper shared by both loops.
pub struct Ingestor {
  scraper:    Scraper,
  store:      RwLock<SqliteStore>,
  store_path: PathBuf,
}

impl Ingestor {
  /// `store_path` is where the writer is reopened from if its connection
  /// goes away.
  pub fn new(scraper: Scraper, store: SqliteStore, store_path: impl Into<PathBuf>) -> Self {
    Self {
      scraper,
      store: RwLock::new(store),
      store_path: store_path.into(),
    }
  }

  async fn writer(&self) -> SqliteStore { self.store.read().await.clone() }

  // ── Loops ───────────────────────────────────────────────────────────────

  /// Sample the global count every `period`, starting immediately.
  pub async fn run_global(self: Arc<Self>, period: Duration) {
    let mut ticker = ticker(period);
    loop {
      ticker.tick().await;
      self.ingest_global().await;
    }
  }

  /// Sample the world list every `period`, starting immediately.
  pub async fn run_worlds(self: Arc<Self>, period: Duration) {
    let mut ticker = ticker(period);
    loop {
      ticker.tick().await;
      self.ingest_worlds().await;
    }
  }

  // ── Single ticks ────────────────────────────────────────────────────────

  /// Scrape and record the global count once. `None` when no sample was
  /// taken this cycle.
  pub async fn ingest_global(&self) -> Option<WriteOutcome> {
    let count = match self.scraper.fetch_global_count().await {
      Ok(Some(count)) => count,
      Ok(None) => return None,
      Err(e) => {
        tracing::warn!(error = %e, "global count fetch failed; no sample this cycle");
        return None;
      }
    };
    let at = Utc::now();

    match self.writer().await.record_global(at, count).await {
      Ok(outcome) => Some(outcome),
      Err(e) => {
        self.store_failed("global count", &e).await;
        None
      }
    }
  }

  /// Scrape and record the world list once. `None` when no sample was taken
  /// this cycle.
  pub async fn ingest_worlds(&self) -> Option<WriteOutcome> {
    let worlds = match self.scraper.fetch_worlds().await {
      Ok(worlds) => worlds,
      Err(e) => {
        tracing::warn!(error = %e, "world list fetch failed; no sample this cycle");
        return None;
      }
    };
    let at = Utc::now();

    match self.writer().await.record_worlds(at, worlds).await {
      Ok(outcome) => Some(outcome),
      Err(e) => {
        self.store_failed("world scrape", &e).await;
        None
      }
    }
  }

  /// Log a failed write and, if the connection itself is gone, replace it so
  /// the next tick has somewhere to write.
  async fn store_failed(&self, what: &str, e: &worldcount_store_sqlite::Error) {
    tracing::error!(error = %e, "failed to record {what}");
    if !e.is_unavailable() {
      return;
    }

    match SqliteStore::open(&self.store_path).await {
      Ok(store) => {
        *self.store.write().await = store;
        tracing::info!(path = ?self.store_path, "reopened writer store");
      }
      Err(e) => {
        tracing::error!(error = %e, "failed to reopen writer store; retrying next tick");
      }
    }
  }
}

fn ticker(period: Duration) -> Interval {
  let mut ticker = tokio::time::interval(period);
  // A slow scrape pushes the schedule back instead of bursting to catch up.
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
  ticker
}
