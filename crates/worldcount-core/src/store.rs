//! The `SampleStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `worldcount-store-sqlite`). The HTTP layer and the ingestion scheduler
//! depend on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  dimension::Metadata,
  query::HistoryQuery,
  sample::{Cycle, CycleReport, WorldObservation, WriteOutcome},
  series::{LatestSnapshot, SeriesPoint},
};

/// Abstraction over a population store backend.
///
/// Writes are append-only. Re-recording a timestamp that is already stored is
/// reported as [`WriteOutcome::AlreadyRecorded`], never as an error, so a
/// retrying caller can replay a cycle safely.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait SampleStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Append one global count.
  fn record_global(
    &self,
    at: DateTime<Utc>,
    count: u32,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + '_;

  /// Append one scrape of the world list as a single atomic unit: either the
  /// scrape event and every observation land, or nothing does.
  ///
  /// An empty list records nothing and reports [`WriteOutcome::Skipped`].
  fn record_worlds(
    &self,
    at: DateTime<Utc>,
    worlds: Vec<WorldObservation>,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + '_;

  /// Record both halves of a cycle independently of each other.
  fn record_cycle(
    &self,
    cycle: Cycle,
  ) -> impl Future<Output = CycleReport<Self::Error>> + Send + '_ {
    async move {
      let global = match cycle.global_count {
        Some(count) => self.record_global(cycle.timestamp, count).await,
        None => Ok(WriteOutcome::Skipped),
      };
      let worlds = self.record_worlds(cycle.timestamp, cycle.worlds).await;
      CycleReport { global, worlds }
    }
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  /// The most recent global count with the latest F2P/members split.
  /// Returns `None` until a global count has been recorded.
  fn latest(
    &self,
  ) -> impl Future<Output = Result<Option<LatestSnapshot>, Self::Error>> + Send + '_;

  /// Known locations, activities and world numbers.
  fn metadata(
    &self,
  ) -> impl Future<Output = Result<Metadata, Self::Error>> + Send + '_;

  /// Execute a validated history query. Points are always returned in
  /// ascending time order.
  fn history<'a>(
    &'a self,
    query: &'a HistoryQuery,
  ) -> impl Future<Output = Result<Vec<SeriesPoint>, Self::Error>> + Send + 'a;
}
