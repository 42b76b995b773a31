//! [`SqliteStore`], the SQLite implementation of [`SampleStore`].

use std::{
  path::Path,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, params};
use worldcount_core::{
  dimension::{Activity, Location, Metadata},
  query::HistoryQuery,
  sample::{WorldObservation, WriteOutcome},
  series::{LatestSnapshot, SeriesPoint},
  store::SampleStore,
};

use crate::{
  Result,
  encode::{RawLatest, RawPoint, encode_ts},
  normalize::{DimensionCache, Resolver, is_unique_violation},
  schema::SCHEMA,
  sql::{self, SeriesSql, TimeColumn},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A population store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection and the dimension cache are
/// reference-counted. The cache is only touched from the connection's own
/// thread, so its lock is never contended.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn:  tokio_rusqlite::Connection,
  pub(crate) cache: Arc<Mutex<DimensionCache>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path`, run schema initialisation and load
  /// the dimension cache.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let cache = conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(DimensionCache::load(conn)?)
      })
      .await?;
    tracing::debug!(entries = cache.len(), "loaded dimension cache");
    Ok(Self { conn, cache: Arc::new(Mutex::new(cache)) })
  }

  /// Run `f` inside a write transaction with a dimension resolver. Ids the
  /// resolver creates reach the cache only if the transaction commits.
  async fn write_with<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection, &mut Resolver<'_>) -> rusqlite::Result<T>
      + Send
      + 'static,
  {
    let cache = Arc::clone(&self.cache);
    let out = self
      .conn
      .call(move |conn| {
        let mut cache = lock(&cache);
        let tx = conn.transaction()?;
        let mut resolver = Resolver::new(&cache);
        let out = f(&tx, &mut resolver)?;
        let staged = resolver.into_staged();
        tx.commit()?;
        cache.absorb(staged);
        Ok(out)
      })
      .await?;
    Ok(out)
  }

  // ── Dimension normalization ─────────────────────────────────────────────

  /// The id of the location called `name`, created on first sight.
  pub async fn resolve_location(&self, name: &str) -> Result<i64> {
    let name = name.to_owned();
    self
      .write_with(move |conn, resolver| resolver.resolve_location(conn, &name))
      .await
  }

  /// The id of the activity described as `description`, created on first
  /// sight.
  pub async fn resolve_activity(&self, description: &str) -> Result<i64> {
    let description = description.to_owned();
    self
      .write_with(move |conn, resolver| {
        resolver.resolve_activity(conn, &description)
      })
      .await
  }

  /// The world detail id for an attribute triple, creating any missing
  /// dimension rows.
  pub async fn resolve_detail(
    &self,
    location: &str,
    activity: &str,
    is_f2p: bool,
  ) -> Result<i64> {
    let location = location.to_owned();
    let activity = activity.to_owned();
    self
      .write_with(move |conn, resolver| {
        resolver.resolve(conn, &location, &activity, is_f2p)
      })
      .await
  }
}

fn lock(cache: &Mutex<DimensionCache>) -> MutexGuard<'_, DimensionCache> {
  // The cache only changes through `absorb` after a commit, so a panic
  // elsewhere cannot leave it half-updated.
  cache.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── SampleStore impl ────────────────────────────────────────────────────────

impl SampleStore for SqliteStore {
  type Error = crate::Error;

  // ── Writes ──────────────────────────────────────────────────────────────

  async fn record_global(&self, at: DateTime<Utc>, count: u32) -> Result<WriteOutcome> {
    let at_str = encode_ts(at);

    let outcome = self
      .conn
      .call(move |conn| {
        match conn.execute(
          "INSERT INTO global_samples (timestamp, count) VALUES (?1, ?2)",
          params![at_str, count],
        ) {
          Ok(_) => Ok(WriteOutcome::Recorded { rows: 1 }),
          Err(e) if is_unique_violation(&e) => Ok(WriteOutcome::AlreadyRecorded),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    match outcome {
      WriteOutcome::AlreadyRecorded => {
        tracing::debug!(%at, "global count already recorded; skipping")
      }
      _ => tracing::info!(%at, count, "recorded global count"),
    }
    Ok(outcome)
  }

  async fn record_worlds(
    &self,
    at:     DateTime<Utc>,
    worlds: Vec<WorldObservation>,
  ) -> Result<WriteOutcome> {
    if worlds.is_empty() {
      return Ok(WriteOutcome::Skipped);
    }

    let at_str = encode_ts(at);

    let outcome = self
      .write_with(move |conn, resolver| {
        let scrape_id = match conn.execute(
          "INSERT INTO scrape_events (timestamp) VALUES (?1)",
          params![at_str],
        ) {
          Ok(_) => conn.last_insert_rowid(),
          Err(e) if is_unique_violation(&e) => {
            return Ok(WriteOutcome::AlreadyRecorded);
          }
          Err(e) => return Err(e),
        };

        let mut insert = conn.prepare_cached(
          "INSERT INTO world_samples (scrape_id, world_number, player_count, detail_id)
           VALUES (?1, ?2, ?3, ?4)",
        )?;
        for w in &worlds {
          let detail_id = resolver.resolve(conn, &w.location, &w.activity, w.is_f2p)?;
          insert.execute(params![scrape_id, w.world_number, w.player_count, detail_id])?;
        }

        Ok(WriteOutcome::Recorded { rows: worlds.len() })
      })
      .await?;

    match outcome {
      WriteOutcome::Recorded { rows } => {
        tracing::info!(%at, worlds = rows, "recorded world scrape")
      }
      _ => tracing::debug!(%at, "world scrape already recorded; skipping"),
    }
    Ok(outcome)
  }

  // ── Reads ───────────────────────────────────────────────────────────────

  async fn latest(&self) -> Result<Option<LatestSnapshot>> {
    let raw: Option<RawLatest> = self
      .conn
      .call(|conn| {
        let global: Option<(String, i64)> = conn
          .query_row(
            "SELECT timestamp, count FROM global_samples
             ORDER BY timestamp DESC LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;
        let Some((timestamp, count)) = global else {
          return Ok(None);
        };

        let breakdown: Option<(String, i64, i64)> = conn
          .query_row(
            "SELECT
               se.timestamp,
               COALESCE(SUM(CASE WHEN det.is_f2p = 1 THEN ws.player_count END), 0),
               COALESCE(SUM(CASE WHEN det.is_f2p = 0 THEN ws.player_count END), 0)
             FROM (SELECT id, timestamp FROM scrape_events
                   ORDER BY timestamp DESC LIMIT 1) se
             LEFT JOIN world_samples ws  ON ws.scrape_id = se.id
             LEFT JOIN world_details det ON det.id       = ws.detail_id
             GROUP BY se.id",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
          )
          .optional()?;

        Ok(Some(RawLatest { timestamp, count, breakdown }))
      })
      .await?;

    raw.map(RawLatest::into_snapshot).transpose()
  }

  async fn metadata(&self) -> Result<Metadata> {
    let metadata = self
      .conn
      .call(|conn| {
        let locations = conn
          .prepare("SELECT id, name FROM locations ORDER BY name")?
          .query_map([], |r| Ok(Location { id: r.get(0)?, name: r.get(1)? }))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let activities = conn
          .prepare("SELECT id, description FROM activities ORDER BY description")?
          .query_map([], |r| {
            Ok(Activity { id: r.get(0)?, description: r.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let worlds = conn
          .prepare("SELECT DISTINCT world_number FROM world_samples ORDER BY world_number")?
          .query_map([], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<u32>>>()?;

        Ok(Metadata { locations, activities, worlds })
      })
      .await?;

    Ok(metadata)
  }

  async fn history(&self, query: &HistoryQuery) -> Result<Vec<SeriesPoint>> {
    let SeriesSql { sql, params, time, reverse } = sql::build(query);

    let raws: Vec<RawPoint> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(match time {
              TimeColumn::Stamped => RawPoint::Stamped {
                timestamp: row.get(0)?,
                count:     row.get(1)?,
              },
              TimeColumn::Epoch => RawPoint::Bucket {
                start: row.get(0)?,
                count: row.get(1)?,
              },
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut points = raws
      .into_iter()
      .map(RawPoint::into_point)
      .collect::<Result<Vec<_>>>()?;
    // Tail queries read newest first; callers always get oldest first.
    if reverse {
      points.reverse();
    }
    Ok(points)
  }
}
