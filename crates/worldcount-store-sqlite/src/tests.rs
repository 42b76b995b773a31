//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, TimeZone as _, Utc};
use worldcount_core::{
  query::{
    Aggregation, Bucket, HistoryQuery, LATEST_TIMESTAMP_SECS, Shape, Stream,
    TimeRange, WorldFilter, parse_timestamp,
  },
  sample::{Cycle, WorldObservation, WriteOutcome},
  series::SeriesPoint,
  store::SampleStore,
};

use crate::{
  SqliteStore,
  encode::{encode_lower_bound, encode_ts},
};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 3, d, h, mi, s).unwrap()
}

fn world(
  number: u32,
  players: u32,
  location: &str,
  is_f2p: bool,
) -> WorldObservation {
  WorldObservation::new(number, players, location, is_f2p, "-")
}

async fn count_rows(s: &SqliteStore, table: &'static str) -> i64 {
  s.conn
    .call(move |conn| {
      let sql = format!("SELECT COUNT(*) FROM {table}");
      Ok(conn.query_row(&sql, [], |r| r.get(0))?)
    })
    .await
    .unwrap()
}

fn bucketed(stream: Stream, bucket: Bucket, agg: Aggregation) -> HistoryQuery {
  HistoryQuery {
    stream,
    shape: Shape::Bucketed { range: TimeRange::default(), bucket, agg },
  }
}

fn counts(points: &[SeriesPoint]) -> Vec<i64> {
  points.iter().map(|p| p.count).collect()
}

// ─── Dimension normalization ─────────────────────────────────────────────────

#[tokio::test]
async fn resolve_detail_is_idempotent() {
  let s = store().await;

  let a = s.resolve_detail("Germany", "Trade", false).await.unwrap();
  let b = s.resolve_detail("Germany", "Trade", false).await.unwrap();
  assert_eq!(a, b);

  let c = s.resolve_detail("Germany", "Trade", true).await.unwrap();
  assert_ne!(a, c);

  assert_eq!(count_rows(&s, "locations").await, 1);
  assert_eq!(count_rows(&s, "activities").await, 1);
  assert_eq!(count_rows(&s, "world_details").await, 2);
}

#[tokio::test]
async fn resolve_adopts_rows_written_behind_the_cache() {
  let s = store().await;

  // Another writer inserts the same values without going through this
  // store's cache.
  let (location_id, activity_id, detail_id) = s
    .conn
    .call(|conn| {
      conn.execute("INSERT INTO locations (name) VALUES ('Germany')", [])?;
      let location_id = conn.last_insert_rowid();
      conn.execute("INSERT INTO activities (description) VALUES ('PvP')", [])?;
      let activity_id = conn.last_insert_rowid();
      conn.execute(
        "INSERT INTO world_details (location_id, is_f2p, activity_id)
         VALUES (?1, 1, ?2)",
        [location_id, activity_id],
      )?;
      Ok((location_id, activity_id, conn.last_insert_rowid()))
    })
    .await
    .unwrap();

  assert_eq!(s.resolve_location("Germany").await.unwrap(), location_id);
  assert_eq!(s.resolve_activity("PvP").await.unwrap(), activity_id);
  assert_eq!(
    s.resolve_detail("Germany", "PvP", true).await.unwrap(),
    detail_id
  );
  assert_eq!(count_rows(&s, "world_details").await, 1);
}

#[tokio::test]
async fn cache_is_reloaded_on_open() {
  let path = std::env::temp_dir()
    .join(format!("worldcount-reload-{}.db", std::process::id()));
  let _ = std::fs::remove_file(&path);

  let first = SqliteStore::open(&path).await.unwrap();
  let id = first.resolve_detail("Finland", "-", false).await.unwrap();
  drop(first);

  let second = SqliteStore::open(&path).await.unwrap();
  // One location, one activity, one detail.
  assert_eq!(second.cache.lock().unwrap().len(), 3);
  assert_eq!(second.resolve_detail("Finland", "-", false).await.unwrap(), id);
  assert_eq!(count_rows(&second, "world_details").await, 1);
  drop(second);

  for suffix in ["", "-wal", "-shm"] {
    let mut p = path.clone().into_os_string();
    p.push(suffix);
    let _ = std::fs::remove_file(p);
  }
}

// ─── Writes ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn record_worlds_writes_every_row() {
  let s = store().await;

  let outcome = s
    .record_worlds(at(1, 12, 0, 0), vec![
      world(302, 1500, "United Kingdom", false),
      world(301, 800, "United States", true),
      world(308, 1200, "United Kingdom", true),
    ])
    .await
    .unwrap();
  assert_eq!(outcome, WriteOutcome::Recorded { rows: 3 });

  assert_eq!(count_rows(&s, "scrape_events").await, 1);
  assert_eq!(count_rows(&s, "world_samples").await, 3);
  assert_eq!(count_rows(&s, "locations").await, 2);
  assert_eq!(count_rows(&s, "world_details").await, 3);
}

#[tokio::test]
async fn empty_world_list_is_skipped() {
  let s = store().await;
  let outcome = s.record_worlds(at(1, 12, 0, 0), vec![]).await.unwrap();
  assert_eq!(outcome, WriteOutcome::Skipped);
  assert_eq!(count_rows(&s, "scrape_events").await, 0);
}

#[tokio::test]
async fn repeated_timestamps_are_already_recorded() {
  let s = store().await;
  let t = at(1, 12, 0, 0);

  assert_eq!(
    s.record_global(t, 100).await.unwrap(),
    WriteOutcome::Recorded { rows: 1 }
  );
  assert_eq!(
    s.record_global(t, 200).await.unwrap(),
    WriteOutcome::AlreadyRecorded
  );

  let worlds = vec![world(301, 10, "Germany", true)];
  s.record_worlds(t, worlds.clone()).await.unwrap();
  assert_eq!(
    s.record_worlds(t, worlds).await.unwrap(),
    WriteOutcome::AlreadyRecorded
  );

  assert_eq!(count_rows(&s, "global_samples").await, 1);
  assert_eq!(count_rows(&s, "scrape_events").await, 1);
  assert_eq!(count_rows(&s, "world_samples").await, 1);

  let latest = s.latest().await.unwrap().unwrap();
  assert_eq!(latest.count, 100);
}

#[tokio::test]
async fn failed_scrape_leaves_nothing_behind() {
  let s = store().await;

  // The second row repeats world 301, which violates the primary key after
  // the scrape event, the new location and the first sample were written.
  let err = s
    .record_worlds(at(1, 12, 0, 0), vec![
      world(301, 10, "Atlantis", false),
      world(301, 20, "Atlantis", false),
    ])
    .await;
  assert!(err.is_err());

  assert_eq!(count_rows(&s, "scrape_events").await, 0);
  assert_eq!(count_rows(&s, "world_samples").await, 0);
  assert_eq!(count_rows(&s, "locations").await, 0);
  assert_eq!(count_rows(&s, "world_details").await, 0);

  // Ids from the rolled-back transaction must not have reached the cache,
  // or this insert would reference a missing detail row.
  let outcome = s
    .record_worlds(at(1, 12, 0, 0), vec![world(301, 10, "Atlantis", false)])
    .await
    .unwrap();
  assert_eq!(outcome, WriteOutcome::Recorded { rows: 1 });
  assert_eq!(count_rows(&s, "locations").await, 1);
}

#[tokio::test]
async fn cycle_halves_are_independent() {
  let s = store().await;

  let report = s
    .record_cycle(Cycle {
      timestamp:    at(1, 12, 0, 0),
      global_count: None,
      worlds:       vec![world(301, 10, "Germany", true)],
    })
    .await;
  assert_eq!(report.global.unwrap(), WriteOutcome::Skipped);
  assert_eq!(report.worlds.unwrap(), WriteOutcome::Recorded { rows: 1 });

  let report = s
    .record_cycle(Cycle {
      timestamp:    at(1, 12, 5, 0),
      global_count: Some(500),
      worlds:       vec![
        world(302, 10, "Germany", true),
        world(302, 10, "Germany", true),
      ],
    })
    .await;
  assert_eq!(report.global.unwrap(), WriteOutcome::Recorded { rows: 1 });
  assert!(report.worlds.is_err());

  assert_eq!(count_rows(&s, "global_samples").await, 1);
  assert_eq!(count_rows(&s, "scrape_events").await, 1);
}

// ─── Latest ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn latest_is_none_when_empty() {
  let s = store().await;
  assert!(s.latest().await.unwrap().is_none());
}

#[tokio::test]
async fn latest_without_world_scrape_has_zero_split() {
  let s = store().await;
  s.record_global(at(1, 12, 0, 0), 90_000).await.unwrap();

  let latest = s.latest().await.unwrap().unwrap();
  assert_eq!(latest.count, 90_000);
  assert_eq!(latest.f2p_count, 0);
  assert_eq!(latest.members_count, 0);
  assert!(latest.breakdown_timestamp.is_none());
}

#[tokio::test]
async fn latest_splits_newest_scrape_by_membership() {
  let s = store().await;

  s.record_worlds(at(1, 11, 30, 0), vec![world(301, 999, "Germany", true)])
    .await
    .unwrap();
  s.record_worlds(at(1, 12, 0, 0), vec![
    world(301, 10, "Germany", true),
    world(308, 5, "Germany", true),
    world(302, 20, "Germany", false),
  ])
  .await
  .unwrap();
  s.record_global(at(1, 11, 55, 0), 80_000).await.unwrap();
  s.record_global(at(1, 12, 5, 0), 81_000).await.unwrap();

  let latest = s.latest().await.unwrap().unwrap();
  assert_eq!(latest.timestamp, at(1, 12, 5, 0));
  assert_eq!(latest.count, 81_000);
  assert_eq!(latest.f2p_count, 15);
  assert_eq!(latest.members_count, 20);
  assert_eq!(latest.breakdown_timestamp, Some(at(1, 12, 0, 0)));
}

// ─── Metadata ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn metadata_is_sorted() {
  let s = store().await;
  s.record_worlds(at(1, 12, 0, 0), vec![
    WorldObservation::new(420, 1, "United States", false, "Trade"),
    WorldObservation::new(301, 1, "Germany", true, "-"),
    WorldObservation::new(350, 1, "Australia", false, "Clan Wars"),
  ])
  .await
  .unwrap();

  let meta = s.metadata().await.unwrap();
  let names: Vec<_> = meta.locations.iter().map(|l| l.name.as_str()).collect();
  assert_eq!(names, ["Australia", "Germany", "United States"]);
  let activities: Vec<_> =
    meta.activities.iter().map(|a| a.description.as_str()).collect();
  assert_eq!(activities, ["-", "Clan Wars", "Trade"]);
  assert_eq!(meta.worlds, [301, 350, 420]);
}

#[tokio::test]
async fn metadata_is_empty_for_new_store() {
  let s = store().await;
  let meta = s.metadata().await.unwrap();
  assert!(meta.locations.is_empty());
  assert!(meta.activities.is_empty());
  assert!(meta.worlds.is_empty());
}

// ─── Global history ──────────────────────────────────────────────────────────

#[tokio::test]
async fn tail_returns_newest_points_oldest_first() {
  let s = store().await;
  for (i, minute) in [0, 5, 10, 15, 20].into_iter().enumerate() {
    s.record_global(at(1, 12, minute, 0), 100 + i as u32).await.unwrap();
  }

  let points = s.history(&HistoryQuery::tail(3)).await.unwrap();
  let stamps: Vec<_> = points.iter().map(|p| p.timestamp).collect();
  assert_eq!(stamps, [at(1, 12, 10, 0), at(1, 12, 15, 0), at(1, 12, 20, 0)]);
  assert_eq!(counts(&points), [102, 103, 104]);
}

#[tokio::test]
async fn raw_range_bounds_are_inclusive() {
  let s = store().await;
  for minute in [0, 5, 10, 15, 20] {
    s.record_global(at(1, 12, minute, 0), minute).await.unwrap();
  }

  let query = HistoryQuery {
    stream: Stream::Global,
    shape:  Shape::Raw {
      range: TimeRange {
        start: Some(at(1, 12, 5, 0)),
        end:   Some(at(1, 12, 15, 0)),
      },
    },
  };
  let points = s.history(&query).await.unwrap();
  assert_eq!(counts(&points), [5, 10, 15]);
}

#[tokio::test]
async fn fractional_lower_bound_excludes_earlier_second() {
  let s = store().await;
  s.record_global(at(1, 12, 0, 0), 1).await.unwrap();
  s.record_global(at(1, 12, 0, 1), 2).await.unwrap();

  let start = at(1, 12, 0, 0) + chrono::TimeDelta::milliseconds(500);
  let query = HistoryQuery {
    stream: Stream::Global,
    shape:  Shape::Raw { range: TimeRange { start: Some(start), end: None } },
  };
  let points = s.history(&query).await.unwrap();
  assert_eq!(counts(&points), [2]);
}

#[tokio::test]
async fn lower_bound_at_latest_accepted_second_matches_nothing() {
  let s = store().await;
  s.record_global(at(1, 12, 0, 0), 1).await.unwrap();

  let start = parse_timestamp("9999-12-31T23:59:59Z").unwrap();
  assert_eq!(start.timestamp(), LATEST_TIMESTAMP_SECS);
  let query = HistoryQuery {
    stream: Stream::Global,
    shape:  Shape::Raw { range: TimeRange { start: Some(start), end: None } },
  };
  assert!(s.history(&query).await.unwrap().is_empty());
}

#[test]
fn lower_bound_in_last_representable_second_does_not_overflow() {
  let bound = encode_lower_bound(DateTime::<Utc>::MAX_UTC);
  assert_eq!(bound, encode_ts(DateTime::<Utc>::MAX_UTC));
}

#[tokio::test]
async fn minute_buckets_align_to_epoch() {
  let s = store().await;
  let stamps = [
    at(1, 12, 1, 7),
    at(1, 12, 4, 59),
    at(1, 12, 5, 0),
    at(1, 12, 13, 30),
  ];
  for (i, t) in stamps.iter().enumerate() {
    s.record_global(*t, 10 * (i as u32 + 1)).await.unwrap();
  }

  let bucket = Bucket::Minutes(5);
  let points = s
    .history(&bucketed(Stream::Global, bucket, Aggregation::Max))
    .await
    .unwrap();

  for p in &points {
    assert_eq!(p.timestamp.timestamp() % 300, 0);
  }
  let starts: Vec<_> = points.iter().map(|p| p.timestamp).collect();
  assert_eq!(starts, [at(1, 12, 0, 0), at(1, 12, 5, 0), at(1, 12, 10, 0)]);
  assert_eq!(starts[2], bucket.start_of(stamps[3]));
  assert_eq!(counts(&points), [20, 30, 40]);
}

#[tokio::test]
async fn calendar_buckets_truncate_utc_fields() {
  let s = store().await;
  // 2024-03-06 is a Wednesday; the week starts on Sunday the 3rd.
  s.record_global(at(6, 10, 47, 0), 7).await.unwrap();

  let cases = [
    (Bucket::Hour, at(6, 10, 0, 0)),
    (Bucket::Day, at(6, 0, 0, 0)),
    (Bucket::Week, at(3, 0, 0, 0)),
    (Bucket::Month, at(1, 0, 0, 0)),
  ];
  for (bucket, expected) in cases {
    let points = s
      .history(&bucketed(Stream::Global, bucket, Aggregation::Max))
      .await
      .unwrap();
    assert_eq!(points.len(), 1, "{bucket:?}");
    assert_eq!(points[0].timestamp, expected, "{bucket:?}");
    assert_eq!(bucket.start_of(at(6, 10, 47, 0)), expected, "{bucket:?}");
  }
}

#[tokio::test]
async fn week_bucket_of_a_sunday_is_that_sunday() {
  let s = store().await;
  s.record_global(at(10, 23, 59, 59), 1).await.unwrap();
  s.record_global(at(9, 23, 59, 59), 2).await.unwrap();

  let points = s
    .history(&bucketed(Stream::Global, Bucket::Week, Aggregation::Max))
    .await
    .unwrap();
  let starts: Vec<_> = points.iter().map(|p| p.timestamp).collect();
  assert_eq!(starts, [at(3, 0, 0, 0), at(10, 0, 0, 0)]);
}

#[tokio::test]
async fn average_rounds_half_away_from_zero() {
  let s = store().await;

  let groups: [(&[u32], i64); 6] = [
    (&[10, 11], 11),
    (&[1, 2], 2),
    (&[2, 3], 3),
    (&[10, 10, 11], 10),
    (&[10, 12], 11),
    (&[7], 7),
  ];
  for (hour, (values, _)) in groups.iter().enumerate() {
    for (minute, value) in values.iter().enumerate() {
      s.record_global(at(1, hour as u32, minute as u32, 0), *value)
        .await
        .unwrap();
    }
  }

  let points = s
    .history(&bucketed(Stream::Global, Bucket::Hour, Aggregation::Avg))
    .await
    .unwrap();
  let expected: Vec<i64> = groups.iter().map(|(_, avg)| *avg).collect();
  assert_eq!(counts(&points), expected);
}

#[tokio::test]
async fn bucketed_range_limits_input_rows() {
  let s = store().await;
  s.record_global(at(1, 10, 0, 0), 50).await.unwrap();
  s.record_global(at(1, 10, 30, 0), 10).await.unwrap();
  s.record_global(at(1, 10, 45, 0), 20).await.unwrap();

  let query = HistoryQuery {
    stream: Stream::Global,
    shape:  Shape::Bucketed {
      range:  TimeRange { start: Some(at(1, 10, 15, 0)), end: None },
      bucket: Bucket::Hour,
      agg:    Aggregation::Max,
    },
  };
  let points = s.history(&query).await.unwrap();
  assert_eq!(counts(&points), [20]);
  assert_eq!(points[0].timestamp, at(1, 10, 0, 0));
}

// ─── World history ───────────────────────────────────────────────────────────

async fn seed_worlds(s: &SqliteStore) {
  s.record_worlds(at(1, 12, 0, 0), vec![
    world(93, 40, "Germany", true),
    world(301, 100, "United Kingdom", false),
    world(302, 200, "United Kingdom", true),
  ])
  .await
  .unwrap();
  s.record_worlds(at(1, 12, 30, 0), vec![
    world(93, 45, "Germany", true),
    world(301, 110, "United Kingdom", false),
    world(302, 220, "United Kingdom", true),
  ])
  .await
  .unwrap();
}

fn worlds_raw(filter: WorldFilter) -> HistoryQuery {
  HistoryQuery {
    stream: Stream::Worlds(filter),
    shape:  Shape::Raw { range: TimeRange::default() },
  }
}

#[tokio::test]
async fn single_world_reports_raw_counts() {
  let s = store().await;
  seed_worlds(&s).await;

  let filter = WorldFilter { world: Some(93), ..Default::default() };
  let points = s.history(&worlds_raw(filter)).await.unwrap();
  assert_eq!(counts(&points), [40, 45]);
  assert_eq!(points[0].timestamp, at(1, 12, 0, 0));
}

#[tokio::test]
async fn location_filter_sums_per_scrape() {
  let s = store().await;
  seed_worlds(&s).await;

  let uk = s.resolve_location("United Kingdom").await.unwrap();
  let filter = WorldFilter { location_id: Some(uk), ..Default::default() };
  let points = s.history(&worlds_raw(filter)).await.unwrap();
  assert_eq!(counts(&points), [300, 330]);
}

#[tokio::test]
async fn membership_filter_sums_per_scrape() {
  let s = store().await;
  seed_worlds(&s).await;

  let f2p = WorldFilter { is_f2p: Some(true), ..Default::default() };
  let points = s.history(&worlds_raw(f2p)).await.unwrap();
  assert_eq!(counts(&points), [240, 265]);

  let uk = s.resolve_location("United Kingdom").await.unwrap();
  let uk_members = WorldFilter {
    location_id: Some(uk),
    is_f2p: Some(false),
    ..Default::default()
  };
  let points = s.history(&worlds_raw(uk_members)).await.unwrap();
  assert_eq!(counts(&points), [100, 110]);
}

#[tokio::test]
async fn unmatched_filter_returns_empty_series() {
  let s = store().await;
  seed_worlds(&s).await;

  let filter = WorldFilter { world: Some(999), ..Default::default() };
  assert!(s.history(&worlds_raw(filter)).await.unwrap().is_empty());
}

#[tokio::test]
async fn world_stream_buckets_per_scrape_totals() {
  let s = store().await;
  seed_worlds(&s).await;

  let filter = WorldFilter { is_f2p: Some(true), ..Default::default() };
  let max = s
    .history(&bucketed(Stream::Worlds(filter), Bucket::Hour, Aggregation::Max))
    .await
    .unwrap();
  assert_eq!(max, [SeriesPoint { timestamp: at(1, 12, 0, 0), count: 265 }]);

  let avg = s
    .history(&bucketed(Stream::Worlds(filter), Bucket::Hour, Aggregation::Avg))
    .await
    .unwrap();
  // (240 + 265) / 2 = 252.5
  assert_eq!(counts(&avg), [253]);
}

#[tokio::test]
async fn world_tail_returns_latest_scrapes() {
  let s = store().await;
  seed_worlds(&s).await;

  let query = HistoryQuery {
    stream: Stream::Worlds(WorldFilter::default()),
    shape:  Shape::Tail { limit: 1 },
  };
  let points = s.history(&query).await.unwrap();
  assert_eq!(points, [SeriesPoint { timestamp: at(1, 12, 30, 0), count: 375 }]);
}
