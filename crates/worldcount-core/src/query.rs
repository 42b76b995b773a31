//! History queries: parameters, validation and the structured query.
//!
//! Raw request parameters ([`HistoryParams`]) are validated once into a
//! [`HistoryQuery`], a small tagged description of which fact stream to read,
//! which rows to keep and how to group them. Storage backends translate a
//! `HistoryQuery` into their own query language; they never see the raw
//! parameters.

use std::str::FromStr;

use chrono::{
  DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike,
  Utc,
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Raw rows returned by a tail query when no `limit` is given; one day at a
/// five-minute cadence.
pub const DEFAULT_LIMIT: u32 = 288;

/// Bucket width for `unit=minute` when no `step` is given.
pub const DEFAULT_STEP_MINUTES: u32 = 5;

/// Longest span a `unit=minute` query may cover.
pub const MAX_MINUTE_SPAN_DAYS: i64 = 30;

/// Window used by a `unit=minute` query that names no start.
pub const DEFAULT_MINUTE_WINDOW_HOURS: i64 = 24;

/// `0000-01-01T00:00:00Z`, the earliest instant a client may name.
pub const EARLIEST_TIMESTAMP_SECS: i64 = -62_167_219_200;

/// `9999-12-31T23:59:59Z`, the latest instant a client may name.
///
/// Stored timestamps carry four-digit years and compare as text, which only
/// orders correctly between these two.
pub const LATEST_TIMESTAMP_SECS: i64 = 253_402_300_799;

// ─── Units and aggregation ───────────────────────────────────────────────────

/// The grouping unit requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
  Minute,
  Hour,
  Day,
  Week,
  Month,
}

impl FromStr for Unit {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "minute" => Ok(Self::Minute),
      "hour" => Ok(Self::Hour),
      "day" => Ok(Self::Day),
      "week" => Ok(Self::Week),
      "month" => Ok(Self::Month),
      other => Err(Error::UnknownUnit(other.to_owned())),
    }
  }
}

/// How the samples inside one bucket are reduced to a single count.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
  #[default]
  Max,
  /// Arithmetic mean rounded to the nearest integer, halves away from zero.
  Avg,
}

impl FromStr for Aggregation {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "max" => Ok(Self::Max),
      "avg" => Ok(Self::Avg),
      other => Err(Error::UnknownAggregation(other.to_owned())),
    }
  }
}

// ─── Buckets ─────────────────────────────────────────────────────────────────

/// A bucket grid.
///
/// Two alignment rules coexist: `Minutes` buckets are fixed-width intervals
/// counted from the Unix epoch, while the other variants truncate UTC
/// calendar fields. Stored series were bucketed this way from the start, so
/// the two rules are kept apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
  /// Fixed width in minutes, aligned to the epoch.
  Minutes(u32),
  Hour,
  Day,
  /// Weeks starting on Sunday.
  Week,
  Month,
}

impl Bucket {
  /// The bucket grid for `unit`; `step` only matters for minutes.
  pub fn for_unit(unit: Unit, step: Option<u32>) -> Result<Self> {
    Ok(match unit {
      Unit::Minute => match step.unwrap_or(DEFAULT_STEP_MINUTES) {
        0 => return Err(Error::InvalidStep),
        m => Self::Minutes(m),
      },
      Unit::Hour => Self::Hour,
      Unit::Day => Self::Day,
      Unit::Week => Self::Week,
      Unit::Month => Self::Month,
    })
  }

  /// The start of the bucket containing `ts`.
  pub fn start_of(self, ts: DateTime<Utc>) -> DateTime<Utc> {
    let date = ts.date_naive();
    let midnight = date.and_time(NaiveTime::MIN).and_utc();
    match self {
      Self::Minutes(m) => {
        let width = i64::from(m) * 60;
        ts - TimeDelta::seconds(ts.timestamp().rem_euclid(width))
          - TimeDelta::nanoseconds(i64::from(ts.timestamp_subsec_nanos()))
      }
      Self::Hour => midnight + TimeDelta::hours(i64::from(ts.hour())),
      Self::Day => midnight,
      Self::Week => {
        let back = date.weekday().num_days_from_sunday();
        midnight - TimeDelta::days(i64::from(back))
      }
      Self::Month => midnight - TimeDelta::days(i64::from(date.day0())),
    }
  }
}

// ─── Structured query ────────────────────────────────────────────────────────

/// Inclusive bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
  pub start: Option<DateTime<Utc>>,
  pub end:   Option<DateTime<Utc>>,
}

/// Filters over the per-world fact stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldFilter {
  /// A single world; its raw player count is reported per scrape.
  pub world:       Option<u32>,
  pub location_id: Option<i64>,
  pub is_f2p:      Option<bool>,
}

impl WorldFilter {
  pub fn is_empty(&self) -> bool {
    self.world.is_none() && self.location_id.is_none() && self.is_f2p.is_none()
  }

  /// Whether the filter needs the world detail attributes.
  pub fn needs_details(&self) -> bool {
    self.location_id.is_some() || self.is_f2p.is_some()
  }
}

/// Which fact table a query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
  /// The site-wide counter.
  Global,
  /// Per-world samples. Without `world` the counts of all matching worlds are
  /// summed per scrape.
  Worlds(WorldFilter),
}

/// Which rows come back and how they are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
  /// The most recent `limit` raw points, returned oldest first.
  Tail { limit: u32 },
  /// Every raw point inside `range`, ascending.
  Raw { range: TimeRange },
  /// One point per bucket inside `range`, ascending.
  Bucketed {
    range:  TimeRange,
    bucket: Bucket,
    agg:    Aggregation,
  },
}

/// A validated history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
  pub stream: Stream,
  pub shape:  Shape,
}

impl HistoryQuery {
  /// The most recent `limit` global samples.
  pub fn tail(limit: u32) -> Self {
    Self { stream: Stream::Global, shape: Shape::Tail { limit } }
  }

  /// Validate raw request parameters.
  ///
  /// `now` anchors the span guard and the default minute window.
  pub fn from_params(params: &HistoryParams, now: DateTime<Utc>) -> Result<Self> {
    let start = params.start.as_deref().map(parse_timestamp).transpose()?;
    let end = params.end.as_deref().map(parse_timestamp).transpose()?;
    let unit = params.unit.as_deref().map(str::parse::<Unit>).transpose()?;
    let agg = params
      .agg
      .as_deref()
      .map(str::parse::<Aggregation>)
      .transpose()?
      .unwrap_or_default();
    let is_f2p = params.is_f2p.as_deref().map(parse_flag).transpose()?;
    let limit = match params.limit {
      Some(0) => return Err(Error::InvalidLimit),
      Some(n) => n,
      None => DEFAULT_LIMIT,
    };

    let filter = WorldFilter {
      world: params.world_id,
      location_id: params.location_id,
      is_f2p,
    };
    let stream = if filter.is_empty() {
      Stream::Global
    } else {
      Stream::Worlds(filter)
    };

    let mut range = TimeRange { start, end };
    let shape = match unit {
      None if start.is_none() && end.is_none() => Shape::Tail { limit },
      None => Shape::Raw { range },
      Some(unit) => {
        let bucket = Bucket::for_unit(unit, params.step)?;
        if unit == Unit::Minute {
          check_minute_span(&range, now)?;
          if range.start.is_none() {
            let anchor = range.end.unwrap_or(now);
            let start = anchor
              .checked_sub_signed(TimeDelta::hours(DEFAULT_MINUTE_WINDOW_HOURS))
              .ok_or_else(|| Error::InvalidTimestamp(anchor.to_rfc3339()))?;
            range.start = Some(start);
          }
        }
        Shape::Bucketed { range, bucket, agg }
      }
    };

    Ok(Self { stream, shape })
  }
}

/// Reject minute-granularity requests over more than
/// [`MAX_MINUTE_SPAN_DAYS`]. Requests without a start are always allowed.
fn check_minute_span(range: &TimeRange, now: DateTime<Utc>) -> Result<()> {
  let span = match (range.start, range.end) {
    (Some(start), Some(end)) => end - start,
    (Some(start), None) => now - start,
    (None, _) => return Ok(()),
  };
  if span > TimeDelta::days(MAX_MINUTE_SPAN_DAYS) {
    return Err(Error::SpanTooLong { max_days: MAX_MINUTE_SPAN_DAYS });
  }
  Ok(())
}

// ─── Raw parameters ──────────────────────────────────────────────────────────

/// History request parameters exactly as a client sends them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
  pub start:       Option<String>,
  pub end:         Option<String>,
  pub limit:       Option<u32>,
  pub unit:        Option<String>,
  pub step:        Option<u32>,
  pub agg:         Option<String>,
  pub world_id:    Option<u32>,
  pub location_id: Option<i64>,
  /// `1`/`0`/`true`/`false`.
  pub is_f2p:      Option<String>,
}

/// Parse a client-supplied timestamp as UTC.
///
/// Accepts RFC 3339 (offsets are converted), naive date-times with `T` or a
/// space as separator (taken as UTC, optional trailing `Z`), and bare dates
/// (midnight UTC). Instants outside four-digit years are rejected, see
/// [`LATEST_TIMESTAMP_SECS`].
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
  parse_any(raw.trim())
    .filter(in_accepted_range)
    .ok_or_else(|| Error::InvalidTimestamp(raw.to_owned()))
}

fn in_accepted_range(dt: &DateTime<Utc>) -> bool {
  let secs = dt.timestamp();
  // A fractional part in the last second would round up into year 10000.
  let past_latest = secs > LATEST_TIMESTAMP_SECS
    || (secs == LATEST_TIMESTAMP_SECS && dt.timestamp_subsec_nanos() > 0);
  secs >= EARLIEST_TIMESTAMP_SECS && !past_latest
}

fn parse_any(s: &str) -> Option<DateTime<Utc>> {
  const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
  ];

  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }

  let naive = s.strip_suffix('Z').unwrap_or(s);
  for fmt in NAIVE_FORMATS {
    if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
      return Some(dt.and_utc());
    }
  }
  NaiveDate::parse_from_str(naive, "%Y-%m-%d")
    .ok()
    .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

fn parse_flag(raw: &str) -> Result<bool> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "1" | "true" => Ok(true),
    "0" | "false" => Ok(false),
    _ => Err(Error::InvalidFlag(raw.to_owned())),
  }
}
