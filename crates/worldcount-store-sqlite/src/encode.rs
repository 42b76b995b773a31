//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as `YYYY-MM-DDTHH:MM:SSZ`: UTC, whole seconds, fixed
//! width. Text order is therefore chronological order, and SQLite's date
//! functions read the values directly.

use chrono::{DateTime, SubsecRound as _, TimeDelta, Utc};
use worldcount_core::series::{LatestSnapshot, SeriesPoint};

use crate::{Error, Result};

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Encode a sample time, dropping any sub-second part.
pub fn encode_ts(dt: DateTime<Utc>) -> String { dt.format(TS_FORMAT).to_string() }

/// Encode an inclusive lower bound. Fractional seconds round up so a bound
/// never admits a stored second that lies before it. The last representable
/// second has nothing after it and is kept as is.
pub fn encode_lower_bound(dt: DateTime<Utc>) -> String {
  let whole = dt.trunc_subsecs(0);
  if whole == dt {
    return encode_ts(dt);
  }
  let next = whole.checked_add_signed(TimeDelta::seconds(1)).unwrap_or(whole);
  encode_ts(next)
}

/// Encode an inclusive upper bound.
pub fn encode_upper_bound(dt: DateTime<Utc>) -> String { encode_ts(dt) }

pub fn decode_ts(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn decode_epoch(secs: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp(secs, 0)
    .ok_or_else(|| Error::DateParse(format!("epoch second out of range: {secs}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// A series row as read from SQLite, before its time column is decoded.
pub enum RawPoint {
  /// A raw sample; the stored timestamp text.
  Stamped { timestamp: String, count: i64 },
  /// A bucket; its start as Unix seconds.
  Bucket { start: i64, count: i64 },
}

impl RawPoint {
  pub fn into_point(self) -> Result<SeriesPoint> {
    match self {
      Self::Stamped { timestamp, count } => Ok(SeriesPoint {
        timestamp: decode_ts(&timestamp)?,
        count,
      }),
      Self::Bucket { start, count } => Ok(SeriesPoint {
        timestamp: decode_epoch(start)?,
        count,
      }),
    }
  }
}

/// The newest global sample and, if any world scrape exists, the newest
/// scrape's `(timestamp, f2p_sum, members_sum)`.
pub struct RawLatest {
  pub timestamp: String,
  pub count:     i64,
  pub breakdown: Option<(String, i64, i64)>,
}

impl RawLatest {
  pub fn into_snapshot(self) -> Result<LatestSnapshot> {
    let (breakdown_timestamp, f2p_count, members_count) = match self.breakdown {
      Some((ts, f2p, members)) => (Some(decode_ts(&ts)?), f2p, members),
      None => (None, 0, 0),
    };
    Ok(LatestSnapshot {
      timestamp: decode_ts(&self.timestamp)?,
      count: self.count,
      f2p_count,
      members_count,
      breakdown_timestamp,
    })
  }
}
