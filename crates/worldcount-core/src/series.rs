//! Read-side result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point of a history series. For bucketed queries `timestamp` is the
/// start of the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
  pub timestamp: DateTime<Utc>,
  pub count:     i64,
}

/// The most recent global count together with the F2P/members split of the
/// most recent world scrape.
///
/// The two halves are sampled independently, so `timestamp` and
/// `breakdown_timestamp` generally differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestSnapshot {
  pub timestamp:           DateTime<Utc>,
  pub count:               i64,
  pub f2p_count:           i64,
  pub members_count:       i64,
  /// `None` until the first world scrape has been recorded.
  pub breakdown_timestamp: Option<DateTime<Utc>>,
}
