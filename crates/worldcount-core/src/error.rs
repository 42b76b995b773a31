//! Error types for `worldcount-core`.
//!
//! Every variant describes a rejected request: callers report it back as-is
//! and never retry.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
  #[error("invalid timestamp: {0:?}")]
  InvalidTimestamp(String),

  #[error("unknown unit {0:?}; expected minute, hour, day, week or month")]
  UnknownUnit(String),

  #[error("unknown aggregation {0:?}; expected max or avg")]
  UnknownAggregation(String),

  #[error("invalid flag {0:?}; expected 1, 0, true or false")]
  InvalidFlag(String),

  #[error("step must be at least one minute")]
  InvalidStep,

  #[error("limit must be at least 1")]
  InvalidLimit,

  #[error(
    "minute-level queries cannot span more than {max_days} days; use a \
     larger unit (hour/day) or a shorter time range"
  )]
  SpanTooLong { max_days: i64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
