//! Write-side input types: what one scrape cycle hands to the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Observations ────────────────────────────────────────────────────────────

/// One row of the world list as scraped, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldObservation {
  pub world_number: u32,
  pub player_count: u32,
  pub location:     String,
  pub is_f2p:       bool,
  pub activity:     String,
}

impl WorldObservation {
  pub fn new(
    world_number: u32,
    player_count: u32,
    location: impl Into<String>,
    is_f2p: bool,
    activity: impl Into<String>,
  ) -> Self {
    Self {
      world_number,
      player_count,
      location: location.into(),
      is_f2p,
      activity: activity.into(),
    }
  }
}

/// Everything sampled in one cycle. Either half may be missing: a failed
/// count fetch leaves `global_count` empty and a failed world-list fetch
/// leaves `worlds` empty.
#[derive(Debug, Clone)]
pub struct Cycle {
  pub timestamp:    DateTime<Utc>,
  pub global_count: Option<u32>,
  pub worlds:       Vec<WorldObservation>,
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What happened to one half of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
  /// New rows were written. `rows` counts fact rows.
  Recorded { rows: usize },
  /// A sample with the same timestamp is already stored; nothing was written.
  AlreadyRecorded,
  /// There was nothing to write.
  Skipped,
}

/// Per-stream results of [`crate::store::SampleStore::record_cycle`]. The two
/// halves are independent: one failing says nothing about the other.
#[derive(Debug)]
pub struct CycleReport<E> {
  pub global: Result<WriteOutcome, E>,
  pub worlds: Result<WriteOutcome, E>,
}
