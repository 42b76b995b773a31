//! Dimension rows: the distinct attribute values a world can carry.
//!
//! Dimension rows are content-addressed and append-only: a value is assigned an
//! id the first time it is seen and keeps it forever. There is no rename or
//! merge.

use serde::{Deserialize, Serialize};

/// A server location, e.g. "United Kingdom".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
  pub id:   i64,
  pub name: String,
}

/// A world's advertised activity, e.g. "Trade - Free".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
  pub id:          i64,
  pub description: String,
}

/// One distinct shape a world can have at a point in time.
///
/// Unique by `(location_id, is_f2p, activity_id)`. Fact rows keep pointing at
/// the detail they were recorded with even after the world changes shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldDetail {
  pub id:          i64,
  pub location_id: i64,
  pub is_f2p:      bool,
  pub activity_id: i64,
}

/// Everything a client needs to build filters for a history query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
  /// Ordered by name.
  pub locations:  Vec<Location>,
  /// Ordered by description.
  pub activities: Vec<Activity>,
  /// Every world number ever observed, ascending.
  pub worlds:     Vec<u32>,
}
