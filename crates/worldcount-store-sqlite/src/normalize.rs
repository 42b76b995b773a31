//! Dimension normalization: attribute values to stable integer ids.
//!
//! [`DimensionCache`] mirrors the three dimension tables in memory. It is
//! loaded once when the store opens and only ever grows. New values are
//! created through a [`Resolver`], which works inside the caller's
//! transaction and keeps the ids it creates to itself; the caller merges them
//! into the cache with [`DimensionCache::absorb`] once the transaction has
//! committed. A rolled-back cycle therefore cannot leave ids in the cache
//! that do not exist in the tables.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension as _, Row, params};
use worldcount_core::dimension::WorldDetail;

/// Identity of a world detail row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DetailKey {
  pub location_id: i64,
  pub is_f2p:      bool,
  pub activity_id: i64,
}

impl From<&WorldDetail> for DetailKey {
  fn from(d: &WorldDetail) -> Self {
    Self {
      location_id: d.location_id,
      is_f2p:      d.is_f2p,
      activity_id: d.activity_id,
    }
  }
}

fn detail_from_row(r: &Row<'_>) -> rusqlite::Result<WorldDetail> {
  Ok(WorldDetail {
    id:          r.get(0)?,
    location_id: r.get(1)?,
    is_f2p:      r.get(2)?,
    activity_id: r.get(3)?,
  })
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// Committed dimension ids, keyed by content.
#[derive(Debug, Default)]
pub struct DimensionCache {
  locations:  HashMap<String, i64>,
  activities: HashMap<String, i64>,
  details:    HashMap<DetailKey, i64>,
}

impl DimensionCache {
  /// Read every existing dimension row.
  pub fn load(conn: &Connection) -> rusqlite::Result<Self> {
    let mut cache = Self::default();

    let mut stmt = conn.prepare("SELECT name, id FROM locations")?;
    for row in stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))? {
      let (name, id): (String, i64) = row?;
      cache.locations.insert(name, id);
    }

    let mut stmt = conn.prepare("SELECT description, id FROM activities")?;
    for row in stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))? {
      let (description, id): (String, i64) = row?;
      cache.activities.insert(description, id);
    }

    let mut stmt = conn
      .prepare("SELECT id, location_id, is_f2p, activity_id FROM world_details")?;
    for detail in stmt.query_map([], detail_from_row)? {
      let detail = detail?;
      cache.details.insert(DetailKey::from(&detail), detail.id);
    }

    Ok(cache)
  }

  /// Merge ids staged by a [`Resolver`] whose transaction has committed.
  pub fn absorb(&mut self, staged: DimensionCache) {
    self.locations.extend(staged.locations);
    self.activities.extend(staged.activities);
    self.details.extend(staged.details);
  }

  /// Total number of cached ids across all three dimensions.
  pub fn len(&self) -> usize {
    self.locations.len() + self.activities.len() + self.details.len()
  }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Lookup-or-create over one transaction.
///
/// Reads go to the committed cache first, then to ids staged by this
/// resolver. Misses insert a row; if the insert hits the UNIQUE constraint
/// because another writer got there first, the winner's id is read back.
pub struct Resolver<'c> {
  committed: &'c DimensionCache,
  staged:    DimensionCache,
}

impl<'c> Resolver<'c> {
  pub fn new(committed: &'c DimensionCache) -> Self {
    Self { committed, staged: DimensionCache::default() }
  }

  pub fn resolve_location(
    &mut self,
    conn: &Connection,
    name: &str,
  ) -> rusqlite::Result<i64> {
    if let Some(&id) = self
      .committed
      .locations
      .get(name)
      .or_else(|| self.staged.locations.get(name))
    {
      return Ok(id);
    }

    let id = insert_or_find(
      conn,
      "INSERT INTO locations (name) VALUES (?1)",
      "SELECT id FROM locations WHERE name = ?1",
      params![name],
    )?;
    tracing::debug!(location = name, id, "new location");
    self.staged.locations.insert(name.to_owned(), id);
    Ok(id)
  }

  pub fn resolve_activity(
    &mut self,
    conn: &Connection,
    description: &str,
  ) -> rusqlite::Result<i64> {
    if let Some(&id) = self
      .committed
      .activities
      .get(description)
      .or_else(|| self.staged.activities.get(description))
    {
      return Ok(id);
    }

    let id = insert_or_find(
      conn,
      "INSERT INTO activities (description) VALUES (?1)",
      "SELECT id FROM activities WHERE description = ?1",
      params![description],
    )?;
    tracing::debug!(activity = description, id, "new activity");
    self.staged.activities.insert(description.to_owned(), id);
    Ok(id)
  }

  /// Resolve the full attribute triple to a world detail id, creating the
  /// location, activity and detail rows as needed.
  pub fn resolve(
    &mut self,
    conn: &Connection,
    location: &str,
    activity: &str,
    is_f2p: bool,
  ) -> rusqlite::Result<i64> {
    let key = DetailKey {
      location_id: self.resolve_location(conn, location)?,
      is_f2p,
      activity_id: self.resolve_activity(conn, activity)?,
    };
    if let Some(&id) = self
      .committed
      .details
      .get(&key)
      .or_else(|| self.staged.details.get(&key))
    {
      return Ok(id);
    }

    let id = insert_or_find(
      conn,
      "INSERT INTO world_details (location_id, is_f2p, activity_id)
       VALUES (?1, ?2, ?3)",
      "SELECT id FROM world_details
       WHERE location_id = ?1 AND is_f2p = ?2 AND activity_id = ?3",
      params![key.location_id, key.is_f2p, key.activity_id],
    )?;
    tracing::debug!(?key, id, "new world detail");
    self.staged.details.insert(key, id);
    Ok(id)
  }

  /// Hand back the ids created by this resolver. Only absorb them into the
  /// cache after the transaction they were created in has committed.
  pub fn into_staged(self) -> DimensionCache { self.staged }
}

/// Insert a dimension row, or return the id of the row that already holds
/// the same value.
fn insert_or_find(
  conn: &Connection,
  insert: &str,
  find: &str,
  params: &[&dyn rusqlite::ToSql],
) -> rusqlite::Result<i64> {
  match conn.execute(insert, params) {
    Ok(_) => Ok(conn.last_insert_rowid()),
    Err(e) if is_unique_violation(&e) => {
      let id = conn.query_row(find, params, |r| r.get(0)).optional()?;
      // The conflicting row cannot vanish: dimension rows are never deleted.
      id.ok_or(e)
    }
    Err(e) => Err(e),
  }
}

/// Whether `e` is a UNIQUE or PRIMARY KEY constraint violation.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
  )
}
