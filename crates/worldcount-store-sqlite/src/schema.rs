//! SQL schema for the worldcount SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Dimension tables. Append-only and content-addressed.
CREATE TABLE IF NOT EXISTS locations (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS activities (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    description TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS world_details (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    location_id INTEGER NOT NULL REFERENCES locations(id),
    is_f2p      INTEGER NOT NULL CHECK (is_f2p IN (0, 1)),
    activity_id INTEGER NOT NULL REFERENCES activities(id),
    UNIQUE (location_id, is_f2p, activity_id)
);

-- One row per recorded world-list scrape.
CREATE TABLE IF NOT EXISTS scrape_events (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL UNIQUE   -- YYYY-MM-DDTHH:MM:SSZ
);

CREATE TABLE IF NOT EXISTS world_samples (
    scrape_id    INTEGER NOT NULL REFERENCES scrape_events(id),
    world_number INTEGER NOT NULL,
    player_count INTEGER NOT NULL,
    detail_id    INTEGER NOT NULL REFERENCES world_details(id),
    PRIMARY KEY (scrape_id, world_number)
) WITHOUT ROWID;

-- The site-wide counter, sampled on its own cadence.
CREATE TABLE IF NOT EXISTS global_samples (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL UNIQUE,  -- YYYY-MM-DDTHH:MM:SSZ
    count     INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS world_samples_world_idx  ON world_samples(world_number, scrape_id);
CREATE INDEX IF NOT EXISTS world_samples_detail_idx ON world_samples(detail_id);

PRAGMA user_version = 1;
";
