//! Error type for `worldcount-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl Error {
  /// Whether the underlying connection is gone. The store must be reopened
  /// before it can be used again.
  pub fn is_unavailable(&self) -> bool {
    matches!(
      self,
      Self::Database(
        tokio_rusqlite::Error::ConnectionClosed
          | tokio_rusqlite::Error::Close(_)
      )
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
