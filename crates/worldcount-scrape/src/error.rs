use thiserror::Error;

/// A failed page fetch. Always transient: the cycle goes without a sample and
/// the next tick tries again.
#[derive(Debug, Error)]
pub enum Error {
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{url} answered {status}")]
  Status { url: String, status: reqwest::StatusCode },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
