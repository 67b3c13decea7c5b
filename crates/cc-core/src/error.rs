//! Error types for `cc-core`.
//!
//! Every variant is a terminal outcome for the scan that produced it. A
//! failed temperature screening is *not* an error; it travels inside a
//! successful outcome as a [`Verdict::Fail`](crate::screening::Verdict).

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// The scan string does not follow the wire grammar.
  #[error("bad scan payload: {0}")]
  BadPayload(String),

  /// An entity, institution or matching active record does not exist.
  #[error("not found: {0}")]
  NotFound(String),

  /// A compare-and-swap advance lost a race against another writer.
  #[error("record {0} was changed concurrently")]
  Conflict(Uuid),

  /// The persistence engine or directory failed or did not answer in time.
  #[error("backend unavailable: {0}")]
  Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn not_found(what: impl Into<String>) -> Self {
    Self::NotFound(what.into())
  }

  /// Box a backend error into [`Error::Unavailable`].
  pub fn unavailable<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Unavailable(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
