use std::{future::Future, time::Duration};

use cc_core::{Error, Result};
use tracing::warn;

/// Await a backend call for at most `limit`.
///
/// Both a backend error and an elapsed deadline become
/// [`Error::Unavailable`].
pub(crate) async fn bounded<T, E, F>(
  limit: Duration,
  call: &'static str,
  fut: F,
) -> Result<T>
where
  F: Future<Output = std::result::Result<T, E>>,
  E: std::error::Error + Send + Sync + 'static,
{
  match tokio::time::timeout(limit, fut).await {
    Ok(Ok(value)) => Ok(value),
    Ok(Err(e)) => {
      warn!(call, error = %e, "backend call failed");
      Err(Error::unavailable(e))
    }
    Err(elapsed) => {
      warn!(call, ?limit, "backend call timed out");
      Err(Error::unavailable(elapsed))
    }
  }
}
