//! Fixed back-off retry helpers.
//!
//! The bridge never gives up on a settlement: an operation is attempted until it succeeds or the
//! process is asked to shut down. These helpers therefore only fail with [`Cancelled`].

use std::{fmt::Display, future::Future, time::Duration};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Returned when the surrounding [`CancellationToken`] fires before an operation succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Sleeps for `delay` unless `cancel` fires first.
pub async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> Result<(), Cancelled> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Runs `attempt` until it returns `Ok`, sleeping `delay` between failures.
///
/// An in-flight attempt is dropped as soon as `cancel` fires.
pub async fn retry_until_cancelled<T, E, F, Fut>(
    cancel: &CancellationToken,
    delay: Duration,
    operation: &str,
    mut attempt: F,
) -> Result<T, Cancelled>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempts = 0u64;
    loop {
        attempts += 1;
        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            res = attempt() => res,
        };

        match res {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(%operation, %err, %attempts, ?delay, "attempt failed, retrying");
            }
        }

        sleep_or_cancel(cancel, delay).await?;
    }
}
