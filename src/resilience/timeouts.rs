//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap downstream calls with a deadline
//! - Turn domain errors and deadline overruns into `CallError`
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; on overrun the future is dropped, which
//!   stops waiting but cannot force-stop work the operation already handed off
//! - A zero duration disables the deadline

use std::future::Future;
use std::time::Duration;

use crate::resilience::error::{BoxError, CallError};

/// Await `future` for at most `limit`.
pub async fn with_deadline<T, E, F>(limit: Duration, future: F) -> Result<T, CallError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    if limit.is_zero() {
        return future.await.map_err(CallError::downstream);
    }
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result.map_err(CallError::downstream),
        Err(_) => Err(CallError::Timeout(limit)),
    }
}
