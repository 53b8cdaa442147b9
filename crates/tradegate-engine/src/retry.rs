//! Bounded external calls: one timeout per attempt, one retry with jitter.
//!
//! Only transient failures are retried. Permanent failures and policy
//! outcomes go straight back to the caller.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use tradegate_store::StoreError;

use crate::error::{ProviderError, VenueError};

const MAX_ATTEMPTS: u32 = 2;

/// Errors that may clear up on their own.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for ProviderError {
    fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

impl Transient for VenueError {
    fn is_transient(&self) -> bool {
        matches!(self, VenueError::Unreachable(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempt_timeout: Duration,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempt_timeout_ms: u64, base_delay_ms: u64) -> Self {
        Self {
            attempt_timeout: Duration::from_millis(attempt_timeout_ms),
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }
}

/// Final failure of a bounded call.
#[derive(Debug)]
pub enum CallError<E> {
    Failed(E),
    TimedOut(Duration),
}

impl<E: Transient> CallError<E> {
    fn is_transient(&self) -> bool {
        match self {
            CallError::Failed(e) => e.is_transient(),
            CallError::TimedOut(_) => true,
        }
    }
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Failed(e) => write!(f, "{e}"),
            CallError::TimedOut(d) => write!(f, "timed out after {} ms", d.as_millis()),
        }
    }
}

/// Base delay with ±25% jitter.
fn jittered(base: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let range = base_ms / 4;
    let jitter = rand::random::<u64>() % (range * 2 + 1);
    Duration::from_millis(base_ms.saturating_sub(range) + jitter)
}

/// Run `operation` under the policy's per-attempt timeout, retrying once on a
/// transient failure or timeout.
pub async fn with_retry<F, Fut, T, E>(
    call: &'static str,
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, CallError<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + fmt::Display,
{
    let mut attempt = 1;
    loop {
        let failure = match timeout(policy.attempt_timeout, operation()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => CallError::Failed(e),
            Err(_) => CallError::TimedOut(policy.attempt_timeout),
        };

        if attempt >= MAX_ATTEMPTS || !failure.is_transient() {
            debug!(call, attempt, error = %failure, "Giving up");
            return Err(failure);
        }

        let delay = jittered(policy.base_delay);
        warn!(
            call,
            attempt,
            error = %failure,
            delay_ms = delay.as_millis() as u64,
            "Transient failure, retrying"
        );
        sleep(delay).await;
        attempt += 1;
    }
}
