//! Exponential backoff retry, shared by the job queue and any other
//! component that talks to a transport that can fail transiently.

use std::future::Future;
use std::time::Duration;

use crate::error::Error;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub factor: u32,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// The policy mandated for job queue operations: 0.5s initial backoff,
    /// doubling, up to 3 attempts total.
    pub fn default_policy() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            factor: 2,
            max_attempts: 3,
        }
    }
}

/// Run `op`, retrying on transient errors (per [`Error::is_transient`])
/// according to `policy`. Returns the first non-transient error, or the last
/// transient error once attempts are exhausted.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 1;
    let mut backoff = policy.initial_backoff;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                tracing::warn!(attempt, max_attempts = policy.max_attempts, error = %err, "transient error, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= policy.factor;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            factor: 2,
            max_attempts: 3,
        };
        let attempts = AtomicU32::new(0);

        let result = retry_with_backoff(&policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Error::QueueUnavailable("injected".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            factor: 2,
            max_attempts: 3,
        };
        let attempts = AtomicU32::new(0);

        let result: Result<(), Error> = retry_with_backoff(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(Error::QueueUnavailable("always fails".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let policy = RetryPolicy::default_policy();
        let attempts = AtomicU32::new(0);

        let result: Result<(), Error> = retry_with_backoff(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(Error::InvalidTarget("bad".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
