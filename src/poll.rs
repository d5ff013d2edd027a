//! Fixed-interval polling of remote operations.
//!
//! Runs and file batches report progress only through repeated status
//! reads. [`poll_until`] issues one read per interval until a predicate
//! accepts the value, the optional timeout elapses, or the cancellation
//! token fires. Each of the three endings is a distinct [`PollOutcome`].
//! Errors from the read itself are returned immediately.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two status reads.
    pub interval: Duration,
    /// Upper bound on the whole wait. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Some(Duration::from_secs(300)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut,
    Cancelled,
}

pub async fn poll_until<T, F, Fut, P>(
    policy: PollPolicy,
    cancel: &CancellationToken,
    fetch: F,
    done: P,
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let wait = async {
        match policy.timeout {
            Some(limit) => {
                let bounded = tokio::time::timeout(limit, poll_loop(policy.interval, fetch, done));
                match bounded.await {
                    Ok(result) => result.map(PollOutcome::Ready),
                    Err(_) => Ok(PollOutcome::TimedOut),
                }
            }
            None => poll_loop(policy.interval, fetch, done)
                .await
                .map(PollOutcome::Ready),
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(PollOutcome::Cancelled),
        outcome = wait => outcome,
    }
}

async fn poll_loop<T, F, Fut, P>(interval: Duration, mut fetch: F, done: P) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let mut attempt = 0u64;
    loop {
        attempt += 1;
        let value = fetch().await?;
        if done(&value) {
            return Ok(value);
        }
        log::debug!("poll attempt {} not settled, sleeping {:?}", attempt, interval);
        tokio::time::sleep(interval).await;
    }
}
