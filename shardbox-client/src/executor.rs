//! Parallel request executor
//!
//! Fans an operation out to a set of blobbers concurrently, with per-peer
//! retry, timeout, and a mandatory back-off on HTTP 429. Three completion
//! modes: wait for all, first success, or first `k` successes.

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use shardbox_core::error::{Result, ShardboxError};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Per-request dispatch policy
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Attempts per peer, counting those that produced no response
    pub retries: u32,
    /// Timeout per attempt
    pub timeout: Duration,
    /// Mandatory sleep after an HTTP 429 before the next attempt
    pub rate_limit_backoff: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout: Duration::from_secs(10),
            rate_limit_backoff: Duration::from_secs(1),
        }
    }
}

impl RequestConfig {
    /// Policy for shard-sized transfers
    pub fn bulk() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            ..Default::default()
        }
    }
}

/// Result of one peer's dispatch, after retries
#[derive(Debug)]
pub struct PeerResult<T> {
    pub index: usize,
    pub result: Result<T>,
    pub latency_ms: u64,
}

impl<T> PeerResult<T> {
    pub fn ok(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }
}

/// Fan-out dispatcher for one allocation's blobber set
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    config: RequestConfig,
}

impl Dispatcher {
    pub fn new(config: RequestConfig) -> Self {
        Self { config }
    }

    /// Run one peer's operation under the retry policy
    pub async fn single<T, F, Fut>(&self, index: usize, op: F) -> PeerResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let result = with_retry(&self.config, op).await;
        PeerResult {
            index,
            result,
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Fan out to every index and wait for all results
    pub async fn wait<T, F, Fut, I>(&self, indices: I, op: F) -> Vec<PeerResult<T>>
    where
        I: IntoIterator<Item = usize>,
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let op = &op;
        let futures: Vec<_> = indices
            .into_iter()
            .map(|i| self.single(i, move || op(i)))
            .collect();
        join_all(futures).await
    }

    /// Return the first success; remaining requests are dropped
    pub async fn first<T, F, Fut, I>(&self, indices: I, op: F) -> Result<(usize, T)>
    where
        I: IntoIterator<Item = usize>,
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let op = &op;
        let mut pending: FuturesUnordered<_> = indices
            .into_iter()
            .map(|i| self.single(i, move || op(i)))
            .collect();
        let mut last_err = None;
        while let Some(peer) = pending.next().await {
            match peer.result {
                Ok(value) => return Ok((peer.index, value)),
                Err(e) => {
                    debug!(peer = peer.index, error = %e, "peer failed, trying next");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ShardboxError::Network("no peers to dispatch to".into())))
    }

    /// Collect results until `k` peers succeed, then drop the rest.
    ///
    /// Returns everything observed so far, successes and failures alike;
    /// the caller decides whether `k` was actually reached.
    pub async fn first_k<T, F, Fut, I>(&self, indices: I, k: usize, op: F) -> Vec<PeerResult<T>>
    where
        I: IntoIterator<Item = usize>,
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let op = &op;
        let mut pending: FuturesUnordered<_> = indices
            .into_iter()
            .map(|i| self.single(i, move || op(i)))
            .collect();
        let mut results = Vec::new();
        let mut successes = 0;
        while let Some(peer) = pending.next().await {
            if peer.result.is_ok() {
                successes += 1;
            }
            results.push(peer);
            if successes >= k {
                break;
            }
        }
        results
    }
}

async fn with_retry<T, F, Fut>(config: &RequestConfig, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.retries.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match timeout(config.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                let retryable = e.is_retryable();
                if let ShardboxError::ServerRejected { status: 429, .. } = &e {
                    sleep(config.rate_limit_backoff).await;
                }
                if !retryable {
                    return Err(e);
                }
                warn!(attempt, error = %e, "retryable request failure");
                last_err = Some(e);
            }
            Err(_) => {
                warn!(attempt, timeout = ?config.timeout, "request timed out");
                last_err = Some(ShardboxError::Network(format!(
                    "request timed out after {:?}",
                    config.timeout
                )));
            }
        }
    }
    Err(last_err.unwrap_or_else(|| ShardboxError::Network("request never attempted".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_until_success() {
        let dispatcher = Dispatcher::new(RequestConfig {
            retries: 3,
            timeout: Duration::from_secs(1),
            rate_limit_backoff: Duration::from_millis(1),
        });
        let attempts = AtomicU32::new(0);
        let result = dispatcher
            .single(0, || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ShardboxError::Network("flaky".into()))
                } else {
                    Ok(42u32)
                }
            })
            .await;
        assert_eq!(result.result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let dispatcher = Dispatcher::default();
        let attempts = AtomicU32::new(0);
        let result: PeerResult<u32> = dispatcher
            .single(0, || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ShardboxError::ServerRejected {
                    status: 400,
                    message: "bad request".into(),
                })
            })
            .await;
        assert!(result.result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let dispatcher = Dispatcher::new(RequestConfig {
            retries: 2,
            timeout: Duration::from_secs(1),
            rate_limit_backoff: Duration::from_millis(1),
        });
        let attempts = AtomicU32::new(0);
        let result: PeerResult<u32> = dispatcher
            .single(0, || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ShardboxError::Network("down".into()))
            })
            .await;
        assert!(result.result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wait_returns_all() {
        let dispatcher = Dispatcher::default();
        let results = dispatcher
            .wait(0..3, |i| async move {
                if i == 1 {
                    Err(ShardboxError::ServerRejected {
                        status: 403,
                        message: "no".into(),
                    })
                } else {
                    Ok(i * 10)
                }
            })
            .await;
        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.result.is_ok()).count(), 2);
    }

    #[tokio::test]
    async fn test_first_returns_a_success() {
        let dispatcher = Dispatcher::default();
        let (index, value) = dispatcher
            .first(0..3, |i| async move {
                if i == 0 {
                    Err(ShardboxError::ServerRejected {
                        status: 404,
                        message: "missing".into(),
                    })
                } else {
                    Ok(i)
                }
            })
            .await
            .unwrap();
        assert_eq!(index, value);
        assert_ne!(index, 0);
    }

    #[tokio::test]
    async fn test_first_k_stops_at_k() {
        let dispatcher = Dispatcher::default();
        let results = dispatcher.first_k(0..5, 2, |i| async move { Ok(i) }).await;
        let ok = results.iter().filter(|r| r.result.is_ok()).count();
        assert_eq!(ok, 2);
    }
}
