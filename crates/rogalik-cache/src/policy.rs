//! Timeout and retry policy for cache calls.
//!
//! Every cache call made by the auth subsystem goes through
//! [`ResilientCache`], which bounds each attempt with a timeout and retries
//! transient failures with capped exponential backoff plus jitter.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::{CacheError, SharedCache};

/// Timeout and retry settings applied to every cache call.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// Upper bound on a single attempt.
    pub timeout: Duration,
    /// Extra attempts after the first one fails transiently.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub initial_backoff: Duration,
    /// Cap on the backoff delay (before jitter).
    pub max_backoff: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            max_retries: 2,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl CachePolicy {
    /// Backoff before retry number `attempt` (0-based), with up to 50%
    /// random jitter added.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_backoff);
        let jitter_ms = base.as_millis() as u64 / 2;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        base + Duration::from_millis(jitter)
    }

    /// Runs `operation` under this policy.
    async fn run<F, Fut, T>(
        &self,
        operation_name: &'static str,
        mut operation: F,
    ) -> Result<T, CacheError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Timeout),
            };
            match result {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            "cache call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    tracing::debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient cache error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        tracing::warn!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            error = %err,
                            "cache call failed, retries exhausted"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// Wraps a [`SharedCache`] with a [`CachePolicy`].
#[derive(Debug, Clone)]
pub struct ResilientCache<C> {
    inner: C,
    policy: CachePolicy,
}

impl<C: SharedCache> ResilientCache<C> {
    /// Wraps `inner` with `policy`.
    pub fn new(inner: C, policy: CachePolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// The policy applied to every call.
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }
}

#[async_trait]
impl<C: SharedCache> SharedCache for ResilientCache<C> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.policy.run("get", || self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        self.policy.run("set", || self.inner.set(key, value)).await
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.policy
            .run("set_with_ttl", || self.inner.set_with_ttl(key, value, ttl))
            .await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        // A timed-out attempt may still have landed; the retry then sees
        // the key present and reports `false`, which callers handle like
        // any lost race.
        self.policy
            .run("set_if_absent", || self.inner.set_if_absent(key, value, ttl))
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.policy.run("exists", || self.inner.exists(key)).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.policy.run("delete", || self.inner.delete(key)).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.policy.run("ttl", || self.inner.ttl(key)).await
    }
}
