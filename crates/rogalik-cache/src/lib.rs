//! Shared cache abstraction for Rogalik.
//!
//! Every service instance reads key material and revocation entries from
//! one external key-value store. This crate defines the [`SharedCache`]
//! trait that the rest of the workspace talks to, plus the backends:
//!
//! - [`MemoryCache`]: process-local, for tests and single-instance runs
//! - `RedisCache`: the production backend (feature `redis`)
//! - [`ResilientCache`]: wraps any backend with a timeout and retry policy
//!
//! # Feature Flags
//!
//! - `redis`: Redis backend via the `redis` crate
//!
//! # Atomicity
//!
//! Correctness of key generation depends entirely on
//! [`SharedCache::set_if_absent`] being atomic in the backend. No
//! in-process lock can stand in for it, because the competing writers
//! live in different processes.

mod error;
mod memory;
mod policy;
#[cfg(feature = "redis")]
mod redis_cache;

pub use error::CacheError;
pub use memory::MemoryCache;
pub use policy::{CachePolicy, ResilientCache};
#[cfg(feature = "redis")]
pub use redis_cache::{RedisCache, RedisSettings};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// A key-value store with per-key TTL, shared by all service instances.
///
/// Implementations must be safe to call concurrently from many tasks.
/// Keys are UTF-8 strings, values are opaque bytes.
#[async_trait]
pub trait SharedCache: Send + Sync + 'static {
    /// Returns the value stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores `value` under `key`, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

    /// Stores `value` under `key` so that it disappears after `ttl`.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidArgument`] for a zero `ttl`.
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Atomically stores `value` only if `key` holds no live value.
    ///
    /// Returns `true` if this call created the key. An expired key is
    /// treated as absent.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>;

    /// Returns `true` if `key` holds a live value.
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Removes `key`. Returns `true` if a live value was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Remaining lifetime of `key`, or `None` if it is absent or has no TTL.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;
}

#[async_trait]
impl<C: SharedCache + ?Sized> SharedCache for Arc<C> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        (**self).set(key, value).await
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        (**self).set_with_ttl(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        (**self).set_if_absent(key, value, ttl).await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        (**self).exists(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        (**self).delete(key).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        (**self).ttl(key).await
    }
}

/// Rejects a zero TTL, which every backend treats as a caller bug.
pub(crate) fn check_ttl(ttl: Duration) -> Result<(), CacheError> {
    if ttl.is_zero() {
        return Err(CacheError::InvalidArgument("ttl must be non-zero".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_ttl_rejects_zero() {
        assert!(matches!(
            check_ttl(Duration::ZERO),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_check_ttl_accepts_positive() {
        assert!(check_ttl(Duration::from_millis(1)).is_ok());
    }

    #[tokio::test]
    async fn test_arc_forwards_to_inner_cache() {
        let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
        cache.set("k", b"v").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(cache.exists("k").await.unwrap());
    }
}
