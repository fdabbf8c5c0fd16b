//! Token blacklist backed by the shared cache.
//!
//! Each entry lives exactly as long as the token it blocks, so the list
//! never needs sweeping.

use std::sync::Arc;
use std::time::Duration;

use rogalik_cache::{CacheError, SharedCache};

/// Prefix of every revocation entry.
pub const REVOCATION_PREFIX: &str = "blacklist_";

const SENTINEL: &[u8] = b"1";

/// Marks tokens as revoked until their natural expiry.
#[derive(Clone)]
pub struct RevocationStore {
    cache: Arc<dyn SharedCache>,
}

impl RevocationStore {
    pub fn new(cache: Arc<dyn SharedCache>) -> Self {
        Self { cache }
    }

    /// Revokes `token` for `ttl`.
    ///
    /// Revoking again only refreshes the TTL. A zero `ttl` does nothing,
    /// since the token has nothing left to outlive.
    pub async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            tracing::debug!("token already at expiry, not revoking");
            return Ok(());
        }
        self.cache
            .set_with_ttl(&revocation_key(token), SENTINEL, ttl)
            .await?;
        tracing::debug!(ttl_secs = ttl.as_secs(), "token revoked");
        Ok(())
    }

    /// Returns `true` if `token` is currently revoked.
    pub async fn is_revoked(&self, token: &str) -> Result<bool, CacheError> {
        self.cache.exists(&revocation_key(token)).await
    }
}

impl std::fmt::Debug for RevocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationStore").finish_non_exhaustive()
    }
}

fn revocation_key(token: &str) -> String {
    format!("{REVOCATION_PREFIX}{token}")
}
