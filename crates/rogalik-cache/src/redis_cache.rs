//! Redis implementation of [`SharedCache`].

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};

use crate::{CacheError, SharedCache, check_ttl};

/// Connection parameters for [`RedisCache`].
#[derive(Clone)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    /// Empty means no `AUTH`.
    pub password: String,
    /// Logical database index.
    pub db: i64,
}

impl std::fmt::Debug for RedisSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("db", &self.db)
            .finish()
    }
}

impl RedisSettings {
    fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.db
            )
        }
    }
}

/// A [`SharedCache`] backed by a Redis server.
///
/// Holds one multiplexed connection; clones share it.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    /// Opens a multiplexed connection to the server described by `settings`.
    pub async fn connect(settings: &RedisSettings) -> Result<Self, CacheError> {
        let client = Client::open(settings.url()).map_err(map_error)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_error)?;
        tracing::info!(
            host = %settings.host,
            port = settings.port,
            db = settings.db,
            "connected to redis"
        );
        Ok(Self { conn })
    }
}

fn map_error(err: RedisError) -> CacheError {
    if err.is_timeout() {
        CacheError::Timeout
    } else if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
    {
        CacheError::Connection(err.to_string())
    } else {
        CacheError::Backend(err.to_string())
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX rejects 0; sub-millisecond TTLs round up.
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_error)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(map_error)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        check_ttl(ttl)?;
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_error)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            check_ttl(ttl)?;
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let mut conn = self.conn.clone();
        // Nil reply means the key already existed.
        let reply: Option<String> =
            cmd.query_async(&mut conn).await.map_err(map_error)?;
        Ok(reply.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let count: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_error)?;
        Ok(count > 0)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_error)?;
        Ok(removed > 0)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.conn.clone();
        // -2: no such key, -1: no expiry.
        let millis: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_error)?;
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_without_password() {
        let settings = RedisSettings {
            host: "cache".into(),
            port: 6379,
            password: String::new(),
            db: 2,
        };
        assert_eq!(settings.url(), "redis://cache:6379/2");
    }

    #[test]
    fn test_url_with_password() {
        let settings = RedisSettings {
            host: "cache".into(),
            port: 6380,
            password: "hunter2".into(),
            db: 0,
        };
        assert_eq!(settings.url(), "redis://:hunter2@cache:6380/0");
    }

    #[test]
    fn test_ttl_millis_rounds_up_sub_millisecond() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }
}
