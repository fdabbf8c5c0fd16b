//! Settings loaded from TOML with environment overrides.
//!
//! ```toml
//! [auth]
//! signing_algorithm = "RS256"
//! token_expiration_seconds = 11520
//! verify_expiry = true
//! symmetric_key = "<64 hex chars>"
//!
//! [cache]
//! host = "redis.internal"
//! port = 6379
//! local = false
//! ```
//!
//! Every field can be overridden with a `ROGALIK_` variable: auth fields
//! by their bare name (`ROGALIK_SYMMETRIC_KEY`), cache fields with a
//! `CACHE_` prefix (`ROGALIK_CACHE_HOST`).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rogalik_cache::CachePolicy;
use rogalik_keys::{KeyConfig, MIN_KEY_BITS};
use rogalik_token::{Algorithm, TokenSettings, is_rsa_algorithm};
use serde::Deserialize;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "ROGALIK_";

/// Errors from loading or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// The variable is named but not its value, which may be a secret.
    #[error("invalid value in environment variable {var}")]
    InvalidOverride { var: String },

    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// All settings for the auth subsystem.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub auth: AuthSettings,
    pub cache: CacheSettings,
}

/// `[auth]` section.
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSettings {
    /// RSA-based JWT algorithm.
    pub signing_algorithm: Algorithm,
    pub token_expiration_seconds: u64,
    pub verify_expiry: bool,
    /// Key that seals the private signing key in the cache. Required.
    pub symmetric_key: String,
    pub key_bits: usize,
    pub lock_ttl_seconds: u64,
    pub init_timeout_seconds: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        let tokens = TokenSettings::default();
        Self {
            signing_algorithm: tokens.signing_algorithm,
            token_expiration_seconds: tokens.token_expiration_seconds,
            verify_expiry: tokens.verify_expiry,
            symmetric_key: String::new(),
            key_bits: MIN_KEY_BITS,
            lock_ttl_seconds: 30,
            init_timeout_seconds: 60,
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("signing_algorithm", &self.signing_algorithm)
            .field("token_expiration_seconds", &self.token_expiration_seconds)
            .field("verify_expiry", &self.verify_expiry)
            .field("symmetric_key", &"<redacted>")
            .field("key_bits", &self.key_bits)
            .field("lock_ttl_seconds", &self.lock_ttl_seconds)
            .field("init_timeout_seconds", &self.init_timeout_seconds)
            .finish()
    }
}

impl AuthSettings {
    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            signing_algorithm: self.signing_algorithm,
            token_expiration_seconds: self.token_expiration_seconds,
            verify_expiry: self.verify_expiry,
        }
    }

    pub fn key_config(&self) -> KeyConfig {
        KeyConfig {
            key_bits: self.key_bits,
            lock_ttl: Duration::from_secs(self.lock_ttl_seconds),
            init_timeout: Duration::from_secs(self.init_timeout_seconds),
            ..KeyConfig::default()
        }
    }
}

/// `[cache]` section.
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: i64,
    /// Use the in-process cache instead of Redis. Only correct for a
    /// single instance.
    pub local: bool,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 6379,
            password: String::new(),
            db: 0,
            local: true,
            timeout_ms: 2000,
            max_retries: 2,
        }
    }
}

impl fmt::Debug for CacheSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("db", &self.db)
            .field("local", &self.local)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl CacheSettings {
    pub fn policy(&self) -> CachePolicy {
        CachePolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            max_retries: self.max_retries,
            ..CachePolicy::default()
        }
    }

    #[cfg(feature = "redis")]
    pub fn redis_settings(&self) -> rogalik_cache::RedisSettings {
        rogalik_cache::RedisSettings {
            host: self.host.clone(),
            port: self.port,
            password: self.password.clone(),
            db: self.db,
        }
    }
}

impl Settings {
    /// Parses settings from TOML text. Missing fields take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads `path`, applies environment overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let mut settings = Self::from_toml_str(&text)?;
        settings.apply_overrides(std::env::vars())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults plus environment overrides, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        settings.apply_overrides(std::env::vars())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Applies `ROGALIK_*` pairs from `vars`. Unknown names are ignored.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let auth = &mut self.auth;
            let cache = &mut self.cache;
            match key {
                "SIGNING_ALGORITHM" => auth.signing_algorithm = parse(&name, &value)?,
                "TOKEN_EXPIRATION_SECONDS" => auth.token_expiration_seconds = parse(&name, &value)?,
                "VERIFY_EXPIRY" => auth.verify_expiry = parse(&name, &value)?,
                "SYMMETRIC_KEY" => auth.symmetric_key = value,
                "KEY_BITS" => auth.key_bits = parse(&name, &value)?,
                "LOCK_TTL_SECONDS" => auth.lock_ttl_seconds = parse(&name, &value)?,
                "INIT_TIMEOUT_SECONDS" => auth.init_timeout_seconds = parse(&name, &value)?,
                "CACHE_HOST" => cache.host = value,
                "CACHE_PORT" => cache.port = parse(&name, &value)?,
                "CACHE_PASSWORD" => cache.password = value,
                "CACHE_DB" => cache.db = parse(&name, &value)?,
                "CACHE_LOCAL" => cache.local = parse(&name, &value)?,
                "CACHE_TIMEOUT_MS" => cache.timeout_ms = parse(&name, &value)?,
                "CACHE_MAX_RETRIES" => cache.max_retries = parse(&name, &value)?,
                _ => tracing::debug!(var = %name, "ignoring unknown override"),
            }
        }
        Ok(())
    }

    /// Rejects settings the subsystem cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });

        if self.auth.symmetric_key.trim().is_empty() {
            return invalid("auth.symmetric_key", "must be set");
        }
        if !is_rsa_algorithm(self.auth.signing_algorithm) {
            return invalid("auth.signing_algorithm", "must be RS256/384/512 or PS256/384/512");
        }
        if self.auth.key_bits < MIN_KEY_BITS {
            return invalid("auth.key_bits", "must be at least 2048");
        }
        if self.auth.token_expiration_seconds == 0 {
            return invalid("auth.token_expiration_seconds", "must be positive");
        }
        if self.auth.lock_ttl_seconds == 0 {
            return invalid("auth.lock_ttl_seconds", "must be positive");
        }
        if self.auth.init_timeout_seconds == 0 {
            return invalid("auth.init_timeout_seconds", "must be positive");
        }
        if self.cache.timeout_ms == 0 {
            return invalid("cache.timeout_ms", "must be positive");
        }
        Ok(())
    }
}

fn parse<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
        var: var.to_owned(),
    })
}
