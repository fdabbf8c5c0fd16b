//! `AuthSystem` builder: the one place the subsystem is wired together.
//!
//! A process builds exactly one [`AuthSystem`] at startup and hands clones
//! of it (or of its [`TokenService`]) to whatever needs them. Building
//! makes sure the signing key pair exists, so a process that fails to
//! build must not start serving.

use std::sync::Arc;

use rogalik_cache::{MemoryCache, ResilientCache, SharedCache};
use rogalik_keys::{KeyPairManager, KeyPairStatus, SymmetricEncryptor};
use rogalik_token::{AuthFailure, ClaimSet, ErrorKind, RevocationStore, TokenError, TokenService};

use crate::{RogalikError, Settings};

/// Builder for an [`AuthSystem`].
///
/// # Example
///
/// ```rust,ignore
/// let auth = AuthSystem::builder()
///     .settings(Settings::load("rogalik.toml")?)
///     .build()
///     .await?;
/// let token = auth.create_token(claims).await?;
/// ```
pub struct AuthSystemBuilder {
    settings: Settings,
    cache: Option<Arc<dyn SharedCache>>,
}

impl AuthSystemBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            cache: None,
        }
    }

    /// Sets the settings.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Uses `cache` as the backend instead of the one named in settings.
    /// It is still wrapped with the configured timeout and retry policy.
    pub fn cache(mut self, cache: Arc<dyn SharedCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validates settings, connects the cache, and makes sure the signing
    /// key pair exists.
    ///
    /// # Errors
    /// Any configuration, cache or key error. All of them are fatal for
    /// the process.
    pub async fn build(self) -> Result<AuthSystem, RogalikError> {
        let settings = self.settings;
        settings.validate()?;

        let backend = match self.cache {
            Some(cache) => cache,
            None => connect(&settings).await?,
        };
        let cache: Arc<dyn SharedCache> =
            Arc::new(ResilientCache::new(backend, settings.cache.policy()));

        let encryptor = SymmetricEncryptor::from_secret(&settings.auth.symmetric_key)?;
        let keys = Arc::new(KeyPairManager::new(
            Arc::clone(&cache),
            encryptor,
            settings.auth.key_config(),
        )?);
        let status = keys.ensure_keys().await?;
        tracing::info!(?status, instance = %keys.instance_id(), "signing key pair ready");

        let tokens = Arc::new(TokenService::new(
            Arc::clone(&keys),
            RevocationStore::new(Arc::clone(&cache)),
            settings.auth.token_settings(),
        )?);

        Ok(AuthSystem {
            settings: Arc::new(settings),
            cache,
            keys,
            tokens,
            key_status: status,
        })
    }
}

impl Default for AuthSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn connect(settings: &Settings) -> Result<Arc<dyn SharedCache>, RogalikError> {
    if settings.cache.local {
        tracing::warn!("using process-local cache; keys and revocations are not shared");
        return Ok(Arc::new(MemoryCache::new()));
    }

    #[cfg(feature = "redis")]
    {
        let redis = rogalik_cache::RedisCache::connect(&settings.cache.redis_settings()).await?;
        Ok(Arc::new(redis))
    }

    #[cfg(not(feature = "redis"))]
    {
        Err(crate::ConfigError::Invalid {
            field: "cache.local",
            reason: "remote cache requires the `redis` feature",
        }
        .into())
    }
}

/// The assembled auth subsystem. Cheap to clone.
#[derive(Clone)]
pub struct AuthSystem {
    settings: Arc<Settings>,
    cache: Arc<dyn SharedCache>,
    keys: Arc<KeyPairManager>,
    tokens: Arc<TokenService>,
    key_status: KeyPairStatus,
}

impl AuthSystem {
    /// Creates a new builder.
    pub fn builder() -> AuthSystemBuilder {
        AuthSystemBuilder::new()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The shared cache, already wrapped with the retry policy.
    pub fn cache(&self) -> &Arc<dyn SharedCache> {
        &self.cache
    }

    pub fn keys(&self) -> &Arc<KeyPairManager> {
        &self.keys
    }

    /// The token service, for handing to guards and middleware.
    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    /// How the key pair was obtained when this system was built.
    pub fn key_status(&self) -> KeyPairStatus {
        self.key_status
    }

    /// See [`TokenService::create_token`].
    pub async fn create_token(&self, claims: ClaimSet) -> Result<String, TokenError> {
        self.tokens.create_token(claims).await
    }

    /// See [`TokenService::validate_token`].
    pub async fn validate_token<K: ErrorKind>(
        &self,
        raw: &str,
        kind: K,
    ) -> Result<ClaimSet, K::Error> {
        self.tokens.validate_token(raw, kind).await
    }

    /// See [`TokenService::logout`].
    pub async fn logout(&self, raw: &str) -> Result<(), AuthFailure> {
        self.tokens.logout(raw).await
    }
}

impl std::fmt::Debug for AuthSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSystem")
            .field("settings", &self.settings)
            .field("keys", &self.keys)
            .field("key_status", &self.key_status)
            .finish_non_exhaustive()
    }
}
