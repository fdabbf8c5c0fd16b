//! Cross-instance creation and retrieval of the signing key pair.
//!
//! Every instance calls [`KeyPairManager::ensure_keys`] at startup. The
//! pair is created at most once no matter how many instances race:
//!
//! 1. If both keys are already in the cache, nothing happens.
//! 2. Otherwise the instance tries to take `keypair_lock` with a short TTL
//!    through the cache's atomic set-if-absent.
//! 3. The lock holder re-checks, generates the pair, writes the encrypted
//!    private key and then the public key, and releases the lock. Before
//!    each write it confirms it still owns the lock; if not it backs off
//!    and waits like everyone else.
//! 4. Everyone else polls until both keys appear. If the lock vanishes
//!    first (holder crashed, TTL ran out) they compete for it again.
//!
//! The first writer wins: once a complete pair exists nobody overwrites
//! it. A partial pair (one key missing) is treated as absent and replaced
//! under the lock.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::EncodingKey;
use rogalik_cache::SharedCache;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tokio::time::Instant;
use zeroize::Zeroizing;

use crate::{KeyError, SymmetricEncryptor};

/// Cache key holding the public key PEM.
pub const PUBLIC_KEY: &str = "public_key";
/// Cache key holding the encrypted private key.
pub const PRIVATE_KEY: &str = "private_key";
/// Cache key used as the creation lock.
pub const KEYPAIR_LOCK: &str = "keypair_lock";
/// Smallest accepted RSA modulus.
pub const MIN_KEY_BITS: usize = 2048;

/// Configuration for the key pair manager.
#[derive(Debug, Clone)]
pub struct KeyConfig {
    /// RSA modulus size in bits.
    pub key_bits: usize,
    /// TTL on the creation lock. Bounds how long a crashed creator can
    /// block the others. Must cover key generation, or the holder loses
    /// the lock and starts over.
    pub lock_ttl: Duration,
    /// How long a waiting instance polls before giving up.
    pub init_timeout: Duration,
    /// Delay between polls while another instance holds the lock.
    pub poll_interval: Duration,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            key_bits: MIN_KEY_BITS,
            lock_ttl: Duration::from_secs(30),
            init_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// How [`KeyPairManager::ensure_keys`] found or produced the key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPairStatus {
    /// Both keys were already present.
    Existing,
    /// This instance created the pair.
    Generated,
    /// Another instance created the pair while this one waited.
    Adopted,
}

/// The decrypted private key, ready for signing.
///
/// Wraps the `jsonwebtoken` key so the material never appears in logs.
#[derive(Clone)]
pub struct SigningKey {
    key: EncodingKey,
}

impl SigningKey {
    /// The underlying `jsonwebtoken` encoding key.
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey { .. }")
    }
}

/// Owns the signing key pair stored in the shared cache.
pub struct KeyPairManager {
    cache: Arc<dyn SharedCache>,
    encryptor: SymmetricEncryptor,
    config: KeyConfig,
    instance_id: String,
}

impl KeyPairManager {
    /// Creates a manager over `cache`.
    ///
    /// # Errors
    /// Returns [`KeyError::KeyTooSmall`] if `config.key_bits` is below
    /// [`MIN_KEY_BITS`].
    pub fn new(
        cache: Arc<dyn SharedCache>,
        encryptor: SymmetricEncryptor,
        config: KeyConfig,
    ) -> Result<Self, KeyError> {
        if config.key_bits < MIN_KEY_BITS {
            return Err(KeyError::KeyTooSmall(config.key_bits));
        }
        Ok(Self {
            cache,
            encryptor,
            config,
            instance_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    /// The identifier this instance writes into the creation lock.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The active configuration.
    pub fn config(&self) -> &KeyConfig {
        &self.config
    }

    /// Makes sure a complete key pair exists in the cache.
    ///
    /// # Errors
    /// - [`KeyError::InitTimeout`] if another instance holds the lock and
    ///   no pair appears within `init_timeout`
    /// - [`KeyError::Cache`] if the cache is unreachable
    /// - [`KeyError::Generation`] or [`KeyError::Encryption`] if this
    ///   instance won the lock and could not produce the pair
    #[tracing::instrument(skip(self), fields(instance = %self.instance_id))]
    pub async fn ensure_keys(&self) -> Result<KeyPairStatus, KeyError> {
        if self.has_key_pair().await? {
            tracing::debug!("signing key pair already present");
            return Ok(KeyPairStatus::Existing);
        }

        let deadline = Instant::now() + self.config.init_timeout;
        let mut waited = false;
        loop {
            if self.try_lock().await? {
                let result = self.create_if_missing(waited).await;
                self.release_lock().await;
                match result {
                    Err(KeyError::LockLost) => {
                        tracing::warn!("key pair lock expired during generation, waiting");
                    }
                    other => return other,
                }
            }

            waited = true;
            if self.has_key_pair().await? {
                tracing::info!("adopted signing key pair created by another instance");
                return Ok(KeyPairStatus::Adopted);
            }
            if Instant::now() >= deadline {
                tracing::error!(
                    timeout_ms = self.config.init_timeout.as_millis() as u64,
                    "gave up waiting for signing key pair"
                );
                return Err(KeyError::InitTimeout);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Replaces the key pair unconditionally.
    ///
    /// Tokens signed with the previous pair stop verifying once every
    /// instance has picked up the new public key.
    ///
    /// # Errors
    /// [`KeyError::InitTimeout`] if the creation lock cannot be taken
    /// within `init_timeout`, or any generation or cache error.
    #[tracing::instrument(skip(self), fields(instance = %self.instance_id))]
    pub async fn rotate_keys(&self) -> Result<(), KeyError> {
        let deadline = Instant::now() + self.config.init_timeout;
        while !self.try_lock().await? {
            if Instant::now() >= deadline {
                return Err(KeyError::InitTimeout);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        let result = self.generate_and_store().await;
        self.release_lock().await;
        if result.is_ok() {
            tracing::info!("rotated signing key pair");
        }
        result
    }

    /// Returns the public key PEM.
    ///
    /// # Errors
    /// [`KeyError::KeyNotFound`] if no public key is stored.
    pub async fn get_public_key(&self) -> Result<Vec<u8>, KeyError> {
        self.cache
            .get(PUBLIC_KEY)
            .await?
            .ok_or(KeyError::KeyNotFound { key: PUBLIC_KEY })
    }

    /// Returns the decrypted private key as a signing key.
    ///
    /// # Errors
    /// - [`KeyError::KeyNotFound`] if no private key is stored
    /// - [`KeyError::Decryption`] if it was sealed under another key
    /// - [`KeyError::InvalidKeyMaterial`] if the plaintext is not a PEM
    pub async fn get_private_key(&self) -> Result<SigningKey, KeyError> {
        let blob = self
            .cache
            .get(PRIVATE_KEY)
            .await?
            .ok_or(KeyError::KeyNotFound { key: PRIVATE_KEY })?;
        let pem = self.encryptor.decrypt(&blob)?;
        let key = EncodingKey::from_rsa_pem(&pem)
            .map_err(|e| KeyError::InvalidKeyMaterial(e.to_string()))?;
        Ok(SigningKey { key })
    }

    async fn has_key_pair(&self) -> Result<bool, KeyError> {
        Ok(self.cache.exists(PRIVATE_KEY).await? && self.cache.exists(PUBLIC_KEY).await?)
    }

    async fn try_lock(&self) -> Result<bool, KeyError> {
        let created = self
            .cache
            .set_if_absent(
                KEYPAIR_LOCK,
                self.instance_id.as_bytes(),
                Some(self.config.lock_ttl),
            )
            .await?;
        // A retried set reports `false` when the first attempt landed.
        Ok(created || self.owns_lock().await?)
    }

    async fn owns_lock(&self) -> Result<bool, KeyError> {
        Ok(self
            .cache
            .get(KEYPAIR_LOCK)
            .await?
            .is_some_and(|owner| owner == self.instance_id.as_bytes()))
    }

    async fn ensure_lock_held(&self) -> Result<(), KeyError> {
        if self.owns_lock().await? {
            return Ok(());
        }
        Err(KeyError::LockLost)
    }

    /// Runs under the lock. Another instance may have finished between our
    /// last check and taking the lock.
    async fn create_if_missing(&self, waited: bool) -> Result<KeyPairStatus, KeyError> {
        if self.has_key_pair().await? {
            return Ok(if waited {
                KeyPairStatus::Adopted
            } else {
                KeyPairStatus::Existing
            });
        }
        self.generate_and_store().await?;
        Ok(KeyPairStatus::Generated)
    }

    async fn generate_and_store(&self) -> Result<(), KeyError> {
        let bits = self.config.key_bits;
        let started = Instant::now();
        let (private_pem, public_pem) = tokio::task::spawn_blocking(move || generate_pem_pair(bits))
            .await
            .map_err(|e| KeyError::Generation(e.to_string()))??;

        let sealed = self.encryptor.encrypt(private_pem.as_bytes())?;
        // Private key first, public key second.
        self.ensure_lock_held().await?;
        self.cache.set(PRIVATE_KEY, sealed.as_bytes()).await?;
        self.ensure_lock_held().await?;
        self.cache.set(PUBLIC_KEY, public_pem.as_bytes()).await?;

        tracing::info!(
            bits,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generated signing key pair"
        );
        Ok(())
    }

    /// Deletes the lock if this instance still owns it. Failure is logged
    /// and otherwise ignored; the TTL clears the lock eventually.
    async fn release_lock(&self) {
        match self.cache.get(KEYPAIR_LOCK).await {
            Ok(Some(owner)) if owner == self.instance_id.as_bytes() => {
                if let Err(err) = self.cache.delete(KEYPAIR_LOCK).await {
                    tracing::warn!(error = %err, "failed to release key pair lock");
                }
            }
            Ok(_) => {
                tracing::warn!("key pair lock expired before release");
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to read key pair lock");
            }
        }
    }
}

impl fmt::Debug for KeyPairManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPairManager")
            .field("config", &self.config)
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

/// Generates an RSA pair and returns (PKCS#1 private PEM, SPKI public PEM).
fn generate_pem_pair(bits: usize) -> Result<(Zeroizing<String>, String), KeyError> {
    let mut rng = rsa::rand_core::OsRng;
    let private = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    let private_pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    let public_pem = RsaPublicKey::from(&private)
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    Ok((private_pem, public_pem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rogalik_cache::MemoryCache;

    fn encryptor() -> SymmetricEncryptor {
        SymmetricEncryptor::from_bytes(&[42u8; 32])
    }

    fn manager_with(cache: Arc<dyn SharedCache>, config: KeyConfig) -> KeyPairManager {
        KeyPairManager::new(cache, encryptor(), config).unwrap()
    }

    fn manager(cache: Arc<dyn SharedCache>) -> KeyPairManager {
        manager_with(cache, KeyConfig::default())
    }

    // =========================================================================
    // Construction
    // =========================================================================

    #[test]
    fn test_rejects_small_modulus() {
        let config = KeyConfig {
            key_bits: 1024,
            ..KeyConfig::default()
        };
        let result = KeyPairManager::new(Arc::new(MemoryCache::new()), encryptor(), config);
        assert!(matches!(result, Err(KeyError::KeyTooSmall(1024))));
    }

    #[test]
    fn test_instance_ids_are_unique() {
        let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
        let a = manager(Arc::clone(&cache));
        let b = manager(cache);
        assert_ne!(a.instance_id(), b.instance_id());
    }

    // =========================================================================
    // ensure_keys
    // =========================================================================

    #[tokio::test]
    async fn test_generates_once_then_reports_existing() {
        let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
        let keys = manager(Arc::clone(&cache));

        assert_eq!(keys.ensure_keys().await.unwrap(), KeyPairStatus::Generated);
        let public = keys.get_public_key().await.unwrap();
        assert!(String::from_utf8_lossy(&public).starts_with("-----BEGIN PUBLIC KEY-----"));

        assert_eq!(keys.ensure_keys().await.unwrap(), KeyPairStatus::Existing);
        assert_eq!(keys.get_public_key().await.unwrap(), public);
        assert!(!cache.exists(KEYPAIR_LOCK).await.unwrap());
    }

    #[tokio::test]
    async fn test_private_key_is_not_stored_in_clear() {
        let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
        let keys = manager(Arc::clone(&cache));
        keys.ensure_keys().await.unwrap();

        let stored = cache.get(PRIVATE_KEY).await.unwrap().unwrap();
        assert!(!String::from_utf8_lossy(&stored).contains("PRIVATE KEY"));
        assert!(keys.get_private_key().await.is_ok());
    }

    #[tokio::test]
    async fn test_partial_pair_is_replaced() {
        let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
        cache.set(PUBLIC_KEY, b"stale").await.unwrap();
        let keys = manager(Arc::clone(&cache));

        assert_eq!(keys.ensure_keys().await.unwrap(), KeyPairStatus::Generated);
        assert_ne!(keys.get_public_key().await.unwrap(), b"stale".to_vec());
        assert!(keys.get_private_key().await.is_ok());
    }

    #[tokio::test]
    async fn test_waits_for_crashed_holder_lock_to_expire() {
        let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
        cache
            .set_if_absent(KEYPAIR_LOCK, b"dead", Some(Duration::from_millis(200)))
            .await
            .unwrap();
        let keys = manager_with(
            Arc::clone(&cache),
            KeyConfig {
                poll_interval: Duration::from_millis(20),
                init_timeout: Duration::from_secs(30),
                ..KeyConfig::default()
            },
        );

        assert_eq!(keys.ensure_keys().await.unwrap(), KeyPairStatus::Generated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_lock_never_clears() {
        let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
        cache.set(KEYPAIR_LOCK, b"stuck").await.unwrap();
        let keys = manager_with(
            cache,
            KeyConfig {
                poll_interval: Duration::from_millis(50),
                init_timeout: Duration::from_millis(500),
                ..KeyConfig::default()
            },
        );

        assert!(matches!(keys.ensure_keys().await, Err(KeyError::InitTimeout)));
    }

    #[tokio::test]
    async fn test_lock_already_held_by_self_counts_as_won() {
        let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
        let keys = manager_with(
            Arc::clone(&cache),
            KeyConfig {
                poll_interval: Duration::from_millis(20),
                init_timeout: Duration::from_millis(500),
                ..KeyConfig::default()
            },
        );
        // What a retried set-if-absent leaves behind when its first
        // attempt landed but the reply was lost.
        cache
            .set_with_ttl(KEYPAIR_LOCK, keys.instance_id().as_bytes(), Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(keys.ensure_keys().await.unwrap(), KeyPairStatus::Generated);
        assert!(!cache.exists(KEYPAIR_LOCK).await.unwrap());
    }

    #[tokio::test]
    async fn test_generation_aborts_when_lock_changes_hands() {
        let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
        let keys = manager(Arc::clone(&cache));
        assert!(keys.try_lock().await.unwrap());

        // Our lock expired and another instance took it.
        cache.set(KEYPAIR_LOCK, b"usurper").await.unwrap();

        assert!(matches!(
            keys.generate_and_store().await,
            Err(KeyError::LockLost)
        ));
        assert!(!cache.exists(PRIVATE_KEY).await.unwrap());
        assert!(!cache.exists(PUBLIC_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_does_not_release_foreign_lock() {
        let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
        let keys = manager(Arc::clone(&cache));
        cache.set(KEYPAIR_LOCK, b"someone-else").await.unwrap();

        keys.release_lock().await;
        assert_eq!(
            cache.get(KEYPAIR_LOCK).await.unwrap(),
            Some(b"someone-else".to_vec())
        );
    }

    // =========================================================================
    // Retrieval
    // =========================================================================

    #[tokio::test]
    async fn test_missing_keys_are_reported() {
        let keys = manager(Arc::new(MemoryCache::new()));
        assert!(matches!(
            keys.get_public_key().await,
            Err(KeyError::KeyNotFound { key: PUBLIC_KEY })
        ));
        assert!(matches!(
            keys.get_private_key().await,
            Err(KeyError::KeyNotFound { key: PRIVATE_KEY })
        ));
    }

    #[tokio::test]
    async fn test_wrong_symmetric_key_fails_decryption() {
        let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
        manager(Arc::clone(&cache)).ensure_keys().await.unwrap();

        let other = KeyPairManager::new(
            cache,
            SymmetricEncryptor::from_bytes(&[7u8; 32]),
            KeyConfig::default(),
        )
        .unwrap();
        assert!(matches!(other.get_private_key().await, Err(KeyError::Decryption)));
    }

    #[tokio::test]
    async fn test_rotate_replaces_pair() {
        let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
        let keys = manager(cache);
        keys.ensure_keys().await.unwrap();
        let before = keys.get_public_key().await.unwrap();

        keys.rotate_keys().await.unwrap();
        assert_ne!(keys.get_public_key().await.unwrap(), before);
        assert_eq!(keys.ensure_keys().await.unwrap(), KeyPairStatus::Existing);
    }
}
