//! Error types for the key layer.

use rogalik_cache::CacheError;

/// Errors that can occur while creating, storing or loading key material.
///
/// Messages never include key bytes; they are safe to log.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// A key entry is missing from the cache.
    #[error("key not found in cache: {key}")]
    KeyNotFound { key: &'static str },

    /// The configured symmetric key is not 32 bytes in a known encoding.
    #[error("symmetric key must be 32 bytes (hex, base64 or raw)")]
    InvalidSymmetricKey,

    /// Encrypting the private key failed.
    #[error("private key encryption failed")]
    Encryption,

    /// The stored private key could not be decrypted. Usually means the
    /// configured symmetric key differs from the one used to store it.
    #[error("private key decryption failed")]
    Decryption,

    /// Stored key material could not be parsed.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// RSA key generation failed.
    #[error("key generation failed: {0}")]
    Generation(String),

    /// The requested modulus is too small.
    #[error("RSA modulus of {0} bits is below the 2048-bit minimum")]
    KeyTooSmall(usize),

    /// Another instance held the creation lock for longer than the
    /// configured init timeout without finishing.
    #[error("timed out waiting for the signing key pair to be created")]
    InitTimeout,

    /// The creation lock expired or passed to another instance before
    /// this one finished writing the pair.
    #[error("lost the key pair lock during creation")]
    LockLost,

    /// The cache call itself failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cache_error() {
        let err: KeyError = CacheError::Timeout.into();
        assert!(matches!(err, KeyError::Cache(CacheError::Timeout)));
    }

    #[test]
    fn test_key_not_found_names_the_key() {
        let err = KeyError::KeyNotFound { key: "public_key" };
        assert_eq!(err.to_string(), "key not found in cache: public_key");
    }
}
