//! Error types for token issuance.

use jsonwebtoken::Algorithm;
use rogalik_cache::CacheError;
use rogalik_keys::KeyError;

use crate::AuthFailure;

/// Errors from creating a token or setting up the service.
///
/// Validation failures are reported as [`AuthFailure`] instead.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The claim set has no non-empty string `sub`.
    #[error("claim set must contain a non-empty string `sub`")]
    MissingSubject,

    /// Only RSA-based signature schemes are supported.
    #[error("unsupported signing algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    /// The signing key could not be loaded.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// `jsonwebtoken` refused to sign.
    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl TokenError {
    /// Classifies the error so callers can show the same short reason a
    /// failed validation would.
    pub fn failure(&self) -> AuthFailure {
        match self {
            Self::MissingSubject => AuthFailure::MissingCredentials,
            Self::Key(KeyError::Decryption | KeyError::Encryption | KeyError::InvalidSymmetricKey) => {
                AuthFailure::EncryptionFailure
            }
            Self::Key(KeyError::Cache(CacheError::Timeout | CacheError::Connection(_))) => {
                AuthFailure::CacheUnavailable
            }
            Self::Key(_) | Self::UnsupportedAlgorithm(_) | Self::Signing(_) => {
                AuthFailure::KeyUnavailable
            }
        }
    }
}
