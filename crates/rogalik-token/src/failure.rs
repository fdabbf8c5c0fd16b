//! Failure classification and protocol-specific error injection.
//!
//! Validation logic is written once and reports an [`AuthFailure`]. The
//! caller decides how that failure looks on its wire by passing an
//! [`ErrorKind`]: an HTTP layer turns it into a status code, a message
//! layer into a close code, tests keep the bare failure via [`PlainKind`].

use std::fmt;

/// Why a credential was rejected.
///
/// `Display` yields the short, client-safe reason. Internal details such
/// as decryption or cache errors are logged where they happen and never
/// carried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum AuthFailure {
    /// No `Bearer ` token was supplied.
    #[error("missing credentials")]
    MissingCredentials,
    /// The token is on the revocation list.
    #[error("revoked")]
    RevokedToken,
    /// The verification key could not be loaded.
    #[error("key unavailable")]
    KeyUnavailable,
    /// Malformed token or signature mismatch.
    #[error("decode error")]
    SignatureInvalid,
    /// The token is past its `exp`.
    #[error("expired")]
    ExpiredToken,
    /// The private key could not be decrypted or encrypted.
    #[error("key unavailable")]
    EncryptionFailure,
    /// The revocation lookup itself failed.
    #[error("service unavailable")]
    CacheUnavailable,
}

impl AuthFailure {
    /// Short reason string shown to clients.
    pub fn reason(self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing credentials",
            Self::RevokedToken => "revoked",
            Self::KeyUnavailable | Self::EncryptionFailure => "key unavailable",
            Self::SignatureInvalid => "decode error",
            Self::ExpiredToken => "expired",
            Self::CacheUnavailable => "service unavailable",
        }
    }

    /// `true` if the failure is the caller's fault rather than ours.
    pub fn is_credential_failure(self) -> bool {
        matches!(
            self,
            Self::MissingCredentials
                | Self::RevokedToken
                | Self::SignatureInvalid
                | Self::ExpiredToken
        )
    }
}

/// Turns an [`AuthFailure`] into a protocol-specific error.
pub trait ErrorKind: Send + Sync {
    /// The error type surfaced to the protocol layer.
    type Error: Send + 'static;

    /// Builds the protocol error for `failure`.
    fn reject(&self, failure: AuthFailure) -> Self::Error;
}

/// Keeps the bare [`AuthFailure`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainKind;

impl ErrorKind for PlainKind {
    type Error = AuthFailure;

    fn reject(&self, failure: AuthFailure) -> AuthFailure {
        failure
    }
}

/// Where a single validation call ended up.
///
/// `Valid` is the only state that lets the protected operation run. The
/// state is recorded on the `validate_token` tracing span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Start,
    TokenExtracted,
    Revoked,
    KeyUnavailable,
    SignatureInvalid,
    Expired,
    Valid,
}

impl ValidationState {
    /// Terminal state reached for `failure`.
    pub fn after(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::MissingCredentials => Self::Start,
            AuthFailure::CacheUnavailable => Self::TokenExtracted,
            AuthFailure::RevokedToken => Self::Revoked,
            AuthFailure::KeyUnavailable | AuthFailure::EncryptionFailure => Self::KeyUnavailable,
            AuthFailure::SignatureInvalid => Self::SignatureInvalid,
            AuthFailure::ExpiredToken => Self::Expired,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::TokenExtracted => "token_extracted",
            Self::Revoked => "revoked",
            Self::KeyUnavailable => "key_unavailable",
            Self::SignatureInvalid => "signature_invalid",
            Self::Expired => "expired",
            Self::Valid => "valid",
        }
    }
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
