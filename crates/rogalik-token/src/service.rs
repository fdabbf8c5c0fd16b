//! Signed, time-bound session tokens.
//!
//! Tokens are standard JWTs signed with the shared RSA key pair. Every
//! instance reads the public key and the revocation list from the cache on
//! each validation, so no instance trusts in-process state about either.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use rogalik_keys::KeyPairManager;
use serde_json::Value;

use crate::{AuthFailure, ErrorKind, RevocationStore, TokenError, ValidationState};

/// Decoded token payload.
pub type ClaimSet = serde_json::Map<String, Value>;

/// Prefix every presented token must carry.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Returns `true` for the RSA signature schemes tokens can be signed with:
/// RS256/384/512 and PS256/384/512.
pub fn is_rsa_algorithm(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
    )
}

/// Token issuance and validation settings.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    /// Signature scheme. Must be RSA-based.
    pub signing_algorithm: Algorithm,
    /// Lifetime of issued tokens.
    pub token_expiration_seconds: u64,
    /// Reject tokens past `exp`. Disabling this keeps tokens valid until
    /// revoked.
    pub verify_expiry: bool,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            signing_algorithm: Algorithm::RS256,
            token_expiration_seconds: 11520,
            verify_expiry: true,
        }
    }
}

impl TokenSettings {
    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.token_expiration_seconds)
    }
}

/// Issues, validates and revokes tokens.
pub struct TokenService {
    keys: Arc<KeyPairManager>,
    revocations: RevocationStore,
    settings: TokenSettings,
    validation: Validation,
}

impl TokenService {
    /// Creates the service.
    ///
    /// # Errors
    /// [`TokenError::UnsupportedAlgorithm`] unless the algorithm is one of
    /// RS256/384/512 or PS256/384/512.
    pub fn new(
        keys: Arc<KeyPairManager>,
        revocations: RevocationStore,
        settings: TokenSettings,
    ) -> Result<Self, TokenError> {
        if !is_rsa_algorithm(settings.signing_algorithm) {
            return Err(TokenError::UnsupportedAlgorithm(settings.signing_algorithm));
        }

        let mut validation = Validation::new(settings.signing_algorithm);
        validation.leeway = 0;
        validation.validate_exp = settings.verify_expiry;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            keys,
            revocations,
            settings,
            validation,
        })
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// The key manager this service signs with.
    pub fn keys(&self) -> &Arc<KeyPairManager> {
        &self.keys
    }

    /// Signs `claims` with `exp` set to now plus the configured lifetime.
    ///
    /// Any `exp` already in `claims` is replaced.
    ///
    /// # Errors
    /// - [`TokenError::MissingSubject`] without a non-empty string `sub`
    /// - [`TokenError::Key`] if the private key cannot be loaded
    pub async fn create_token(&self, mut claims: ClaimSet) -> Result<String, TokenError> {
        match claims.get("sub") {
            Some(Value::String(sub)) if !sub.is_empty() => {}
            _ => return Err(TokenError::MissingSubject),
        }

        let exp = jsonwebtoken::get_current_timestamp() + self.settings.token_expiration_seconds;
        claims.insert("exp".to_owned(), Value::from(exp));

        let key = self.keys.get_private_key().await.inspect_err(|err| {
            tracing::error!(error = %err, "signing key unavailable");
        })?;
        let token = jsonwebtoken::encode(
            &Header::new(self.settings.signing_algorithm),
            &claims,
            key.encoding_key(),
        )
        .map_err(TokenError::Signing)?;

        tracing::debug!(sub = %claims["sub"], exp, "token issued");
        Ok(token)
    }

    /// Validates `raw` and maps any failure through `kind`.
    ///
    /// Checks, in order: `Bearer ` prefix, revocation, public key lookup,
    /// signature, expiry.
    pub async fn validate_token<K: ErrorKind>(
        &self,
        raw: &str,
        kind: K,
    ) -> Result<ClaimSet, K::Error> {
        self.verify(raw).await.map_err(|failure| kind.reject(failure))
    }

    /// Validates `raw`, reporting the bare [`AuthFailure`].
    #[tracing::instrument(name = "validate_token", skip_all, fields(state = %ValidationState::Start))]
    pub async fn verify(&self, raw: &str) -> Result<ClaimSet, AuthFailure> {
        let result = self.run_checks(raw).await;
        let state = match &result {
            Ok(_) => ValidationState::Valid,
            Err(failure) => ValidationState::after(*failure),
        };
        tracing::Span::current().record("state", state.as_str());
        if let Err(failure) = &result {
            tracing::debug!(reason = failure.reason(), "token rejected");
        }
        result
    }

    /// Revokes `raw` for the rest of its lifetime.
    ///
    /// Logging out with an expired or already revoked token succeeds
    /// without doing anything. When expiry is not enforced the entry lives
    /// for the full configured token lifetime.
    ///
    /// # Errors
    /// Any other validation failure, or [`AuthFailure::CacheUnavailable`]
    /// if the entry could not be written.
    pub async fn logout(&self, raw: &str) -> Result<(), AuthFailure> {
        let claims = match self.verify(raw).await {
            Ok(claims) => claims,
            Err(AuthFailure::ExpiredToken | AuthFailure::RevokedToken) => return Ok(()),
            Err(failure) => return Err(failure),
        };
        let token = strip_bearer(raw).ok_or(AuthFailure::MissingCredentials)?;

        self.revocations
            .revoke(token, self.remaining_lifetime(&claims))
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "failed to revoke token");
                AuthFailure::CacheUnavailable
            })
    }

    async fn run_checks(&self, raw: &str) -> Result<ClaimSet, AuthFailure> {
        let token = strip_bearer(raw).ok_or(AuthFailure::MissingCredentials)?;

        let revoked = self.revocations.is_revoked(token).await.map_err(|err| {
            tracing::warn!(error = %err, "revocation lookup failed");
            AuthFailure::CacheUnavailable
        })?;
        if revoked {
            return Err(AuthFailure::RevokedToken);
        }

        let public_pem = self.keys.get_public_key().await.map_err(|err| {
            tracing::warn!(error = %err, "public key lookup failed");
            AuthFailure::KeyUnavailable
        })?;
        let decoding_key = DecodingKey::from_rsa_pem(&public_pem).map_err(|err| {
            tracing::warn!(error = %err, "stored public key is not a valid PEM");
            AuthFailure::KeyUnavailable
        })?;

        jsonwebtoken::decode::<ClaimSet>(token, &decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                JwtErrorKind::ExpiredSignature => AuthFailure::ExpiredToken,
                _ => AuthFailure::SignatureInvalid,
            })
    }

    fn remaining_lifetime(&self, claims: &ClaimSet) -> Duration {
        if !self.settings.verify_expiry {
            return self.settings.expiration();
        }
        let exp = claims.get("exp").and_then(Value::as_u64).unwrap_or(0);
        lifetime_until(exp, jsonwebtoken::get_current_timestamp())
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// How long a token expiring at `exp` still validates, seen at `now`.
///
/// Validation accepts a token through the whole second `exp`, and `now` is
/// truncated, so the entry must outlive `exp + 1`.
fn lifetime_until(exp: u64, now: u64) -> Duration {
    if exp < now {
        return Duration::ZERO;
    }
    Duration::from_secs(exp - now + 1)
}

/// Returns the token after `Bearer `, or `None` if the prefix or the token
/// is missing.
pub fn strip_bearer(raw: &str) -> Option<&str> {
    raw.strip_prefix(BEARER_PREFIX).filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer("Bearer abc"), Some("abc"));
        assert_eq!(strip_bearer("Bearer "), None);
        assert_eq!(strip_bearer("bearer abc"), None);
        assert_eq!(strip_bearer("abc"), None);
        assert_eq!(strip_bearer(""), None);
    }

    #[test]
    fn test_lifetime_covers_the_expiry_second() {
        assert_eq!(lifetime_until(100, 90), Duration::from_secs(11));
        assert_eq!(lifetime_until(100, 100), Duration::from_secs(1));
        assert_eq!(lifetime_until(100, 101), Duration::ZERO);
    }

    #[test]
    fn test_only_rsa_schemes_are_accepted() {
        assert!(is_rsa_algorithm(Algorithm::RS256));
        assert!(is_rsa_algorithm(Algorithm::PS512));
        assert!(!is_rsa_algorithm(Algorithm::HS256));
        assert!(!is_rsa_algorithm(Algorithm::ES256));
        assert!(!is_rsa_algorithm(Algorithm::EdDSA));
    }

    #[test]
    fn test_default_settings() {
        let settings = TokenSettings::default();
        assert_eq!(settings.signing_algorithm, Algorithm::RS256);
        assert_eq!(settings.expiration(), Duration::from_secs(11520));
        assert!(settings.verify_expiry);
    }
}
