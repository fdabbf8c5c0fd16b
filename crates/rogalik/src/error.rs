//! Unified error type for the Rogalik auth subsystem.

use rogalik_cache::CacheError;
use rogalik_keys::KeyError;
use rogalik_token::TokenError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// Everything that can fail while assembling an [`AuthSystem`](crate::AuthSystem)
/// surfaces as one of these, so `?` works across layers.
#[derive(Debug, thiserror::Error)]
pub enum RogalikError {
    /// Settings could not be loaded or are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The shared cache could not be reached.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Key material could not be created, stored or loaded.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The token service could not be set up or could not sign.
    #[error(transparent)]
    Token(#[from] TokenError),
}
