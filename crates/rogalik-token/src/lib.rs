//! Session tokens for Rogalik.
//!
//! [`TokenService`] issues JWTs signed with the shared key pair and
//! validates them in a fixed order: `Bearer ` prefix, revocation list,
//! public key, signature, expiry. Failures are reported as an
//! [`AuthFailure`] and shaped for the caller's protocol by an
//! [`ErrorKind`].
//!
//! [`RevocationStore`] keeps logged-out tokens blocked until they would
//! have expired anyway.

mod error;
mod failure;
mod revocation;
mod service;

pub use error::TokenError;
pub use failure::{AuthFailure, ErrorKind, PlainKind, ValidationState};
pub use revocation::{REVOCATION_PREFIX, RevocationStore};
pub use service::{
    BEARER_PREFIX, ClaimSet, TokenService, TokenSettings, is_rsa_algorithm, strip_bearer,
};

/// Re-exported so callers can name signature schemes without depending on
/// `jsonwebtoken` directly.
pub use jsonwebtoken::Algorithm;
