//! Signing key lifecycle for Rogalik.
//!
//! Tokens are signed with an RSA key pair that lives in the shared cache,
//! so any instance can verify what any other instance signed. This crate
//! owns that pair:
//!
//! - [`SymmetricEncryptor`] keeps the private half encrypted at rest
//! - [`KeyPairManager`] creates the pair at most once across all
//!   instances and hands out the public PEM and the decrypted signing key
//!
//! # Cache layout
//!
//! ```text
//! public_key    → SPKI PEM (plain)
//! private_key   → base64url(nonce || ChaCha20-Poly1305(PKCS#1 PEM))
//! keypair_lock  → instance id of the current creator (short TTL)
//! ```

mod cipher;
mod error;
mod manager;

pub use cipher::SymmetricEncryptor;
pub use error::KeyError;
pub use manager::{
    KEYPAIR_LOCK, KeyConfig, KeyPairManager, KeyPairStatus, MIN_KEY_BITS,
    PRIVATE_KEY, PUBLIC_KEY, SigningKey,
};
