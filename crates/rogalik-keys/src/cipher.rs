//! Symmetric encryption of the private key at rest.
//!
//! The private PEM never touches the cache in the clear. It is sealed with
//! ChaCha20-Poly1305 under a 32-byte key taken from configuration, and
//! stored as `base64url(nonce || ciphertext)` with a fresh random nonce per
//! write. Authenticated encryption means a wrong key is detected on
//! decrypt instead of yielding garbage.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::{Engine, alphabet};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::KeyError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

const ANY_PADDING: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const URL_SAFE_KEY: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, ANY_PADDING);
const STANDARD_KEY: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, ANY_PADDING);

/// Seals and opens the private key with a configured symmetric key.
#[derive(Clone)]
pub struct SymmetricEncryptor {
    cipher: ChaCha20Poly1305,
}

impl SymmetricEncryptor {
    /// Builds an encryptor from configured key material.
    ///
    /// Accepts 64 hex characters, base64url or standard base64 of 32
    /// bytes, or exactly 32 raw characters. Surrounding whitespace is
    /// ignored.
    ///
    /// # Errors
    /// Returns [`KeyError::InvalidSymmetricKey`] for anything else,
    /// including an empty string.
    pub fn from_secret(raw: &str) -> Result<Self, KeyError> {
        let key = parse_key_material(raw).ok_or(KeyError::InvalidSymmetricKey)?;
        Ok(Self::from_bytes(&key))
    }

    /// Builds an encryptor from a raw 32-byte key.
    pub fn from_bytes(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Encrypts `plaintext` into the storable text form.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, KeyError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| KeyError::Encryption)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(payload))
    }

    /// Reverses [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    /// Returns [`KeyError::Decryption`] if the blob is malformed, was
    /// tampered with, or was sealed under a different key.
    pub fn decrypt(&self, encoded: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeyError> {
        let payload = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| KeyError::Decryption)?;
        if payload.len() < NONCE_LEN + TAG_LEN {
            return Err(KeyError::Decryption);
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| KeyError::Decryption)
    }
}

impl fmt::Debug for SymmetricEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricEncryptor { .. }")
    }
}

fn parse_key_material(raw: &str) -> Option<Zeroizing<[u8; 32]>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.len() == 64 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return hex::decode(trimmed).ok().and_then(|bytes| to_key(&bytes));
    }
    [URL_SAFE_KEY, STANDARD_KEY]
        .iter()
        .find_map(|engine| engine.decode(trimmed).ok().and_then(|bytes| to_key(&bytes)))
        .or_else(|| to_key(trimmed.as_bytes()))
}

fn to_key(bytes: &[u8]) -> Option<Zeroizing<[u8; 32]>> {
    let bytes = Zeroizing::new(bytes.to_vec());
    let key: [u8; 32] = bytes.as_slice().try_into().ok()?;
    Some(Zeroizing::new(key))
}
