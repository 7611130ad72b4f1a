//! Deterministic path-component encryption.
//!
//! Each component is sealed with AES-256-GCM under a fixed all-zero nonce;
//! the on-disk token is `tag (16) || ciphertext`, base64-encoded with the
//! URL-safe alphabet and no padding. The fixed nonce makes encoding
//! deterministic, so a component can be located on disk by re-encrypting its
//! name. What leaks is equality of component names across the tree, nothing
//! more. Decoding verifies the tag, so foreign entries in a backing
//! directory are detected rather than mis-decoded.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use super::CryptoError;
use super::keys::SecretKey;

/// GCM authentication tag width; the token leads with the tag.
pub const TAG_LEN: usize = 16;

const ZERO_NONCE: [u8; 12] = [0u8; 12];

/// Encoder/decoder for path-component names.
pub struct NameCodec {
    gcm: Aes256Gcm,
}

impl NameCodec {
    #[must_use]
    pub fn new(key: &SecretKey) -> Self {
        Self {
            gcm: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes())),
        }
    }

    /// Encrypt one path component into its on-disk token.
    pub fn encrypt(&self, name: &str) -> Result<String, CryptoError> {
        let sealed = self
            .gcm
            .encrypt(Nonce::from_slice(&ZERO_NONCE), name.as_bytes())
            .map_err(|_| CryptoError::NameEncrypt(name.to_string()))?;

        // The aead API appends the tag; the token format leads with it.
        let (body, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        let mut raw = Vec::with_capacity(sealed.len());
        raw.extend_from_slice(tag);
        raw.extend_from_slice(body);
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Decode an on-disk token back into the component name, verifying the
    /// tag.
    pub fn decrypt(&self, token: &str) -> Result<String, CryptoError> {
        let invalid = || CryptoError::InvalidName(token.to_string());

        let raw = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
        if raw.len() < TAG_LEN {
            return Err(invalid());
        }
        let (tag, body) = raw.split_at(TAG_LEN);
        let mut sealed = Vec::with_capacity(raw.len());
        sealed.extend_from_slice(body);
        sealed.extend_from_slice(tag);

        let plain = self
            .gcm
            .decrypt(Nonce::from_slice(&ZERO_NONCE), sealed.as_ref())
            .map_err(|_| invalid())?;
        String::from_utf8(plain).map_err(|_| invalid())
    }
}
