//! The mount key: 256 bits, supplied by the user, never persisted.

use std::fmt;

use rand::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key width in bytes. Both the CTR body cipher and the GCM name codec are
/// AES-256, so one key parameterizes both.
pub const KEY_LEN: usize = 32;

/// Errors from decoding user-supplied key material.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Not hexadecimal, or odd length.
    #[error("key must be hexadecimal with an even number of digits")]
    MalformedHex,

    /// Decoded to the wrong width.
    #[error("key must be {KEY_LEN} bytes, got {0}")]
    WrongLength(usize),
}

/// The symmetric mount key. Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode a key from the hex form the CLI exchanges.
    ///
    /// The input must match `^[0-9a-fA-F]+$`, have even length, and decode
    /// to exactly [`KEY_LEN`] bytes.
    pub fn from_hex(hex_key: &str) -> Result<Self, KeyError> {
        if hex_key.is_empty()
            || hex_key.len() % 2 != 0
            || !hex_key.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(KeyError::MalformedHex);
        }
        let raw = hex::decode(hex_key).map_err(|_| KeyError::MalformedHex)?;
        let len = raw.len();
        let bytes: [u8; KEY_LEN] = raw.try_into().map_err(|_| KeyError::WrongLength(len))?;
        Ok(Self(bytes))
    }

    /// Generate a fresh random key.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

// Key material stays out of logs and error chains.
impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}
