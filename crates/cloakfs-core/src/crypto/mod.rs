//! Cryptographic primitives for the cloakfs on-disk format.
//!
//! Two constructions, both keyed by the same 256-bit [`SecretKey`]:
//!
//! - [`stream::StreamCipher`] — AES-256 in counter mode for file bodies.
//!   The per-file nonce is the IV base; the block counter is folded into its
//!   low 8 bytes, so any 16-byte-aligned region of a body can be enciphered
//!   or deciphered independently.
//! - [`names::NameCodec`] — AES-256-GCM with a fixed zero nonce for path
//!   components. Deterministic on purpose: encrypted names can be looked up
//!   without a directory index. The tradeoff is that equal component names
//!   are visible as equal tokens across the tree. Never reuse this
//!   construction for file bodies.

pub mod keys;
pub mod names;
pub mod stream;

use thiserror::Error;

use crate::error::StoreError;

/// Errors from the cipher gadget.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A name token failed to decode: malformed base64 or a tag that does
    /// not verify under the mount key.
    #[error("name token failed to decode: {0}")]
    InvalidName(String),

    /// Name encryption failed. AES-GCM over an in-memory buffer does not
    /// fail in practice; this exists so the failure propagates instead of
    /// panicking.
    #[error("name encryption failed for {0:?}")]
    NameEncrypt(String),
}

impl From<CryptoError> for StoreError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidName(token) => StoreError::InvalidName(token),
            other => StoreError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

pub use keys::{KeyError, SecretKey, KEY_LEN};
pub use names::NameCodec;
pub use stream::{StreamCipher, AES_BLOCK};
