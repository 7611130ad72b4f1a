//! AES-256-CTR stream cipher over a derived IV.
//!
//! The IV for block counter `c` is the 16-byte per-file nonce with its low
//! 8 bytes replaced by `low64(nonce) + c` (big-endian, wrapping). Folding
//! the counter into only the low half means any 16-byte-aligned region of a
//! body can be processed without touching its neighbors, which is what makes
//! random-access read and write possible. Writer and reader must derive the
//! IV identically; a mismatch in the wrap behavior silently corrupts data.

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};

use super::keys::SecretKey;

/// AES block width; also the counter granularity along the ciphertext body.
pub const AES_BLOCK: usize = 16;

/// Per-file nonce width. The nonce doubles as the CTR IV base.
pub const NONCE_LEN: usize = 16;

/// Keystream generator for file bodies.
///
/// Enciphering and deciphering are the same XOR, so there is a single
/// [`apply`](StreamCipher::apply) entry point.
pub struct StreamCipher {
    aes: Aes256,
}

impl StreamCipher {
    #[must_use]
    pub fn new(key: &SecretKey) -> Self {
        Self {
            aes: Aes256::new(GenericArray::from_slice(key.as_bytes())),
        }
    }

    /// XOR the keystream over `buf` in place.
    ///
    /// `buf` must start on an AES block boundary of the body; `counter` is
    /// the index of that block (first body byte = counter 0). The buffer
    /// need not end on a block boundary.
    pub fn apply(&self, nonce: &[u8; NONCE_LEN], counter: u64, buf: &mut [u8]) {
        for (i, chunk) in buf.chunks_mut(AES_BLOCK).enumerate() {
            let block = self.keystream_block(nonce, counter.wrapping_add(i as u64));
            for (byte, key_byte) in chunk.iter_mut().zip(block.iter()) {
                *byte ^= key_byte;
            }
        }
    }

    fn keystream_block(&self, nonce: &[u8; NONCE_LEN], counter: u64) -> [u8; AES_BLOCK] {
        let mut iv = *nonce;
        let mut low = [0u8; 8];
        low.copy_from_slice(&iv[8..16]);
        let bumped = u64::from_be_bytes(low).wrapping_add(counter);
        iv[8..16].copy_from_slice(&bumped.to_be_bytes());

        let mut block = GenericArray::clone_from_slice(&iv);
        self.aes.encrypt_block(&mut block);
        block.into()
    }
}
