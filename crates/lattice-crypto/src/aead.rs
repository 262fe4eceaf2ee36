//! `XChaCha20-Poly1305` keys for channel records and sealed keys.
//!
//! Every key here comes out of the BLAKE3 KDF, never from the caller
//! directly. Records use a nonce of `counter (8 bytes LE) || salt (16)`.
//! Sealed keys use a fresh key per message and so a single zero nonce.

use crate::{CryptoError, SESSION_IV_SIZE};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use zeroize::Zeroizing;

/// Poly1305 tag appended to every ciphertext
pub const TAG_SIZE: usize = 16;

const NONCE_SIZE: usize = 24;

/// Nonce of record `counter` under a session salt
#[must_use]
pub fn record_nonce(counter: u64, salt: &[u8; SESSION_IV_SIZE]) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..8].copy_from_slice(&counter.to_le_bytes());
    nonce[8..].copy_from_slice(salt);
    nonce
}

/// Nonce for a key that encrypts exactly one message
pub const SINGLE_USE_NONCE: [u8; NONCE_SIZE] = [0u8; NONCE_SIZE];

/// A derived AEAD key
pub struct AeadKey(Zeroizing<[u8; 32]>);

impl AeadKey {
    /// Wrap KDF output
    #[must_use]
    pub fn from_derived(key: [u8; 32]) -> Self {
        Self(Zeroizing::new(key))
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(self.0.as_slice().into())
    }

    /// Encrypt and append the tag.
    ///
    /// # Errors
    ///
    /// `CryptoError::EncryptionFailed` if the backend refuses the input.
    pub fn encrypt(
        &self,
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.cipher()
            .encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Verify the tag and decrypt.
    ///
    /// # Errors
    ///
    /// `CryptoError::DecryptionFailed` for short input or a bad tag.
    pub fn decrypt(
        &self,
        nonce: &[u8; NONCE_SIZE],
        sealed: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }
        self.cipher()
            .decrypt(XNonce::from_slice(nonce), Payload { msg: sealed, aad })
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AeadKey(..)")
    }
}
