//! X25519 node identity keys.
//!
//! A node's static key pair is what peers seal session keys to. The public
//! half travels in `KeyAck` packets and cache records as 32 raw bytes.
//! Agreement with a low-order point yields an all-zero secret and is refused.

use crate::{CryptoError, X25519_PUBLIC_KEY_SIZE};
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

/// Static or ephemeral X25519 secret
#[derive(Clone)]
pub struct PrivateKey(x25519_dalek::StaticSecret);

/// X25519 public key as carried on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PublicKey(x25519_dalek::PublicKey);

impl PrivateKey {
    /// Fresh key from `rng`
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(x25519_dalek::StaticSecret::random_from_rng(rng))
    }

    /// Matching public key
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(x25519_dalek::PublicKey::from(&self.0))
    }

    /// Raw Diffie-Hellman output with `peer`, to be fed through a KDF.
    ///
    /// # Errors
    ///
    /// `CryptoError::InvalidPublicKey` when `peer` is a low-order point.
    pub fn agree(&self, peer: &PublicKey) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
        let shared = Zeroizing::new(self.0.diffie_hellman(&peer.0).to_bytes());
        if shared.iter().all(|&b| b == 0) {
            return Err(CryptoError::InvalidPublicKey);
        }
        Ok(shared)
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").field(&self.public_key()).finish()
    }
}

impl PublicKey {
    /// Parse the wire form.
    ///
    /// # Errors
    ///
    /// `CryptoError::InvalidKeyLength` unless `bytes` is exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; X25519_PUBLIC_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: X25519_PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(x25519_dalek::PublicKey::from(raw)))
    }

    /// Wire form
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; X25519_PUBLIC_KEY_SIZE] {
        self.0.as_bytes()
    }
}
