//! Sealed key transport.
//!
//! A session key is carried to a peer whose static X25519 public key is
//! already known (from the DHT or a trust record). The sender generates an
//! ephemeral key pair per message:
//!
//! ```text
//! sealed = ephemeral_pub (32) || XChaCha20-Poly1305(k, nonce = 0, msg, aad = ephemeral_pub)
//! k      = BLAKE3-derive("lattice sealed key transport v1", dh || ephemeral_pub || recipient_pub)
//! ```
//!
//! The key is unique per ephemeral, so a fixed nonce is safe.

use crate::CryptoError;
use crate::aead::{AeadKey, SINGLE_USE_NONCE, TAG_SIZE};
use crate::hash::Kdf;
use crate::x25519::{PrivateKey, PublicKey};
use rand_core::{CryptoRng, RngCore};

const SEAL_KDF: Kdf = Kdf::new("lattice sealed key transport v1");

/// Bytes added to the plaintext by [`seal`].
pub const SEAL_OVERHEAD: usize = 32 + TAG_SIZE;

/// Encrypt `plaintext` so that only the holder of `recipient`'s private key can read it.
///
/// # Errors
///
/// Returns `CryptoError::InvalidPublicKey` for a low-order recipient key.
pub fn seal<R: RngCore + CryptoRng>(
    rng: &mut R,
    recipient: &PublicKey,
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = PrivateKey::generate(rng);
    let ephemeral_pub = ephemeral.public_key();
    let shared = ephemeral.agree(recipient)?;

    let key = AeadKey::from_derived(SEAL_KDF.derive(&[
        shared.as_slice(),
        ephemeral_pub.as_bytes().as_slice(),
        recipient.as_bytes().as_slice(),
    ]));
    let ciphertext = key.encrypt(&SINGLE_USE_NONCE, plaintext, ephemeral_pub.as_bytes())?;

    let mut out = Vec::with_capacity(32 + ciphertext.len());
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a blob produced by [`seal`].
///
/// # Errors
///
/// Returns `CryptoError::SealedTooShort` for truncated input and
/// `CryptoError::DecryptionFailed` if the blob was not sealed to `recipient`.
pub fn open(recipient: &PrivateKey, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < SEAL_OVERHEAD {
        return Err(CryptoError::SealedTooShort(sealed.len()));
    }

    let (ephemeral_bytes, ciphertext) = sealed.split_at(32);
    let ephemeral_pub = PublicKey::from_slice(ephemeral_bytes)?;
    let shared = recipient.agree(&ephemeral_pub)?;

    let recipient_pub = recipient.public_key();
    let key = AeadKey::from_derived(SEAL_KDF.derive(&[
        shared.as_slice(),
        ephemeral_pub.as_bytes().as_slice(),
        recipient_pub.as_bytes().as_slice(),
    ]));
    key.decrypt(&SINGLE_USE_NONCE, ciphertext, ephemeral_pub.as_bytes())
}
