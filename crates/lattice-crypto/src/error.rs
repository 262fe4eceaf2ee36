//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (authentication failure)
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Peer public key produced an all-zero shared secret
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Sealed blob shorter than the fixed envelope
    #[error("sealed message too short: {0} bytes")]
    SealedTooShort(usize),

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,

    /// Nonce counter exhausted
    #[error("nonce counter exhausted")]
    NonceOverflow,

    /// Record counter already seen or too old
    #[error("replay detected: counter {0}")]
    ReplayDetected(u64),

    /// Block cipher input is not a whole number of blocks
    #[error("ciphertext length {0} is not a multiple of the block size")]
    InvalidCiphertextLength(usize),

    /// Base64 or UTF-8 decoding failed
    #[error("encoding error: {0}")]
    Encoding(String),
}
