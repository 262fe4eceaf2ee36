//! # Lattice Crypto
//!
//! Cryptographic primitives used by the Lattice connectivity layer.
//!
//! This crate provides:
//! - `XChaCha20-Poly1305` AEAD and the per-direction channel record cipher
//! - Sliding-window replay protection for channel records
//! - X25519 key agreement and sealed transport of session keys
//! - BLAKE3 fingerprints and context-separated key derivation
//! - The AES-256-CBC cipher shared with remote web caches
//! - Secure random number generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Notes |
//! |----------|-----------|-------|
//! | Key transport | X25519 + BLAKE3 + XChaCha20-Poly1305 | ephemeral sender key |
//! | Channel records | XChaCha20-Poly1305 | counter nonces, one key per direction |
//! | KDF | BLAKE3 `derive_key` | static context strings |
//! | Web-cache requests | AES-256-CBC, zero padding | pre-shared access key |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod error;
pub mod hash;
pub mod random;
pub mod record;
pub mod replay;
pub mod seal;
pub mod webcache;
pub mod x25519;

pub use error::CryptoError;

/// Symmetric session key size
pub const SESSION_KEY_SIZE: usize = 32;

/// Channel IV size (nonce salt for record encryption)
pub const SESSION_IV_SIZE: usize = 16;

/// X25519 public key size
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// Name of the only symmetric algorithm offered in key requests
pub const CHANNEL_ALGORITHM: &str = "xchacha20-poly1305";
