//! Cipher for the web-cache rendezvous protocol.
//!
//! Requests and responses exchanged with a remote web cache are encrypted
//! under the cache's pre-shared access key so the HTTP responder never sees
//! plaintext bootstrap data:
//!
//! ```text
//! wire = base64( iv (16) || AES-256-CBC(key, iv, zero_pad(plaintext)) )
//! ```
//!
//! Blocks and IVs are 16 bytes (AES). Caches speaking 32-byte Rijndael blocks
//! cannot read this format, so a cache must run the Lattice responder.
//! Plaintext is zero padded: trailing NUL bytes are not preserved, and a
//! ciphertext that is not a whole number of blocks is rejected rather than
//! guessed at.

use crate::CryptoError;
use crate::random::random_array;
use aes::Aes256;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use block_modes::block_padding::ZeroPadding;
use block_modes::{BlockMode, Cbc};
use zeroize::Zeroizing;

type Aes256Cbc = Cbc<Aes256, ZeroPadding>;

/// AES block size; also the IV length.
pub const BLOCK_SIZE: usize = 16;

/// Access key length.
pub const ACCESS_KEY_SIZE: usize = 32;

/// Pre-shared key of one remote web cache.
#[derive(Clone)]
pub struct WebCacheCipher {
    key: Zeroizing<[u8; ACCESS_KEY_SIZE]>,
}

impl WebCacheCipher {
    /// Create a cipher from a raw access key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` unless the key is 32 bytes.
    pub fn new(access_key: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; ACCESS_KEY_SIZE] =
            access_key
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: ACCESS_KEY_SIZE,
                    actual: access_key.len(),
                })?;
        Ok(Self {
            key: Zeroizing::new(key),
        })
    }

    /// Encrypt a request line with a fresh random IV and encode it as base64.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RandomFailed` if no IV could be generated.
    pub fn encrypt_request(&self, plaintext: &str) -> Result<String, CryptoError> {
        let iv: [u8; BLOCK_SIZE] = random_array()?;
        Ok(STANDARD.encode(self.encrypt_with_iv(&iv, plaintext.as_bytes())?))
    }

    /// Decode and decrypt a base64 response body.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encoding` for bad base64 or UTF-8 and
    /// `CryptoError::InvalidCiphertextLength` when the body is not IV plus whole blocks.
    pub fn decrypt_response(&self, body: &str) -> Result<String, CryptoError> {
        let raw = STANDARD
            .decode(body.trim())
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;

        if raw.len() < BLOCK_SIZE {
            return Err(CryptoError::InvalidCiphertextLength(raw.len()));
        }
        let (iv, ciphertext) = raw.split_at(BLOCK_SIZE);
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::InvalidCiphertextLength(ciphertext.len()));
        }

        let cipher = Aes256Cbc::new_from_slices(self.key.as_slice(), iv)
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: ACCESS_KEY_SIZE,
                actual: self.key.len(),
            })?;
        let plaintext = cipher
            .decrypt_vec(ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let text = String::from_utf8(plaintext).map_err(|e| CryptoError::Encoding(e.to_string()))?;
        Ok(text.trim_end_matches('\0').to_string())
    }

    fn encrypt_with_iv(&self, iv: &[u8; BLOCK_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Cbc::new_from_slices(self.key.as_slice(), iv)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        let ciphertext = cipher.encrypt_vec(plaintext);

        let mut out = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
        out.extend_from_slice(iv);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }
}

impl std::fmt::Debug for WebCacheCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WebCacheCipher(..)")
    }
}
