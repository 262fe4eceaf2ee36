//! Channel record encryption.
//!
//! Once a channel has passed its encryption-start marker, every packet in
//! that direction is wrapped as:
//!
//! ```text
//! record = counter (u64 LE) || XChaCha20-Poly1305(ciphertext || tag)
//! nonce  = counter (8 bytes LE) || iv (16 bytes)
//! aad    = counter (8 bytes LE)
//! ```
//!
//! Each direction uses its own key derived from the negotiated session key
//! and IV, so the two sides never share a (key, nonce) pair.

use crate::CryptoError;
use crate::aead::{AeadKey, TAG_SIZE, record_nonce};
use crate::hash::Kdf;
use crate::replay::ReplayWindow;
use crate::{SESSION_IV_SIZE, SESSION_KEY_SIZE};

const INITIATOR_TO_RESPONDER: Kdf = Kdf::new("lattice channel record v1 initiator->responder");
const RESPONDER_TO_INITIATOR: Kdf = Kdf::new("lattice channel record v1 responder->initiator");

/// Bytes added to each plaintext by [`RecordCipher::seal`].
pub const RECORD_OVERHEAD: usize = 8 + TAG_SIZE;

/// Which side proposed the session key that won the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This node's request was adopted
    Initiator,
    /// The peer's request was adopted
    Responder,
}

/// Bidirectional record cipher for one channel session.
pub struct RecordCipher {
    send_key: AeadKey,
    recv_key: AeadKey,
    salt: [u8; SESSION_IV_SIZE],
    send_counter: u64,
    replay: ReplayWindow,
}

impl RecordCipher {
    /// Derive directional keys from the negotiated session key and IV.
    #[must_use]
    pub fn new(
        session_key: &[u8; SESSION_KEY_SIZE],
        iv: &[u8; SESSION_IV_SIZE],
        role: Role,
    ) -> Self {
        let parts = [session_key.as_slice(), iv.as_slice()];
        let i2r = AeadKey::from_derived(INITIATOR_TO_RESPONDER.derive(&parts));
        let r2i = AeadKey::from_derived(RESPONDER_TO_INITIATOR.derive(&parts));
        let (send_key, recv_key) = match role {
            Role::Initiator => (i2r, r2i),
            Role::Responder => (r2i, i2r),
        };

        Self {
            send_key,
            recv_key,
            salt: *iv,
            send_counter: 0,
            replay: ReplayWindow::new(),
        }
    }

    /// Encrypt one record.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::NonceOverflow` once the counter space is exhausted.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.send_counter == u64::MAX {
            return Err(CryptoError::NonceOverflow);
        }
        let counter = self.send_counter;
        self.send_counter += 1;

        let header = counter.to_le_bytes();
        let nonce = record_nonce(counter, &self.salt);
        let ciphertext = self.send_key.encrypt(&nonce, plaintext, &header)?;

        let mut record = Vec::with_capacity(8 + ciphertext.len());
        record.extend_from_slice(&header);
        record.extend_from_slice(&ciphertext);
        Ok(record)
    }

    /// Authenticate and decrypt one record.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::ReplayDetected` for a duplicate or stale counter
    /// and `CryptoError::DecryptionFailed` for anything that fails to authenticate.
    pub fn open(&mut self, record: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if record.len() < RECORD_OVERHEAD {
            return Err(CryptoError::DecryptionFailed);
        }

        let (header, ciphertext) = record.split_at(8);
        let mut counter_bytes = [0u8; 8];
        counter_bytes.copy_from_slice(header);
        let counter = u64::from_le_bytes(counter_bytes);

        if !self.replay.check(counter) {
            return Err(CryptoError::ReplayDetected(counter));
        }

        let nonce = record_nonce(counter, &self.salt);
        let plaintext = self.recv_key.decrypt(&nonce, ciphertext, header)?;
        self.replay.commit(counter);
        Ok(plaintext)
    }

    /// Number of records sealed so far.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.send_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (RecordCipher, RecordCipher) {
        let key = [9u8; SESSION_KEY_SIZE];
        let iv = [4u8; SESSION_IV_SIZE];
        (
            RecordCipher::new(&key, &iv, Role::Initiator),
            RecordCipher::new(&key, &iv, Role::Responder),
        )
    }

    #[test]
    fn test_bidirectional() {
        let (mut a, mut b) = pair();

        let r1 = a.seal(b"from a").unwrap();
        assert_eq!(r1.len(), 6 + RECORD_OVERHEAD);
        assert_eq!(b.open(&r1).unwrap(), b"from a");

        let r2 = b.seal(b"from b").unwrap();
        assert_eq!(a.open(&r2).unwrap(), b"from b");
    }

    #[test]
    fn test_own_records_do_not_open() {
        let (mut a, _) = pair();
        let r = a.seal(b"loopback").unwrap();
        assert!(a.open(&r).is_err());
    }

    #[test]
    fn test_replay_rejected() {
        let (mut a, mut b) = pair();
        let r = a.seal(b"once").unwrap();
        assert!(b.open(&r).is_ok());
        assert!(matches!(b.open(&r), Err(CryptoError::ReplayDetected(0))));
    }

    #[test]
    fn test_out_of_order_accepted() {
        let (mut a, mut b) = pair();
        let r0 = a.seal(b"zero").unwrap();
        let r1 = a.seal(b"one").unwrap();
        assert_eq!(b.open(&r1).unwrap(), b"one");
        assert_eq!(b.open(&r0).unwrap(), b"zero");
    }

    #[test]
    fn test_forged_record_does_not_burn_counter() {
        let (mut a, mut b) = pair();
        let good = a.seal(b"real").unwrap();
        let mut forged = good.clone();
        let last = forged.len() - 1;
        forged[last] ^= 0xFF;

        assert!(b.open(&forged).is_err());
        assert_eq!(b.open(&good).unwrap(), b"real");
    }
}
