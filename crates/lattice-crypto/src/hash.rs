//! BLAKE3 fingerprints and key derivation.

/// Short BLAKE3 fingerprint of arbitrary bytes, used to tag sealed keys in
/// acks and logs.
#[must_use]
pub fn fingerprint(data: &[u8]) -> u64 {
    let digest = blake3::hash(data);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

/// BLAKE3 key derivation bound to a static context string.
pub struct Kdf {
    context: &'static str,
}

impl Kdf {
    /// Create a KDF for the given context.
    #[must_use]
    pub const fn new(context: &'static str) -> Self {
        Self { context }
    }

    /// Derive a 32-byte key from the concatenation of `parts`.
    #[must_use]
    pub fn derive(&self, parts: &[&[u8]]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key(self.context);
        for part in parts {
            hasher.update(part);
        }
        *hasher.finalize().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdf_context_separation() {
        let a = Kdf::new("lattice test a").derive(&[b"ikm"]);
        let b = Kdf::new("lattice test b").derive(&[b"ikm"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_kdf_concatenates_parts() {
        let kdf = Kdf::new("lattice test");
        assert_eq!(kdf.derive(&[b"ab", b"cd"]), kdf.derive(&[b"abcd"]));
    }

    #[test]
    fn test_fingerprint_stable() {
        assert_eq!(fingerprint(b"key"), fingerprint(b"key"));
        assert_ne!(fingerprint(b"key"), fingerprint(b"kez"));
    }
}
