//! Fuzz target for web-cache response decryption

#![no_main]

use arbitrary::Arbitrary;
use lattice_crypto::webcache::WebCacheCipher;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    key: [u8; 32],
    body: String,
}

fuzz_target!(|input: Input| {
    let Ok(cipher) = WebCacheCipher::new(&input.key) else {
        return;
    };
    let _ = cipher.decrypt_response(&input.body);
});
