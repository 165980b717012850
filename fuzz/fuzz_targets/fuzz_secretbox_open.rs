//! Fuzz target for secretbox opening.
//!
//! Arbitrary ciphertext must be rejected cleanly, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use zax_crypto::{make_nonce, secretbox_open, SecretboxKey};

fuzz_target!(|data: &[u8]| {
    let key = SecretboxKey::from_bytes(&[0x42u8; 32]).unwrap();
    let nonce = make_nonce(None).unwrap();

    // Unauthenticated garbage never opens.
    assert!(secretbox_open(data, &nonce, &key).is_err());
});
