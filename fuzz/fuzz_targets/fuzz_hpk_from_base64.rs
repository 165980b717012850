//! Fuzz target for mailbox address parsing.
//!
//! Parsing arbitrary strings as an address must succeed only for
//! Base64 of exactly 32 bytes, and roundtrip when it does.

#![no_main]

use libfuzzer_sys::fuzz_target;
use zax_crypto::Hpk;

fuzz_target!(|input: &str| {
    if let Ok(hpk) = Hpk::from_base64(input) {
        let roundtrip = Hpk::from_base64(&hpk.to_base64()).unwrap();
        assert_eq!(hpk, roundtrip);
    }
});
