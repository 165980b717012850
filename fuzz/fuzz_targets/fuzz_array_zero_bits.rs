//! Fuzz target for the proof-of-work predicate.
//!
//! Must never panic for any byte slice and difficulty, and must be
//! monotone: satisfying `d` bits implies satisfying every smaller `d`.

#![no_main]

use libfuzzer_sys::fuzz_target;
use zax_relay::pow::array_zero_bits;

fuzz_target!(|input: (Vec<u8>, u8)| {
    let (bytes, difficulty) = input;
    let satisfied = array_zero_bits(&bytes, difficulty);

    if satisfied && difficulty > 0 {
        assert!(array_zero_bits(&bytes, difficulty - 1));
    }
});
