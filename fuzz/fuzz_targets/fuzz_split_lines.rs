//! Fuzz target for response line framing.
//!
//! Splitting arbitrary bodies must never panic, and rejoining the split
//! lines must never grow extra content.

#![no_main]

use libfuzzer_sys::fuzz_target;
use zax_relay::wire::{join_lines, split_lines};

fuzz_target!(|body: &str| {
    let lines = split_lines(body);

    // No line may retain a separator.
    for line in &lines {
        assert!(!line.contains('\n'));
        assert!(!line.ends_with('\r'));
    }

    // Splitting the canonical rejoin is a fixed point.
    let rejoined = join_lines(&lines);
    assert_eq!(split_lines(&rejoined), lines);
});
