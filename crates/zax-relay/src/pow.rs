//! Proof-of-work for the session handshake.
//!
//! A relay may demand that `h2(clientToken || relayToken || n)` end in
//! `difficulty` zero bits for a client-chosen 32-byte nonce `n`. The
//! bit order is low-first: byte 0 holds the lowest bits, each further
//! byte the next higher eight.

use tracing::info;

use zax_crypto::{h2, random_bytes};

use crate::Result;

/// Width of the searched nonce in bytes.
pub const POW_NONCE_SIZE: usize = 32;

/// How many candidates to try between scheduler yields.
const YIELD_EVERY: u64 = 1024;

/// How many candidates between progress log lines.
const LOG_EVERY: u64 = 65_536;

/// True iff the rightmost `difficulty` bits of `bytes` are zero.
///
/// `bytes[0]` holds the lowest bits: the full bytes
/// `bytes[..difficulty / 8]` must be zero and the low `difficulty % 8`
/// bits of the next byte must be zero.
pub fn array_zero_bits(bytes: &[u8], difficulty: u8) -> bool {
    let full = (difficulty / 8) as usize;
    let rem = difficulty % 8;

    if full > bytes.len() || (rem > 0 && full == bytes.len()) {
        return false;
    }
    if bytes[..full].iter().any(|&b| b != 0) {
        return false;
    }
    rem == 0 || bytes[full] & ((1u8 << rem) - 1) == 0
}

/// Search for a nonce satisfying the relay's difficulty.
///
/// Unbounded in principle; yields to the scheduler so callers can
/// cancel by dropping the future, and logs progress when the difficulty
/// is high enough to take a while.
pub async fn solve_handshake(handshake: &[u8], difficulty: u8) -> Result<[u8; POW_NONCE_SIZE]> {
    let mut input = Vec::with_capacity(handshake.len() + POW_NONCE_SIZE);
    let mut attempts: u64 = 0;

    loop {
        let candidate = random_bytes(POW_NONCE_SIZE)?;

        input.clear();
        input.extend_from_slice(handshake);
        input.extend_from_slice(&candidate);

        if array_zero_bits(&h2(&input), difficulty) {
            let mut nonce = [0u8; POW_NONCE_SIZE];
            nonce.copy_from_slice(&candidate);
            return Ok(nonce);
        }

        attempts += 1;
        if attempts % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
        }
        if difficulty > 10 && attempts % LOG_EVERY == 0 {
            info!(difficulty, attempts, "proof-of-work search in progress");
        }
    }
}
