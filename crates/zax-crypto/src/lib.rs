//! # zax-crypto
//!
//! Cryptographic primitives for the Zax relay protocol.
//!
//! This crate wraps exactly the NaCl operations the client needs:
//!
//! - **Asymmetric envelopes**: Curve25519-XSalsa20-Poly1305 (`box`)
//! - **Symmetric envelopes**: XSalsa20-Poly1305 (`secretbox`)
//! - **Keys**: random, seed-derived, and raw-secret Curve25519 pairs
//! - **Hashing**: SHA-256 and the `h2` double hash behind every relay
//!   address
//! - **Nonces**: 24-byte values with a timestamped header
//!
//! ## Security
//!
//! All secret data implements `Zeroize` for memory cleanup, and
//! address comparisons are constant-time.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod b64;
pub mod boxes;
pub mod error;
pub mod hash;
pub mod keys;
pub mod nonce;
#[cfg(test)]
mod proptests;
pub mod random;

pub use boxes::{
    box_encrypt, box_open, box_open_msg, box_seal, secretbox, secretbox_open, secretbox_seal,
    EncryptedMessage, SecretboxKey, SECRETBOX_KEY_SIZE,
};
pub use error::{CryptoError, Result};
pub use hash::{h2, sha256, Hpk, HASH_SIZE};
pub use keys::{Keys, PublicKey, SecretKey, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE};
pub use nonce::{make_nonce, make_nonce_at, Nonce, NONCE_SIZE};
pub use random::random_bytes;
