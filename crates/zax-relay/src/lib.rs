//! # zax-relay
//!
//! The relay session protocol: token exchange, a proof-of-work
//! difficulty challenge, a public-key ownership proof, and the
//! encrypted command envelope that rides on top.
//!
//! The relay is untrusted. It sees only token hashes, ephemeral public
//! keys, mailbox addresses (`h2` of public keys), and ciphertext.
//!
//! ## Layers
//!
//! - [`transport`]: the one-function HTTP contract (`reqwest`
//!   implementation behind the `http` feature)
//! - [`wire`]: CRLF line framing
//! - [`pow`]: the difficulty predicate and nonce search
//! - [`commands`]: the closed command set and its response arities
//! - [`session`]: the per-URL handshake state machine

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod commands;
pub mod config;
pub mod error;
pub mod pow;
pub mod session;
pub mod transport;
pub mod wire;

pub use commands::Command;
pub use config::{
    SessionConfig, DEFAULT_GUARD_FACTOR, DEFAULT_SESSION_TIMEOUT, DEFAULT_TOKEN_LEN,
    DEFAULT_TOKEN_TIMEOUT,
};
pub use error::{RelayError, Result};
pub use pow::{array_zero_bits, solve_handshake, POW_NONCE_SIZE};
pub use session::RelaySession;
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::RelayTransport;
