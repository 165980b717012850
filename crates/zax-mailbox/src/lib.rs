//! # zax-mailbox
//!
//! End-to-end encrypted, mutually anonymous messaging through
//! untrusted Zax relays.
//!
//! A [`Mailbox`] owns one long-term Curve25519 comm keypair and a
//! registry of guests it exchanges messages with. Relays route by
//! `h2(publicKey)` and store only ciphertext; two parties who know each
//! other's public keys can deposit messages and files into each other's
//! mailboxes on any relay they share.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use zax_mailbox::{Mailbox, MailboxConfig};
//! use zax_relay::HttpTransport;
//! use zax_store::MemoryDriver;
//!
//! let transport = Arc::new(HttpTransport::new(config.relay_ajax_timeout)?);
//! let alice = Mailbox::new("Alice", Arc::new(MemoryDriver::new()), transport, MailboxConfig::default()).await?;
//!
//! alice.add_guest("Bob", bob_public_key).await?;
//! let token = alice.upload("https://relay.example", "Bob", "hello", true).await?;
//! ```
//!
//! ## Architecture
//!
//! - `zax-crypto`: NaCl primitives (box, secretbox, `h2`, nonces)
//! - `zax-store`: encrypted persistence and the identity keyring
//! - `zax-relay`: the relay session protocol and command envelope
//! - this crate: the façade tying them together

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod files;
pub mod mailbox;
pub mod message;

pub use config::{MailboxConfig, MailboxConfigBuilder};
pub use error::{MailboxError, Result};
pub use files::{
    chunk_count, CommandStatus, FileStatus, FileUploadMetadata, StartFileUpload,
    FILE_STATUS_COMPLETE,
};
pub use mailbox::Mailbox;
pub use message::{RawRecord, ZaxMessage, ZaxMessageKind};

// Re-export commonly used types from the lower layers.
pub use zax_crypto::{EncryptedMessage, Hpk, Keys, Nonce, PublicKey, SecretKey, SecretboxKey};
pub use zax_relay::{RelayTransport, SessionConfig};
pub use zax_store::{MemoryDriver, StorageDriver};
