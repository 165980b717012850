//! # zax-store
//!
//! Encrypted client-side persistence for Zax mailboxes.
//!
//! This crate provides:
//! - **StorageDriver**: the narrow get/set/remove contract the embedding
//!   application implements
//! - **EncryptedStore**: a secretbox envelope over the driver, one nonce
//!   row per ciphertext row
//! - **Keyring**: the owner's comm keypair plus the guest registry
//!
//! ## Security
//!
//! The driver only ever sees ciphertext and opaque row names. Losing
//! the storage key (via `self_destruct`) makes every row irrecoverable.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod driver;
pub mod encrypted_store;
pub mod error;
pub mod keyring;
#[cfg(test)]
mod proptests;

pub use driver::{MemoryDriver, StorageDriver};
pub use encrypted_store::{
    EncryptedStore, StoreOptions, DEFAULT_NONCE_TAG, DEFAULT_STORAGE_KEY_TAG, DEFAULT_STORAGE_ROOT,
};
pub use error::{Result, StoreError};
pub use keyring::{
    GuestRecord, Keyring, KeyringOptions, BACKUP_COMM_KEY, DEFAULT_COMM_KEY_TAG,
    DEFAULT_GUEST_REGISTRY_TAG,
};
