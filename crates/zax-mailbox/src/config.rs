//! Mailbox configuration.
//!
//! Collects the relay timing knobs and the persisted-state namespace
//! constants in one validated structure.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use zax_mailbox::config::MailboxConfig;
//!
//! // Use defaults
//! let config = MailboxConfig::default();
//!
//! // Or use the builder for customization
//! let config = MailboxConfig::builder()
//!     .relay_ajax_timeout(Duration::from_secs(10))
//!     .relay_token_timeout(Duration::from_secs(120))
//!     .build()
//!     .unwrap();
//! ```

use std::time::Duration;

use zax_relay::SessionConfig;
use zax_store::encrypted_store::StoreOptions;
use zax_store::keyring::KeyringOptions;

use crate::error::{MailboxError, Result};

/// Default per-HTTP-call timeout.
pub const DEFAULT_AJAX_TIMEOUT: Duration = Duration::from_secs(5);

/// Mailbox configuration.
#[derive(Clone, Debug)]
pub struct MailboxConfig {
    /// Token width in bytes.
    pub relay_token_len: usize,
    /// Relay-token lifetime (deadline armed after handshake leg 1).
    pub relay_token_timeout: Duration,
    /// Session lifetime (deadline armed after handshake leg 3).
    pub relay_session_timeout: Duration,
    /// Per-HTTP-call timeout.
    pub relay_ajax_timeout: Duration,
    /// Fraction of each lifetime actually used, in `(0, 1]`.
    pub timeout_guard_factor: f64,
    /// Suffix appended to every persisted row key.
    pub storage_root: String,
    /// Prefix of companion nonce rows.
    pub nonce_tag: String,
    /// Tag of the storage-key slot.
    pub skey_tag: String,
    /// Tag of the comm-key row.
    pub comm_key_tag: String,
    /// Tag of the guest-registry row.
    pub guest_registry_tag: String,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        let store = StoreOptions::default();
        let keyring = KeyringOptions::default();
        Self {
            relay_token_len: zax_relay::DEFAULT_TOKEN_LEN,
            relay_token_timeout: zax_relay::DEFAULT_TOKEN_TIMEOUT,
            relay_session_timeout: zax_relay::DEFAULT_SESSION_TIMEOUT,
            relay_ajax_timeout: DEFAULT_AJAX_TIMEOUT,
            timeout_guard_factor: zax_relay::DEFAULT_GUARD_FACTOR,
            storage_root: store.storage_root,
            nonce_tag: store.nonce_tag,
            skey_tag: store.storage_key_tag,
            comm_key_tag: keyring.comm_key_tag,
            guest_registry_tag: keyring.guest_registry_tag,
        }
    }
}

impl MailboxConfig {
    /// Create a configuration builder.
    pub fn builder() -> MailboxConfigBuilder {
        MailboxConfigBuilder::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `MailboxError::Config` if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.relay_token_len == 0 {
            return Err(MailboxError::Config(
                "relay_token_len must be greater than zero".into(),
            ));
        }
        if self.relay_token_timeout.is_zero() || self.relay_session_timeout.is_zero() {
            return Err(MailboxError::Config(
                "relay timeouts must be greater than zero".into(),
            ));
        }
        if self.relay_ajax_timeout.is_zero() {
            return Err(MailboxError::Config(
                "relay_ajax_timeout must be greater than zero".into(),
            ));
        }
        if !(self.timeout_guard_factor > 0.0 && self.timeout_guard_factor <= 1.0) {
            return Err(MailboxError::Config(
                "timeout_guard_factor must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// The per-session slice of this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            token_len: self.relay_token_len,
            token_timeout: self.relay_token_timeout,
            session_timeout: self.relay_session_timeout,
            guard_factor: self.timeout_guard_factor,
        }
    }

    /// The keyring/persistence slice of this configuration.
    pub fn keyring_options(&self) -> KeyringOptions {
        KeyringOptions {
            store: StoreOptions {
                storage_root: self.storage_root.clone(),
                nonce_tag: self.nonce_tag.clone(),
                storage_key_tag: self.skey_tag.clone(),
            },
            comm_key_tag: self.comm_key_tag.clone(),
            guest_registry_tag: self.guest_registry_tag.clone(),
        }
    }
}

/// Builder for [`MailboxConfig`].
#[derive(Clone, Debug, Default)]
pub struct MailboxConfigBuilder {
    config: MailboxConfig,
}

impl MailboxConfigBuilder {
    /// Set the token width in bytes.
    pub fn relay_token_len(mut self, len: usize) -> Self {
        self.config.relay_token_len = len;
        self
    }

    /// Set the relay-token lifetime.
    pub fn relay_token_timeout(mut self, timeout: Duration) -> Self {
        self.config.relay_token_timeout = timeout;
        self
    }

    /// Set the session lifetime.
    pub fn relay_session_timeout(mut self, timeout: Duration) -> Self {
        self.config.relay_session_timeout = timeout;
        self
    }

    /// Set the per-HTTP-call timeout.
    pub fn relay_ajax_timeout(mut self, timeout: Duration) -> Self {
        self.config.relay_ajax_timeout = timeout;
        self
    }

    /// Set the deadline guard factor.
    pub fn timeout_guard_factor(mut self, factor: f64) -> Self {
        self.config.timeout_guard_factor = factor;
        self
    }

    /// Set the persisted-key suffix.
    pub fn storage_root(mut self, root: impl Into<String>) -> Self {
        self.config.storage_root = root.into();
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<MailboxConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
