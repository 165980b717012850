//! Typed downloaded messages.
//!
//! The relay hands back raw records `{data, time, from, nonce, kind}`.
//! Parsing resolves the sender through the keyring and produces one of
//! three variants:
//!
//! - [`ZaxMessage::Text`] - a text message, decrypted when possible.
//!   When `box_open` fails the original `data` passes through verbatim;
//!   relays accept unencrypted deposits and this is how they surface.
//! - [`ZaxMessage::File`] - a file announcement whose metadata envelope
//!   decrypted cleanly.
//! - [`ZaxMessage::Plain`] - the sender's address is not in the
//!   keyring; contents are returned opaquely.
//!
//! Malformed records (bad addresses, bad nonces, unknown kinds) are
//! protocol errors, distinct from the `box_open` passthrough.

use serde::{Deserialize, Serialize};

use zax_crypto::{b64, box_open, CryptoError, Hpk, Nonce, SecretKey};
use zax_store::Keyring;

use crate::error::{MailboxError, Result};
use crate::files::FileUploadMetadata;

/// The kind discriminant of a downloaded message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZaxMessageKind {
    /// A (possibly passthrough) text message.
    TextMessage,
    /// A file announcement.
    FileMetadata,
    /// An undecryptable message from an unregistered sender.
    Plain,
}

/// A raw record as the relay returns it from `download`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawRecord {
    /// Payload: ciphertext, plaintext, or a file envelope, by `kind`.
    pub data: String,
    /// Relay receipt time (Unix seconds, fractional).
    #[serde(default)]
    pub time: f64,
    /// Sender address (`h2` of the sender's public key, Base64).
    pub from: String,
    /// Message nonce; also the handle `delete` takes.
    pub nonce: String,
    /// `"message"` or `"file"`.
    pub kind: String,
}

/// Wire shape of a file announcement's `data` field.
#[derive(Deserialize)]
struct FileEnvelope {
    nonce: String,
    ctext: String,
    #[serde(rename = "uploadID")]
    upload_id: String,
}

/// A downloaded message, parsed and (where possible) decrypted.
#[derive(Clone, Debug)]
pub enum ZaxMessage {
    /// A text message from a registered guest.
    Text {
        /// Decrypted text, or the raw `data` on passthrough.
        data: String,
        /// Keyring tag of the sender.
        sender_tag: String,
        /// The record nonce (Base64), usable with `delete`.
        nonce: String,
        /// Relay receipt time.
        time: f64,
    },
    /// A file announcement from a registered guest.
    File {
        /// The decrypted upload metadata, `skey` included.
        data: FileUploadMetadata,
        /// Keyring tag of the sender.
        sender_tag: String,
        /// The upload id every chunk operation references.
        upload_id: String,
        /// The record nonce (Base64).
        nonce: String,
        /// Relay receipt time.
        time: f64,
    },
    /// A message from a sender the keyring does not know.
    Plain {
        /// The raw payload, returned opaquely.
        data: String,
        /// The unknown sender's address (Base64).
        from: String,
        /// The record nonce (Base64).
        nonce: String,
        /// Relay receipt time.
        time: f64,
    },
}

impl ZaxMessage {
    /// The variant discriminant.
    pub fn kind(&self) -> ZaxMessageKind {
        match self {
            ZaxMessage::Text { .. } => ZaxMessageKind::TextMessage,
            ZaxMessage::File { .. } => ZaxMessageKind::FileMetadata,
            ZaxMessage::Plain { .. } => ZaxMessageKind::Plain,
        }
    }

    /// The record nonce, the handle `delete` takes.
    pub fn nonce(&self) -> &str {
        match self {
            ZaxMessage::Text { nonce, .. }
            | ZaxMessage::File { nonce, .. }
            | ZaxMessage::Plain { nonce, .. } => nonce,
        }
    }

    /// Text payload, when this is a text or plain message.
    pub fn text(&self) -> Option<&str> {
        match self {
            ZaxMessage::Text { data, .. } | ZaxMessage::Plain { data, .. } => Some(data),
            ZaxMessage::File { .. } => None,
        }
    }

    /// File metadata, when this is a file announcement.
    pub fn file_metadata(&self) -> Option<&FileUploadMetadata> {
        match self {
            ZaxMessage::File { data, .. } => Some(data),
            _ => None,
        }
    }
}

/// Parse one raw record against the keyring.
///
/// `url` is only used to label protocol errors.
pub(crate) fn parse_record(
    url: &str,
    record: RawRecord,
    keyring: &Keyring,
    comm_sk: &SecretKey,
) -> Result<ZaxMessage> {
    let from = Hpk::from_base64(&record.from)
        .map_err(|_| MailboxError::protocol(url, "record sender address is not a valid hpk"))?;

    let sender_tag = match keyring.tag_by_hpk(&from) {
        Some(tag) => tag.to_string(),
        None => {
            return Ok(ZaxMessage::Plain {
                data: record.data,
                from: record.from,
                nonce: record.nonce,
                time: record.time,
            })
        }
    };
    // Present tag implies a registered record; the pk lookup cannot miss.
    let sender_pk = keyring
        .guest_key(&sender_tag)
        .ok_or_else(|| MailboxError::Invariant("registry lost a resolved tag".into()))?;

    match record.kind.as_str() {
        "message" => {
            let nonce = Nonce::from_base64(&record.nonce)
                .map_err(|_| MailboxError::protocol(url, "record nonce is malformed"))?;

            // An unencrypted deposit is not Base64 (or does not open);
            // both fall through to passthrough, as relays deliver
            // plaintext uploads in the same shape.
            let opened = b64::decode(&record.data)
                .ok()
                .and_then(|ctext| box_open(&ctext, &nonce, sender_pk, comm_sk).ok());

            let data = match opened {
                Some(plain) => String::from_utf8(plain).map_err(|_| {
                    MailboxError::protocol(url, "decrypted message is not UTF-8")
                })?,
                None => record.data,
            };
            Ok(ZaxMessage::Text {
                data,
                sender_tag,
                nonce: record.nonce,
                time: record.time,
            })
        }
        "file" => {
            let envelope: FileEnvelope = serde_json::from_str(&record.data)
                .map_err(|_| MailboxError::protocol(url, "file record data is malformed"))?;

            let nonce = Nonce::from_base64(&envelope.nonce)
                .map_err(|_| MailboxError::protocol(url, "file envelope nonce is malformed"))?;
            let ctext = b64::decode(&envelope.ctext)
                .map_err(|_| MailboxError::protocol(url, "file envelope ctext is malformed"))?;

            // File metadata is always client-encrypted; failure to open
            // is a hard crypto error, not a passthrough.
            let plain = box_open(&ctext, &nonce, sender_pk, comm_sk)
                .map_err(|_| MailboxError::Crypto(CryptoError::Decryption))?;
            let data: FileUploadMetadata = serde_json::from_slice(&plain)
                .map_err(|_| MailboxError::protocol(url, "file metadata is not valid JSON"))?;

            Ok(ZaxMessage::File {
                data,
                sender_tag,
                upload_id: envelope.upload_id,
                nonce: record.nonce,
                time: record.time,
            })
        }
        other => Err(MailboxError::protocol(
            url,
            format!("unknown record kind {:?}", other),
        )),
    }
}
