//! Chunked file transfer types.
//!
//! Files ride next to the message stream: the sender announces a file
//! with an encrypted metadata message carrying a per-file symmetric key
//! (`skey`), then streams secretbox-sealed chunks to the relay. The
//! relay stores ciphertext blobs it cannot read; only the recipient,
//! holding `skey` from the metadata, can reassemble the file.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use zax_crypto::SecretboxKey;

/// Metadata describing an uploaded file.
///
/// `skey` travels only inside the encrypted metadata message; the relay
/// never sees it in cleartext.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileUploadMetadata {
    /// File name as the sender knows it.
    pub name: String,
    /// Size of the plaintext file in bytes.
    pub orig_size: u64,
    /// Creation timestamp (Unix seconds), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    /// Modification timestamp (Unix seconds), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<i64>,
    /// MD5 of the plaintext, when the sender computed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    /// Free-form sender attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Value>,
    /// Base64 of the 32-byte secretbox key every chunk is sealed with.
    /// Set by `start_file_upload`; never sent to the relay in clear.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skey: Option<String>,
}

impl FileUploadMetadata {
    /// Minimal metadata for a named file of a given size.
    pub fn new(name: impl Into<String>, orig_size: u64) -> Self {
        Self {
            name: name.into(),
            orig_size,
            created: None,
            modified: None,
            md5: None,
            attrs: None,
            skey: None,
        }
    }
}

/// Everything `start_file_upload` hands back to the caller.
pub struct StartFileUpload {
    /// Relay-assigned identifier referenced by every chunk operation.
    pub upload_id: String,
    /// Largest chunk the relay accepts, in bytes.
    pub max_chunk_size: u64,
    /// Storage token for the announcement message.
    pub storage_token: String,
    /// The per-file symmetric key. Keep it to upload chunks.
    pub skey: SecretboxKey,
}

impl std::fmt::Debug for StartFileUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartFileUpload")
            .field("upload_id", &self.upload_id)
            .field("max_chunk_size", &self.max_chunk_size)
            .field("skey", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Wire shape of the `startFileUpload` response.
#[derive(Deserialize)]
pub(crate) struct StartFileUploadReply {
    #[serde(rename = "uploadID")]
    pub upload_id: String,
    pub max_chunk_size: u64,
    pub storage_token: String,
}

/// Relay-reported status of a fully uploaded file.
pub const FILE_STATUS_COMPLETE: &str = "COMPLETE";

/// Status of a file on the relay.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileStatus {
    /// `"COMPLETE"`, `"UPLOADING"`, or `"NOT_FOUND"`.
    pub status: String,
    /// Plaintext size, when the relay knows it.
    #[serde(default)]
    pub file_size: Option<u64>,
    /// Number of stored chunks.
    #[serde(default)]
    pub total_chunks: Option<u64>,
    /// Ciphertext bytes stored so far.
    #[serde(default)]
    pub bytes_stored: Option<u64>,
}

impl FileStatus {
    /// Whether every chunk has been stored.
    pub fn is_complete(&self) -> bool {
        self.status == FILE_STATUS_COMPLETE
    }
}

/// Relay acknowledgement carrying only a status string.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandStatus {
    /// `"OK"` on success.
    pub status: String,
}

/// Number of chunks a file of `len` bytes splits into.
///
/// Zero-length files still occupy one (empty) chunk so the upload has a
/// final part to close on.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    if len == 0 {
        return 1;
    }
    len.div_ceil(chunk_size)
}
