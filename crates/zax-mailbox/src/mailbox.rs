//! The user-facing mailbox.
//!
//! A [`Mailbox`] binds one identity (a keyring with its long-term comm
//! keypair) to any number of relays. Relay sessions are created lazily,
//! one per URL, each behind its own lock so concurrent commands never
//! race a handshake. Expired sessions reconnect transparently once per
//! call; a second failure in the same call surfaces.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use zax_mailbox::{Mailbox, MailboxConfig};
//! use zax_store::MemoryDriver;
//!
//! let driver = Arc::new(MemoryDriver::new());
//! let alice = Mailbox::new("Alice", driver, transport, MailboxConfig::default()).await?;
//! alice.add_guest("Bob", bob_pub).await?;
//!
//! let token = alice.upload(relay_url, "Bob", "hello", true).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use zax_crypto::{
    b64, box_open, box_seal, EncryptedMessage, Hpk, Nonce, PublicKey, SecretKey, SecretboxKey,
};
use zax_relay::{Command, RelaySession, RelayTransport};
use zax_store::{Keyring, StorageDriver};

use crate::config::MailboxConfig;
use crate::error::{MailboxError, Result};
use crate::files::{
    chunk_count, CommandStatus, FileStatus, FileUploadMetadata, StartFileUpload,
    StartFileUploadReply,
};
use crate::message::{parse_record, RawRecord, ZaxMessage};

/// Parsed output of one relay command.
enum CommandOutput {
    /// Plaintext single-line response.
    Lines(Vec<String>),
    /// Decrypted JSON payload of a two-line response.
    Json(Value),
    /// Decrypted envelope plus the raw chunk ciphertext line.
    Chunk {
        envelope: Value,
        raw: String,
    },
}

/// A client-side identity bound to one comm keypair.
pub struct Mailbox {
    id: String,
    config: MailboxConfig,
    transport: Arc<dyn RelayTransport>,
    keyring: RwLock<Keyring>,
    sessions: Mutex<HashMap<String, Arc<Mutex<RelaySession>>>>,
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Mailbox {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Create a mailbox under `identity`, generating a fresh comm
    /// keypair if none is persisted.
    pub async fn new(
        identity: &str,
        driver: Arc<dyn StorageDriver>,
        transport: Arc<dyn RelayTransport>,
        config: MailboxConfig,
    ) -> Result<Self> {
        config.validate()?;
        let keyring = Keyring::new(driver, identity, config.keyring_options()).await?;
        debug!(identity, "mailbox opened");
        Ok(Self {
            id: identity.to_string(),
            config,
            transport,
            keyring: RwLock::new(keyring),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Create a mailbox whose comm keypair derives from `seed`.
    pub async fn from_seed(
        identity: &str,
        seed: &[u8],
        driver: Arc<dyn StorageDriver>,
        transport: Arc<dyn RelayTransport>,
        config: MailboxConfig,
    ) -> Result<Self> {
        let mailbox = Self::new(identity, driver, transport, config).await?;
        mailbox.keyring.write().await.set_comm_from_seed(seed).await?;
        Ok(mailbox)
    }

    /// Create a mailbox whose comm keypair is rebuilt from a raw
    /// secret key.
    pub async fn from_sec_key(
        identity: &str,
        secret_key: SecretKey,
        driver: Arc<dyn StorageDriver>,
        transport: Arc<dyn RelayTransport>,
        config: MailboxConfig,
    ) -> Result<Self> {
        let mailbox = Self::new(identity, driver, transport, config).await?;
        mailbox
            .keyring
            .write()
            .await
            .set_comm_from_sec_key(secret_key)
            .await?;
        Ok(mailbox)
    }

    /// Restore a mailbox from a keyring backup string.
    pub async fn from_backup(
        identity: &str,
        backup: &str,
        driver: Arc<dyn StorageDriver>,
        transport: Arc<dyn RelayTransport>,
        config: MailboxConfig,
    ) -> Result<Self> {
        config.validate()?;
        let keyring =
            Keyring::from_backup(driver, identity, config.keyring_options(), backup).await?;
        info!(identity, guests = keyring.guest_count(), "mailbox restored from backup");
        Ok(Self {
            id: identity.to_string(),
            config,
            transport,
            keyring: RwLock::new(keyring),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    // ========================================================================
    // Identity & keyring
    // ========================================================================

    /// The identity this mailbox was opened under.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The owner's public comm key.
    pub async fn pub_comm_key(&self) -> PublicKey {
        self.keyring.read().await.pub_comm_key().clone()
    }

    /// The owner's secret comm key.
    pub async fn private_comm_key(&self) -> SecretKey {
        let keyring = self.keyring.read().await;
        SecretKey::from_bytes(keyring.private_comm_key().as_bytes())
            .expect("comm key is always 32 bytes")
    }

    /// The owner's relay address, `h2(pub_comm_key)`.
    pub async fn hpk(&self) -> Hpk {
        self.keyring.read().await.hpk()
    }

    /// Register (or overwrite) a guest under `tag`.
    pub async fn add_guest(&self, tag: &str, public_key: PublicKey) -> Result<()> {
        self.keyring.write().await.add_guest(tag, public_key).await?;
        Ok(())
    }

    /// Remove the guest under `tag`. Returns `true` if one existed.
    pub async fn remove_guest(&self, tag: &str) -> Result<bool> {
        Ok(self.keyring.write().await.remove_guest(tag).await?)
    }

    /// The public key registered under `tag`.
    pub async fn guest_key(&self, tag: &str) -> Option<PublicKey> {
        self.keyring.read().await.guest_key(tag).cloned()
    }

    /// Reverse lookup: the tag registered for a relay address.
    pub async fn tag_by_hpk(&self, hpk: &Hpk) -> Option<String> {
        self.keyring.read().await.tag_by_hpk(hpk).map(String::from)
    }

    /// Serialize the keyring as a portable backup string.
    pub async fn backup(&self) -> Result<String> {
        Ok(self.keyring.read().await.backup()?)
    }

    /// Wipe every persisted keyring row and the storage key.
    ///
    /// The mailbox is consumed; nothing about the identity can be
    /// recovered afterwards.
    pub async fn self_destruct(self) -> Result<()> {
        let keyring = self.keyring.into_inner();
        keyring.self_destruct().await?;
        info!(identity = %self.id, "mailbox destroyed");
        Ok(())
    }

    // ========================================================================
    // Raw encode / decode
    // ========================================================================

    /// Encrypt `message` toward a guest, without touching any relay.
    pub async fn encode_to(&self, guest_tag: &str, message: &str) -> Result<EncryptedMessage> {
        let keyring = self.keyring.read().await;
        let pk = keyring
            .guest_key(guest_tag)
            .ok_or_else(|| MailboxError::UnknownGuest(guest_tag.to_string()))?;
        Ok(box_seal(message.as_bytes(), pk, keyring.private_comm_key())?)
    }

    /// Decrypt an envelope received from a guest.
    pub async fn decode_from(
        &self,
        guest_tag: &str,
        nonce: &Nonce,
        ctext: &[u8],
    ) -> Result<String> {
        let keyring = self.keyring.read().await;
        let pk = keyring
            .guest_key(guest_tag)
            .ok_or_else(|| MailboxError::UnknownGuest(guest_tag.to_string()))?;
        let plain = box_open(ctext, nonce, pk, keyring.private_comm_key())?;
        String::from_utf8(plain)
            .map_err(|_| MailboxError::Invariant("decoded message is not UTF-8".into()))
    }

    // ========================================================================
    // Message commands
    // ========================================================================

    /// Eagerly establish (or re-establish) the session to `url`.
    ///
    /// Returns the pending message count the relay reports with the
    /// ownership proof.
    pub async fn connect_to_relay(&self, url: &str) -> Result<i64> {
        let session = self.session_for(url).await;
        let mut session = session.lock().await;
        let keyring = self.keyring.read().await;
        Ok(session.connect(keyring.comm_keys()).await?)
    }

    /// Deposit `message` into a guest's mailbox on `url`.
    ///
    /// With `encrypt` the payload is a `box` envelope toward the guest;
    /// otherwise the raw string is deposited as-is. Returns the storage
    /// token for later [`message_status`](Mailbox::message_status) calls.
    pub async fn upload(
        &self,
        url: &str,
        guest_tag: &str,
        message: &str,
        encrypt: bool,
    ) -> Result<String> {
        let (to, payload) = {
            let keyring = self.keyring.read().await;
            let record = keyring
                .guest_record(guest_tag)
                .ok_or_else(|| MailboxError::UnknownGuest(guest_tag.to_string()))?;
            let payload = if encrypt {
                let sealed =
                    box_seal(message.as_bytes(), &record.pk, keyring.private_comm_key())?;
                serde_json::to_value(sealed)
                    .map_err(|e| MailboxError::Serialization(e.to_string()))?
            } else {
                Value::String(message.to_string())
            };
            (record.hpk.to_base64(), payload)
        };

        let lines = self
            .run_lines(url, Command::Upload, json!({ "to": to, "payload": payload }))
            .await?;
        let token = lines[0].trim().to_string();
        if token.is_empty() {
            return Err(MailboxError::protocol_cmd(url, "upload", "empty storage token"));
        }
        Ok(token)
    }

    /// Fetch and parse every pending message.
    pub async fn download(&self, url: &str) -> Result<Vec<ZaxMessage>> {
        let payload = self.run_json(url, Command::Download, Value::Null).await?;
        let records: Vec<RawRecord> = serde_json::from_value(payload)
            .map_err(|e| MailboxError::protocol_cmd(url, "download", e.to_string()))?;

        let keyring = self.keyring.read().await;
        records
            .into_iter()
            .map(|record| parse_record(url, record, &keyring, keyring.private_comm_key()))
            .collect()
    }

    /// Number of messages pending on `url`.
    pub async fn count(&self, url: &str) -> Result<i64> {
        let payload = self.run_json(url, Command::Count, Value::Null).await?;
        payload
            .as_i64()
            .ok_or_else(|| MailboxError::protocol_cmd(url, "count", "count is not an integer"))
    }

    /// Remaining TTL of an uploaded message in seconds.
    ///
    /// Redis semantics pass through verbatim: `-2` means the message is
    /// gone, `-1` means it never expires.
    pub async fn message_status(&self, url: &str, storage_token: &str) -> Result<i64> {
        let lines = self
            .run_lines(url, Command::MessageStatus, json!({ "token": storage_token }))
            .await?;
        lines[0].trim().parse().map_err(|_| {
            MailboxError::protocol_cmd(url, "messageStatus", "status is not an integer")
        })
    }

    /// Delete messages by record nonce. Returns the remaining count.
    pub async fn delete(&self, url: &str, nonces: &[String]) -> Result<i64> {
        let lines = self
            .run_lines(url, Command::Delete, json!({ "payload": nonces }))
            .await?;
        lines[0]
            .trim()
            .parse()
            .map_err(|_| MailboxError::protocol_cmd(url, "delete", "count is not an integer"))
    }

    // ========================================================================
    // File commands
    // ========================================================================

    /// Announce a file to a guest and open an upload.
    ///
    /// Generates the per-file `skey`, embeds it in the metadata, and
    /// encrypts the whole metadata object toward the guest. The relay
    /// sees only the file size and the ciphertext envelope.
    pub async fn start_file_upload(
        &self,
        url: &str,
        guest_tag: &str,
        mut metadata: FileUploadMetadata,
    ) -> Result<StartFileUpload> {
        let skey = SecretboxKey::generate()?;
        metadata.skey = Some(skey.to_base64());

        let (to, envelope) = {
            let keyring = self.keyring.read().await;
            let record = keyring
                .guest_record(guest_tag)
                .ok_or_else(|| MailboxError::UnknownGuest(guest_tag.to_string()))?;
            let plain = serde_json::to_vec(&metadata)
                .map_err(|e| MailboxError::Serialization(e.to_string()))?;
            let sealed = box_seal(&plain, &record.pk, keyring.private_comm_key())?;
            let envelope = serde_json::to_value(sealed)
                .map_err(|e| MailboxError::Serialization(e.to_string()))?;
            (record.hpk.to_base64(), envelope)
        };

        let payload = self
            .run_json(
                url,
                Command::StartFileUpload,
                json!({
                    "to": to,
                    "file_size": metadata.orig_size,
                    "metadata": envelope,
                }),
            )
            .await?;
        let reply: StartFileUploadReply = serde_json::from_value(payload)
            .map_err(|e| MailboxError::protocol_cmd(url, "startFileUpload", e.to_string()))?;

        debug!(url, upload_id = %reply.upload_id, "file upload opened");
        Ok(StartFileUpload {
            upload_id: reply.upload_id,
            max_chunk_size: reply.max_chunk_size,
            storage_token: reply.storage_token,
            skey,
        })
    }

    /// Seal and upload one chunk of an open file upload.
    ///
    /// `part` is zero-based; the chunk carrying `part == total_parts - 1`
    /// closes the upload.
    pub async fn upload_file_chunk(
        &self,
        url: &str,
        upload_id: &str,
        chunk: &[u8],
        part: usize,
        total_parts: usize,
        skey: &SecretboxKey,
    ) -> Result<CommandStatus> {
        if total_parts == 0 || part >= total_parts {
            return Err(MailboxError::protocol_cmd(
                url,
                "uploadFileChunk",
                format!("part {} out of bounds for {} parts", part, total_parts),
            ));
        }

        let nonce = zax_crypto::make_nonce(Some(part as u32))?;
        let ctext = zax_crypto::secretbox(chunk, &nonce, skey)?;

        let payload = self
            .run_command(
                url,
                Command::UploadFileChunk,
                json!({
                    "uploadID": upload_id,
                    "part": part,
                    "last_chunk": part == total_parts - 1,
                    "nonce": nonce.to_base64(),
                }),
                Some(b64::encode(&ctext)),
            )
            .await?;
        let CommandOutput::Json(payload) = payload else {
            return Err(MailboxError::Invariant("uploadFileChunk output shape".into()));
        };
        serde_json::from_value(payload)
            .map_err(|e| MailboxError::protocol_cmd(url, "uploadFileChunk", e.to_string()))
    }

    /// Download and open one chunk of a file.
    ///
    /// The relay returns the chunk's symmetric nonce inside the session
    /// envelope and the secretbox ciphertext as a raw third line; `skey`
    /// from the file metadata opens it.
    pub async fn download_file_chunk(
        &self,
        url: &str,
        upload_id: &str,
        part: usize,
        skey: &SecretboxKey,
    ) -> Result<Vec<u8>> {
        let output = self
            .run_command(
                url,
                Command::DownloadFileChunk,
                json!({ "uploadID": upload_id, "part": part }),
                None,
            )
            .await?;
        let CommandOutput::Chunk { envelope, raw } = output else {
            return Err(MailboxError::Invariant("downloadFileChunk output shape".into()));
        };

        let nonce = envelope
            .get("nonce")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                MailboxError::protocol_cmd(url, "downloadFileChunk", "envelope lacks a nonce")
            })?;
        let nonce = Nonce::from_base64(nonce).map_err(|_| {
            MailboxError::protocol_cmd(url, "downloadFileChunk", "chunk nonce is malformed")
        })?;
        let ctext = b64::decode(raw.trim()).map_err(|_| {
            MailboxError::protocol_cmd(url, "downloadFileChunk", "chunk ctext is malformed")
        })?;

        Ok(zax_crypto::secretbox_open(&ctext, &nonce, skey)?)
    }

    /// Status of a file by upload id.
    pub async fn file_status(&self, url: &str, upload_id: &str) -> Result<FileStatus> {
        let payload = self
            .run_json(url, Command::FileStatus, json!({ "uploadID": upload_id }))
            .await?;
        serde_json::from_value(payload)
            .map_err(|e| MailboxError::protocol_cmd(url, "fileStatus", e.to_string()))
    }

    /// Delete a file and its chunks from the relay.
    pub async fn delete_file(&self, url: &str, upload_id: &str) -> Result<CommandStatus> {
        let payload = self
            .run_json(url, Command::DeleteFile, json!({ "uploadID": upload_id }))
            .await?;
        serde_json::from_value(payload)
            .map_err(|e| MailboxError::protocol_cmd(url, "deleteFile", e.to_string()))
    }

    /// Announce and upload a whole file in one call.
    ///
    /// Drives [`start_file_upload`](Mailbox::start_file_upload) and the
    /// chunk loop at the relay's advertised chunk size. Returns the
    /// upload handle, `skey` included.
    pub async fn send_file(
        &self,
        url: &str,
        guest_tag: &str,
        metadata: FileUploadMetadata,
        content: &[u8],
    ) -> Result<StartFileUpload> {
        let upload = self.start_file_upload(url, guest_tag, metadata).await?;
        let chunk_size = upload.max_chunk_size as usize;
        let total = chunk_count(content.len(), chunk_size);

        if content.is_empty() {
            self.upload_file_chunk(url, &upload.upload_id, b"", 0, total, &upload.skey)
                .await?;
        } else {
            for (part, chunk) in content.chunks(chunk_size).enumerate() {
                self.upload_file_chunk(url, &upload.upload_id, chunk, part, total, &upload.skey)
                    .await?;
            }
        }
        debug!(url, upload_id = %upload.upload_id, parts = total, "file sent");
        Ok(upload)
    }

    /// Download and reassemble a whole file.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::FileIncomplete`] when the relay has not
    /// stored every chunk yet.
    pub async fn fetch_file(
        &self,
        url: &str,
        upload_id: &str,
        skey: &SecretboxKey,
    ) -> Result<Vec<u8>> {
        let status = self.file_status(url, upload_id).await?;
        if !status.is_complete() {
            return Err(MailboxError::FileIncomplete {
                upload_id: upload_id.to_string(),
                status: status.status,
            });
        }
        let total = status.total_chunks.ok_or_else(|| {
            MailboxError::protocol_cmd(url, "fileStatus", "complete file lacks total_chunks")
        })?;

        let mut content = Vec::new();
        for part in 0..total {
            let chunk = self
                .download_file_chunk(url, upload_id, part as usize, skey)
                .await?;
            content.extend_from_slice(&chunk);
        }
        Ok(content)
    }

    /// Find the announcement for `upload_id` among pending messages and
    /// return its metadata.
    pub async fn get_file_metadata(
        &self,
        url: &str,
        upload_id: &str,
    ) -> Result<Option<FileUploadMetadata>> {
        let messages = self.download(url).await?;
        Ok(messages.into_iter().find_map(|message| match message {
            ZaxMessage::File {
                data,
                upload_id: id,
                ..
            } if id == upload_id => Some(data),
            _ => None,
        }))
    }

    /// Convenience: how many chunks a payload of `len` bytes needs at
    /// the relay's chunk size.
    pub fn chunks_for(len: usize, max_chunk_size: u64) -> usize {
        chunk_count(len, max_chunk_size as usize)
    }

    // ========================================================================
    // Session plumbing
    // ========================================================================

    /// The session for `url`, created on first use.
    async fn session_for(&self, url: &str) -> Arc<Mutex<RelaySession>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(url.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(RelaySession::new(
                    url,
                    self.transport.clone(),
                    self.config.session_config(),
                )))
            })
            .clone()
    }

    /// Run one command with the per-URL lock held, reconnecting first
    /// if the session is fresh or a deadline has passed.
    async fn run_command(
        &self,
        url: &str,
        command: Command,
        params: Value,
        raw_ctext: Option<String>,
    ) -> Result<CommandOutput> {
        let session = self.session_for(url).await;
        let mut session = session.lock().await;

        if !session.ready() {
            if session.connected() {
                debug!(url, "relay session expired; reconnecting");
            }
            let keyring = self.keyring.read().await;
            session.connect(keyring.comm_keys()).await?;
        }

        let hpk = self.keyring.read().await.hpk();
        let mut lines = session
            .command(&hpk, command, params, raw_ctext.as_deref())
            .await?;

        match command.response_lines() {
            1 => Ok(CommandOutput::Lines(lines)),
            2 => Ok(CommandOutput::Json(
                session.open_envelope(&lines[0], &lines[1])?,
            )),
            _ => {
                let raw = lines.pop().expect("arity checked by session");
                Ok(CommandOutput::Chunk {
                    envelope: session.open_envelope(&lines[0], &lines[1])?,
                    raw,
                })
            }
        }
    }

    /// Run a command whose response is a plaintext line list.
    async fn run_lines(&self, url: &str, command: Command, params: Value) -> Result<Vec<String>> {
        match self.run_command(url, command, params, None).await? {
            CommandOutput::Lines(lines) => Ok(lines),
            _ => Err(MailboxError::Invariant(format!(
                "{} response shape",
                command
            ))),
        }
    }

    /// Run a command whose response is an encrypted JSON payload.
    async fn run_json(&self, url: &str, command: Command, params: Value) -> Result<Value> {
        match self.run_command(url, command, params, None).await? {
            CommandOutput::Json(payload) => Ok(payload),
            _ => Err(MailboxError::Invariant(format!(
                "{} response shape",
                command
            ))),
        }
    }
}
