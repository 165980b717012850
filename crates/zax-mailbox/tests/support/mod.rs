//! An in-process relay implementing the Zax wire contract.
//!
//! Plugs into a `Mailbox` through `RelayTransport`, so the integration
//! scenarios exercise the real handshake, the real proof-of-work, and
//! the real command envelopes without a network.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{json, Value};

use zax_crypto::{
    b64, box_open, box_seal, h2, random_bytes, Keys, Nonce, PublicKey,
};
use zax_relay::{array_zero_bits, RelayError, RelayTransport};

/// Chunk ceiling the mock relay advertises. Small enough that the
/// ≤1000-byte scenario files split into several parts.
pub const MAX_CHUNK_SIZE: u64 = 256;

/// TTL the mock reports for live messages.
const LIVE_TTL: i64 = 100;

struct Handshake {
    client_token: Vec<u8>,
    relay_token: Vec<u8>,
    relay_keys: Option<Keys>,
}

struct Client {
    relay_keys: Keys,
    session_pk: PublicKey,
}

struct StoredFile {
    file_size: u64,
    chunks: BTreeMap<u64, (String, String)>,
    complete: bool,
    total_chunks: Option<u64>,
}

#[derive(Default)]
struct RelayState {
    handshakes: HashMap<String, Handshake>,
    clients: HashMap<String, Client>,
    mailboxes: HashMap<String, Vec<Value>>,
    tokens: HashMap<String, (String, String)>,
    files: HashMap<String, StoredFile>,
}

/// The mock relay.
pub struct MockRelay {
    difficulty: u8,
    state: Mutex<RelayState>,
    start_session_calls: AtomicUsize,
}

impl MockRelay {
    pub fn new(difficulty: u8) -> Self {
        Self {
            difficulty,
            state: Mutex::new(RelayState::default()),
            start_session_calls: AtomicUsize::new(0),
        }
    }

    /// How many handshakes have been initiated against this relay.
    pub fn handshake_count(&self) -> usize {
        self.start_session_calls.load(Ordering::SeqCst)
    }

    /// Forget every proved session, as a restarted relay would. The
    /// next command from any client comes back 401.
    pub fn drop_sessions(&self) {
        self.state.lock().unwrap().clients.clear();
    }

    fn now() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_secs_f64()
    }

    fn protocol_err(reason: &str) -> RelayError {
        RelayError::Network {
            status: Some(400),
            message: reason.to_string(),
        }
    }

    fn unauthorized() -> RelayError {
        RelayError::Network {
            status: Some(401),
            message: "unknown session".to_string(),
        }
    }

    fn split(body: &str) -> Vec<String> {
        body.replace("\r\n", "\n")
            .split('\n')
            .map(str::to_string)
            .filter(|l| !l.is_empty())
            .collect()
    }

    fn start_session(&self, body: &str) -> Result<String, RelayError> {
        self.start_session_calls.fetch_add(1, Ordering::SeqCst);

        let client_token = b64::decode(body.trim()).map_err(|_| Self::protocol_err("token"))?;
        let relay_token = random_bytes(32).expect("rng");

        let key = b64::encode(h2(&client_token));
        let mut state = self.state.lock().unwrap();
        state.handshakes.insert(
            key,
            Handshake {
                client_token,
                relay_token: relay_token.clone(),
                relay_keys: None,
            },
        );
        Ok(format!("{}\r\n{}", b64::encode(&relay_token), self.difficulty))
    }

    fn verify_session(&self, body: &str) -> Result<String, RelayError> {
        let lines = Self::split(body);
        if lines.len() != 2 {
            return Err(Self::protocol_err("verify arity"));
        }

        let mut state = self.state.lock().unwrap();
        let handshake = state
            .handshakes
            .get_mut(&lines[0])
            .ok_or_else(Self::unauthorized)?;

        let mut material = handshake.client_token.clone();
        material.extend_from_slice(&handshake.relay_token);

        let answer = b64::decode(&lines[1]).map_err(|_| Self::protocol_err("handshake"))?;
        let accepted = if self.difficulty == 0 {
            answer == h2(&material)
        } else {
            material.extend_from_slice(&answer);
            answer.len() == 32 && array_zero_bits(&h2(&material), self.difficulty)
        };
        if !accepted {
            return Err(Self::protocol_err("handshake rejected"));
        }

        let relay_keys = Keys::generate();
        let pk = relay_keys.public_key.to_base64();
        handshake.relay_keys = Some(relay_keys);
        Ok(pk)
    }

    fn prove(&self, body: &str) -> Result<String, RelayError> {
        let lines = Self::split(body);
        if lines.len() != 4 {
            return Err(Self::protocol_err("prove arity"));
        }

        let mut state = self.state.lock().unwrap();
        let handshake = state
            .handshakes
            .remove(&lines[0])
            .ok_or_else(Self::unauthorized)?;
        let relay_keys = handshake
            .relay_keys
            .ok_or_else(|| Self::protocol_err("prove before verify"))?;

        let session_pk =
            PublicKey::from_base64(&lines[1]).map_err(|_| Self::protocol_err("session pk"))?;
        let outer_nonce =
            Nonce::from_base64(&lines[2]).map_err(|_| Self::protocol_err("nonce"))?;
        let outer_ctext = b64::decode(&lines[3]).map_err(|_| Self::protocol_err("ctext"))?;

        let payload = box_open(
            &outer_ctext,
            &outer_nonce,
            &session_pk,
            &relay_keys.secret_key,
        )
        .map_err(|_| Self::unauthorized())?;
        let payload: Value =
            serde_json::from_slice(&payload).map_err(|_| Self::protocol_err("payload"))?;

        let comm_pk = PublicKey::from_base64(
            payload.get("pub_key").and_then(Value::as_str).unwrap_or(""),
        )
        .map_err(|_| Self::protocol_err("pub_key"))?;
        let inner_nonce = Nonce::from_base64(
            payload.get("nonce").and_then(Value::as_str).unwrap_or(""),
        )
        .map_err(|_| Self::protocol_err("inner nonce"))?;
        let inner_ctext =
            b64::decode(payload.get("ctext").and_then(Value::as_str).unwrap_or(""))
                .map_err(|_| Self::protocol_err("inner ctext"))?;

        let signature = box_open(&inner_ctext, &inner_nonce, &comm_pk, &relay_keys.secret_key)
            .map_err(|_| Self::unauthorized())?;

        let mut signed = Vec::new();
        signed.extend_from_slice(session_pk.as_bytes());
        signed.extend_from_slice(&handshake.relay_token);
        signed.extend_from_slice(&handshake.client_token);
        if signature != h2(&signed) {
            return Err(Self::unauthorized());
        }

        let hpk = b64::encode(h2(comm_pk.as_bytes()));
        let count = state.mailboxes.get(&hpk).map_or(0, Vec::len);
        state.clients.insert(
            hpk,
            Client {
                relay_keys,
                session_pk,
            },
        );
        Ok(count.to_string())
    }

    fn seal_reply(client: &Client, payload: &Value) -> String {
        let sealed = box_seal(
            payload.to_string().as_bytes(),
            &client.session_pk,
            &client.relay_keys.secret_key,
        )
        .expect("seal reply");
        format!(
            "{}\r\n{}",
            sealed.nonce.to_base64(),
            b64::encode(&sealed.ctext)
        )
    }

    fn command(&self, body: &str) -> Result<String, RelayError> {
        let lines = Self::split(body);
        if lines.len() < 3 {
            return Err(Self::protocol_err("command arity"));
        }
        let hpk = lines[0].clone();

        let mut state = self.state.lock().unwrap();
        let client = state.clients.get(&hpk).ok_or_else(Self::unauthorized)?;

        let nonce = Nonce::from_base64(&lines[1]).map_err(|_| Self::protocol_err("nonce"))?;
        let ctext = b64::decode(&lines[2]).map_err(|_| Self::protocol_err("ctext"))?;
        let request = box_open(
            &ctext,
            &nonce,
            &client.session_pk,
            &client.relay_keys.secret_key,
        )
        .map_err(|_| Self::unauthorized())?;
        let request: Value =
            serde_json::from_slice(&request).map_err(|_| Self::protocol_err("request"))?;

        let cmd = request.get("cmd").and_then(Value::as_str).unwrap_or("");
        match cmd {
            "count" => {
                let count = state.mailboxes.get(&hpk).map_or(0, Vec::len);
                let client = state.clients.get(&hpk).unwrap();
                Ok(Self::seal_reply(client, &json!(count)))
            }
            "upload" => {
                let to = request
                    .get("to")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Self::protocol_err("to"))?
                    .to_string();
                let payload = request
                    .get("payload")
                    .ok_or_else(|| Self::protocol_err("payload"))?;

                let (data, record_nonce) = match payload {
                    Value::Object(envelope) => (
                        envelope
                            .get("ctext")
                            .and_then(Value::as_str)
                            .ok_or_else(|| Self::protocol_err("ctext"))?
                            .to_string(),
                        envelope
                            .get("nonce")
                            .and_then(Value::as_str)
                            .ok_or_else(|| Self::protocol_err("nonce"))?
                            .to_string(),
                    ),
                    Value::String(plain) => {
                        (plain.clone(), b64::encode(random_bytes(32).expect("rng")))
                    }
                    _ => return Err(Self::protocol_err("payload type")),
                };

                let record = json!({
                    "data": data,
                    "time": Self::now(),
                    "from": hpk,
                    "nonce": record_nonce,
                    "kind": "message",
                });
                state.mailboxes.entry(to.clone()).or_default().push(record);
                state
                    .tokens
                    .insert(record_nonce.clone(), (to, record_nonce.clone()));
                Ok(record_nonce)
            }
            "download" => {
                let records = state.mailboxes.get(&hpk).cloned().unwrap_or_default();
                let client = state.clients.get(&hpk).unwrap();
                Ok(Self::seal_reply(client, &Value::Array(records)))
            }
            "messageStatus" => {
                let token = request.get("token").and_then(Value::as_str).unwrap_or("");
                let status = match state.tokens.get(token) {
                    Some((to, nonce)) => {
                        let live = state.mailboxes.get(to).is_some_and(|records| {
                            records.iter().any(|r| r.get("nonce").and_then(Value::as_str) == Some(nonce))
                        });
                        if live {
                            LIVE_TTL
                        } else {
                            -2
                        }
                    }
                    None => -2,
                };
                Ok(status.to_string())
            }
            "delete" => {
                let nonces: Vec<String> = request
                    .get("payload")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .ok_or_else(|| Self::protocol_err("payload"))?;
                let records = state.mailboxes.entry(hpk.clone()).or_default();
                records.retain(|r| {
                    r.get("nonce")
                        .and_then(Value::as_str)
                        .map_or(true, |n| !nonces.iter().any(|d| d == n))
                });
                Ok(records.len().to_string())
            }
            "startFileUpload" => {
                let to = request
                    .get("to")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Self::protocol_err("to"))?
                    .to_string();
                let file_size = request
                    .get("file_size")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| Self::protocol_err("file_size"))?;
                let metadata = request
                    .get("metadata")
                    .cloned()
                    .ok_or_else(|| Self::protocol_err("metadata"))?;

                let upload_id = b64::encode(random_bytes(16).expect("rng"));
                let storage_token = b64::encode(random_bytes(32).expect("rng"));

                let announcement = json!({
                    "data": json!({
                        "nonce": metadata.get("nonce"),
                        "ctext": metadata.get("ctext"),
                        "uploadID": upload_id,
                    })
                    .to_string(),
                    "time": Self::now(),
                    "from": hpk,
                    "nonce": storage_token,
                    "kind": "file",
                });
                state
                    .mailboxes
                    .entry(to.clone())
                    .or_default()
                    .push(announcement);
                state
                    .tokens
                    .insert(storage_token.clone(), (to, storage_token.clone()));
                state.files.insert(
                    upload_id.clone(),
                    StoredFile {
                        file_size,
                        chunks: BTreeMap::new(),
                        complete: false,
                        total_chunks: None,
                    },
                );

                let client = state.clients.get(&hpk).unwrap();
                Ok(Self::seal_reply(
                    client,
                    &json!({
                        "uploadID": upload_id,
                        "max_chunk_size": MAX_CHUNK_SIZE,
                        "storage_token": storage_token,
                    }),
                ))
            }
            "uploadFileChunk" => {
                let raw = lines
                    .get(3)
                    .ok_or_else(|| Self::protocol_err("missing chunk line"))?
                    .clone();
                let upload_id = request
                    .get("uploadID")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Self::protocol_err("uploadID"))?;
                let part = request
                    .get("part")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| Self::protocol_err("part"))?;
                let last_chunk = request
                    .get("last_chunk")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let chunk_nonce = request
                    .get("nonce")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Self::protocol_err("nonce"))?
                    .to_string();

                let file = state
                    .files
                    .get_mut(upload_id)
                    .ok_or_else(|| Self::protocol_err("unknown upload"))?;
                file.chunks.insert(part, (chunk_nonce, raw));
                if last_chunk {
                    file.complete = true;
                    file.total_chunks = Some(part + 1);
                }

                let client = state.clients.get(&hpk).unwrap();
                Ok(Self::seal_reply(client, &json!({ "status": "OK" })))
            }
            "downloadFileChunk" => {
                let upload_id = request
                    .get("uploadID")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Self::protocol_err("uploadID"))?;
                let part = request
                    .get("part")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| Self::protocol_err("part"))?;

                let (chunk_nonce, chunk_ctext) = state
                    .files
                    .get(upload_id)
                    .and_then(|f| f.chunks.get(&part))
                    .cloned()
                    .ok_or_else(|| Self::protocol_err("unknown chunk"))?;

                let client = state.clients.get(&hpk).unwrap();
                let envelope = Self::seal_reply(client, &json!({ "nonce": chunk_nonce }));
                Ok(format!("{}\r\n{}", envelope, chunk_ctext))
            }
            "fileStatus" => {
                let upload_id = request
                    .get("uploadID")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let payload = match state.files.get(upload_id) {
                    Some(file) => {
                        let bytes: usize = file
                            .chunks
                            .values()
                            .map(|(_, c)| b64::decode(c).map(|b| b.len()).unwrap_or(0))
                            .sum();
                        json!({
                            "status": if file.complete { "COMPLETE" } else { "UPLOADING" },
                            "file_size": file.file_size,
                            "total_chunks": file.total_chunks,
                            "bytes_stored": bytes,
                        })
                    }
                    None => json!({ "status": "NOT_FOUND" }),
                };
                let client = state.clients.get(&hpk).unwrap();
                Ok(Self::seal_reply(client, &payload))
            }
            "deleteFile" => {
                let upload_id = request
                    .get("uploadID")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let status = if state.files.remove(upload_id).is_some() {
                    "OK"
                } else {
                    "NOT_FOUND"
                };
                let client = state.clients.get(&hpk).unwrap();
                Ok(Self::seal_reply(client, &json!({ "status": status })))
            }
            other => Err(Self::protocol_err(&format!("unknown command {:?}", other))),
        }
    }
}

#[async_trait]
impl RelayTransport for MockRelay {
    async fn post(&self, _url: &str, path: &str, body: &str) -> zax_relay::Result<String> {
        match path {
            "start_session" => self.start_session(body),
            "verify_session" => self.verify_session(body),
            "prove" => self.prove(body),
            "command" => self.command(body),
            other => Err(Self::protocol_err(&format!("unknown path {:?}", other))),
        }
    }
}

/// Routes each URL to its own relay, for multi-relay scenarios.
#[derive(Default)]
pub struct RelayNetwork {
    relays: HashMap<String, std::sync::Arc<MockRelay>>,
}

impl RelayNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, url: &str, relay: std::sync::Arc<MockRelay>) -> Self {
        self.relays.insert(url.to_string(), relay);
        self
    }
}

#[async_trait]
impl RelayTransport for RelayNetwork {
    async fn post(&self, url: &str, path: &str, body: &str) -> zax_relay::Result<String> {
        match self.relays.get(url) {
            Some(relay) => relay.post(url, path, body).await,
            None => Err(RelayError::Network {
                status: None,
                message: format!("no relay at {}", url),
            }),
        }
    }
}
