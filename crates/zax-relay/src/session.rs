//! The per-(mailbox, URL) relay session.
//!
//! A session walks a three-leg handshake before it can carry commands:
//!
//! 1. **start_session** - swap random tokens with the relay and learn
//!    the proof-of-work difficulty.
//! 2. **verify_session** - answer the difficulty challenge and receive
//!    the relay's ephemeral public key.
//! 3. **prove** - present the mailbox's long-term key, authenticated by
//!    a digest over the session material.
//!
//! Afterwards every command is one encrypted request/response round
//! trip against `/command`. Two deadlines run independently: the relay
//! token's (armed after leg 1) and the session's (armed after leg 3);
//! when either passes, the owner reconnects before the next command.
//! Any failure drops the ephemerals and returns the session to fresh.

use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use zax_crypto::{b64, box_open, box_seal, h2, random_bytes, Hpk, Keys, Nonce, PublicKey};

use crate::commands::Command;
use crate::config::SessionConfig;
use crate::pow::{array_zero_bits, solve_handshake};
use crate::transport::RelayTransport;
use crate::wire::{join_lines, split_lines};
use crate::{RelayError, Result};

/// Handshake endpoint, leg 1.
const START_SESSION_PATH: &str = "start_session";

/// Handshake endpoint, leg 2.
const VERIFY_SESSION_PATH: &str = "verify_session";

/// Handshake endpoint, leg 3.
const PROVE_PATH: &str = "prove";

/// The single post-handshake endpoint.
const COMMAND_PATH: &str = "command";

/// An authenticated, owner-proved channel to one relay URL.
pub struct RelaySession {
    url: String,
    config: SessionConfig,
    transport: Arc<dyn RelayTransport>,
    difficulty: u8,
    client_token: Option<Vec<u8>>,
    relay_token: Option<Vec<u8>>,
    session_keys: Option<Keys>,
    relay_public_key: Option<PublicKey>,
    token_deadline: Option<Instant>,
    session_deadline: Option<Instant>,
    connected: bool,
}

impl std::fmt::Debug for RelaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySession")
            .field("url", &self.url)
            .field("connected", &self.connected)
            .field("difficulty", &self.difficulty)
            .finish_non_exhaustive()
    }
}

impl RelaySession {
    /// Create a fresh session for `url`. No I/O happens until
    /// [`connect`](RelaySession::connect).
    pub fn new(url: &str, transport: Arc<dyn RelayTransport>, config: SessionConfig) -> Self {
        Self {
            url: url.to_string(),
            config,
            transport,
            difficulty: 0,
            client_token: None,
            relay_token: None,
            session_keys: None,
            relay_public_key: None,
            token_deadline: None,
            session_deadline: None,
            connected: false,
        }
    }

    /// The relay URL this session talks to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Difficulty the relay requested during the last handshake.
    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    /// Whether the ownership proof has succeeded.
    pub fn connected(&self) -> bool {
        self.connected
    }

    /// Whether either deadline has passed.
    pub fn expired(&self) -> bool {
        let now = Instant::now();
        self.token_deadline.is_some_and(|d| now >= d)
            || self.session_deadline.is_some_and(|d| now >= d)
    }

    /// Whether the session can carry a command right now.
    pub fn ready(&self) -> bool {
        self.connected && !self.expired()
    }

    /// Drop ephemerals and deadlines, returning the session to fresh.
    pub fn reset(&mut self) {
        self.difficulty = 0;
        self.client_token = None;
        self.relay_token = None;
        self.session_keys = None;
        self.relay_public_key = None;
        self.token_deadline = None;
        self.session_deadline = None;
        self.connected = false;
    }

    /// Run the full handshake. On failure the session is reset.
    ///
    /// Returns the mailbox's pending message count, which the relay
    /// reports in the proof response.
    pub async fn connect(&mut self, comm_keys: &Keys) -> Result<i64> {
        self.reset();
        match self.handshake(comm_keys).await {
            Ok(count) => Ok(count),
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    async fn handshake(&mut self, comm_keys: &Keys) -> Result<i64> {
        self.start_session().await?;
        self.verify_session().await?;
        self.prove(comm_keys).await
    }

    /// Leg 1: exchange tokens and learn the difficulty.
    async fn start_session(&mut self) -> Result<()> {
        let client_token = random_bytes(self.config.token_len)?;
        let body = b64::encode(&client_token);

        let response = self
            .transport
            .post(&self.url, START_SESSION_PATH, &body)
            .await?;
        let lines = split_lines(&response);
        if lines.len() != 2 {
            return Err(RelayError::protocol(
                &self.url,
                format!("start_session: expected 2 lines, got {}", lines.len()),
            ));
        }

        let relay_token = b64::decode(&lines[0])
            .map_err(|_| RelayError::protocol(&self.url, "start_session: bad relay token"))?;
        if relay_token.len() != self.config.token_len {
            return Err(RelayError::protocol(
                &self.url,
                format!(
                    "start_session: relay token is {} bytes, expected {}",
                    relay_token.len(),
                    self.config.token_len
                ),
            ));
        }
        let difficulty: u8 = lines[1]
            .trim()
            .parse()
            .map_err(|_| RelayError::protocol(&self.url, "start_session: bad difficulty"))?;

        debug!(url = %self.url, difficulty, "token exchange complete");
        self.client_token = Some(client_token);
        self.relay_token = Some(relay_token);
        self.difficulty = difficulty;
        self.token_deadline = Some(Instant::now() + self.config.guarded_token_timeout());
        Ok(())
    }

    /// Leg 2: answer the difficulty challenge, receive the relay key.
    async fn verify_session(&mut self) -> Result<()> {
        let client_token = self
            .client_token
            .as_ref()
            .ok_or_else(|| RelayError::Invariant("verify_session before start_session".into()))?;
        let relay_token = self
            .relay_token
            .as_ref()
            .ok_or_else(|| RelayError::Invariant("verify_session before start_session".into()))?;

        let mut handshake = Vec::with_capacity(client_token.len() + relay_token.len());
        handshake.extend_from_slice(client_token);
        handshake.extend_from_slice(relay_token);

        let session_handshake = if self.difficulty == 0 {
            h2(&handshake).to_vec()
        } else {
            let nonce = solve_handshake(&handshake, self.difficulty).await?;
            debug_assert!({
                let mut input = handshake.clone();
                input.extend_from_slice(&nonce);
                array_zero_bits(&h2(&input), self.difficulty)
            });
            nonce.to_vec()
        };

        let body = join_lines(&[
            b64::encode(h2(client_token)),
            b64::encode(&session_handshake),
        ]);
        let response = self
            .transport
            .post(&self.url, VERIFY_SESSION_PATH, &body)
            .await?;
        let lines = split_lines(&response);
        if lines.len() != 1 {
            return Err(RelayError::protocol(
                &self.url,
                format!("verify_session: expected 1 line, got {}", lines.len()),
            ));
        }

        let relay_public_key = PublicKey::from_base64(lines[0].trim())
            .map_err(|_| RelayError::protocol(&self.url, "verify_session: bad relay key"))?;

        debug!(url = %self.url, "relay session key received");
        self.relay_public_key = Some(relay_public_key);
        Ok(())
    }

    /// Leg 3: prove mailbox ownership.
    ///
    /// The proof content is derived from session material only; the
    /// long-term comm key authenticates it but never signs anything
    /// relay-chosen.
    async fn prove(&mut self, comm_keys: &Keys) -> Result<i64> {
        let client_token = self
            .client_token
            .as_ref()
            .ok_or_else(|| RelayError::Invariant("prove before start_session".into()))?;
        let relay_token = self
            .relay_token
            .as_ref()
            .ok_or_else(|| RelayError::Invariant("prove before start_session".into()))?;
        let relay_public_key = self
            .relay_public_key
            .as_ref()
            .ok_or_else(|| RelayError::Invariant("prove before verify_session".into()))?;

        let session_keys = Keys::generate();

        let mut signed = Vec::new();
        signed.extend_from_slice(session_keys.public_key.as_bytes());
        signed.extend_from_slice(relay_token);
        signed.extend_from_slice(client_token);
        let signature = h2(&signed);

        let inner = box_seal(&signature, relay_public_key, &comm_keys.secret_key)?;
        let payload = serde_json::json!({
            "pub_key": comm_keys.public_key.to_base64(),
            "nonce": inner.nonce.to_base64(),
            "ctext": b64::encode(&inner.ctext),
        });
        let payload =
            serde_json::to_vec(&payload).map_err(|e| RelayError::Serialization(e.to_string()))?;
        let outer = box_seal(&payload, relay_public_key, &session_keys.secret_key)?;

        let body = join_lines(&[
            b64::encode(h2(client_token)),
            session_keys.public_key.to_base64(),
            outer.nonce.to_base64(),
            b64::encode(&outer.ctext),
        ]);
        let response = self.transport.post(&self.url, PROVE_PATH, &body).await?;
        let lines = split_lines(&response);
        if lines.len() != 1 {
            return Err(RelayError::protocol(
                &self.url,
                format!("prove: expected 1 line, got {}", lines.len()),
            ));
        }
        let count: i64 = lines[0]
            .trim()
            .parse()
            .map_err(|_| RelayError::protocol(&self.url, "prove: bad message count"))?;

        debug!(url = %self.url, count, "mailbox ownership proved");
        self.session_keys = Some(session_keys);
        self.session_deadline = Some(Instant::now() + self.config.guarded_session_timeout());
        self.connected = true;
        Ok(count)
    }

    /// Issue one command against `/command`.
    ///
    /// `params` must be a JSON object (or null); it is merged with the
    /// command name, sealed toward the relay under the session key, and
    /// line-framed outside the envelope. `raw_ctext`, when present,
    /// rides as the fourth request line (file-chunk uploads).
    ///
    /// Returns the response lines after arity checking. A 401 response
    /// drops the session state before the error is returned.
    pub async fn command(
        &mut self,
        hpk: &Hpk,
        command: Command,
        params: Value,
        raw_ctext: Option<&str>,
    ) -> Result<Vec<String>> {
        if !self.connected {
            return Err(RelayError::Invariant(format!(
                "command {} issued before the session was proved",
                command
            )));
        }
        let session_keys = self
            .session_keys
            .as_ref()
            .ok_or_else(|| RelayError::Invariant("connected session without keys".into()))?;
        let relay_public_key = self
            .relay_public_key
            .as_ref()
            .ok_or_else(|| RelayError::Invariant("connected session without relay key".into()))?;

        let mut body = serde_json::Map::new();
        body.insert("cmd".into(), Value::String(command.wire_name().into()));
        match params {
            Value::Object(entries) => body.extend(entries),
            Value::Null => {}
            other => {
                return Err(RelayError::Invariant(format!(
                    "command params must be an object, got {}",
                    other
                )))
            }
        }
        let body = serde_json::to_vec(&Value::Object(body))
            .map_err(|e| RelayError::Serialization(e.to_string()))?;

        let envelope = box_seal(&body, relay_public_key, &session_keys.secret_key)?;
        let mut lines = vec![
            hpk.to_base64(),
            envelope.nonce.to_base64(),
            b64::encode(&envelope.ctext),
        ];
        if let Some(raw) = raw_ctext {
            lines.push(raw.to_string());
        }

        let response = match self
            .transport
            .post(&self.url, COMMAND_PATH, &join_lines(&lines))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if e.is_unauthorized() {
                    warn!(url = %self.url, command = %command, "relay rejected session (401)");
                    self.reset();
                }
                return Err(e);
            }
        };

        let lines = split_lines(&response);
        if lines.len() != command.response_lines() {
            return Err(RelayError::protocol_cmd(
                &self.url,
                command.wire_name(),
                format!(
                    "expected {} response lines, got {}",
                    command.response_lines(),
                    lines.len()
                ),
            ));
        }
        Ok(lines)
    }

    /// Open an encrypted `[nonce, ctext]` response pair and parse the
    /// plaintext as JSON.
    pub fn open_envelope(&self, nonce_b64: &str, ctext_b64: &str) -> Result<Value> {
        let session_keys = self
            .session_keys
            .as_ref()
            .ok_or_else(|| RelayError::Invariant("open_envelope on a fresh session".into()))?;
        let relay_public_key = self
            .relay_public_key
            .as_ref()
            .ok_or_else(|| RelayError::Invariant("open_envelope on a fresh session".into()))?;

        let nonce = Nonce::from_base64(nonce_b64.trim())
            .map_err(|_| RelayError::protocol(&self.url, "response nonce is not base64"))?;
        let ctext = b64::decode(ctext_b64.trim())
            .map_err(|_| RelayError::protocol(&self.url, "response ctext is not base64"))?;

        let plain = box_open(&ctext, &nonce, relay_public_key, &session_keys.secret_key)?;
        serde_json::from_slice(&plain)
            .map_err(|e| RelayError::protocol(&self.url, format!("response is not JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    /// Scripted transport: pops one canned reply per call.
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<String>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RelayTransport for ScriptedTransport {
        async fn post(&self, _url: &str, path: &str, body: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((path.to_string(), body.to_string()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected transport call")
        }
    }

    fn start_session_reply(token_len: usize, difficulty: u8) -> String {
        format!(
            "{}\r\n{}",
            b64::encode(vec![7u8; token_len]),
            difficulty
        )
    }

    #[tokio::test]
    async fn test_start_session_parses_token_and_difficulty() {
        let transport = ScriptedTransport::new(vec![Ok(start_session_reply(32, 4))]);
        let mut session =
            RelaySession::new("https://relay.test", transport.clone(), SessionConfig::default());

        session.start_session().await.unwrap();
        assert_eq!(session.difficulty(), 4);
        assert_eq!(session.relay_token.as_deref(), Some(&[7u8; 32][..]));

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "start_session");
        // The body is the base64 of the 32-byte client token.
        assert_eq!(b64::decode(&calls[0].1).unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_start_session_rejects_wrong_arity() {
        let transport = ScriptedTransport::new(vec![Ok("only-one-line".to_string())]);
        let mut session =
            RelaySession::new("https://relay.test", transport, SessionConfig::default());

        let result = session.start_session().await;
        assert!(matches!(result, Err(RelayError::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_start_session_rejects_short_relay_token() {
        let reply = format!("{}\r\n0", b64::encode([7u8; 16]));
        let transport = ScriptedTransport::new(vec![Ok(reply)]);
        let mut session =
            RelaySession::new("https://relay.test", transport, SessionConfig::default());

        assert!(matches!(
            session.start_session().await,
            Err(RelayError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_verify_session_zero_difficulty_sends_h2() {
        let relay_pk = Keys::generate().public_key;
        let transport = ScriptedTransport::new(vec![
            Ok(start_session_reply(32, 0)),
            Ok(relay_pk.to_base64()),
        ]);
        let mut session =
            RelaySession::new("https://relay.test", transport.clone(), SessionConfig::default());

        session.start_session().await.unwrap();
        session.verify_session().await.unwrap();

        let calls = transport.calls();
        let verify_lines = split_lines(&calls[1].1);
        assert_eq!(verify_lines.len(), 2);

        let client_token = session.client_token.as_ref().unwrap();
        assert_eq!(verify_lines[0], b64::encode(h2(client_token)));

        let mut handshake = client_token.clone();
        handshake.extend_from_slice(session.relay_token.as_ref().unwrap());
        assert_eq!(verify_lines[1], b64::encode(h2(&handshake)));
        assert_eq!(session.relay_public_key.as_ref(), Some(&relay_pk));
    }

    #[tokio::test]
    async fn test_verify_session_solves_difficulty() {
        let relay_pk = Keys::generate().public_key;
        let transport = ScriptedTransport::new(vec![
            Ok(start_session_reply(32, 3)),
            Ok(relay_pk.to_base64()),
        ]);
        let mut session =
            RelaySession::new("https://relay.test", transport.clone(), SessionConfig::default());

        session.start_session().await.unwrap();
        session.verify_session().await.unwrap();

        let calls = transport.calls();
        let verify_lines = split_lines(&calls[1].1);
        let nonce = b64::decode(&verify_lines[1]).unwrap();
        assert_eq!(nonce.len(), 32);

        let mut input = session.client_token.clone().unwrap();
        input.extend_from_slice(session.relay_token.as_ref().unwrap());
        input.extend_from_slice(&nonce);
        assert!(array_zero_bits(&h2(&input), 3));
    }

    #[tokio::test]
    async fn test_connect_resets_on_failure() {
        let transport = ScriptedTransport::new(vec![
            Ok(start_session_reply(32, 0)),
            Err(RelayError::Network {
                status: Some(500),
                message: "boom".into(),
            }),
        ]);
        let mut session =
            RelaySession::new("https://relay.test", transport, SessionConfig::default());

        let comm = Keys::generate();
        assert!(session.connect(&comm).await.is_err());
        assert!(!session.connected());
        assert!(session.client_token.is_none());
        assert!(session.token_deadline.is_none());
    }

    #[tokio::test]
    async fn test_command_requires_proved_session() {
        let transport = ScriptedTransport::new(vec![]);
        let mut session =
            RelaySession::new("https://relay.test", transport, SessionConfig::default());

        let hpk = Hpk::from_public_key(&Keys::generate().public_key);
        let result = session
            .command(&hpk, Command::Count, Value::Null, None)
            .await;
        assert!(matches!(result, Err(RelayError::Invariant(_))));
    }

    #[tokio::test]
    async fn test_command_401_resets_session() {
        let relay = Keys::generate();
        let transport = ScriptedTransport::new(vec![
            Ok(start_session_reply(32, 0)),
            Ok(relay.public_key.to_base64()),
            Ok("0".to_string()),
            Err(RelayError::Network {
                status: Some(401),
                message: "unauthorized".into(),
            }),
        ]);
        let mut session =
            RelaySession::new("https://relay.test", transport, SessionConfig::default());

        let comm = Keys::generate();
        session.connect(&comm).await.unwrap();
        assert!(session.ready());

        let hpk = Hpk::from_public_key(&comm.public_key);
        let result = session
            .command(&hpk, Command::Count, Value::Null, None)
            .await;
        assert!(result.is_err());
        assert!(!session.connected());
        assert!(session.session_keys.is_none());
    }

    #[tokio::test]
    async fn test_command_checks_response_arity() {
        let relay = Keys::generate();
        let transport = ScriptedTransport::new(vec![
            Ok(start_session_reply(32, 0)),
            Ok(relay.public_key.to_base64()),
            Ok("3".to_string()),
            // `count` expects 2 lines; return 1.
            Ok("just-one".to_string()),
        ]);
        let mut session =
            RelaySession::new("https://relay.test", transport, SessionConfig::default());

        let comm = Keys::generate();
        session.connect(&comm).await.unwrap();

        let hpk = Hpk::from_public_key(&comm.public_key);
        let result = session
            .command(&hpk, Command::Count, Value::Null, None)
            .await;
        assert!(matches!(
            result,
            Err(RelayError::Protocol { command: Some(c), .. }) if c == "count"
        ));
    }

    #[tokio::test]
    async fn test_command_rejects_non_object_params() {
        let relay = Keys::generate();
        let transport = ScriptedTransport::new(vec![
            Ok(start_session_reply(32, 0)),
            Ok(relay.public_key.to_base64()),
            Ok("0".to_string()),
        ]);
        let mut session =
            RelaySession::new("https://relay.test", transport, SessionConfig::default());

        let comm = Keys::generate();
        session.connect(&comm).await.unwrap();

        let hpk = Hpk::from_public_key(&comm.public_key);
        let result = session
            .command(&hpk, Command::Count, Value::String("nope".into()), None)
            .await;
        assert!(matches!(result, Err(RelayError::Invariant(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_deadline_expires_session() {
        let relay = Keys::generate();
        let transport = ScriptedTransport::new(vec![
            Ok(start_session_reply(32, 0)),
            Ok(relay.public_key.to_base64()),
            Ok("0".to_string()),
        ]);
        let mut session =
            RelaySession::new("https://relay.test", transport, SessionConfig::default());

        let comm = Keys::generate();
        session.connect(&comm).await.unwrap();
        assert!(session.ready());

        // Just before the guarded token deadline (300s * 0.9).
        tokio::time::advance(std::time::Duration::from_secs(269)).await;
        assert!(session.ready());

        tokio::time::advance(std::time::Duration::from_secs(2)).await;
        assert!(session.expired());
        assert!(!session.ready());
    }
}
