//! Zax CLI
//!
//! A small interactive client demonstrating the mailbox API against a
//! live relay.
//!
//! ## Usage
//!
//! Run with: `cargo run -p zax-cli -- <identity> [relay-url]`
//!
//! Available commands:
//! - `/help` - Show available commands
//! - `/identity` - Show your public key and relay address
//! - `/backup` - Print a keyring backup string
//! - `/guests` - List registered guests
//! - `/add <name> <pubkey>` - Register a guest by Base64 public key
//! - `/remove <name>` - Remove a guest
//! - `/relay <url>` - Switch the active relay
//! - `/send <name> <message>` - Send an encrypted message
//! - `/plain <name> <message>` - Send an unencrypted message
//! - `/inbox` - Download and show pending messages
//! - `/count` - Show the pending message count
//! - `/delete <nonce>` - Delete a message by nonce
//! - `/sendfile <name> <path>` - Send a file
//! - `/fetchfile <uploadID> <path>` - Fetch a file announced to you
//! - `/quit` - Exit

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::ExecutableCommand;
use tokio::sync::RwLock;

use zax_crypto::{PublicKey, SecretboxKey};
use zax_mailbox::{FileUploadMetadata, Mailbox, MailboxConfig, ZaxMessage};
use zax_relay::HttpTransport;
use zax_store::StorageDriver;

/// Where the encrypted rows live when no path is given.
const DEFAULT_STORE_FILE: &str = "zax-cli-store.json";

// =============================================================================
// File-backed storage driver
// =============================================================================

/// A storage driver persisting rows to one JSON file.
///
/// Everything that reaches this driver is already ciphertext; the file
/// contents are safe to sync or back up as-is.
struct FileDriver {
    path: PathBuf,
    rows: RwLock<HashMap<String, String>>,
}

impl FileDriver {
    fn open(path: PathBuf) -> Result<Self> {
        let rows = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("corrupt store file {}", path.display()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e).context("reading store file"),
        };
        Ok(Self {
            path,
            rows: RwLock::new(rows),
        })
    }

    async fn persist(&self) -> zax_store::Result<()> {
        let rows = self.rows.read().await;
        let contents = serde_json::to_string_pretty(&*rows)
            .map_err(|e| zax_store::StoreError::Serialization(e.to_string()))?;
        std::fs::write(&self.path, contents)
            .map_err(|e| zax_store::StoreError::Driver(e.to_string()))
    }
}

#[async_trait]
impl StorageDriver for FileDriver {
    async fn get(&self, key: &str) -> zax_store::Result<Option<String>> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> zax_store::Result<()> {
        self.rows
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        self.persist().await
    }

    async fn remove(&self, key: &str) -> zax_store::Result<()> {
        self.rows.write().await.remove(key);
        self.persist().await
    }
}

// =============================================================================
// Output helpers
// =============================================================================

fn banner(text: &str) {
    let mut stdout = io::stdout();
    let _ = stdout.execute(SetForegroundColor(Color::Cyan));
    println!("{}", text);
    let _ = stdout.execute(ResetColor);
}

fn notice(text: &str) {
    let mut stdout = io::stdout();
    let _ = stdout.execute(SetForegroundColor(Color::Green));
    println!("{}", text);
    let _ = stdout.execute(ResetColor);
}

fn warn(text: &str) {
    let mut stdout = io::stdout();
    let _ = stdout.execute(SetForegroundColor(Color::Red));
    println!("{}", text);
    let _ = stdout.execute(ResetColor);
}

fn prompt(relay: &str) -> Result<Option<String>> {
    print!("[{}] > ", relay);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

// =============================================================================
// Command handling
// =============================================================================

struct App {
    mailbox: Mailbox,
    relay: String,
}

impl App {
    async fn handle(&mut self, line: &str) -> Result<bool> {
        let (command, rest) = match line.split_once(' ') {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };

        match command {
            "/help" => {
                banner("commands: /identity /backup /guests /add /remove /relay /send /plain /inbox /count /delete /sendfile /fetchfile /quit");
            }
            "/identity" => {
                notice(&format!("pub : {}", self.mailbox.pub_comm_key().await.to_base64()));
                notice(&format!("hpk : {}", self.mailbox.hpk().await.to_base64()));
            }
            "/backup" => {
                println!("{}", self.mailbox.backup().await?);
            }
            "/guests" => {
                // The keyring is the address book.
                let backup: HashMap<String, String> =
                    serde_json::from_str(&self.mailbox.backup().await?)?;
                for (tag, pk) in backup {
                    if tag != zax_store::BACKUP_COMM_KEY {
                        println!("{}  {}", tag, pk);
                    }
                }
            }
            "/add" => {
                let (name, pk) = rest
                    .split_once(' ')
                    .ok_or_else(|| anyhow!("usage: /add <name> <pubkey>"))?;
                let pk = PublicKey::from_base64(pk.trim()).map_err(|e| anyhow!("bad key: {}", e))?;
                self.mailbox.add_guest(name, pk).await?;
                notice(&format!("registered {}", name));
            }
            "/remove" => {
                if self.mailbox.remove_guest(rest).await? {
                    notice(&format!("removed {}", rest));
                } else {
                    warn("no such guest");
                }
            }
            "/relay" => {
                if rest.is_empty() {
                    bail!("usage: /relay <url>");
                }
                self.relay = rest.to_string();
                notice(&format!("active relay: {}", self.relay));
            }
            "/send" | "/plain" => {
                let (name, message) = rest
                    .split_once(' ')
                    .ok_or_else(|| anyhow!("usage: {} <name> <message>", command))?;
                let token = self
                    .mailbox
                    .upload(&self.relay, name, message, command == "/send")
                    .await?;
                notice(&format!("stored, token {}", token));
            }
            "/inbox" => {
                let messages = self.mailbox.download(&self.relay).await?;
                if messages.is_empty() {
                    notice("inbox empty");
                }
                for message in messages {
                    match message {
                        ZaxMessage::Text {
                            data,
                            sender_tag,
                            nonce,
                            ..
                        } => println!("[{}] {}  (nonce {})", sender_tag, data, nonce),
                        ZaxMessage::File {
                            data,
                            sender_tag,
                            upload_id,
                            ..
                        } => println!(
                            "[{}] file {:?} ({} bytes, uploadID {})",
                            sender_tag, data.name, data.orig_size, upload_id
                        ),
                        ZaxMessage::Plain { data, from, .. } => {
                            println!("[unknown {}] {}", from, data)
                        }
                    }
                }
            }
            "/count" => {
                notice(&format!(
                    "{} pending",
                    self.mailbox.count(&self.relay).await?
                ));
            }
            "/delete" => {
                if rest.is_empty() {
                    bail!("usage: /delete <nonce>");
                }
                let remaining = self
                    .mailbox
                    .delete(&self.relay, &[rest.to_string()])
                    .await?;
                notice(&format!("{} remaining", remaining));
            }
            "/sendfile" => {
                let (name, path) = rest
                    .split_once(' ')
                    .ok_or_else(|| anyhow!("usage: /sendfile <name> <path>"))?;
                let content = std::fs::read(path.trim())
                    .with_context(|| format!("reading {}", path))?;
                let file_name = PathBuf::from(path.trim())
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "file".to_string());
                let metadata = FileUploadMetadata::new(file_name, content.len() as u64);
                let upload = self
                    .mailbox
                    .send_file(&self.relay, name, metadata, &content)
                    .await?;
                notice(&format!("sent, uploadID {}", upload.upload_id));
            }
            "/fetchfile" => {
                let (upload_id, path) = rest
                    .split_once(' ')
                    .ok_or_else(|| anyhow!("usage: /fetchfile <uploadID> <path>"))?;
                let metadata = self
                    .mailbox
                    .get_file_metadata(&self.relay, upload_id)
                    .await?
                    .ok_or_else(|| anyhow!("no pending announcement for {}", upload_id))?;
                let skey = metadata
                    .skey
                    .as_deref()
                    .ok_or_else(|| anyhow!("announcement carries no key"))?;
                let skey =
                    SecretboxKey::from_base64(skey).map_err(|e| anyhow!("bad key: {}", e))?;
                let content = self.mailbox.fetch_file(&self.relay, upload_id, &skey).await?;
                std::fs::write(path.trim(), &content)
                    .with_context(|| format!("writing {}", path))?;
                notice(&format!(
                    "fetched {:?} ({} bytes) to {}",
                    metadata.name,
                    content.len(),
                    path.trim()
                ));
            }
            "/quit" => return Ok(false),
            other => warn(&format!("unknown command {:?}, try /help", other)),
        }
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let identity = args.next().context("usage: zax-cli <identity> [relay-url]")?;
    let relay = args
        .next()
        .unwrap_or_else(|| "https://relay.zax.example".to_string());

    let config = MailboxConfig::default();
    let driver = Arc::new(FileDriver::open(PathBuf::from(DEFAULT_STORE_FILE))?);
    let transport = Arc::new(
        HttpTransport::new(config.relay_ajax_timeout).map_err(|e| anyhow!("transport: {}", e))?,
    );

    let mailbox = Mailbox::new(&identity, driver, transport, config).await?;

    banner(&format!("zax-cli - mailbox {:?}", identity));
    banner(&format!("address {}", mailbox.hpk().await.to_base64()));
    banner("type /help for commands");

    let mut app = App { mailbox, relay };
    loop {
        let Some(line) = prompt(&app.relay)? else { break };
        if line.is_empty() {
            continue;
        }
        match app.handle(&line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => warn(&format!("error: {:#}", e)),
        }
    }
    Ok(())
}
