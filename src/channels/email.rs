//! Email channel: IMAP fetch for inbound, SMTP via lettre for replies.

use std::io::{Read, Write as IoWrite};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::MessageParser;

use crate::channels::email_types::extract_sender;
use crate::config::Lookup;
use crate::error::{ChannelError, ConfigError};
use crate::pipeline::reply::ReplyEmail;

// ── Configuration ───────────────────────────────────────────────────

/// Mail transport configuration.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// IMAP host; the poller is disabled when unset.
    pub imap_host: Option<String>,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    /// Address replies are sent from.
    pub from_address: String,
    pub poll_interval_secs: u64,
    pub allowed_senders: Vec<String>,
}

impl EmailConfig {
    /// Build from `EMAIL_*` variables plus `REPLY_FROM_ADDRESS`.
    pub fn from_lookup(lookup: &Lookup<'_>) -> Result<Self, ConfigError> {
        let from_address = lookup("REPLY_FROM_ADDRESS")
            .ok_or_else(|| ConfigError::MissingEnvVar("REPLY_FROM_ADDRESS".into()))?;

        let imap_host = lookup("EMAIL_IMAP_HOST").filter(|s| !s.is_empty());

        let imap_port: u16 = lookup("EMAIL_IMAP_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let smtp_host = lookup("EMAIL_SMTP_HOST")
            .or_else(|| imap_host.as_ref().map(|h| h.replace("imap", "smtp")))
            .ok_or_else(|| ConfigError::MissingEnvVar("EMAIL_SMTP_HOST".into()))?;

        let smtp_port: u16 = lookup("EMAIL_SMTP_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = lookup("EMAIL_USERNAME").unwrap_or_default();
        let password = lookup("EMAIL_PASSWORD").unwrap_or_default();

        let poll_interval_secs: u64 = lookup("EMAIL_POLL_INTERVAL_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        let allowed_senders: Vec<String> = lookup("EMAIL_ALLOWED_SENDERS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
            poll_interval_secs,
            allowed_senders,
        })
    }
}

// ── Reply sending ───────────────────────────────────────────────────

/// Delivers composed replies back to the original sender.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(&self, reply: ReplyEmail) -> Result<(), ChannelError>;
}

/// SMTP reply sender.
pub struct SmtpReplySender {
    config: EmailConfig,
}

impl SmtpReplySender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ReplySender for SmtpReplySender {
    async fn send(&self, reply: ReplyEmail) -> Result<(), ChannelError> {
        let message = build_message(&self.config.from_address, &reply)?;
        let config = self.config.clone();
        let to = reply.to.clone();

        tokio::task::spawn_blocking(move || send_smtp(&config, &message))
            .await
            .map_err(|e| send_failed(format!("SMTP task failed: {e}")))??;

        tracing::info!("Reply sent to {to}");
        Ok(())
    }
}

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: "email".into(),
        reason,
    }
}

/// Build a `multipart/alternative` reply.
pub fn build_message(from: &str, reply: &ReplyEmail) -> Result<Message, ChannelError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| send_failed(format!("Invalid from address: {e}")))?;
    let to: Mailbox = reply
        .to
        .parse()
        .map_err(|e| send_failed(format!("Invalid to address: {e}")))?;

    let mut builder = Message::builder().from(from).to(to).subject(&reply.subject);
    if let Some(ref id) = reply.in_reply_to {
        builder = builder.in_reply_to(id.clone()).references(id.clone());
    }

    builder
        .multipart(MultiPart::alternative_plain_html(
            reply.text.clone(),
            reply.html.clone(),
        ))
        .map_err(|e| send_failed(format!("Failed to build email: {e}")))
}

/// Send over SMTP (blocking; run in spawn_blocking).
fn send_smtp(config: &EmailConfig, message: &Message) -> Result<(), ChannelError> {
    let creds = Credentials::new(config.username.clone(), config.password.clone());

    let transport = SmtpTransport::relay(&config.smtp_host)
        .map_err(|e| send_failed(format!("SMTP relay error: {e}")))?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    transport
        .send(message)
        .map_err(|e| send_failed(format!("SMTP send failed: {e}")))?;
    Ok(())
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Check if a sender email is in the allowlist.
///
/// - Empty list → deny all
/// - `*` in list → allow all
/// - `@domain.com` or `domain.com` → domain match
/// - `user@domain.com` → exact email match
pub fn is_sender_allowed(allowed: &[String], email: &str) -> bool {
    if allowed.is_empty() {
        return false;
    }
    if allowed.iter().any(|a| a == "*") {
        return true;
    }
    let email_lower = email.to_lowercase();
    allowed.iter().any(|a| {
        if a.starts_with('@') {
            email_lower.ends_with(&a.to_lowercase())
        } else if a.contains('@') {
            a.eq_ignore_ascii_case(email)
        } else {
            email_lower.ends_with(&format!("@{}", a.to_lowercase()))
        }
    })
}

// ── IMAP ────────────────────────────────────────────────────────────

/// A fetched raw message.
#[derive(Debug, Clone)]
pub struct FetchedEmail {
    pub uid: String,
    pub sender: String,
    pub raw: Vec<u8>,
}

/// Error type for IMAP fetch operations.
pub type ImapError = Box<dyn std::error::Error + Send + Sync>;

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

struct ImapSession {
    tls: TlsStream,
    tag_counter: u32,
}

impl ImapSession {
    fn read_line(&mut self) -> Result<Vec<u8>, ImapError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.tls.read(&mut byte) {
                Ok(0) => return Err("IMAP connection closed".into()),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(buf);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{}", self.tag_counter)
    }

    /// Send a command and collect untagged lines plus the tagged status line.
    ///
    /// Literals (`{N}\r\n` + N bytes) are read whole and appended to the line
    /// that announced them.
    fn command(&mut self, cmd: &str) -> Result<Vec<Vec<u8>>, ImapError> {
        let tag = self.next_tag();
        self.tls.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.tls.flush()?;

        let mut lines = Vec::new();
        loop {
            let mut line = self.read_line()?;
            if let Some(size) = literal_size(&line) {
                let mut literal = vec![0u8; size];
                self.tls.read_exact(&mut literal)?;
                line.extend_from_slice(&literal);
            }
            let done = line.starts_with(tag.as_bytes());
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }
}

/// Parse a trailing `{N}\r\n` literal marker.
fn literal_size(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let inner = line.strip_suffix(b"}")?;
    let open = inner.iter().rposition(|b| *b == b'{')?;
    std::str::from_utf8(&inner[open + 1..]).ok()?.parse().ok()
}

/// Extract the RFC822 literal from a FETCH response.
fn fetched_body(lines: &[Vec<u8>]) -> Option<Vec<u8>> {
    lines.iter().find_map(|line| {
        let marker = line.windows(3).position(|w| w == b"}\r\n")?;
        let size = literal_size(&line[..marker + 3])?;
        let start = marker + 3;
        line.get(start..start + size).map(<[u8]>::to_vec)
    })
}

fn status_ok(lines: &[Vec<u8>]) -> bool {
    lines
        .last()
        .is_some_and(|l| String::from_utf8_lossy(l).split_whitespace().nth(1) == Some("OK"))
}

/// Fetch each uid and flag it \Seen.
///
/// Messages already fetched are returned even when a later command fails,
/// since they are flagged seen and would not come back on the next poll.
fn fetch_and_mark(
    uids: &[String],
    mut command: impl FnMut(&str) -> Result<Vec<Vec<u8>>, ImapError>,
) -> Vec<FetchedEmail> {
    let mut results = Vec::new();
    for uid in uids {
        let fetch = match command(&format!("UID FETCH {uid} RFC822")) {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!(
                    uid = %uid,
                    fetched = results.len(),
                    "IMAP fetch failed, returning messages fetched so far: {e}"
                );
                break;
            }
        };

        if let Some(raw) = fetched_body(&fetch) {
            let sender = MessageParser::default()
                .parse(&raw)
                .map(|parsed| extract_sender(&parsed))
                .unwrap_or_else(|| "unknown".into());
            results.push(FetchedEmail { uid: uid.clone(), sender, raw });
        }

        match command(&format!("UID STORE {uid} +FLAGS (\\Seen)")) {
            Ok(lines) if status_ok(&lines) => {}
            Ok(lines) => {
                let status = lines.last().map(|l| String::from_utf8_lossy(l).into_owned());
                tracing::warn!(uid = %uid, ?status, "IMAP server refused to flag message seen");
            }
            Err(e) => tracing::warn!(uid = %uid, "Failed to flag message seen: {e}"),
        }
    }
    results
}

/// Fetch unseen emails via IMAP over TLS and mark them seen
/// (blocking; run in spawn_blocking).
pub fn fetch_unseen_imap(config: &EmailConfig) -> Result<Vec<FetchedEmail>, ImapError> {
    let host = config
        .imap_host
        .clone()
        .ok_or("IMAP host not configured")?;

    let tcp = TcpStream::connect((host.as_str(), config.imap_port))?;
    tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = rustls_pki_types::ServerName::try_from(host)?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)?;

    let mut session = ImapSession {
        tls: rustls::StreamOwned::new(conn, tcp),
        tag_counter: 0,
    };

    let _greeting = session.read_line()?;

    let login = session.command(&format!(
        "LOGIN \"{}\" \"{}\"",
        config.username, config.password
    ))?;
    if !status_ok(&login) {
        return Err("IMAP login failed".into());
    }

    let _select = session.command("SELECT \"INBOX\"")?;

    let search = session.command("UID SEARCH UNSEEN")?;
    let mut uids: Vec<String> = Vec::new();
    for line in &search {
        let line = String::from_utf8_lossy(line);
        if line.starts_with("* SEARCH") {
            uids.extend(line.split_whitespace().skip(2).map(str::to_string));
        }
    }

    let results = fetch_and_mark(&uids, |cmd| session.command(cmd));

    if let Err(e) = session.command("LOGOUT") {
        tracing::debug!("IMAP logout failed: {e}");
    }

    Ok(results)
}

// ── Tests ───────────────────────────────────────────────────────────
