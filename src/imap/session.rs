// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Wire-level IMAP session abstraction and its async-imap backed implementation.

use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use futures_util::stream::TryStreamExt;
use log::{debug, info, warn};
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::config::{AccountConfig, TlsMode};
use crate::imap::error::ImapError;
use crate::imap::escape::{quote_mailbox_name, MailboxName};
use crate::imap::flags::RawFlag;
use crate::imap::types::{FolderInfo, MessageId};

pub type CompatStream = Compat<MailStream>;
pub type UnderlyingImapSession = async_imap::Session<CompatStream>;

/// One FETCH response, detached from the connection buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedMessage {
    pub uid: Option<MessageId>,
    pub flags: Vec<RawFlag>,
    pub size: Option<u32>,
    pub internal_date: Option<DateTime<FixedOffset>>,
    pub header: Option<Vec<u8>>,
    pub body: Option<Vec<u8>>,
}

/// The IMAP commands the engine needs.
///
/// Mailbox arguments are passed as [`MailboxName`] and quoted by the
/// implementation exactly once. `uid_set` arguments are already rendered
/// UID sets, `query` arguments are raw FETCH/SEARCH/STORE item lists.
#[async_trait]
pub trait ImapSession: Send {
    async fn has_capability(&mut self, name: &str) -> Result<bool, ImapError>;

    async fn identify(&mut self, name: &str, version: &str) -> Result<(), ImapError>;

    async fn select(&mut self, mailbox: &MailboxName) -> Result<(), ImapError>;

    async fn uid_search(&mut self, query: &str) -> Result<Vec<MessageId>, ImapError>;

    async fn uid_fetch(&mut self, uid_set: &str, query: &str) -> Result<Vec<FetchedMessage>, ImapError>;

    /// `command` is the STORE item plus flag list, e.g. `+FLAGS (\Seen)`.
    async fn uid_store(&mut self, uid_set: &str, command: &str) -> Result<Vec<FetchedMessage>, ImapError>;

    async fn uid_move(&mut self, uid_set: &str, target: &MailboxName) -> Result<(), ImapError>;

    async fn uid_copy(&mut self, uid_set: &str, target: &MailboxName) -> Result<(), ImapError>;

    async fn expunge(&mut self) -> Result<(), ImapError>;

    /// LIST with an empty reference. `pattern` is sent as given.
    async fn list(&mut self, pattern: &str) -> Result<Vec<FolderInfo>, ImapError>;

    async fn create(&mut self, mailbox: &MailboxName) -> Result<(), ImapError>;

    async fn logout(&mut self) -> Result<(), ImapError>;
}

/// Opens authenticated sessions for an account.
#[async_trait]
pub trait SessionConnector: Send + Sync + Debug {
    async fn connect(&self, account: &AccountConfig) -> Result<Box<dyn ImapSession>, ImapError>;
}

/// ID command in the compact form strict servers accept: no padding inside
/// the parentheses and every value quoted.
pub fn id_command(name: &str, version: &str) -> String {
    format!(
        "ID (\"name\" {} \"version\" {})",
        quote_mailbox_name(name),
        quote_mailbox_name(version)
    )
}

// --- Transport ---

/// TLS or plain TCP stream, unified so one session type covers every mode.
pub enum MailStream {
    Tls(Box<TlsStream<TcpStream>>),
    Plain(TcpStream),
}

impl Debug for MailStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailStream::Tls(_) => f.write_str("MailStream::Tls"),
            MailStream::Plain(_) => f.write_str("MailStream::Plain"),
        }
    }
}

impl AsyncRead for MailStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MailStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            MailStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MailStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MailStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            MailStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MailStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            MailStream::Plain(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MailStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            MailStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

fn tls_connector() -> Result<TlsConnector, ImapError> {
    let mut root_cert_store = RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs()?;
    let (added, ignored) = root_cert_store.add_parsable_certificates(certs);
    debug!("Loaded {} native certs, ignored {}.", added, ignored);
    if root_cert_store.is_empty() {
        warn!("Root certificate store is empty after loading native certs.");
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

async fn upgrade_tls(host: &str, tcp: TcpStream) -> Result<MailStream, ImapError> {
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| ImapError::Connection(format!("Invalid server name format: {}", host)))?;
    let tls = tls_connector()?
        .connect(server_name, tcp)
        .await
        .map_err(|e| ImapError::Connection(format!("TLS handshake failed: {}", e)))?;
    debug!("TLS handshake with {} successful.", host);
    Ok(MailStream::Tls(Box::new(tls)))
}

async fn read_line<S: AsyncRead + Unpin>(stream: &mut S) -> Result<String, ImapError> {
    // Byte-at-a-time so nothing past the line is consumed from the socket.
    let mut reader = BufReader::with_capacity(1, stream);
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(ImapError::Connection("Server closed the connection".to_string()));
    }
    Ok(line.trim_end().to_string())
}

async fn read_greeting<S: AsyncRead + Unpin>(stream: &mut S) -> Result<(), ImapError> {
    let greeting = read_line(stream).await?;
    debug!("Server greeting: {}", greeting);
    let upper = greeting.to_ascii_uppercase();
    if upper.starts_with("* OK") || upper.starts_with("* PREAUTH") {
        Ok(())
    } else {
        Err(ImapError::Connection(format!("Unexpected greeting: {}", greeting)))
    }
}

async fn starttls(tcp: &mut TcpStream) -> Result<(), ImapError> {
    tcp.write_all(b"a0 STARTTLS\r\n").await?;
    tcp.flush().await?;
    loop {
        let line = read_line(tcp).await?;
        if let Some(status) = line.strip_prefix("a0 ") {
            if status.to_ascii_uppercase().starts_with("OK") {
                return Ok(());
            }
            return Err(ImapError::Connection(format!("STARTTLS refused: {}", status)));
        }
    }
}

async fn open_stream(account: &AccountConfig) -> Result<MailStream, ImapError> {
    debug!("Attempting TCP connection to {}:{}...", account.host, account.port);
    let mut tcp = TcpStream::connect((account.host.as_str(), account.port)).await?;

    match account.tls {
        TlsMode::Tls => {
            let mut stream = upgrade_tls(&account.host, tcp).await?;
            read_greeting(&mut stream).await?;
            Ok(stream)
        }
        TlsMode::Starttls => {
            read_greeting(&mut tcp).await?;
            starttls(&mut tcp).await?;
            upgrade_tls(&account.host, tcp).await
        }
        TlsMode::Plain => {
            warn!("Connecting to {} without TLS", account.host);
            read_greeting(&mut tcp).await?;
            Ok(MailStream::Plain(tcp))
        }
    }
}

/// Default connector: TCP, TLS per the account's mode, then LOGIN.
#[derive(Debug, Clone, Default)]
pub struct TcpSessionConnector;

#[async_trait]
impl SessionConnector for TcpSessionConnector {
    async fn connect(&self, account: &AccountConfig) -> Result<Box<dyn ImapSession>, ImapError> {
        let stream = open_stream(account).await?;
        let client = async_imap::Client::new(stream.compat());
        debug!("IMAP client created. Attempting login for user '{}'...", account.username);

        match client.login(&account.username, &account.password).await {
            Ok(session) => {
                info!("IMAP login successful for user: {}", account.username);
                Ok(Box::new(AsyncImapSessionWrapper::new(session)))
            }
            Err((e, _client)) => Err(ImapError::Connection(format!(
                "Login failed for {}: {}",
                account.username, e
            ))),
        }
    }
}

// --- async-imap adapter ---

fn flag_to_raw(flag: async_imap::types::Flag<'_>) -> RawFlag {
    use async_imap::types::Flag;
    #[allow(unreachable_patterns)]
    let text = match flag {
        Flag::Seen => "\\Seen".to_string(),
        Flag::Answered => "\\Answered".to_string(),
        Flag::Flagged => "\\Flagged".to_string(),
        Flag::Deleted => "\\Deleted".to_string(),
        Flag::Draft => "\\Draft".to_string(),
        Flag::Recent => "\\Recent".to_string(),
        Flag::MayCreate => "\\*".to_string(),
        Flag::Custom(c) => c.to_string(),
        other => format!("{:?}", other),
    };
    RawFlag::Text(text)
}

fn name_attribute(attr: &async_imap::types::NameAttribute<'_>) -> String {
    use async_imap::types::NameAttribute;
    #[allow(unreachable_patterns)]
    match attr {
        NameAttribute::NoInferiors => "\\Noinferiors".to_string(),
        NameAttribute::NoSelect => "\\Noselect".to_string(),
        NameAttribute::Marked => "\\Marked".to_string(),
        NameAttribute::Unmarked => "\\Unmarked".to_string(),
        NameAttribute::All => "\\All".to_string(),
        NameAttribute::Archive => "\\Archive".to_string(),
        NameAttribute::Drafts => "\\Drafts".to_string(),
        NameAttribute::Flagged => "\\Flagged".to_string(),
        NameAttribute::Junk => "\\Junk".to_string(),
        NameAttribute::Sent => "\\Sent".to_string(),
        NameAttribute::Trash => "\\Trash".to_string(),
        NameAttribute::Extension(label) => label.to_string(),
        other => format!("{:?}", other),
    }
}

impl From<&async_imap::types::Fetch> for FetchedMessage {
    fn from(fetch: &async_imap::types::Fetch) -> Self {
        FetchedMessage {
            uid: fetch.uid,
            flags: fetch.flags().map(flag_to_raw).collect(),
            size: fetch.size,
            internal_date: fetch.internal_date(),
            header: fetch.header().map(<[u8]>::to_vec),
            body: fetch.body().map(<[u8]>::to_vec),
        }
    }
}

/// Owns one authenticated async-imap session.
pub struct AsyncImapSessionWrapper {
    session: UnderlyingImapSession,
}

impl AsyncImapSessionWrapper {
    pub fn new(session: UnderlyingImapSession) -> Self {
        Self { session }
    }

    /// Discard untagged responses the command calls above do not consume
    /// (EXISTS, EXPUNGE after MOVE, ...), so the channel never fills up.
    fn drain_unsolicited(&mut self) {
        while let Ok(response) = self.session.unsolicited_responses.try_recv() {
            debug!("Discarding unsolicited response: {:?}", response);
        }
    }

    async fn run_ok(&mut self, command: String) -> Result<(), ImapError> {
        debug!("IMAP command: {}", command);
        let result = self.session.run_command_and_check_ok(&command).await;
        self.drain_unsolicited();
        result.map_err(ImapError::from)
    }
}

#[async_trait]
impl ImapSession for AsyncImapSessionWrapper {
    async fn has_capability(&mut self, name: &str) -> Result<bool, ImapError> {
        let caps = self.session.capabilities().await?;
        Ok(caps.has_str(name))
    }

    async fn identify(&mut self, name: &str, version: &str) -> Result<(), ImapError> {
        self.run_ok(id_command(name, version)).await
    }

    async fn select(&mut self, mailbox: &MailboxName) -> Result<(), ImapError> {
        self.run_ok(format!("SELECT {}", mailbox.wire()?)).await
    }

    async fn uid_search(&mut self, query: &str) -> Result<Vec<MessageId>, ImapError> {
        let uids = self.session.uid_search(query).await?;
        self.drain_unsolicited();
        let mut uids: Vec<MessageId> = uids.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn uid_fetch(&mut self, uid_set: &str, query: &str) -> Result<Vec<FetchedMessage>, ImapError> {
        debug!("UID FETCH {} {}", uid_set, query);
        let fetches: Vec<_> = self.session.uid_fetch(uid_set, query).await?.try_collect().await?;
        self.drain_unsolicited();
        Ok(fetches.iter().map(FetchedMessage::from).collect())
    }

    async fn uid_store(&mut self, uid_set: &str, command: &str) -> Result<Vec<FetchedMessage>, ImapError> {
        debug!("UID STORE {} {}", uid_set, command);
        let fetches: Vec<_> = self.session.uid_store(uid_set, command).await?.try_collect().await?;
        self.drain_unsolicited();
        Ok(fetches.iter().map(FetchedMessage::from).collect())
    }

    async fn uid_move(&mut self, uid_set: &str, target: &MailboxName) -> Result<(), ImapError> {
        self.run_ok(format!("UID MOVE {} {}", uid_set, target.wire()?)).await
    }

    async fn uid_copy(&mut self, uid_set: &str, target: &MailboxName) -> Result<(), ImapError> {
        self.run_ok(format!("UID COPY {} {}", uid_set, target.wire()?)).await
    }

    async fn expunge(&mut self) -> Result<(), ImapError> {
        let expunged: Vec<u32> = self.session.expunge().await?.try_collect().await?;
        debug!("EXPUNGE removed {} messages", expunged.len());
        self.drain_unsolicited();
        Ok(())
    }

    async fn list(&mut self, pattern: &str) -> Result<Vec<FolderInfo>, ImapError> {
        let names: Vec<_> = self.session.list(Some(""), Some(pattern)).await?.try_collect().await?;
        self.drain_unsolicited();
        Ok(names
            .iter()
            .map(|name| {
                FolderInfo::new(
                    name.name(),
                    name.delimiter().map(str::to_string),
                    name.attributes().iter().map(name_attribute).collect(),
                )
            })
            .collect())
    }

    async fn create(&mut self, mailbox: &MailboxName) -> Result<(), ImapError> {
        self.run_ok(format!("CREATE {}", mailbox.wire()?)).await
    }

    async fn logout(&mut self) -> Result<(), ImapError> {
        self.session.logout().await.map_err(ImapError::from)
    }
}
