// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-memory IMAP server used by the unit tests.
//!
//! `FakeMailStore` is a cheap clone handle over shared state, so a test can
//! keep one copy for assertions while sessions mutate another. Every wire
//! command is appended to a log in the same textual form a real server
//! would receive.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};

use crate::config::{AccountConfig, TimeoutConfig, TlsMode};
use crate::imap::error::ImapError;
use crate::imap::escape::MailboxName;
use crate::imap::flags::{FlagSet, RawFlag, DELETED};
use crate::imap::session::{id_command, FetchedMessage, ImapSession, SessionConnector};
use crate::imap::types::{FolderInfo, MessageId};
use crate::session_manager::{Session, SessionManager};

pub fn test_account() -> AccountConfig {
    AccountConfig {
        name: "test".to_string(),
        host: "imap.test.invalid".to_string(),
        port: 993,
        username: "tester".to_string(),
        password: "secret".to_string(),
        tls: TlsMode::Tls,
    }
}

/// A small RFC 5322 message. `date` is RFC 3339.
pub fn sample_message(subject: &str, date: &str) -> Vec<u8> {
    let date = DateTime::parse_from_rfc3339(date)
        .map(|d| d.to_rfc2822())
        .unwrap_or_else(|_| date.to_string());
    format!(
        "From: Alice Example <alice@example.com>\r\n\
         To: bob@example.com, carol@example.com\r\n\
         Cc: bob@example.com\r\n\
         Subject: {subject}\r\n\
         Date: {date}\r\n\
         Message-ID: <{subject}@example.com>\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         Body of {subject}. Nothing else to see here.\r\n"
    )
    .into_bytes()
}

/// Open a session on a fresh fake connection, selecting `folder` unless empty.
pub async fn open_fake_session(store: &FakeMailStore, folder: &str) -> Session {
    let manager = SessionManager::new(
        test_account(),
        Arc::new(FakeConnector::new(store.clone())),
        TimeoutConfig::default(),
        "mailbridge",
    );
    let folder = MailboxName::new(folder);
    let target = if folder.is_empty() { None } else { Some(&folder) };
    manager.open_session(target).await.unwrap()
}

#[derive(Debug, Clone)]
struct FakeMessage {
    raw: Vec<u8>,
    flags: BTreeSet<String>,
    internal_date: DateTime<FixedOffset>,
}

impl FakeMessage {
    fn header(&self) -> Vec<u8> {
        match self.raw.windows(4).position(|w| w == b"\r\n\r\n") {
            Some(pos) => self.raw[..pos + 4].to_vec(),
            None => self.raw.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct FakeFolder {
    name: String,
    messages: BTreeMap<MessageId, FakeMessage>,
    next_uid: MessageId,
}

#[derive(Debug)]
struct State {
    folders: Vec<FakeFolder>,
    move_capable: bool,
    bytes_flags: bool,
    failures: Vec<(String, ImapError)>,
    refuse: Option<ImapError>,
    hang_logout: bool,
    hangs: Vec<String>,
    commands: Vec<String>,
    connections: usize,
}

impl Default for State {
    fn default() -> Self {
        State {
            folders: Vec::new(),
            move_capable: true,
            bytes_flags: false,
            failures: Vec::new(),
            refuse: None,
            hang_logout: false,
            hangs: Vec::new(),
            commands: Vec::new(),
            connections: 0,
        }
    }
}

impl State {
    fn folder(&self, name: &str) -> Option<&FakeFolder> {
        self.folders.iter().find(|f| f.name == name)
    }

    fn folder_mut(&mut self, name: &str) -> Option<&mut FakeFolder> {
        self.folders.iter_mut().find(|f| f.name == name)
    }
}

#[derive(Clone, Default)]
pub struct FakeMailStore {
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for FakeMailStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FakeMailStore")
    }
}

fn base_date() -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .unwrap()
        .fixed_offset()
}

impl FakeMailStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_folder(self, name: &str) -> Self {
        self.lock().folders.push(FakeFolder {
            name: name.to_string(),
            messages: BTreeMap::new(),
            next_uid: 1,
        });
        self
    }

    /// Add a message with an INTERNALDATE of 2024-01-01 plus `uid` days.
    pub fn with_message(self, folder: &str, uid: MessageId, raw: Vec<u8>, flags: &[&str]) -> Self {
        {
            let mut state = self.lock();
            let folder = state.folder_mut(folder).unwrap();
            folder.messages.insert(
                uid,
                FakeMessage {
                    raw,
                    flags: flags.iter().map(|f| f.to_string()).collect(),
                    internal_date: base_date() + Duration::days(uid as i64),
                },
            );
            folder.next_uid = folder.next_uid.max(uid + 1);
        }
        self
    }

    pub fn with_move_capability(self, enabled: bool) -> Self {
        self.lock().move_capable = enabled;
        self
    }

    /// Report flags as raw bytes instead of text.
    pub fn encode_flags_as_bytes(&self, enabled: bool) {
        self.lock().bytes_flags = enabled;
    }

    /// Fail the next command whose wire text starts with `prefix`.
    pub fn fail_next(&self, prefix: &str, err: ImapError) {
        self.lock().failures.push((prefix.to_string(), err));
    }

    pub fn refuse_connections(&self, err: ImapError) {
        self.lock().refuse = Some(err);
    }

    pub fn hang_on_logout(&self) {
        self.lock().hang_logout = true;
    }

    /// Never answer the next command whose wire text starts with `prefix`.
    pub fn hang_next(&self, prefix: &str) {
        self.lock().hangs.push(prefix.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    pub fn count_commands(&self, prefix: &str) -> usize {
        self.lock().commands.iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    pub fn logouts(&self) -> usize {
        self.count_commands("LOGOUT")
    }

    pub fn uids(&self, folder: &str) -> Vec<MessageId> {
        self.lock()
            .folder(folder)
            .map(|f| f.messages.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn flags_of(&self, folder: &str, uid: MessageId) -> FlagSet {
        let state = self.lock();
        let flags = state
            .folder(folder)
            .and_then(|f| f.messages.get(&uid))
            .map(|m| m.flags.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        flags.into_iter().collect()
    }

    pub fn internal_date(&self, folder: &str, uid: MessageId) -> Option<DateTime<Utc>> {
        self.lock()
            .folder(folder)
            .and_then(|f| f.messages.get(&uid))
            .map(|m| m.internal_date.with_timezone(&Utc))
    }

    /// Like [`Self::record`], but stalls forever on a command queued by
    /// [`Self::hang_next`].
    async fn exchange(&self, command: String) -> Result<(), ImapError> {
        let hang = {
            let mut state = self.lock();
            match state.hangs.iter().position(|prefix| command.starts_with(prefix.as_str())) {
                Some(index) => {
                    state.hangs.remove(index);
                    true
                }
                None => false,
            }
        };
        self.record(command)?;
        if hang {
            futures_util::future::pending::<()>().await;
        }
        Ok(())
    }

    /// Log `command` and pop a matching injected failure, if any.
    fn record(&self, command: String) -> Result<(), ImapError> {
        let mut state = self.lock();
        let failure = state.failures.iter().position(|(prefix, _)| command.starts_with(prefix.as_str()));
        state.commands.push(command);
        match failure {
            Some(index) => Err(state.failures.remove(index).1),
            None => Ok(()),
        }
    }
}

fn parse_uid_set(set: &str) -> Vec<MessageId> {
    let mut uids = Vec::new();
    for part in set.split(',').filter(|p| !p.is_empty()) {
        match part.split_once(':') {
            Some((a, b)) => {
                if let (Ok(a), Ok(b)) = (a.parse::<MessageId>(), b.parse::<MessageId>()) {
                    uids.extend(a.min(b)..=a.max(b));
                }
            }
            None => uids.extend(part.parse::<MessageId>().ok()),
        }
    }
    uids
}

fn parse_flag_list(list: &str) -> Vec<String> {
    list.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[derive(Debug)]
pub struct FakeConnector {
    store: FakeMailStore,
}

impl FakeConnector {
    pub fn new(store: FakeMailStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(&self, _account: &AccountConfig) -> Result<Box<dyn ImapSession>, ImapError> {
        let mut state = self.store.lock();
        if let Some(err) = state.refuse.clone() {
            return Err(err);
        }
        state.connections += 1;
        Ok(Box::new(FakeSession {
            store: self.store.clone(),
            selected: None,
        }))
    }
}

struct FakeSession {
    store: FakeMailStore,
    selected: Option<String>,
}

impl FakeSession {
    fn selected(&self) -> Result<String, ImapError> {
        self.selected
            .clone()
            .ok_or_else(|| ImapError::Protocol("BAD No mailbox selected".into()))
    }

    fn raw_flags(flags: &BTreeSet<String>, as_bytes: bool) -> Vec<RawFlag> {
        flags
            .iter()
            .map(|f| {
                if as_bytes {
                    RawFlag::Bytes(f.as_bytes().to_vec())
                } else {
                    RawFlag::Text(f.clone())
                }
            })
            .collect()
    }
}

#[async_trait]
impl ImapSession for FakeSession {
    async fn has_capability(&mut self, name: &str) -> Result<bool, ImapError> {
        self.store.exchange("CAPABILITY".into()).await?;
        let state = self.store.lock();
        Ok((name.eq_ignore_ascii_case("MOVE") && state.move_capable) || name.eq_ignore_ascii_case("IMAP4rev1"))
    }

    async fn identify(&mut self, name: &str, version: &str) -> Result<(), ImapError> {
        self.store.exchange(id_command(name, version)).await
    }

    async fn select(&mut self, mailbox: &MailboxName) -> Result<(), ImapError> {
        self.store.exchange(format!("SELECT {}", mailbox.wire()?)).await?;
        self.selected = None;
        if self.store.lock().folder(mailbox.raw()).is_none() {
            return Err(ImapError::Command("Mailbox doesn't exist".into()));
        }
        self.selected = Some(mailbox.raw().to_string());
        Ok(())
    }

    async fn uid_search(&mut self, query: &str) -> Result<Vec<MessageId>, ImapError> {
        self.store.exchange(format!("UID SEARCH {}", query)).await?;
        let folder = self.selected()?;
        Ok(self.store.uids(&folder))
    }

    async fn uid_fetch(&mut self, uid_set: &str, query: &str) -> Result<Vec<FetchedMessage>, ImapError> {
        self.store.exchange(format!("UID FETCH {} {}", uid_set, query)).await?;
        let folder = self.selected()?;
        let items: Vec<&str> = query
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split_whitespace()
            .collect();
        let wants_body = items.iter().any(|i| matches!(*i, "BODY.PEEK[]" | "RFC822" | "BODY[]"));

        let state = self.store.lock();
        let messages = match state.folder(&folder) {
            Some(f) => &f.messages,
            None => return Ok(Vec::new()),
        };
        Ok(parse_uid_set(uid_set)
            .into_iter()
            .filter_map(|uid| messages.get(&uid).map(|m| (uid, m)))
            .map(|(uid, m)| FetchedMessage {
                uid: Some(uid),
                flags: if items.contains(&"FLAGS") {
                    Self::raw_flags(&m.flags, state.bytes_flags)
                } else {
                    Vec::new()
                },
                size: items.contains(&"RFC822.SIZE").then(|| m.raw.len() as u32),
                internal_date: items.contains(&"INTERNALDATE").then_some(m.internal_date),
                header: items.contains(&"BODY.PEEK[HEADER]").then(|| m.header()),
                body: wants_body.then(|| m.raw.clone()),
            })
            .collect())
    }

    async fn uid_store(&mut self, uid_set: &str, command: &str) -> Result<Vec<FetchedMessage>, ImapError> {
        self.store.exchange(format!("UID STORE {} {}", uid_set, command)).await?;
        let folder = self.selected()?;
        let (item, list) = command
            .split_once(' ')
            .ok_or_else(|| ImapError::Protocol("BAD STORE syntax".into()))?;
        let flags = parse_flag_list(list);
        let silent = item.ends_with(".SILENT");

        let mut state = self.store.lock();
        let as_bytes = state.bytes_flags;
        let messages = match state.folder_mut(&folder) {
            Some(f) => &mut f.messages,
            None => return Ok(Vec::new()),
        };
        let mut echo = Vec::new();
        for uid in parse_uid_set(uid_set) {
            let Some(message) = messages.get_mut(&uid) else { continue };
            match item.trim_end_matches(".SILENT") {
                "+FLAGS" => message.flags.extend(flags.iter().cloned()),
                "-FLAGS" => message.flags.retain(|f| !flags.contains(f)),
                "FLAGS" => message.flags = flags.iter().cloned().collect(),
                other => return Err(ImapError::Protocol(format!("BAD unknown STORE item {}", other))),
            }
            if !silent {
                echo.push(FetchedMessage {
                    uid: Some(uid),
                    flags: Self::raw_flags(&message.flags, as_bytes),
                    ..Default::default()
                });
            }
        }
        Ok(echo)
    }

    async fn uid_move(&mut self, uid_set: &str, target: &MailboxName) -> Result<(), ImapError> {
        self.store.exchange(format!("UID MOVE {} {}", uid_set, target.wire()?)).await?;
        if !self.store.lock().move_capable {
            return Err(ImapError::Protocol("BAD Unknown command MOVE".into()));
        }
        self.uid_copy_inner(uid_set, target, true)
    }

    async fn uid_copy(&mut self, uid_set: &str, target: &MailboxName) -> Result<(), ImapError> {
        self.store.exchange(format!("UID COPY {} {}", uid_set, target.wire()?)).await?;
        self.uid_copy_inner(uid_set, target, false)
    }

    async fn expunge(&mut self) -> Result<(), ImapError> {
        self.store.exchange("EXPUNGE".into()).await?;
        let folder = self.selected()?;
        if let Some(f) = self.store.lock().folder_mut(&folder) {
            f.messages.retain(|_, m| !m.flags.contains(DELETED));
        }
        Ok(())
    }

    async fn list(&mut self, pattern: &str) -> Result<Vec<FolderInfo>, ImapError> {
        self.store.exchange(format!("LIST \"\" {}", pattern)).await?;
        Ok(self
            .store
            .lock()
            .folders
            .iter()
            .map(|f| FolderInfo::new(f.name.as_str(), Some("/".to_string()), Vec::new()))
            .collect())
    }

    async fn create(&mut self, mailbox: &MailboxName) -> Result<(), ImapError> {
        self.store.exchange(format!("CREATE {}", mailbox.wire()?)).await?;
        let mut state = self.store.lock();
        if state.folder(mailbox.raw()).is_some() {
            return Err(ImapError::Command("Mailbox already exists".into()));
        }
        state.folders.push(FakeFolder {
            name: mailbox.raw().to_string(),
            messages: BTreeMap::new(),
            next_uid: 1,
        });
        Ok(())
    }

    async fn logout(&mut self) -> Result<(), ImapError> {
        let hang = self.store.lock().hang_logout;
        self.store.exchange("LOGOUT".into()).await?;
        if hang {
            futures_util::future::pending::<()>().await;
        }
        self.selected = None;
        Ok(())
    }
}

impl FakeSession {
    fn uid_copy_inner(&mut self, uid_set: &str, target: &MailboxName, remove: bool) -> Result<(), ImapError> {
        let source = self.selected()?;
        let mut state = self.store.lock();
        if state.folder(target.raw()).is_none() {
            return Err(ImapError::Command("[TRYCREATE] Mailbox doesn't exist".into()));
        }

        let mut copied = Vec::new();
        if let Some(src) = state.folder_mut(&source) {
            for uid in parse_uid_set(uid_set) {
                let message = if remove {
                    src.messages.remove(&uid)
                } else {
                    src.messages.get(&uid).cloned()
                };
                copied.extend(message);
            }
        }
        if let Some(dst) = state.folder_mut(target.raw()) {
            for mut message in copied {
                message.flags.remove(DELETED);
                dst.messages.insert(dst.next_uid, message);
                dst.next_uid += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uid_set() {
        assert_eq!(parse_uid_set("1:3,7,9:10"), vec![1, 2, 3, 7, 9, 10]);
        assert_eq!(parse_uid_set("5"), vec![5]);
        assert!(parse_uid_set("").is_empty());
    }

    #[test]
    fn test_fail_next_consumes_once() {
        let store = FakeMailStore::new();
        store.fail_next("UID COPY", ImapError::Command("no".into()));
        assert!(store.record("UID COPY 1 \"A\"".into()).is_err());
        assert!(store.record("UID COPY 1 \"A\"".into()).is_ok());
        assert_eq!(store.count_commands("UID COPY"), 2);
    }
}
