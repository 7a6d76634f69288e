// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scoped IMAP sessions.
//!
//! A [`Session`] is opened for one logical call and closed when that call
//! ends, on every path. [`SessionManager::with_session`] is the only way the
//! dispatcher reaches the server; nothing is pooled or shared.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use log::{debug, info, warn};
use tokio::time::{timeout, timeout_at, Instant};
use uuid::Uuid;

use crate::config::{AccountConfig, TimeoutConfig};
use crate::imap::error::ImapError;
use crate::imap::escape::MailboxName;
use crate::imap::session::{ImapSession, SessionConnector};

pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Identifying,
    Authenticated,
    FolderSelected,
    Closing,
}

/// A live, authenticated connection selected into at most one folder.
pub struct Session {
    id: Uuid,
    account: String,
    inner: Box<dyn ImapSession>,
    state: SessionState,
    selected: Option<MailboxName>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("account", &self.account)
            .field("state", &self.state)
            .field("selected", &self.selected)
            .finish()
    }
}

impl Session {
    pub fn new(account: impl Into<String>, inner: Box<dyn ImapSession>) -> Self {
        Self {
            id: Uuid::new_v4(),
            account: account.into(),
            inner,
            state: SessionState::Authenticated,
            selected: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn selected(&self) -> Option<&MailboxName> {
        self.selected.as_ref()
    }

    /// The wire session, for issuing commands.
    pub fn imap(&mut self) -> &mut dyn ImapSession {
        self.inner.as_mut()
    }

    /// Select `folder` unless it is already selected. A rejected SELECT
    /// becomes `MailboxNotFound` and leaves the session unselected.
    pub async fn select(&mut self, folder: &MailboxName) -> Result<(), ImapError> {
        if self.selected.as_ref() == Some(folder) {
            return Ok(());
        }
        debug!("[{}] Selecting mailbox {}", self.id, folder.quoted());
        self.selected = None;
        match self.inner.select(folder).await {
            Ok(()) => {
                self.selected = Some(folder.clone());
                self.state = SessionState::FolderSelected;
                Ok(())
            }
            Err(ImapError::Command(msg)) => {
                warn!("[{}] SELECT {} rejected: {}", self.id, folder, msg);
                self.state = SessionState::Authenticated;
                Err(ImapError::MailboxNotFound(folder.raw().to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Forget the selection after a command that may have changed it
    /// server-side (e.g. a failed SELECT on a strict server).
    pub fn clear_selection(&mut self) {
        self.selected = None;
        if self.state == SessionState::FolderSelected {
            self.state = SessionState::Authenticated;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state != SessionState::Disconnected {
            warn!("[{}] Session for '{}' dropped without logout", self.id, self.account);
        }
    }
}

/// Opens and closes sessions for one account.
#[derive(Clone)]
pub struct SessionManager {
    account: AccountConfig,
    connector: Arc<dyn SessionConnector>,
    timeouts: TimeoutConfig,
    client_name: String,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("account", &self.account.masked())
            .field("connector", &self.connector)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl SessionManager {
    pub fn new(
        account: AccountConfig,
        connector: Arc<dyn SessionConnector>,
        timeouts: TimeoutConfig,
        client_name: impl Into<String>,
    ) -> Self {
        Self {
            account,
            connector,
            timeouts,
            client_name: client_name.into(),
        }
    }

    pub fn account(&self) -> &AccountConfig {
        &self.account
    }

    async fn connect(&self) -> Result<Session, ImapError> {
        info!(
            "Opening IMAP session for account '{}' ({}:{})",
            self.account.name, self.account.host, self.account.port
        );
        let inner = self.connector.connect(&self.account).await?;
        let mut session = Session::new(self.account.name.clone(), inner);
        session.state = SessionState::Identifying;
        Ok(session)
    }

    /// Identify, then select `target` if given.
    async fn prepare(&self, session: &mut Session, target: Option<&MailboxName>) -> Result<(), ImapError> {
        if let Err(e) = session.inner.identify(&self.client_name, CLIENT_VERSION).await {
            warn!("[{}] IMAP ID command failed: {}", session.id, e);
        }
        session.state = SessionState::Authenticated;
        info!("[{}] Session ready for account '{}'", session.id, self.account.name);

        match target.filter(|f| !f.is_empty()) {
            Some(folder) => session.select(folder).await,
            None => Ok(()),
        }
    }

    /// Connect, log in, identify and optionally select `target`.
    ///
    /// If the select fails the session is logged out before the error is
    /// returned.
    pub async fn open_session(&self, target: Option<&MailboxName>) -> Result<Session, ImapError> {
        let mut session = self.connect().await?;
        if let Err(e) = self.prepare(&mut session, target).await {
            self.close_session(session).await;
            return Err(e);
        }
        Ok(session)
    }

    /// Log out, bounded by the teardown timeout. Never fails.
    pub async fn close_session(&self, mut session: Session) {
        session.state = SessionState::Closing;
        match timeout(self.timeouts.teardown(), session.inner.logout()).await {
            Ok(Ok(())) => debug!("[{}] Logged out", session.id),
            Ok(Err(e)) => info!("[{}] Error during logout: {}", session.id, e),
            Err(_) => warn!(
                "[{}] Logout did not finish within {:?}, dropping connection",
                session.id,
                self.timeouts.teardown()
            ),
        }
        session.selected = None;
        session.state = SessionState::Disconnected;
    }

    /// Run `op` inside a fresh session selected into `folder`.
    ///
    /// Opening the session and running `op` share one operation deadline.
    /// The session is closed afterwards whatever `op` returned, including on
    /// timeout.
    pub async fn with_session<T, F>(&self, folder: Option<MailboxName>, op: F) -> Result<T, ImapError>
    where
        T: Send,
        F: for<'a> FnOnce(&'a mut Session) -> BoxFuture<'a, Result<T, ImapError>> + Send,
    {
        let budget = self.timeouts.operation();
        let deadline = Instant::now() + budget;

        let mut session = match timeout_at(deadline, self.connect()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Connecting to '{}' timed out after {:?}", self.account.name, budget);
                return Err(ImapError::Timeout(format!("session open exceeded {:?}", budget)));
            }
        };

        // From here on the connection exists and must be logged out.
        let prepared = match timeout_at(deadline, self.prepare(&mut session, folder.as_ref())).await {
            Ok(result) => result,
            Err(_) => {
                warn!("[{}] Session setup timed out after {:?}", session.id, budget);
                Err(ImapError::Timeout(format!("session open exceeded {:?}", budget)))
            }
        };
        if let Err(e) = prepared {
            self.close_session(session).await;
            return Err(e);
        }

        let result = match timeout_at(deadline, op(&mut session)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("[{}] Operation timed out after {:?}", session.id, budget);
                Err(ImapError::Timeout(format!("operation exceeded {:?}", budget)))
            }
        };

        if let Err(e) = &result {
            debug!("[{}] Operation failed: {}", session.id, e);
        }
        self.close_session(session).await;
        result
    }
}
