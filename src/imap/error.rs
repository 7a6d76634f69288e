// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::imap::types::MessageId;

/// Errors raised by the mailbox engine.
///
/// `Connection` and `Timeout` leave the session unusable and always abort the
/// call. `InvalidMessageId` and `Command` are normally reported per item inside
/// a batch result instead of being raised.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImapError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Mailbox not found: {0}")]
    MailboxNotFound(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Message not found: {0}")]
    InvalidMessageId(MessageId),

    /// The server answered a command with NO.
    #[error("Command rejected: {0}")]
    Command(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Serializable error kind used in per-item batch outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Connection,
    MailboxNotFound,
    Protocol,
    InvalidMessageId,
    Command,
    Timeout,
    Validation,
}

impl ImapError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ImapError::Connection(_) => ErrorCategory::Connection,
            ImapError::MailboxNotFound(_) => ErrorCategory::MailboxNotFound,
            ImapError::Protocol(_) => ErrorCategory::Protocol,
            ImapError::InvalidMessageId(_) => ErrorCategory::InvalidMessageId,
            ImapError::Command(_) => ErrorCategory::Command,
            ImapError::Timeout(_) => ErrorCategory::Timeout,
            ImapError::Validation(_) => ErrorCategory::Validation,
        }
    }

    /// Whether the session can no longer be trusted after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ImapError::Connection(_) | ImapError::Timeout(_))
    }
}

impl From<async_imap::error::Error> for ImapError {
    fn from(err: async_imap::error::Error) -> Self {
        use async_imap::error::Error;
        match err {
            Error::No(msg) => ImapError::Command(msg),
            Error::Bad(msg) => ImapError::Protocol(format!("BAD response: {}", msg)),
            Error::Parse(e) => ImapError::Protocol(e.to_string()),
            Error::Io(e) => ImapError::Connection(e.to_string()),
            Error::ConnectionLost => ImapError::Connection("connection lost".to_string()),
            Error::Validate(e) => ImapError::Protocol(e.to_string()),
            other => ImapError::Protocol(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ImapError {
    fn from(err: std::io::Error) -> Self {
        ImapError::Connection(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ImapError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ImapError::Timeout(err.to_string())
    }
}
