// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Quoted-string escaping for mailbox names and search literals (RFC 3501 §9).
//!
//! Only raw values are ever stored. Quoted forms are derived on demand and
//! handed straight to the wire, so a value is never quoted twice.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::imap::error::ImapError;

fn quote(raw: &str) -> String {
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');
    for c in raw.chars() {
        if c == '\\' || c == '"' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Fail with `Validation` if `raw` holds CR, LF or NUL. None of them may
/// appear in a quoted string, and CR/LF would end the command line.
pub fn ensure_quotable(raw: &str) -> Result<(), ImapError> {
    if raw.chars().any(|c| matches!(c, '\r' | '\n' | '\0')) {
        return Err(ImapError::Validation(format!(
            "{:?} contains a line break or NUL and cannot be sent",
            raw
        )));
    }
    Ok(())
}

/// Quote a mailbox name for use as a command argument.
///
/// Hierarchy delimiters pass through untouched; only `\` and `"` are escaped.
pub fn quote_mailbox_name(raw: &str) -> String {
    quote(raw)
}

/// Quote a free-text SEARCH value (SUBJECT, BODY, TEXT, FROM, TO).
pub fn quote_search_param(raw: &str) -> String {
    quote(raw)
}

/// Reverse of the quoting rule. Returns `None` if `quoted` is not a
/// well-formed quoted string.
pub fn unquote(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
    let mut raw = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                escaped @ ('\\' | '"') => raw.push(escaped),
                _ => return None,
            },
            '"' => return None,
            other => raw.push(other),
        }
    }
    Some(raw)
}

/// A folder name as given by the caller or reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MailboxName {
    raw: String,
}

impl MailboxName {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn quoted(&self) -> String {
        quote_mailbox_name(&self.raw)
    }

    /// Quoted form for a command line. Rejects names [`ensure_quotable`] refuses.
    pub fn wire(&self) -> Result<String, ImapError> {
        ensure_quotable(&self.raw)?;
        Ok(self.quoted())
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

impl fmt::Display for MailboxName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for MailboxName {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for MailboxName {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}
