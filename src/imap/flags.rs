// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Message flag normalization.
//!
//! Servers hand back flags either as text or as raw bytes, with or without
//! the leading backslash and in any letter case. Every flag that enters this
//! crate goes through [`normalize_flag`] first, so set operations only ever
//! compare canonical strings.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use lazy_static::lazy_static;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::imap::error::ImapError;

pub const SEEN: &str = "\\Seen";
pub const ANSWERED: &str = "\\Answered";
pub const FLAGGED: &str = "\\Flagged";
pub const DELETED: &str = "\\Deleted";
pub const DRAFT: &str = "\\Draft";
pub const RECENT: &str = "\\Recent";

lazy_static! {
    /// Lower-cased bare name -> canonical system flag.
    static ref SYSTEM_FLAGS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("seen", SEEN);
        m.insert("answered", ANSWERED);
        m.insert("flagged", FLAGGED);
        m.insert("deleted", DELETED);
        m.insert("draft", DRAFT);
        m.insert("recent", RECENT);
        m
    };
}

/// A flag exactly as a server or caller produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFlag {
    Text(String),
    Bytes(Vec<u8>),
}

impl RawFlag {
    fn as_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            RawFlag::Text(s) => std::borrow::Cow::Borrowed(s.as_str()),
            RawFlag::Bytes(b) => String::from_utf8_lossy(b),
        }
    }
}

impl From<&str> for RawFlag {
    fn from(s: &str) -> Self {
        RawFlag::Text(s.to_string())
    }
}

impl From<String> for RawFlag {
    fn from(s: String) -> Self {
        RawFlag::Text(s)
    }
}

impl From<&[u8]> for RawFlag {
    fn from(b: &[u8]) -> Self {
        RawFlag::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for RawFlag {
    fn from(b: Vec<u8>) -> Self {
        RawFlag::Bytes(b)
    }
}

fn is_atom_char(c: char) -> bool {
    c.is_ascii_graphic() && !matches!(c, '(' | ')' | '{' | '%' | '*' | '"' | '\\' | ']')
}

/// Map any encoding of a flag to its canonical string.
///
/// System flags are recognised case-insensitively with or without the
/// backslash and come back as `\Seen`, `\Answered` etc. Unknown
/// backslash-prefixed names keep a single backslash. Keywords are kept
/// verbatim. Returns `None` for anything that is not a valid flag atom.
pub fn normalize_flag(raw: &RawFlag) -> Option<String> {
    let text = raw.as_text();
    let trimmed = text.trim();
    let bare = trimmed.trim_start_matches('\\');
    let had_backslash = bare.len() != trimmed.len();

    if bare.is_empty() || !bare.chars().all(is_atom_char) {
        return None;
    }

    if let Some(canonical) = SYSTEM_FLAGS.get(bare.to_ascii_lowercase().as_str()) {
        return Some((*canonical).to_string());
    }

    if had_backslash {
        Some(format!("\\{}", bare))
    } else {
        Some(bare.to_string())
    }
}

/// A set of canonical flag strings. Membership is case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagSet(BTreeSet<String>);

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from server-reported flags. Tokens that do not normalize are dropped.
    pub fn from_server<I>(flags: I) -> Self
    where
        I: IntoIterator<Item = RawFlag>,
    {
        let mut set = BTreeSet::new();
        for raw in flags {
            match normalize_flag(&raw) {
                Some(flag) => {
                    set.insert(flag);
                }
                None => debug!("Ignoring unparseable server flag {:?}", raw),
            }
        }
        FlagSet(set)
    }

    /// Validate and normalize caller-supplied flags for a STORE.
    ///
    /// `\Recent` is accepted but dropped; it cannot be stored.
    pub fn from_input<I, S>(flags: I) -> Result<Self, ImapError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for flag in flags {
            let flag = flag.as_ref();
            let canonical = normalize_flag(&RawFlag::from(flag))
                .ok_or_else(|| ImapError::Validation(format!("Invalid flag: {:?}", flag)))?;
            if canonical != RECENT {
                set.insert(canonical);
            }
        }
        Ok(FlagSet(set))
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.0.contains(flag)
    }

    pub fn insert(&mut self, flag: impl Into<String>) -> bool {
        self.0.insert(flag.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn union(&self, other: &FlagSet) -> FlagSet {
        FlagSet(self.0.union(&other.0).cloned().collect())
    }

    pub fn difference(&self, other: &FlagSet) -> FlagSet {
        FlagSet(self.0.difference(&other.0).cloned().collect())
    }

    /// Parenthesized list for a STORE or APPEND argument, e.g. `(\Seen foo)`.
    pub fn to_list(&self) -> String {
        format!("({})", self.0.iter().cloned().collect::<Vec<_>>().join(" "))
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_list())
    }
}

impl FromIterator<String> for FlagSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        FlagSet::from_server(iter.into_iter().map(RawFlag::Text))
    }
}
