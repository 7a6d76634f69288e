// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::imap::error::{ErrorCategory, ImapError};
use crate::imap::escape::{ensure_quotable, quote_search_param, MailboxName};
use crate::imap::flags::FlagSet;

/// Server-assigned UID, valid only within the folder view that produced it.
pub type MessageId = u32;

/// Upper bound on ids rendered into a single command.
pub const MAX_IDS_PER_COMMAND: usize = 5000;

// Header-level view of a message. No body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMetadata {
    pub id: MessageId,
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    /// To followed by Cc, in header order. Duplicates are kept.
    pub recipients: Vec<String>,
    pub date: Option<DateTime<Utc>>,
    pub flags: FlagSet,
    pub size: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Plain,
    Html,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailBodyResponse {
    pub id: MessageId,
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub recipients: Vec<String>,
    pub date: Option<DateTime<Utc>>,
    pub content: String,
    pub content_type: ContentType,
    pub is_truncated: bool,
    /// Length of the body in characters before any truncation.
    pub original_length: usize,
    pub attachments: Vec<String>,
}

/// One item of a batch that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub id: MessageId,
    pub category: ErrorCategory,
    pub message: String,
}

impl ItemFailure {
    pub fn new(id: MessageId, err: &ImapError) -> Self {
        Self {
            id,
            category: err.category(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBatch {
    pub emails: Vec<EmailBodyResponse>,
    pub requested_count: usize,
    pub retrieved_count: usize,
    pub failed: Vec<ItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderInfo {
    pub name: MailboxName,
    /// `None` when the server reports a flat namespace (NIL).
    pub delimiter: Option<String>,
    pub flags: Vec<String>,
    pub can_select: bool,
    pub quoted: String,
}

impl FolderInfo {
    pub fn new(name: impl Into<MailboxName>, delimiter: Option<String>, flags: Vec<String>) -> Self {
        let name = name.into();
        let can_select = !flags.iter().any(|f| f.eq_ignore_ascii_case("\\Noselect"));
        let quoted = name.quoted();
        Self {
            name,
            delimiter,
            flags,
            can_select,
            quoted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub id: MessageId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCategory>,
}

impl MoveOutcome {
    pub fn moved(id: MessageId) -> Self {
        Self { id, success: true, error: None }
    }

    pub fn failed(id: MessageId, category: ErrorCategory) -> Self {
        Self { id, success: false, error: Some(category) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagOperation {
    Add,
    Remove,
    Replace,
}

impl FlagOperation {
    /// STORE data item name for this operation.
    pub fn store_item(self, silent: bool) -> &'static str {
        match (self, silent) {
            (FlagOperation::Add, false) => "+FLAGS",
            (FlagOperation::Add, true) => "+FLAGS.SILENT",
            (FlagOperation::Remove, false) => "-FLAGS",
            (FlagOperation::Remove, true) => "-FLAGS.SILENT",
            (FlagOperation::Replace, false) => "FLAGS",
            (FlagOperation::Replace, true) => "FLAGS.SILENT",
        }
    }

    /// Resulting flag set when `requested` is applied to `current`.
    pub fn apply(self, current: &FlagSet, requested: &FlagSet) -> FlagSet {
        match self {
            FlagOperation::Add => current.union(requested),
            FlagOperation::Remove => current.difference(requested),
            FlagOperation::Replace => requested.clone(),
        }
    }
}

impl std::str::FromStr for FlagOperation {
    type Err = ImapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(FlagOperation::Add),
            "remove" => Ok(FlagOperation::Remove),
            "replace" => Ok(FlagOperation::Replace),
            other => Err(ImapError::Validation(format!("Invalid flag operation: {}", other))),
        }
    }
}

/// Per-message result of a flag mutation. `flags` is the set after the
/// operation when `error` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagOutcome {
    pub id: MessageId,
    pub flags: Option<FlagSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCategory>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub deleted: Vec<MessageId>,
    pub failed: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = ImapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(ImapError::Validation(format!("Invalid sort order: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataPage {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub emails: Vec<EmailMetadata>,
}

/// Filters for UID SEARCH. An empty value matches every message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub before: Option<NaiveDate>,
    pub since: Option<NaiveDate>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub text: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub seen: Option<bool>,
    pub flagged: Option<bool>,
    pub answered: Option<bool>,
}

fn search_date(date: &NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string().to_uppercase()
}

impl SearchCriteria {
    /// SEARCH keys for these criteria. Free-text values holding CR, LF or
    /// NUL are rejected with `Validation`.
    pub fn keys(&self) -> Result<Vec<String>, ImapError> {
        let mut keys = Vec::new();
        if let Some(d) = &self.before {
            keys.push(format!("BEFORE {}", search_date(d)));
        }
        if let Some(d) = &self.since {
            keys.push(format!("SINCE {}", search_date(d)));
        }
        let text_keys = [
            ("SUBJECT", &self.subject),
            ("BODY", &self.body),
            ("TEXT", &self.text),
            ("FROM", &self.from),
            ("TO", &self.to),
        ];
        for (key, value) in text_keys {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                ensure_quotable(v)?;
                keys.push(format!("{} {}", key, quote_search_param(v)));
            }
        }
        let flag_keys = [
            (self.seen, "SEEN", "UNSEEN"),
            (self.flagged, "FLAGGED", "UNFLAGGED"),
            (self.answered, "ANSWERED", "UNANSWERED"),
        ];
        for (value, yes, no) in flag_keys {
            match value {
                Some(true) => keys.push(yes.to_string()),
                Some(false) => keys.push(no.to_string()),
                None => {}
            }
        }
        if keys.is_empty() {
            keys.push("ALL".to_string());
        }
        Ok(keys)
    }

    pub fn to_query(&self) -> Result<String, ImapError> {
        Ok(self.keys()?.join(" "))
    }
}

/// Render ids as a compact UID set (`1:4,7,9:10`). Input order and
/// duplicates do not matter.
pub fn compact_uid_set(ids: &[MessageId]) -> String {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts = Vec::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end.saturating_add(1))) && end != MessageId::MAX {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{}:{}", start, end));
        }
    }
    parts.join(",")
}

/// Split ids into UID sets holding at most [`MAX_IDS_PER_COMMAND`] ids each.
pub fn uid_set_chunks(ids: &[MessageId]) -> Vec<String> {
    ids.chunks(MAX_IDS_PER_COMMAND).map(compact_uid_set).collect()
}

/// Drop repeated ids, keeping the first occurrence.
pub fn dedup_ids(ids: &[MessageId]) -> Vec<MessageId> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
