// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use log::{debug, error, warn};
use mail_parser::{Message, MimeHeaders, PartType};
use serde::{Deserialize, Serialize};

use crate::imap::error::ImapError;
use crate::imap::metadata::HeaderFields;
use crate::imap::types::{dedup_ids, ContentBatch, ContentType, EmailBodyResponse, ItemFailure, MessageId};
use crate::session_manager::Session;

pub const DEFAULT_TRUNCATE_AT: usize = 20_000;
pub const TRUNCATION_MARKER: &str = "...[TRUNCATED]";

/// Body fetch items, tried in order until one returns a body. The first does
/// not set `\Seen`.
pub const BODY_FORMATS: [&str; 3] = ["BODY.PEEK[]", "RFC822", "BODY[]"];

/// How much of a body to return. Lengths are counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationPolicy {
    Limit(usize),
    Disabled,
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        TruncationPolicy::Limit(DEFAULT_TRUNCATE_AT)
    }
}

impl From<Option<usize>> for TruncationPolicy {
    /// `None` disables truncation.
    fn from(limit: Option<usize>) -> Self {
        match limit {
            Some(n) => TruncationPolicy::Limit(n),
            None => TruncationPolicy::Disabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncatedText {
    pub content: String,
    pub is_truncated: bool,
    pub original_length: usize,
}

impl TruncationPolicy {
    pub fn apply(&self, body: String) -> TruncatedText {
        let original_length = body.chars().count();
        match *self {
            TruncationPolicy::Limit(limit) if original_length > limit => {
                let mut content: String = body.chars().take(limit).collect();
                content.push_str(TRUNCATION_MARKER);
                TruncatedText {
                    content,
                    is_truncated: true,
                    original_length,
                }
            }
            _ => TruncatedText {
                content: body,
                is_truncated: false,
                original_length,
            },
        }
    }
}

fn extract_body(message: &Message<'_>) -> (String, ContentType) {
    for id in &message.text_body {
        if let Some(PartType::Text(text)) = message.parts.get(*id).map(|p| &p.body) {
            return (text.to_string(), ContentType::Plain);
        }
    }
    for id in &message.html_body {
        if let Some(PartType::Html(html)) = message.parts.get(*id).map(|p| &p.body) {
            return (html.to_string(), ContentType::Html);
        }
    }
    (String::new(), ContentType::Plain)
}

fn build_response(id: MessageId, raw: &[u8], policy: TruncationPolicy) -> EmailBodyResponse {
    let (headers, body, content_type, attachments) = match Message::parse(raw) {
        Some(message) => {
            let (body, content_type) = extract_body(&message);
            let attachments = message
                .attachments()
                .filter_map(|part| part.attachment_name().map(str::to_string))
                .collect();
            (HeaderFields::from_message(&message), body, content_type, attachments)
        }
        None => {
            warn!("Message {} is not valid MIME, returning raw text", id);
            (
                HeaderFields::default(),
                String::from_utf8_lossy(raw).into_owned(),
                ContentType::Plain,
                Vec::new(),
            )
        }
    };

    let truncated = policy.apply(body);
    EmailBodyResponse {
        id,
        message_id: headers.message_id,
        subject: headers.subject,
        from: headers.from,
        recipients: headers.recipients,
        date: headers.date,
        content: truncated.content,
        content_type,
        is_truncated: truncated.is_truncated,
        original_length: truncated.original_length,
        attachments,
    }
}

/// Fetch one raw message, walking [`BODY_FORMATS`]. `Ok(None)` means the
/// server does not know the id.
async fn fetch_raw(session: &mut Session, id: MessageId) -> Result<Option<Vec<u8>>, ImapError> {
    let uid_set = id.to_string();
    let mut last_err = None;
    for format in BODY_FORMATS {
        let query = format!("(UID {})", format);
        match session.imap().uid_fetch(&uid_set, &query).await {
            Ok(messages) => match messages.into_iter().find(|m| m.uid == Some(id)) {
                None => return Ok(None),
                Some(message) => match message.body {
                    Some(body) => return Ok(Some(body)),
                    None => debug!("[{}] {} returned no body for {}", session.id(), format, id),
                },
            },
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("[{}] {} failed for {}: {}", session.id(), format, id, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| ImapError::Protocol(format!("No body returned for message {}", id))))
}

/// Fetch full bodies for `ids` from the selected folder.
///
/// Unknown ids and per-message command failures are listed in
/// [`ContentBatch::failed`]; only connection-level errors abort the call.
pub async fn fetch_content(
    session: &mut Session,
    ids: &[MessageId],
    policy: TruncationPolicy,
) -> Result<ContentBatch, ImapError> {
    let ids = dedup_ids(ids);
    let mut emails = Vec::with_capacity(ids.len());
    let mut failed = Vec::new();

    for &id in &ids {
        match fetch_raw(session, id).await {
            Ok(Some(raw)) => emails.push(build_response(id, &raw, policy)),
            Ok(None) => {
                warn!("[{}] Message {} not found", session.id(), id);
                failed.push(ItemFailure::new(id, &ImapError::InvalidMessageId(id)));
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!("[{}] Failed to fetch message {}: {}", session.id(), id, e);
                failed.push(ItemFailure::new(id, &e));
            }
        }
    }

    Ok(ContentBatch {
        requested_count: ids.len(),
        retrieved_count: emails.len(),
        emails,
        failed,
    })
}
