// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Batched header/flag/size retrieval, search and paged listing.
//!
//! One UID FETCH per chunk of [`MAX_IDS_PER_COMMAND`] ids pulls every
//! attribute at once, so the number of round trips does not grow with the
//! number of messages.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use mail_parser::{HeaderValue, Message};

use crate::imap::error::ImapError;
use crate::imap::flags::FlagSet;
use crate::imap::session::FetchedMessage;
use crate::imap::types::{
    compact_uid_set, dedup_ids, EmailMetadata, MessageId, MetadataPage, SearchCriteria, SortOrder,
    MAX_IDS_PER_COMMAND,
};
use crate::session_manager::Session;

pub const METADATA_QUERY: &str = "(UID FLAGS RFC822.SIZE INTERNALDATE BODY.PEEK[HEADER])";
pub const DATE_QUERY: &str = "(UID INTERNALDATE)";

/// Header fields shared by metadata and body records.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct HeaderFields {
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub recipients: Vec<String>,
    pub date: Option<DateTime<Utc>>,
}

fn push_addresses(value: &HeaderValue<'_>, out: &mut Vec<String>) {
    fn render(name: Option<&str>, address: Option<&str>) -> Option<String> {
        match (name.filter(|n| !n.is_empty()), address) {
            (Some(name), Some(address)) => Some(format!("{} <{}>", name, address)),
            (None, Some(address)) => Some(address.to_string()),
            (Some(name), None) => Some(name.to_string()),
            (None, None) => None,
        }
    }

    match value {
        HeaderValue::Address(addr) => {
            out.extend(render(addr.name.as_deref(), addr.address.as_deref()));
        }
        HeaderValue::AddressList(list) => {
            out.extend(list.iter().filter_map(|a| render(a.name.as_deref(), a.address.as_deref())));
        }
        HeaderValue::Group(group) => {
            out.extend(group.addresses.iter().filter_map(|a| render(a.name.as_deref(), a.address.as_deref())));
        }
        HeaderValue::GroupList(groups) => {
            for group in groups {
                out.extend(group.addresses.iter().filter_map(|a| render(a.name.as_deref(), a.address.as_deref())));
            }
        }
        HeaderValue::Text(text) => out.push(text.to_string()),
        _ => {}
    }
}

impl HeaderFields {
    pub fn from_message(message: &Message<'_>) -> Self {
        let mut from = Vec::new();
        push_addresses(message.from(), &mut from);

        let mut recipients = Vec::new();
        push_addresses(message.to(), &mut recipients);
        push_addresses(message.cc(), &mut recipients);

        HeaderFields {
            message_id: message.message_id().map(str::to_string),
            subject: message.subject().map(str::to_string),
            from: from.into_iter().next(),
            recipients,
            date: message
                .date()
                .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
        }
    }

    pub fn parse(raw: &[u8]) -> Option<Self> {
        Message::parse(raw).map(|m| HeaderFields::from_message(&m))
    }
}

fn to_metadata(id: MessageId, fetched: &FetchedMessage) -> EmailMetadata {
    let headers = match fetched.header.as_deref() {
        Some(raw) => HeaderFields::parse(raw).unwrap_or_else(|| {
            warn!("Could not parse headers of message {}", id);
            HeaderFields::default()
        }),
        None => HeaderFields::default(),
    };
    let date = headers
        .date
        .or_else(|| fetched.internal_date.map(|d| d.with_timezone(&Utc)));

    EmailMetadata {
        id,
        message_id: headers.message_id,
        subject: headers.subject,
        from: headers.from,
        recipients: headers.recipients,
        date,
        flags: FlagSet::from_server(fetched.flags.iter().cloned()),
        size: fetched.size,
    }
}

/// Fetch metadata for `ids` in the selected folder.
///
/// Results follow the order of `ids` with duplicates removed. Ids the server
/// does not return (expunged, never existed) are left out.
pub async fn fetch_metadata(session: &mut Session, ids: &[MessageId]) -> Result<Vec<EmailMetadata>, ImapError> {
    let ids = dedup_ids(ids);
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut by_id: HashMap<MessageId, EmailMetadata> = HashMap::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_IDS_PER_COMMAND) {
        let uid_set = compact_uid_set(chunk);
        let fetched = session.imap().uid_fetch(&uid_set, METADATA_QUERY).await?;
        for message in &fetched {
            if let Some(uid) = message.uid {
                by_id.insert(uid, to_metadata(uid, message));
            }
        }
    }

    let result: Vec<EmailMetadata> = ids.iter().filter_map(|id| by_id.remove(id)).collect();
    if result.len() < ids.len() {
        debug!(
            "[{}] {} of {} requested messages not found",
            session.id(),
            ids.len() - result.len(),
            ids.len()
        );
    }
    Ok(result)
}

pub async fn search_message_ids(session: &mut Session, criteria: &SearchCriteria) -> Result<Vec<MessageId>, ImapError> {
    let query = criteria.to_query()?;
    debug!("[{}] UID SEARCH {}", session.id(), query);
    session.imap().uid_search(&query).await
}

pub async fn count_messages(session: &mut Session, criteria: &SearchCriteria) -> Result<usize, ImapError> {
    Ok(search_message_ids(session, criteria).await?.len())
}

/// Search, order every hit by INTERNALDATE and return metadata for one
/// 1-based page.
pub async fn list_metadata_page(
    session: &mut Session,
    criteria: &SearchCriteria,
    page: usize,
    page_size: usize,
    order: SortOrder,
) -> Result<MetadataPage, ImapError> {
    if page == 0 || page_size == 0 {
        return Err(ImapError::Validation("page and page_size must be at least 1".into()));
    }

    let ids = search_message_ids(session, criteria).await?;
    let total = ids.len();

    let mut dated: Vec<(Option<DateTime<Utc>>, MessageId)> = ids.iter().map(|id| (None, *id)).collect();
    let mut dates: HashMap<MessageId, DateTime<Utc>> = HashMap::with_capacity(total);
    for chunk in ids.chunks(MAX_IDS_PER_COMMAND) {
        let fetched = session.imap().uid_fetch(&compact_uid_set(chunk), DATE_QUERY).await?;
        for message in fetched {
            if let (Some(uid), Some(date)) = (message.uid, message.internal_date) {
                dates.insert(uid, date.with_timezone(&Utc));
            }
        }
    }
    for entry in dated.iter_mut() {
        entry.0 = dates.get(&entry.1).copied();
    }

    dated.sort();
    if order == SortOrder::Desc {
        dated.reverse();
    }

    let start = (page - 1).saturating_mul(page_size);
    let page_ids: Vec<MessageId> = dated.iter().skip(start).take(page_size).map(|(_, id)| *id).collect();
    let emails = fetch_metadata(session, &page_ids).await?;

    Ok(MetadataPage {
        page,
        page_size,
        total,
        emails,
    })
}
