// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Flag mutation and deletion.
//!
//! Every mutation first reads the current flags of all ids with one FETCH.
//! Ids missing from that read are reported per item and never sent in a
//! STORE. The STORE itself is tried once per chunk and, if the server
//! rejects it, repeated per id so one bad message cannot sink the rest.

use std::collections::{HashMap, HashSet};

use log::{debug, error, info, warn};

use crate::imap::error::{ErrorCategory, ImapError};
use crate::imap::flags::{FlagSet, DELETED};
use crate::imap::types::{
    compact_uid_set, dedup_ids, DeleteOutcome, FlagOperation, FlagOutcome, ItemFailure, MessageId,
    MAX_IDS_PER_COMMAND,
};
use crate::session_manager::Session;

/// Current flags of every id that exists in the selected folder.
pub async fn read_flags(session: &mut Session, ids: &[MessageId]) -> Result<HashMap<MessageId, FlagSet>, ImapError> {
    let mut current = HashMap::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_IDS_PER_COMMAND) {
        let wanted: HashSet<MessageId> = chunk.iter().copied().collect();
        let fetched = session.imap().uid_fetch(&compact_uid_set(chunk), "(UID FLAGS)").await?;
        for message in fetched {
            if let Some(uid) = message.uid.filter(|uid| wanted.contains(uid)) {
                current.insert(uid, FlagSet::from_server(message.flags));
            }
        }
    }
    Ok(current)
}

/// Ids the STORE succeeded for (with the server's FLAGS echo when one came
/// back) and the ids it failed for.
struct StoreResult {
    stored: HashMap<MessageId, Option<FlagSet>>,
    failed: Vec<ItemFailure>,
}

async fn store_with_fallback(session: &mut Session, ids: &[MessageId], command: &str) -> Result<StoreResult, ImapError> {
    let mut result = StoreResult {
        stored: HashMap::with_capacity(ids.len()),
        failed: Vec::new(),
    };

    for chunk in ids.chunks(MAX_IDS_PER_COMMAND) {
        match session.imap().uid_store(&compact_uid_set(chunk), command).await {
            Ok(echo) => {
                let mut echoed: HashMap<MessageId, FlagSet> = echo
                    .into_iter()
                    .filter_map(|m| m.uid.map(|uid| (uid, FlagSet::from_server(m.flags))))
                    .collect();
                for id in chunk {
                    result.stored.insert(*id, echoed.remove(id));
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(
                    "[{}] Batch STORE failed, trying individual operations: {}",
                    session.id(),
                    e
                );
                for &id in chunk {
                    match session.imap().uid_store(&id.to_string(), command).await {
                        Ok(echo) => {
                            let flags = echo
                                .into_iter()
                                .find(|m| m.uid == Some(id))
                                .map(|m| FlagSet::from_server(m.flags));
                            result.stored.insert(id, flags);
                        }
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            error!("[{}] STORE failed for message {}: {}", session.id(), id, e);
                            result.failed.push(ItemFailure::new(id, &e));
                        }
                    }
                }
            }
        }
    }
    Ok(result)
}

/// Apply `op` with `flags` to `ids` in the selected folder.
///
/// Returns one outcome per distinct id, in request order. With `silent` the
/// resulting sets are computed from the pre-read flags instead of the
/// server's echo.
pub async fn mutate_flags(
    session: &mut Session,
    ids: &[MessageId],
    op: FlagOperation,
    flags: &[String],
    silent: bool,
) -> Result<Vec<FlagOutcome>, ImapError> {
    let requested = FlagSet::from_input(flags)?;
    let ids = dedup_ids(ids);
    if ids.is_empty() || (requested.is_empty() && op != FlagOperation::Replace) {
        return Ok(Vec::new());
    }

    let current = read_flags(session, &ids).await?;
    let existing: Vec<MessageId> = ids.iter().copied().filter(|id| current.contains_key(id)).collect();

    let command = format!("{} {}", op.store_item(silent), requested.to_list());
    info!(
        "[{}] UID STORE {} on {} of {} messages",
        session.id(),
        command,
        existing.len(),
        ids.len()
    );

    let mut stored = if existing.is_empty() {
        StoreResult {
            stored: HashMap::new(),
            failed: Vec::new(),
        }
    } else {
        store_with_fallback(session, &existing, &command).await?
    };

    let outcomes = ids
        .iter()
        .map(|&id| {
            let Some(before) = current.get(&id) else {
                return FlagOutcome {
                    id,
                    flags: None,
                    error: Some(ImapError::InvalidMessageId(id).category()),
                };
            };
            match stored.stored.remove(&id) {
                Some(echo) => {
                    let after = match echo {
                        Some(server_flags) if !silent => server_flags,
                        _ => op.apply(before, &requested),
                    };
                    FlagOutcome {
                        id,
                        flags: Some(after),
                        error: None,
                    }
                }
                None => {
                    let category = stored
                        .failed
                        .iter()
                        .find(|f| f.id == id)
                        .map(|f| f.category)
                        .unwrap_or(ErrorCategory::Command);
                    FlagOutcome {
                        id,
                        flags: None,
                        error: Some(category),
                    }
                }
            }
        })
        .collect();
    Ok(outcomes)
}

pub async fn add_flags(session: &mut Session, ids: &[MessageId], flags: &[String], silent: bool) -> Result<Vec<FlagOutcome>, ImapError> {
    mutate_flags(session, ids, FlagOperation::Add, flags, silent).await
}

pub async fn remove_flags(session: &mut Session, ids: &[MessageId], flags: &[String], silent: bool) -> Result<Vec<FlagOutcome>, ImapError> {
    mutate_flags(session, ids, FlagOperation::Remove, flags, silent).await
}

pub async fn replace_flags(session: &mut Session, ids: &[MessageId], flags: &[String], silent: bool) -> Result<Vec<FlagOutcome>, ImapError> {
    mutate_flags(session, ids, FlagOperation::Replace, flags, silent).await
}

/// Mark existing ids `\Deleted` and expunge once.
pub async fn delete_messages(session: &mut Session, ids: &[MessageId]) -> Result<DeleteOutcome, ImapError> {
    let ids = dedup_ids(ids);
    if ids.is_empty() {
        return Ok(DeleteOutcome::default());
    }

    let current = read_flags(session, &ids).await?;
    let mut outcome = DeleteOutcome::default();
    let mut existing = Vec::with_capacity(ids.len());
    for &id in &ids {
        if current.contains_key(&id) {
            existing.push(id);
        } else {
            outcome.failed.push(ItemFailure::new(id, &ImapError::InvalidMessageId(id)));
        }
    }
    if existing.is_empty() {
        return Ok(outcome);
    }

    let command = format!("+FLAGS.SILENT ({})", DELETED);
    let stored = store_with_fallback(session, &existing, &command).await?;
    outcome.failed.extend(stored.failed);

    let marked: Vec<MessageId> = existing.into_iter().filter(|id| stored.stored.contains_key(id)).collect();
    if !marked.is_empty() {
        match session.imap().expunge().await {
            Ok(()) => {
                debug!("[{}] Expunged {} messages", session.id(), marked.len());
                outcome.deleted = marked;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!("[{}] EXPUNGE failed: {}", session.id(), e);
                outcome.failed.extend(marked.into_iter().map(|id| ItemFailure::new(id, &e)));
            }
        }
    }
    outcome.failed.sort_by_key(|f| ids.iter().position(|id| *id == f.id));
    Ok(outcome)
}
