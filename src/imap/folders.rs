// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use log::{debug, error, info, warn};
use regex::Regex;

use crate::imap::error::{ErrorCategory, ImapError};
use crate::imap::escape::{ensure_quotable, quote_mailbox_name, MailboxName};
use crate::imap::flags::DELETED;
use crate::imap::store::read_flags;
use crate::imap::types::{compact_uid_set, dedup_ids, FolderInfo, MessageId, MoveOutcome, MAX_IDS_PER_COMMAND};
use crate::session_manager::Session;

pub const MOVE_CAPABILITY: &str = "MOVE";

/// Compile a LIST pattern (`*` matches anything, `%` anything but the
/// hierarchy delimiter) into an anchored regex.
pub fn glob_to_regex(pattern: &str, delimiter: Option<&str>) -> Result<Regex, ImapError> {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '%' => match delimiter {
                Some(d) if !d.is_empty() => {
                    re.push_str("[^");
                    re.push_str(&regex::escape(d));
                    re.push_str("]*");
                }
                _ => re.push_str(".*"),
            },
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| ImapError::Validation(format!("Invalid folder pattern {:?}: {}", pattern, e)))
}

/// List folders, optionally restricted by a LIST-style glob.
///
/// The pattern is sent to the server and re-applied locally, since some
/// servers return more than they were asked for.
pub async fn list_folders(session: &mut Session, pattern: Option<&str>) -> Result<Vec<FolderInfo>, ImapError> {
    let pattern = pattern.filter(|p| !p.is_empty()).unwrap_or("*");
    ensure_quotable(pattern)?;
    let folders = session.imap().list(&quote_mailbox_name(pattern)).await?;
    debug!("[{}] LIST {:?} returned {} folders", session.id(), pattern, folders.len());

    if pattern == "*" {
        return Ok(folders);
    }

    let mut compiled: HashMap<Option<String>, Regex> = HashMap::new();
    let mut matched = Vec::with_capacity(folders.len());
    for folder in folders {
        if !compiled.contains_key(&folder.delimiter) {
            let re = glob_to_regex(pattern, folder.delimiter.as_deref())?;
            compiled.insert(folder.delimiter.clone(), re);
        }
        let is_match = compiled
            .get(&folder.delimiter)
            .is_some_and(|re| re.is_match(folder.name.raw()));
        if is_match {
            matched.push(folder);
        }
    }
    Ok(matched)
}

pub async fn folder_exists(session: &mut Session, name: &MailboxName) -> Result<bool, ImapError> {
    let listed = session.imap().list(&name.wire()?).await?;
    Ok(listed.iter().any(|f| &f.name == name))
}

/// Create `name` unless it already exists. Returns whether it was created.
pub async fn create_folder(session: &mut Session, name: &MailboxName) -> Result<bool, ImapError> {
    if name.is_empty() {
        return Err(ImapError::Validation("Folder name must not be empty".into()));
    }
    if folder_exists(session, name).await? {
        debug!("[{}] Folder {} already exists", session.id(), name);
        return Ok(false);
    }
    session.imap().create(name).await?;
    info!("[{}] Created folder: {}", session.id(), name);
    Ok(true)
}

/// Copy one message, then flag it `\Deleted` in the source.
async fn copy_and_flag(session: &mut Session, id: MessageId, target: &MailboxName) -> Result<(), ImapError> {
    let uid_set = id.to_string();
    session.imap().uid_copy(&uid_set, target).await?;
    session
        .imap()
        .uid_store(&uid_set, &format!("+FLAGS.SILENT ({})", DELETED))
        .await?;
    Ok(())
}

/// Move `ids` from `source` to `target`.
///
/// Setup problems (missing source, failed target creation, lost
/// connection) fail the whole call. Everything else is reported per id: one
/// outcome for every requested id, in request order. Ids the native MOVE
/// could not handle are retried with COPY + `\Deleted` + one EXPUNGE.
pub async fn move_messages(
    session: &mut Session,
    source: &MailboxName,
    target: &MailboxName,
    ids: &[MessageId],
    create_if_missing: bool,
) -> Result<Vec<MoveOutcome>, ImapError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    source.wire()?;
    target.wire()?;

    if create_if_missing {
        if let Err(e) = create_folder(session, target).await {
            error!("[{}] Failed to create folder {}: {}", session.id(), target, e);
            return Err(e);
        }
    }

    session.select(source).await?;

    let distinct = dedup_ids(ids);
    let current = read_flags(session, &distinct).await?;
    let mut results: HashMap<MessageId, Result<(), ErrorCategory>> = HashMap::with_capacity(distinct.len());
    let mut pending = Vec::with_capacity(distinct.len());
    for id in distinct {
        if current.contains_key(&id) {
            pending.push(id);
        } else {
            warn!("[{}] Message {} not found in {}", session.id(), id, source);
            results.insert(id, Err(ErrorCategory::InvalidMessageId));
        }
    }

    let native = match session.imap().has_capability(MOVE_CAPABILITY).await {
        Ok(has) => has,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            debug!("[{}] CAPABILITY failed, assuming no MOVE: {}", session.id(), e);
            false
        }
    };

    let mut fallback = Vec::new();
    if native {
        for chunk in pending.chunks(MAX_IDS_PER_COMMAND) {
            match session.imap().uid_move(&compact_uid_set(chunk), target).await {
                Ok(()) => {
                    info!("[{}] Moved {} messages to {} using MOVE", session.id(), chunk.len(), target);
                    results.extend(chunk.iter().map(|id| (*id, Ok(()))));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!("[{}] MOVE rejected, falling back to COPY+DELETE: {}", session.id(), e);
                    fallback.extend_from_slice(chunk);
                }
            }
        }
    } else {
        debug!("[{}] Server lacks MOVE, using COPY+DELETE", session.id());
        fallback = pending;
    }

    let mut flagged = Vec::new();
    for id in fallback {
        match copy_and_flag(session, id, target).await {
            Ok(()) => flagged.push(id),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!("[{}] Error moving email {} to {}: {}", session.id(), id, target, e);
                results.insert(id, Err(e.category()));
            }
        }
    }

    if !flagged.is_empty() {
        match session.imap().expunge().await {
            Ok(()) => {
                info!("[{}] Moved {} messages to {} using COPY+DELETE", session.id(), flagged.len(), target);
                results.extend(flagged.into_iter().map(|id| (id, Ok(()))));
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!("[{}] EXPUNGE after COPY failed: {}", session.id(), e);
                results.extend(flagged.into_iter().map(|id| (id, Err(e.category()))));
            }
        }
    }

    Ok(ids
        .iter()
        .map(|&id| match results.get(&id) {
            Some(Ok(())) => MoveOutcome::moved(id),
            Some(Err(category)) => MoveOutcome::failed(id, *category),
            None => MoveOutcome::failed(id, ErrorCategory::Protocol),
        })
        .collect())
}
