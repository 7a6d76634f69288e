// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Library core for mailbridge.

pub mod config;
pub mod dispatcher;
pub mod imap;
pub mod session_manager;

#[cfg(test)]
mod test_helpers;

pub mod prelude {
    // Config
    pub use crate::config::{AccountConfig, Settings, TimeoutConfig, TlsMode};

    // IMAP
    pub use crate::imap::content::TruncationPolicy;
    pub use crate::imap::error::{ErrorCategory, ImapError};
    pub use crate::imap::escape::MailboxName;
    pub use crate::imap::flags::FlagSet;
    pub use crate::imap::types::{
        ContentBatch, DeleteOutcome, EmailBodyResponse, EmailMetadata, FlagOperation, FlagOutcome, FolderInfo,
        MessageId, MetadataPage, MoveOutcome, SearchCriteria, SortOrder,
    };

    // Routing
    pub use crate::dispatcher::{DispatchError, Dispatcher, MailProvider};
    pub use crate::session_manager::{Session, SessionManager};
}
