// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

pub mod content;
pub mod error;
pub mod escape;
pub mod flags;
pub mod folders;
pub mod metadata;
pub mod session;
pub mod store;
pub mod types;

pub use error::{ErrorCategory, ImapError};
pub use escape::MailboxName;
pub use flags::FlagSet;
pub use session::{ImapSession, SessionConnector, TcpSessionConnector};
