// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Routes calls by account name to a [`MailProvider`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::config::{AccountConfig, Settings, TimeoutConfig};
use crate::imap::content::{self, TruncationPolicy};
use crate::imap::error::ImapError;
use crate::imap::escape::MailboxName;
use crate::imap::session::{SessionConnector, TcpSessionConnector};
use crate::imap::types::{
    ContentBatch, DeleteOutcome, EmailMetadata, FlagOperation, FlagOutcome, FolderInfo, MessageId, MetadataPage,
    MoveOutcome, SearchCriteria, SortOrder,
};
use crate::imap::{folders, metadata, store};
use crate::session_manager::SessionManager;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown account: {0}")]
    UnknownAccount(String),
    #[error(transparent)]
    Imap(#[from] ImapError),
}

/// The operations every mail backend offers.
///
/// Each call is self-contained: implementations open whatever connection
/// they need and release it before returning.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Account this provider serves, password masked.
    fn account_info(&self) -> AccountConfig;

    async fn fetch_metadata(&self, folder: &str, ids: &[MessageId]) -> Result<Vec<EmailMetadata>, ImapError>;

    async fn list_metadata_page(
        &self,
        folder: &str,
        criteria: &SearchCriteria,
        page: usize,
        page_size: usize,
        order: SortOrder,
    ) -> Result<MetadataPage, ImapError>;

    async fn fetch_content(
        &self,
        folder: &str,
        ids: &[MessageId],
        policy: TruncationPolicy,
    ) -> Result<ContentBatch, ImapError>;

    async fn mutate_flags(
        &self,
        folder: &str,
        ids: &[MessageId],
        op: FlagOperation,
        flags: &[String],
        silent: bool,
    ) -> Result<Vec<FlagOutcome>, ImapError>;

    async fn delete_messages(&self, folder: &str, ids: &[MessageId]) -> Result<DeleteOutcome, ImapError>;

    async fn list_folders(&self, pattern: Option<String>) -> Result<Vec<FolderInfo>, ImapError>;

    async fn create_folder(&self, name: &str) -> Result<bool, ImapError>;

    async fn move_messages(
        &self,
        source: &str,
        target: &str,
        ids: &[MessageId],
        create_if_missing: bool,
    ) -> Result<Vec<MoveOutcome>, ImapError>;
}

/// IMAP backend. Every call runs in its own scoped session.
#[derive(Debug, Clone)]
pub struct ImapProvider {
    manager: SessionManager,
}

impl ImapProvider {
    pub fn new(
        account: AccountConfig,
        connector: Arc<dyn SessionConnector>,
        timeouts: TimeoutConfig,
        client_name: impl Into<String>,
    ) -> Self {
        Self {
            manager: SessionManager::new(account, connector, timeouts, client_name),
        }
    }
}

#[async_trait]
impl MailProvider for ImapProvider {
    fn account_info(&self) -> AccountConfig {
        self.manager.account().masked()
    }

    async fn fetch_metadata(&self, folder: &str, ids: &[MessageId]) -> Result<Vec<EmailMetadata>, ImapError> {
        let ids = ids.to_vec();
        self.manager
            .with_session(Some(MailboxName::new(folder)), move |s| {
                async move { metadata::fetch_metadata(s, &ids).await }.boxed()
            })
            .await
    }

    async fn list_metadata_page(
        &self,
        folder: &str,
        criteria: &SearchCriteria,
        page: usize,
        page_size: usize,
        order: SortOrder,
    ) -> Result<MetadataPage, ImapError> {
        let criteria = criteria.clone();
        self.manager
            .with_session(Some(MailboxName::new(folder)), move |s| {
                async move { metadata::list_metadata_page(s, &criteria, page, page_size, order).await }.boxed()
            })
            .await
    }

    async fn fetch_content(
        &self,
        folder: &str,
        ids: &[MessageId],
        policy: TruncationPolicy,
    ) -> Result<ContentBatch, ImapError> {
        let ids = ids.to_vec();
        self.manager
            .with_session(Some(MailboxName::new(folder)), move |s| {
                async move { content::fetch_content(s, &ids, policy).await }.boxed()
            })
            .await
    }

    async fn mutate_flags(
        &self,
        folder: &str,
        ids: &[MessageId],
        op: FlagOperation,
        flags: &[String],
        silent: bool,
    ) -> Result<Vec<FlagOutcome>, ImapError> {
        let ids = ids.to_vec();
        let flags = flags.to_vec();
        self.manager
            .with_session(Some(MailboxName::new(folder)), move |s| {
                async move { store::mutate_flags(s, &ids, op, &flags, silent).await }.boxed()
            })
            .await
    }

    async fn delete_messages(&self, folder: &str, ids: &[MessageId]) -> Result<DeleteOutcome, ImapError> {
        let ids = ids.to_vec();
        self.manager
            .with_session(Some(MailboxName::new(folder)), move |s| {
                async move { store::delete_messages(s, &ids).await }.boxed()
            })
            .await
    }

    async fn list_folders(&self, pattern: Option<String>) -> Result<Vec<FolderInfo>, ImapError> {
        self.manager
            .with_session(None, move |s| {
                async move { folders::list_folders(s, pattern.as_deref()).await }.boxed()
            })
            .await
    }

    async fn create_folder(&self, name: &str) -> Result<bool, ImapError> {
        let name = MailboxName::new(name);
        self.manager
            .with_session(None, move |s| async move { folders::create_folder(s, &name).await }.boxed())
            .await
    }

    async fn move_messages(
        &self,
        source: &str,
        target: &str,
        ids: &[MessageId],
        create_if_missing: bool,
    ) -> Result<Vec<MoveOutcome>, ImapError> {
        let source = MailboxName::new(source);
        let target = MailboxName::new(target);
        let ids = ids.to_vec();
        // The source is selected inside, after the optional CREATE.
        self.manager
            .with_session(None, move |s| {
                async move { folders::move_messages(s, &source, &target, &ids, create_if_missing).await }.boxed()
            })
            .await
    }
}

/// Entry point for callers: account name in, provider result out.
#[derive(Default, Clone)]
pub struct Dispatcher {
    providers: HashMap<String, Arc<dyn MailProvider>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("Dispatcher").field("accounts", &names).finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`ImapProvider`] per configured account, connecting over TCP.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_connector(settings, Arc::new(TcpSessionConnector))
    }

    pub fn with_connector(settings: &Settings, connector: Arc<dyn SessionConnector>) -> Self {
        let mut dispatcher = Self::new();
        for account in &settings.accounts {
            let provider = ImapProvider::new(
                account.clone(),
                Arc::clone(&connector),
                settings.timeouts,
                settings.client_name.clone(),
            );
            dispatcher.register(account.name.clone(), Arc::new(provider));
        }
        info!("Dispatcher ready with {} account(s)", dispatcher.providers.len());
        dispatcher
    }

    /// Add or replace the provider for `name`.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn MailProvider>) {
        let name = name.into();
        debug!("Registering provider for account '{}'", name);
        self.providers.insert(name, provider);
    }

    pub fn provider(&self, name: &str) -> Result<Arc<dyn MailProvider>, DispatchError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownAccount(name.to_string()))
    }

    /// Masked account configs, sorted by name.
    pub fn accounts(&self) -> Vec<AccountConfig> {
        let mut accounts: Vec<AccountConfig> = self.providers.values().map(|p| p.account_info()).collect();
        accounts.sort_by(|a, b| a.name.cmp(&b.name));
        accounts
    }

    pub async fn fetch_metadata(
        &self,
        account: &str,
        folder: &str,
        ids: &[MessageId],
    ) -> Result<Vec<EmailMetadata>, DispatchError> {
        Ok(self.provider(account)?.fetch_metadata(folder, ids).await?)
    }

    pub async fn list_metadata_page(
        &self,
        account: &str,
        folder: &str,
        criteria: &SearchCriteria,
        page: usize,
        page_size: usize,
        order: SortOrder,
    ) -> Result<MetadataPage, DispatchError> {
        Ok(self
            .provider(account)?
            .list_metadata_page(folder, criteria, page, page_size, order)
            .await?)
    }

    pub async fn fetch_content(
        &self,
        account: &str,
        folder: &str,
        ids: &[MessageId],
        policy: TruncationPolicy,
    ) -> Result<ContentBatch, DispatchError> {
        Ok(self.provider(account)?.fetch_content(folder, ids, policy).await?)
    }

    pub async fn mutate_flags(
        &self,
        account: &str,
        folder: &str,
        ids: &[MessageId],
        op: FlagOperation,
        flags: &[String],
        silent: bool,
    ) -> Result<Vec<FlagOutcome>, DispatchError> {
        Ok(self
            .provider(account)?
            .mutate_flags(folder, ids, op, flags, silent)
            .await?)
    }

    pub async fn delete_messages(
        &self,
        account: &str,
        folder: &str,
        ids: &[MessageId],
    ) -> Result<DeleteOutcome, DispatchError> {
        Ok(self.provider(account)?.delete_messages(folder, ids).await?)
    }

    pub async fn list_folders(&self, account: &str, pattern: Option<String>) -> Result<Vec<FolderInfo>, DispatchError> {
        Ok(self.provider(account)?.list_folders(pattern).await?)
    }

    pub async fn create_folder(&self, account: &str, name: &str) -> Result<bool, DispatchError> {
        Ok(self.provider(account)?.create_folder(name).await?)
    }

    pub async fn move_messages(
        &self,
        account: &str,
        source: &str,
        target: &str,
        ids: &[MessageId],
        create_if_missing: bool,
    ) -> Result<Vec<MoveOutcome>, DispatchError> {
        Ok(self
            .provider(account)?
            .move_messages(source, target, ids, create_if_missing)
            .await?)
    }
}
