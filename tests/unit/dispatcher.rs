// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use mailbridge::config::{AccountConfig, Settings, TlsMode};
    use mailbridge::dispatcher::{DispatchError, Dispatcher};
    use mailbridge::imap::content::TruncationPolicy;
    use mailbridge::imap::error::{ErrorCategory, ImapError};
    use mailbridge::imap::session::{ImapSession, SessionConnector};

    /// Connector for an unreachable server.
    #[derive(Debug, Default)]
    struct RefusingConnector {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl SessionConnector for RefusingConnector {
        async fn connect(&self, account: &AccountConfig) -> Result<Box<dyn ImapSession>, ImapError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ImapError::Connection(format!("{}:{} refused", account.host, account.port)))
        }
    }

    fn settings() -> Settings {
        Settings {
            accounts: vec![AccountConfig {
                name: "work".into(),
                host: "imap.invalid".into(),
                port: 993,
                username: "me".into(),
                password: "secret".into(),
                tls: TlsMode::Tls,
            }],
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_connection_failure_surfaces_as_error() {
        let connector = Arc::new(RefusingConnector::default());
        let dispatcher = Dispatcher::with_connector(&settings(), connector.clone());

        let err = dispatcher
            .fetch_content("work", "INBOX", &[1], TruncationPolicy::default())
            .await
            .unwrap_err();
        match err {
            DispatchError::Imap(e) => assert_eq!(e.category(), ErrorCategory::Connection),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_account_never_connects() {
        let connector = Arc::new(RefusingConnector::default());
        let dispatcher = Dispatcher::with_connector(&settings(), connector.clone());

        let err = dispatcher.list_folders("personal", None).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownAccount(_)));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_accounts_hide_passwords() {
        let dispatcher = Dispatcher::from_settings(&settings());
        let accounts = dispatcher.accounts();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "work");
        assert_ne!(accounts[0].password, "secret");
    }
}
