// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use config::{Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_PREFIX: &str = "MAILBRIDGE";
const MASK: &str = "********";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid account configuration: {0}")]
    InvalidAccount(String),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Implicit TLS, usually port 993.
    #[default]
    Tls,
    /// Plain connect upgraded with STARTTLS, usually port 143.
    Starttls,
    Plain,
}

/// Connection parameters for one mailbox account. Read-only to the engine.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub tls: TlsMode,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &MASK)
            .field("tls", &self.tls)
            .finish()
    }
}

fn default_port() -> u16 {
    993
}

impl AccountConfig {
    /// Copy safe to print or log.
    pub fn masked(&self) -> Self {
        Self {
            password: MASK.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig { level: "info".to_string() }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Budget for opening a session plus running the operation.
    pub operation_secs: u64,
    /// Budget for logout during teardown.
    pub teardown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            operation_secs: 60,
            teardown_secs: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn operation(&self) -> Duration {
        Duration::from_secs(self.operation_secs)
    }

    pub fn teardown(&self) -> Duration {
        Duration::from_secs(self.teardown_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub log: LogConfig,
    pub timeouts: TimeoutConfig,
    /// Sent as the `name` field of the ID command.
    pub client_name: String,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl Settings {
    /// Load defaults, then the optional TOML file, then `MAILBRIDGE__*`
    /// environment variables (e.g. `MAILBRIDGE__TIMEOUTS__OPERATION_SECS=30`).
    pub fn new(config_path: Option<&str>) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("timeouts.operation_secs", 60)?
            .set_default("timeouts.teardown_secs", 5)?
            .set_default("client_name", "mailbridge")?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .ignore_empty(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let mut names = HashSet::new();
        for account in &self.accounts {
            if account.name.trim().is_empty() {
                return Err(SettingsError::InvalidAccount("account name must not be empty".into()));
            }
            if account.host.trim().is_empty() {
                return Err(SettingsError::InvalidAccount(format!("account '{}' has no host", account.name)));
            }
            if !names.insert(account.name.as_str()) {
                return Err(SettingsError::InvalidAccount(format!("duplicate account '{}'", account.name)));
            }
        }
        Ok(())
    }

    pub fn account(&self, name: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.name == name)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            log: LogConfig::default(),
            timeouts: TimeoutConfig::default(),
            client_name: "mailbridge".to_string(),
            accounts: Vec::new(),
        }
    }
}
