// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command line front end: runs one mailbox operation against a configured
//! account and prints the result as JSON on stdout.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{debug, error};
use serde::Serialize;
use std::process::exit;
use thiserror::Error;

use mailbridge::config::Settings;
use mailbridge::dispatcher::{DispatchError, Dispatcher};
use mailbridge::imap::content::TruncationPolicy;
use mailbridge::imap::types::{FlagOperation, MessageId, SearchCriteria, SortOrder};

#[derive(Parser, Debug)]
#[command(version, about = "Batched IMAP mailbox access", long_about = None)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, env = "MAILBRIDGE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured accounts (passwords masked).
    Accounts,
    /// List folders.
    Folders {
        account: String,
        /// LIST pattern; `*` and `%` are wildcards.
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Page through message metadata.
    List {
        account: String,
        #[arg(long, default_value = "INBOX")]
        mailbox: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        page_size: usize,
        #[arg(long, default_value = "desc")]
        order: SortOrder,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        since: Option<NaiveDate>,
        #[arg(long)]
        before: Option<NaiveDate>,
        /// Only seen (`true`) or unseen (`false`) messages.
        #[arg(long)]
        seen: Option<bool>,
    },
    /// Fetch message bodies.
    Read {
        account: String,
        #[arg(required = true)]
        ids: Vec<MessageId>,
        #[arg(long, default_value = "INBOX")]
        mailbox: String,
        /// Maximum body length in characters.
        #[arg(long, conflicts_with = "no_truncate")]
        truncate: Option<usize>,
        #[arg(long)]
        no_truncate: bool,
    },
    /// Add, remove or replace flags.
    Flags {
        account: String,
        operation: FlagOperation,
        #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
        ids: Vec<MessageId>,
        #[arg(long, num_args = 1.., value_delimiter = ',')]
        flags: Vec<String>,
        #[arg(long, default_value = "INBOX")]
        mailbox: String,
        /// Do not ask the server to echo the resulting flags.
        #[arg(long)]
        silent: bool,
    },
    /// Move messages to another folder.
    Move {
        account: String,
        #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
        ids: Vec<MessageId>,
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "INBOX")]
        from: String,
        /// Create the target folder when it does not exist.
        #[arg(long)]
        create: bool,
    },
    /// Flag messages as deleted and expunge them.
    Delete {
        account: String,
        #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
        ids: Vec<MessageId>,
        #[arg(long, default_value = "INBOX")]
        mailbox: String,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("Failed to serialize result: {0}")]
    Output(#[from] serde_json::Error),
}

fn render_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", render_json(value)?);
    Ok(())
}

async fn run(dispatcher: &Dispatcher, command: Command) -> Result<(), CliError> {
    match command {
        Command::Accounts => print_json(&dispatcher.accounts()),
        Command::Folders { account, pattern } => print_json(&dispatcher.list_folders(&account, pattern).await?),
        Command::List {
            account,
            mailbox,
            page,
            page_size,
            order,
            subject,
            from,
            to,
            since,
            before,
            seen,
        } => {
            let criteria = SearchCriteria {
                subject,
                from,
                to,
                since,
                before,
                seen,
                ..SearchCriteria::default()
            };
            let result = dispatcher
                .list_metadata_page(&account, &mailbox, &criteria, page, page_size, order)
                .await?;
            print_json(&result)
        }
        Command::Read {
            account,
            ids,
            mailbox,
            truncate,
            no_truncate,
        } => {
            let policy = match (no_truncate, truncate) {
                (true, _) => TruncationPolicy::Disabled,
                (false, Some(limit)) => TruncationPolicy::Limit(limit),
                (false, None) => TruncationPolicy::default(),
            };
            print_json(&dispatcher.fetch_content(&account, &mailbox, &ids, policy).await?)
        }
        Command::Flags {
            account,
            operation,
            ids,
            flags,
            mailbox,
            silent,
        } => {
            let result = dispatcher
                .mutate_flags(&account, &mailbox, &ids, operation, &flags, silent)
                .await?;
            print_json(&result)
        }
        Command::Move {
            account,
            ids,
            to,
            from,
            create,
        } => print_json(&dispatcher.move_messages(&account, &from, &to, &ids, create).await?),
        Command::Delete { account, ids, mailbox } => {
            print_json(&dispatcher.delete_messages(&account, &mailbox, &ids).await?)
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::new(cli.config.as_deref()).unwrap_or_else(|err| {
        eprintln!("Failed to load configuration: {}", err);
        exit(1);
    });
    env_logger::Builder::from_env(Env::default().default_filter_or(settings.log.level.as_str())).init();
    debug!("Loaded {} account(s)", settings.accounts.len());

    let dispatcher = Dispatcher::from_settings(&settings);
    if let Err(e) = run(&dispatcher, cli.command).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        exit(1);
    }
}
