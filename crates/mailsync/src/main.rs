//! `mailsync` - keep a local copy of IMAP inboxes.
//!
//! # Usage
//!
//! ```bash
//! # Add an account (the password is read from stdin when not given)
//! mailsync add-account --name Work --email me@example.com --host imap.example.com
//!
//! # Pull new mail
//! mailsync sync 1
//! mailsync sync 1 --full
//!
//! # Browse what was synced
//! mailsync messages --account 1 --filter unread
//! mailsync show 42
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mailsync_core::sync::{Progress, SyncMode};
use mailsync_core::{
    Account, AccountId, AccountUpdate, ChannelProgress, Config, Database, ImapConnector,
    MailService, MessageId, MessageQuery, NewAccount, ReadFilter, Security, SyncReport, Vault,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mailsync")]
#[command(about = "Synchronize IMAP inboxes into a local database", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List accounts, newest first
    Accounts,
    /// Add an account
    AddAccount {
        /// Display name
        #[arg(long)]
        name: String,
        /// Email address, also the login name
        #[arg(long)]
        email: String,
        /// IMAP server
        #[arg(long)]
        host: String,
        /// IMAP port (defaults to the security mode's port)
        #[arg(long)]
        port: Option<u16>,
        /// Transport security: tls, starttls or none
        #[arg(long, default_value = "tls")]
        security: Security,
        /// Password (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Change an account
    UpdateAccount {
        /// Account id
        id: i64,
        /// New display name
        #[arg(long)]
        name: Option<String>,
        /// New email address
        #[arg(long)]
        email: Option<String>,
        /// New IMAP server
        #[arg(long)]
        host: Option<String>,
        /// New IMAP port
        #[arg(long)]
        port: Option<u16>,
        /// New transport security
        #[arg(long)]
        security: Option<Security>,
        /// New password
        #[arg(long)]
        password: Option<String>,
    },
    /// Delete an account and its messages
    RemoveAccount {
        /// Account id
        id: i64,
    },
    /// Check that an account can log in
    Test {
        /// Account id
        id: i64,
    },
    /// Sync one account, or every account
    Sync {
        /// Account id (all accounts when omitted)
        id: Option<i64>,
        /// Look at the newest messages instead of resuming
        #[arg(long)]
        full: bool,
    },
    /// List synced messages
    Messages {
        /// Only this account
        #[arg(long)]
        account: Option<i64>,
        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Messages per page
        #[arg(long, default_value_t = 20)]
        page_size: u32,
        /// all, read or unread
        #[arg(long, default_value = "all")]
        filter: ReadFilter,
    },
    /// Print one message
    Show {
        /// Message id
        id: i64,
    },
    /// Mark a message as read
    Read {
        /// Message id
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailsync=info,mailsync_core=info,mailsync_imap=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)
        .await
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    config.validate()?;

    let key = config
        .resolve_encryption_key()
        .context("no usable encryption key")?;
    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;

    let service = MailService::new(
        &db,
        Vault::new(&key),
        ImapConnector::new(config.connect_timeout(), config.io_timeout()),
        config.window(),
    );

    let result = run(cli, &service).await;
    db.close().await;
    result
}

async fn run(cli: Cli, service: &MailService) -> Result<()> {
    match cli.command {
        Commands::Accounts => {
            let accounts = service.list_accounts().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&accounts)?);
            } else {
                print_accounts(&accounts);
            }
        }
        Commands::AddAccount {
            name,
            email,
            host,
            port,
            security,
            password,
        } => {
            let mut fields = NewAccount::new(name, email, host, security);
            if let Some(port) = port {
                fields.port = port;
            }
            let password = match password {
                Some(password) => password,
                None => read_password().await?,
            };
            let account = service.create_account(fields, &password).await?;
            println!("Added account {} ({})", account.id, account.email);
        }
        Commands::UpdateAccount {
            id,
            name,
            email,
            host,
            port,
            security,
            password,
        } => {
            let update = AccountUpdate {
                name,
                email,
                host,
                port,
                security,
            };
            if service
                .update_account(AccountId(id), &update, password.as_deref())
                .await?
            {
                println!("Updated account {id}");
            } else {
                println!("No account {id}");
            }
        }
        Commands::RemoveAccount { id } => {
            if service.delete_account(AccountId(id)).await? {
                println!("Removed account {id}");
            } else {
                println!("No account {id}");
            }
        }
        Commands::Test { id } => {
            if service.test_account(AccountId(id)).await? {
                println!("Connection OK");
            } else {
                println!("Connection failed (see log for details)");
            }
        }
        Commands::Sync { id, full } => {
            let mode = if full {
                SyncMode::Full
            } else {
                SyncMode::Incremental
            };
            let ids = match id {
                Some(id) => vec![AccountId(id)],
                None => service
                    .list_accounts()
                    .await?
                    .into_iter()
                    .map(|account| account.id)
                    .collect(),
            };
            let cancel = CancellationToken::new();
            spawn_interrupt_handler(cancel.clone());

            for id in ids {
                if cancel.is_cancelled() {
                    break;
                }
                let report = sync_with_progress(service, id, mode, &cancel).await;
                print_report(&report);
            }
        }
        Commands::Messages {
            account,
            page,
            page_size,
            filter,
        } => {
            let account_id = account.map(AccountId);
            let query = MessageQuery {
                account_id,
                page,
                page_size,
                filter,
            };
            let messages = service.list_messages(&query).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else {
                let total = service.count_messages(account_id, filter).await?;
                for message in &messages {
                    println!(
                        "{:>6} {} {:<30.30} {}",
                        message.id.to_string(),
                        if message.is_read { " " } else { "*" },
                        message.from,
                        message.subject
                    );
                }
                println!("Page {page}: {} of {total} message(s)", messages.len());
            }
        }
        Commands::Show { id } => {
            let Some(message) = service.get_message(MessageId(id)).await? else {
                bail!("no message {id}");
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&message)?);
            } else {
                println!("From:    {}", message.from);
                println!("To:      {}", message.to);
                println!("Subject: {}", message.subject);
                println!("Date:    {}", message.received_at.to_rfc2822());
                if message.has_attachments {
                    println!("(has attachments)");
                }
                println!();
                println!("{}", message.content);
            }
        }
        Commands::Read { id } => {
            if service.mark_read(MessageId(id)).await? {
                println!("Marked message {id} as read");
            } else {
                println!("No message {id}");
            }
        }
    }

    Ok(())
}

/// Runs one pass while printing progress from a separate task.
async fn sync_with_progress(
    service: &MailService,
    id: AccountId,
    mode: SyncMode,
    cancel: &CancellationToken,
) -> SyncReport {
    let (tx, mut rx) = mpsc::channel::<Progress>(64);
    let printer = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            eprintln!("[{}/{}] {}", progress.current, progress.total, progress.status);
        }
    });

    let sink = ChannelProgress::new(tx);
    let report = service.sync_account_with(id, mode, &sink, cancel).await;
    drop(sink);

    if let Err(e) = printer.await {
        warn!("Progress printer failed: {e}");
    }
    report
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, finishing the current message");
            cancel.cancel();
        }
    });
}

async fn read_password() -> Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_accounts(accounts: &[Account]) {
    if accounts.is_empty() {
        println!("No accounts.");
        return;
    }

    println!(
        "{:>4} {:<20} {:<30} {:<30} {:<20}",
        "Id", "Name", "Email", "Server", "Last sync"
    );
    println!("{:-<108}", "");
    for account in accounts {
        let last_sync = account
            .last_sync
            .map_or_else(|| "Never".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string());
        let server = format!(
            "{}:{} ({})",
            account.endpoint.host,
            account.endpoint.port,
            account.endpoint.security.display_name()
        );
        println!(
            "{:>4} {:<20} {:<30} {:<30} {:<20}",
            account.id.to_string(),
            account.name,
            account.email,
            server,
            last_sync
        );
    }
}

fn print_report(report: &SyncReport) {
    if report.busy {
        println!("Account {}: a sync is already running", report.account_id);
        return;
    }

    println!(
        "Account {}: {} new, {} already stored, {} failed",
        report.account_id, report.new_messages, report.already_known, report.failed
    );
    if let Some(reason) = &report.aborted {
        println!("  stopped early: {reason}");
    } else if report.cancelled {
        println!("  cancelled");
    }
}
