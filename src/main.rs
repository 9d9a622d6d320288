//! inbox-sync - Account notification synchronization
//!
//! Main entry point for the inbox-sync CLI.

use anyhow::Context;
use clap::{Parser, Subcommand};
use inbox_sync::config::{self, StoreBackend, SyncConfig};
use inbox_sync::inbox::{
    append_message, AccountId, Message, MessageId, MessageKind, MessageStore, NoopSession,
    RemoteStore, SessionRefresher, SqliteStore, StoreServer,
};
use inbox_sync::sync::{
    AlertPolicy, ClientSession, CueController, FileSignalChannel, MarkReadOutcome,
    ReadStateMutator, Reconciler, SilentCue, SyncBus, TerminalBell,
};
use inbox_sync::{InboxSyncError, Result};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// inbox-sync - Keep unread badges consistent across clients
#[derive(Parser, Debug)]
#[command(name = "inbox-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/inbox-sync/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Account to operate on (overrides the config file)
    #[arg(short, long, env = "INBOX_SYNC_ACCOUNT")]
    account: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration and provision the account
    Init,

    /// Serve the local SQLite store over HTTP
    Serve {
        /// Address to bind (default from config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Append a message to the account (admin action)
    Send {
        /// Message body
        text: String,

        /// Message kind (admin, rejection, system)
        #[arg(short, long, default_value = "admin")]
        kind: String,

        /// Sender name
        #[arg(short, long)]
        sender: Option<String>,
    },

    /// Print the account's messages
    List,

    /// Mark one message read
    Read {
        /// Message ID
        id: String,
    },

    /// Mark every message read
    ReadAll,

    /// Switch the audible cue on or off
    Sound {
        #[command(subcommand)]
        action: SoundAction,
    },

    /// Open a live client (Terminal UI)
    Watch,
}

#[derive(Subcommand, Debug)]
enum SoundAction {
    On,
    Off,
    Status,
}

fn main() {
    let cli = Cli::parse();

    // The TUI logs to a file instead
    if !matches!(cli.command, Commands::Watch) {
        if let Err(e) = inbox_sync::logging::init() {
            eprintln!("Failed to initialize logging: {}", e);
        }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(SyncConfig::default_path);

    let command = match cli.command {
        Commands::Init => return handle_init(&config_path, cli.account).await,
        command => command,
    };

    // An explicit --config must exist; the default location may not yet
    let mut config = match &cli.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::load_default()?,
    };
    if let Some(account) = cli.account {
        config.account = account;
    }
    config::validate_config_result(&config)?;

    tracing::info!(account = %config.account, "Configuration loaded");

    match command {
        Commands::Init => {}
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let store = SqliteStore::open(&config.store.path).with_context(|| {
                format!("Failed to open store at {}", config.store.path.display())
            })?;
            store.provision(&AccountId::new(&config.account)).await?;
            println!("Serving {} on http://{}", config.store.path.display(), bind);
            StoreServer::with_store(store).run(&bind).await?;
        }
        Commands::Send { text, kind, sender } => {
            let kind: MessageKind = kind.parse().map_err(InboxSyncError::Other)?;
            let account = AccountId::new(&config.account);
            let id = match config.store.backend {
                // The server inserts at the head in one request
                StoreBackend::Remote => {
                    remote_store(&config)?
                        .append(&account, kind, text, sender)
                        .await
                        .with_context(|| format!("Failed to send to {}", account))?
                }
                StoreBackend::Sqlite => {
                    let mut message = Message::new(kind, text);
                    if let Some(sender) = sender {
                        message = message.with_sender(sender);
                    }
                    let id = message.id.clone();
                    let (store, _) = open_store(&config)?;
                    append_message(store.as_ref(), &account, message)
                        .await
                        .with_context(|| format!("Failed to send to {}", account))?;
                    id
                }
            };
            println!("Sent {} to {}", id, account);
        }
        Commands::List => {
            let (store, _) = open_store(&config)?;
            let snapshot = store.get_snapshot(&AccountId::new(&config.account)).await?;
            println!(
                "{} messages, {} unread",
                snapshot.len(),
                snapshot.unread_count()
            );
            println!();
            for message in &snapshot.messages {
                print_message(message);
            }
        }
        Commands::Read { id } => {
            let mutator = one_shot_mutator(&config)?;
            let outcome = mutator
                .mark_one_read(&MessageId::from_string(id.clone()))
                .await?;
            match outcome {
                MarkReadOutcome::Updated { .. } => println!("Marked {} read", id),
                MarkReadOutcome::Unchanged => {
                    return Err(InboxSyncError::MessageNotFound(format!(
                        "{} (or already read)",
                        id
                    )))
                }
            }
        }
        Commands::ReadAll => {
            let mutator = one_shot_mutator(&config)?;
            match mutator.mark_all_read().await? {
                MarkReadOutcome::Updated { flipped, .. } => {
                    println!("Marked {} message(s) read", flipped)
                }
                MarkReadOutcome::Unchanged => println!("Nothing unread"),
            }
        }
        Commands::Sound { action } => {
            let cue = CueController::new(Arc::new(SilentCue::new()))
                .with_preference_file(&config.alert.sound_preference);
            match action {
                SoundAction::On => cue.set_enabled(true)?,
                SoundAction::Off => cue.set_enabled(false)?,
                SoundAction::Status => {}
            }
            println!(
                "Sound is {}",
                if cue.is_enabled() { "on" } else { "off" }
            );
        }
        Commands::Watch => {
            inbox_sync::logging::init_file(&config::config_dir().join("inbox-sync.log"))?;
            handle_watch(&config).await?;
        }
    }

    Ok(())
}

async fn handle_init(config_path: &std::path::Path, account: Option<String>) -> Result<()> {
    let mut config = if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        SyncConfig::load(config_path)?
    } else {
        SyncConfig::new()
    };
    if let Some(account) = account {
        config.account = account;
    }
    config::validate_config_result(&config)?;
    config.save(config_path)?;

    let account = AccountId::new(&config.account);
    match config.store.backend {
        StoreBackend::Sqlite => {
            SqliteStore::open(&config.store.path)?
                .provision(&account)
                .await?
        }
        StoreBackend::Remote => remote_store(&config)?.provision(&account).await?,
    }

    println!("Wrote {}", config_path.display());
    println!("Account {} is ready", account);
    Ok(())
}

fn remote_store(config: &SyncConfig) -> Result<RemoteStore> {
    let url = config
        .store
        .url
        .as_deref()
        .ok_or_else(|| InboxSyncError::Config("store.url is required".to_string()))?;
    let mut store =
        RemoteStore::new(url).with_context(|| format!("Failed to create client for {}", url))?;
    if let Some(token) = &config.store.token {
        store = store.with_token(token.clone());
    }
    Ok(store)
}

type StoreHandles = (Arc<dyn MessageStore>, Arc<dyn SessionRefresher>);

fn open_store(config: &SyncConfig) -> Result<StoreHandles> {
    match config.store.backend {
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(&config.store.path).with_context(|| {
                format!("Failed to open store at {}", config.store.path.display())
            })?;
            let store: Arc<dyn MessageStore> = Arc::new(store);
            let session: Arc<dyn SessionRefresher> = Arc::new(NoopSession);
            Ok((store, session))
        }
        StoreBackend::Remote => {
            let remote = Arc::new(remote_store(config)?);
            let store: Arc<dyn MessageStore> = remote.clone();
            let session: Arc<dyn SessionRefresher> = remote;
            Ok((store, session))
        }
    }
}

fn relay_channel(config: &SyncConfig) -> Arc<FileSignalChannel> {
    Arc::new(
        FileSignalChannel::new(&config.relay.path)
            .with_poll_interval(config.relay_poll_interval()),
    )
}

/// Mutator for a single CLI command; its publish still reaches live clients
fn one_shot_mutator(config: &SyncConfig) -> Result<ReadStateMutator> {
    let (store, session) = open_store(config)?;
    let bus = Arc::new(SyncBus::with_relay(relay_channel(config)));
    let reconciler = Arc::new(Reconciler::new(
        AccountId::new(&config.account),
        store,
        session,
        bus,
    ));
    let alert = Arc::new(AlertPolicy::new(Arc::new(CueController::new(Arc::new(
        SilentCue::new(),
    )))));
    Ok(ReadStateMutator::new(reconciler, alert))
}

async fn handle_watch(config: &SyncConfig) -> Result<()> {
    let (store, refresher) = open_store(config)?;
    let cue = Arc::new(
        CueController::new(Arc::new(TerminalBell))
            .with_preference_file(&config.alert.sound_preference),
    );

    let session = ClientSession::builder(AccountId::new(&config.account), store)
        .with_session(refresher)
        .with_relay(relay_channel(config))
        .with_cue(cue)
        .with_poll_interval(config.poll_interval())
        .mount();

    let app = inbox_sync::tui::App::new(
        config.account.clone(),
        config.alert.badge_cap,
        config.alert.preview_chars,
    );
    let result = inbox_sync::tui::run(&session, app, config.poll.refresh_on_focus).await;
    session.teardown().await;
    result
}

fn print_message(message: &Message) {
    let marker = if message.unread { "*" } else { " " };
    let sender = message
        .sender
        .as_deref()
        .map(|s| format!("{}: ", s))
        .unwrap_or_default();
    println!(
        "{} {} [{}] {} {}{}",
        marker,
        message.id,
        message.kind.label(),
        message.created_at.format("%Y-%m-%d %H:%M"),
        sender,
        inbox_sync::presenter::preview(&message.text, 60)
    );
}
