mod terminal;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use lais_chat::{
    ChatConfig, ChatDeps, ChatSession, DisplayMessage, NotificationBridge, RegistryEvent,
    ReqwestClient, SessionEvent, SessionRegistry, TungsteniteConnector,
};
use lais_store::{DurableStore, ResponseCache, SqliteStore, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use terminal::{TerminalFocus, TerminalNotifier, TerminalWindows};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Lais - chat with buyers and sellers from the terminal
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend origin, overrides the config file
    #[arg(long)]
    origin: Option<String>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start away from the terminal so incoming messages raise notifications
    #[arg(long)]
    away: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show who the backend thinks you are
    Whoami,
    /// Chat with the seller of a listing
    Chat {
        #[arg(short, long)]
        listing: Option<i64>,
        #[arg(short, long)]
        seller: Option<i64>,
    },
    /// Open the seller panel
    Seller,
    /// Manage the local response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Drop cached responses holding personal data (run on logout)
    ClearUserData,
    /// Drop every cached response
    Clear,
    /// Drop expired responses
    Sweep,
}

/// Everything an interactive command needs
struct Client {
    deps: ChatDeps,
    store: Arc<dyn DurableStore>,
    bridge: Arc<NotificationBridge>,
    notifier: Arc<TerminalNotifier>,
    focus: Arc<TerminalFocus>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lais=info,lais_chat=info,lais_store=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ChatConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ChatConfig::default(),
    };
    if let Some(origin) = args.origin.clone() {
        config.origin = origin;
    }

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;
    let store: Arc<dyn DurableStore> = Arc::new(
        SqliteStore::open(config.database_path())
            .await
            .context("Failed to open local database")?,
    );
    info!("Using database {}", config.database_path().display());

    match args.command {
        Command::Cache { action } => run_cache(action, store).await,
        command => {
            let client = connect(config, store, args.away).await?;
            match command {
                Command::Whoami => run_whoami(&client).await,
                Command::Chat { listing, seller } => run_chat(&client, listing, seller).await,
                Command::Seller => run_seller(&client).await,
                Command::Cache { .. } => Ok(()),
            }
        }
    }
}

async fn connect(config: ChatConfig, store: Arc<dyn DurableStore>, away: bool) -> Result<Client> {
    let http = Arc::new(ReqwestClient::new().context("Failed to build HTTP client")?);
    let notifier = Arc::new(TerminalNotifier::default());
    let focus = Arc::new(TerminalFocus::new(away));
    let bridge = Arc::new(NotificationBridge::new(
        notifier.clone(),
        focus.clone(),
        store.clone(),
        Arc::new(config.clone()),
    ));

    let deps = ChatDeps::assemble(config, store.clone(), http, Arc::new(TungsteniteConnector))
        .await
        .with_notifications(bridge.clone());

    if bridge.should_prompt().await {
        bridge.mark_prompted().await;
    }

    Ok(Client {
        deps,
        store,
        bridge,
        notifier,
        focus,
    })
}

async fn run_cache(action: CacheAction, store: Arc<dyn DurableStore>) -> Result<()> {
    let cache = ResponseCache::open(store, Arc::new(SystemClock)).await;
    match action {
        CacheAction::ClearUserData => {
            let removed = cache.clear_user_data().await;
            println!("🧹 Removed {} cached responses with user data", removed);
        }
        CacheAction::Clear => {
            cache.clear().await;
            println!("🧹 Cache cleared");
        }
        CacheAction::Sweep => {
            let removed = cache.clean_expired().await;
            println!("🧹 Removed {} expired responses, {} left", removed, cache.len().await);
        }
    }
    Ok(())
}

async fn run_whoami(client: &Client) -> Result<()> {
    let actor = client.deps.identity.resolve_actor().await;
    if actor.is_registered {
        println!("👤 Registered user {}", actor.id);
    } else {
        println!("👤 Anonymous visitor {}", actor.id);
    }
    Ok(())
}

/// Lines typed by the user, trimmed and non-empty
fn spawn_stdin() -> (
    tokio::sync::mpsc::UnboundedReceiver<String>,
    tokio::task::JoinHandle<()>,
) {
    let (stdin_sender, stdin_receiver) = tokio::sync::mpsc::unbounded_channel::<String>();
    let handle = tokio::spawn(async move {
        use tokio::io::{AsyncBufReadExt, BufReader};
        let mut stdin = BufReader::new(tokio::io::stdin());
        let mut line = String::new();

        loop {
            line.clear();
            match stdin.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = line.trim().to_string();
                    if !line.is_empty() && stdin_sender.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    (stdin_receiver, handle)
}

/// Commands shared by both interactive modes: `Some(false)` quits, `None`
/// means the input is not one of them
async fn common_command(client: &Client, input: &str) -> Option<bool> {
    match input {
        "/quit" | "/q" => Some(false),
        "/away" => {
            client.focus.set_away(true);
            println!("💤 Away, new messages will notify");
            Some(true)
        }
        "/back" => {
            client.focus.set_away(false);
            println!("👀 Back");
            Some(true)
        }
        "/goto" => {
            match client.notifier.last() {
                Some(notification) => {
                    if let Err(e) = client
                        .bridge
                        .handle_click(&notification, None, &TerminalWindows)
                        .await
                    {
                        println!("❌ {}", e);
                    }
                }
                None => println!("No notification to follow"),
            }
            Some(true)
        }
        _ => None,
    }
}

async fn run_chat(client: &Client, listing: Option<i64>, seller: Option<i64>) -> Result<()> {
    let (session, mut events) = ChatSession::new(client.deps.clone());
    session
        .open(listing, seller)
        .await
        .context("Failed to open chat")?;

    println!("💬 Type a message and press enter. /away, /back, /goto, /quit");
    let (mut lines, stdin_handle) = spawn_stdin();

    loop {
        tokio::select! {
            Some(event) = events.next() => {
                if event == SessionEvent::Closed {
                    break;
                }
                print_session_event(&event, "Seller");
            }

            line = lines.recv() => {
                let Some(input) = line else { break };
                match common_command(client, &input).await {
                    Some(true) => {}
                    Some(false) => break,
                    None => {
                        session.input_changed();
                        if let Err(e) = session.send(&input).await {
                            println!("❌ {}", e);
                        }
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                println!("\n👋 Goodbye!");
                break;
            }
        }
    }

    session.close();
    stdin_handle.abort();
    Ok(())
}

async fn run_seller(client: &Client) -> Result<()> {
    let (registry, mut events) = SessionRegistry::new(client.deps.clone(), client.store.clone());
    let seller = registry
        .init()
        .await
        .context("The seller panel needs a signed-in account")?;
    info!("Seller panel for user {}", seller.id);

    registry.open_panel().await.context("Failed to load conversations")?;
    print_groups(&registry).await;

    println!("📖 /list, /open <chat>, /toggle <listing>, /delete, /refresh, /away, /back, /goto, /quit");
    let (mut lines, stdin_handle) = spawn_stdin();

    loop {
        tokio::select! {
            Some(event) = events.next() => match event {
                RegistryEvent::GroupsUpdated { .. } => {
                    if let Some(badge) = registry.badge_label() {
                        println!("📬 {} unread", badge);
                    }
                }
                RegistryEvent::RefreshFailed(reason) => debug!("Refresh failed: {}", reason),
                RegistryEvent::Session { event, .. } => print_session_event(&event, "Buyer"),
                RegistryEvent::Error(message) => println!("❌ {}", message),
            },

            line = lines.recv() => {
                let Some(input) = line else { break };
                match common_command(client, &input).await {
                    Some(true) => continue,
                    Some(false) => break,
                    None => {}
                }
                if let Err(e) = seller_command(&registry, &input).await {
                    println!("❌ {}", e);
                }
            }

            _ = tokio::signal::ctrl_c() => {
                println!("\n👋 Goodbye!");
                break;
            }
        }
    }

    registry.close_panel().await;
    stdin_handle.abort();
    Ok(())
}

async fn seller_command(registry: &SessionRegistry, input: &str) -> Result<()> {
    let mut parts = input.splitn(2, ' ');
    let command = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim);

    match (command, arg) {
        ("/list", _) => print_groups(registry).await,
        ("/refresh", _) => {
            registry.refresh().await?;
            print_groups(registry).await;
        }
        ("/open", Some(id)) => {
            let chat_id: i64 = id.parse().context("Usage: /open <chat id>")?;
            registry.select_conversation(chat_id).await?;
            println!("💬 Conversation #{}", chat_id);
        }
        ("/toggle", Some(id)) => {
            let listing_id: i64 = id.parse().context("Usage: /toggle <listing id>")?;
            let collapsed = registry.toggle_group(listing_id).await;
            println!(
                "Listing #{} {}",
                listing_id,
                if collapsed { "collapsed" } else { "expanded" }
            );
        }
        ("/delete", _) => {
            registry.delete_selected().await?;
            println!("🗑️ Conversation deleted");
        }
        _ if input.starts_with('/') => println!("Unknown command: {}", command),
        _ => {
            registry.input_changed().await;
            registry.send(input).await?;
        }
    }
    Ok(())
}

async fn print_groups(registry: &SessionRegistry) {
    let views = registry.group_views().await;
    if views.is_empty() {
        println!("No conversations yet");
        return;
    }

    for view in views {
        let marker = if view.collapsed { "▸" } else { "▾" };
        let unread = if view.unread > 0 {
            format!(" [{} new]", view.unread)
        } else {
            String::new()
        };
        println!(
            "{} {} (#{}) · {} chats{}",
            marker,
            view.title,
            view.listing_id,
            view.count(),
            unread
        );
        if view.collapsed {
            continue;
        }
        for conversation in &view.conversations {
            println!(
                "    #{} {}: {}",
                conversation.id,
                conversation.buyer_label(),
                conversation.last_message.as_deref().unwrap_or("(no messages)")
            );
        }
    }
}

fn print_session_event(event: &SessionEvent, peer: &str) {
    match event {
        SessionEvent::HistoryLoaded(messages) => {
            println!("── {} messages ──", messages.len());
            for message in messages {
                print_message(message, peer);
            }
        }
        SessionEvent::EmptyConversation => println!("No messages yet. Say hello!"),
        SessionEvent::MessageReceived(message) => print_message(message, peer),
        SessionEvent::PeerTyping(true) => println!("✏️ {} is typing...", peer),
        SessionEvent::ConnectionChanged { online: true } => println!("🟢 Connected"),
        SessionEvent::ConnectionChanged { online: false } => println!("🔴 Offline"),
        SessionEvent::MessagesRead { count } => println!("✓✓ {} read", count),
        SessionEvent::PeerDisconnected { user_id } => println!("👋 {} left", user_id),
        SessionEvent::Error(message) => println!("❌ {}", message),
        other => debug!("Session event: {:?}", other),
    }
}

fn print_message(message: &DisplayMessage, peer: &str) {
    let who = if message.own { "You" } else { peer };
    println!(
        "[{}] {}: {}",
        message.message.created_at.format("%H:%M"),
        who,
        message.message.text
    );
}
