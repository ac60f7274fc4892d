//! Lais Chat - realtime buyer-seller messaging for marketplace listings
//!
//! This crate provides the chat core the Lais clients are built on:
//!
//! - **IdentityResolver**: registered user from the auth check, or a persistent
//!   anonymous id
//! - **CachedFetch**: HTTP transport that serves GET responses from the
//!   [`lais_store::ResponseCache`]
//! - **ChatSession**: one conversation with history, a reconnecting socket,
//!   typing indicator and read receipts
//! - **SessionRegistry**: the seller's grouped conversation list with a single
//!   active session
//! - **NotificationBridge**: system notifications for messages that arrive
//!   while the client is in the background
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use lais_chat::{ChatConfig, ChatDeps, ChatSession, ReqwestClient, TungsteniteConnector};
//! use lais_store::MemoryStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let deps = ChatDeps::assemble(
//!     ChatConfig::with_origin("https://market.example"),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(ReqwestClient::new()?),
//!     Arc::new(TungsteniteConnector),
//! )
//! .await;
//!
//! let (session, mut events) = ChatSession::new(deps);
//! session.open(Some(7), Some(3)).await?;
//! session.send("Is it still available?").await?;
//!
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cached_fetch;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod models;
pub mod notifications;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod socket;

pub use api::ChatApi;
pub use cached_fetch::CachedFetch;
pub use config::ChatConfig;
pub use error::{ChatError, ConfigError, HttpError, NotifyError, RegistryError, TransportError};
pub use http::{HttpClient, HttpRequest, HttpResponse, Method, ReqwestClient};
pub use identity::{IdentityResolver, ANONYMOUS_ID_KEY};
pub use models::{Actor, Conversation, ConversationSummary, DisplayMessage, ListingInfo, Message};
pub use notifications::{
    ClickOutcome, FocusState, Notification, NotificationAction, NotificationBridge,
    NotificationPlatform, NotifyOutcome, Permission, WindowClients,
};
pub use protocol::{InboundFrame, OutboundFrame};
pub use registry::{GroupView, RegistryEvent, SessionRegistry};
pub use session::{ChatDeps, ChatSession, SessionEvent, SessionState};
pub use socket::{SocketConnector, SocketLink, SocketSignal, TungsteniteConnector};
