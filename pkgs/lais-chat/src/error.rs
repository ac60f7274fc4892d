//! Error types for chat operations

use thiserror::Error;

/// Errors raised by the HTTP transport and response decoding
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors raised while opening a realtime socket
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Connection refused: {0}")]
    Refused(String),
}

/// Errors surfaced by a chat session
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Listing and seller identifiers are required")]
    MissingIdentifiers,
    #[error("Could not start conversation: {0}")]
    CreateFailed(String),
    #[error("Not connected to chat")]
    NotConnected,
    #[error("Chat session is closed")]
    SessionClosed,
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by the seller session registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Only registered sellers can open the chat panel")]
    NotAuthorized,
    #[error("Invalid seller id: {0}")]
    InvalidSellerId(String),
    #[error("No conversation selected")]
    NoActiveConversation,
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),
}

/// Errors raised by a notification platform
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notifications are not supported")]
    Unsupported,
    #[error("Platform error: {0}")]
    Platform(String),
}

/// Errors loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid origin: {0}")]
    InvalidOrigin(#[from] url::ParseError),
}
