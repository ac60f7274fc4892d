//! Session events and states

use crate::models::DisplayMessage;

/// Lifecycle of a chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Resolving the actor and looking up the conversation
    Discovering,
    /// No conversation exists yet; the first send creates it
    AwaitingFirstMessage,
    Connected,
    /// Waiting out the delay before the next connection attempt
    Reconnecting,
    /// Reconnection ceiling reached; the session stays offline
    Disconnected,
    Closed,
}

/// Everything a session reports to the UI
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened {
        listing_id: Option<i64>,
        chat_id: Option<i64>,
    },
    StateChanged(SessionState),
    ConnectionChanged {
        online: bool,
    },
    /// Full history; replaces whatever is displayed
    HistoryLoaded(Vec<DisplayMessage>),
    /// No conversation yet; show the empty state
    EmptyConversation,
    MessageReceived(DisplayMessage),
    PeerTyping(bool),
    OnlineUsers(Vec<String>),
    MessagesRead {
        count: u32,
    },
    PeerDisconnected {
        user_id: String,
    },
    /// User-facing error message
    Error(String),
    Closed,
}
