//! System notifications for incoming chat messages
//!
//! The bridge decides whether a message deserves a notification and builds
//! it; showing it is left to a [`NotificationPlatform`]. Notifications are
//! tagged per conversation so a newer one replaces the previous.

use async_trait::async_trait;
use lais_store::DurableStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::error::NotifyError;

/// Durable flag set once the user has been asked for permission
pub const PROMPTED_KEY: &str = "notification_permission_asked";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationAction {
    Open,
    Close,
}

impl NotificationAction {
    pub fn title(&self) -> &'static str {
        match self {
            NotificationAction::Open => "Open chat",
            NotificationAction::Close => "Close",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    pub chat_id: i64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Notifications sharing a tag replace each other
    pub tag: String,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

/// Where notifications are displayed
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    fn is_supported(&self) -> bool;

    fn permission(&self) -> Permission;

    async fn request_permission(&self) -> Result<Permission, NotifyError>;

    async fn show(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Remove a displayed notification
    async fn dismiss(&self, _tag: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Whether the user is looking at the client
pub trait FocusState: Send + Sync {
    fn is_visible(&self) -> bool;
    fn has_focus(&self) -> bool;
}

/// Open client windows a notification click can land in
#[async_trait]
pub trait WindowClients: Send + Sync {
    /// URLs of the windows currently open
    async fn urls(&self) -> Vec<String>;

    async fn focus(&self, url: &str) -> Result<(), NotifyError>;

    async fn open(&self, url: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Shown,
    /// The client is visible and focused
    Suppressed,
    Unsupported,
    PermissionDenied,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Dismissed,
    Focused(String),
    Opened(String),
}

pub struct NotificationBridge {
    platform: Arc<dyn NotificationPlatform>,
    focus: Arc<dyn FocusState>,
    store: Arc<dyn DurableStore>,
    config: Arc<ChatConfig>,
}

impl NotificationBridge {
    pub fn new(
        platform: Arc<dyn NotificationPlatform>,
        focus: Arc<dyn FocusState>,
        store: Arc<dyn DurableStore>,
        config: Arc<ChatConfig>,
    ) -> Self {
        Self {
            platform,
            focus,
            store,
            config,
        }
    }

    /// Notify about a message from `sender_label` in conversation `chat_id`
    pub async fn notify(&self, sender_label: &str, text: &str, chat_id: i64) -> NotifyOutcome {
        if self.focus.is_visible() && self.focus.has_focus() {
            debug!("Client focused, not notifying for chat {}", chat_id);
            return NotifyOutcome::Suppressed;
        }

        if !self.platform.is_supported() {
            return NotifyOutcome::Unsupported;
        }

        let permission = match self.platform.permission() {
            Permission::Default => match self.platform.request_permission().await {
                Ok(p) => p,
                Err(e) => {
                    warn!("Notification permission request failed: {}", e);
                    return NotifyOutcome::Failed(e.to_string());
                }
            },
            p => p,
        };
        if permission != Permission::Granted {
            return NotifyOutcome::PermissionDenied;
        }

        let notification = self.build(sender_label, text, chat_id);
        match self.platform.show(&notification).await {
            Ok(()) => {
                info!("Notification shown for chat {}", chat_id);
                NotifyOutcome::Shown
            }
            Err(e) => {
                warn!("Failed to show notification: {}", e);
                NotifyOutcome::Failed(e.to_string())
            }
        }
    }

    /// The notification for a message, without showing it
    pub fn build(&self, sender_label: &str, text: &str, chat_id: i64) -> Notification {
        Notification {
            title: format!("New message from {}", sender_label),
            body: truncate(text, self.config.notification_body_limit),
            tag: format!("chat-{}", chat_id),
            data: NotificationData {
                chat_id,
                url: self.config.notification_url(),
            },
            actions: vec![NotificationAction::Open, NotificationAction::Close],
        }
    }

    /// React to a click on `notification`. `action` is `None` for a click on
    /// the body.
    pub async fn handle_click(
        &self,
        notification: &Notification,
        action: Option<NotificationAction>,
        clients: &dyn WindowClients,
    ) -> Result<ClickOutcome, NotifyError> {
        self.platform.dismiss(&notification.tag).await?;

        if action == Some(NotificationAction::Close) {
            return Ok(ClickOutcome::Dismissed);
        }

        let url = &notification.data.url;
        if clients.urls().await.iter().any(|u| u == url) {
            clients.focus(url).await?;
            return Ok(ClickOutcome::Focused(url.clone()));
        }

        clients.open(url).await?;
        Ok(ClickOutcome::Opened(url.clone()))
    }

    /// Whether the UI should ask the user to enable notifications
    pub async fn should_prompt(&self) -> bool {
        if !self.platform.is_supported() || self.platform.permission() != Permission::Default {
            return false;
        }
        match self.store.get(PROMPTED_KEY).await {
            Ok(flag) => flag.is_none(),
            Err(e) => {
                warn!("Failed to read prompt flag: {}", e);
                false
            }
        }
    }

    /// Remember that the user has been asked
    pub async fn mark_prompted(&self) {
        if let Err(e) = self.store.set(PROMPTED_KEY, "true").await {
            warn!("Failed to store prompt flag: {}", e);
        }
    }
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
