//! Notification and focus adapters for a terminal session

use async_trait::async_trait;
use lais_chat::{
    FocusState, Notification, NotificationPlatform, NotifyError, Permission, WindowClients,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Prints notifications inline and remembers the latest one
#[derive(Default)]
pub struct TerminalNotifier {
    last: Mutex<Option<Notification>>,
}

impl TerminalNotifier {
    pub fn last(&self) -> Option<Notification> {
        self.last.lock().clone()
    }
}

#[async_trait]
impl NotificationPlatform for TerminalNotifier {
    fn is_supported(&self) -> bool {
        true
    }

    fn permission(&self) -> Permission {
        Permission::Granted
    }

    async fn request_permission(&self) -> Result<Permission, NotifyError> {
        Ok(Permission::Granted)
    }

    async fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
        println!("\n🔔 {}: {}", notification.title, notification.body);
        *self.last.lock() = Some(notification.clone());
        Ok(())
    }

    async fn dismiss(&self, tag: &str) -> Result<(), NotifyError> {
        let mut last = self.last.lock();
        if last.as_ref().is_some_and(|n| n.tag == tag) {
            *last = None;
        }
        Ok(())
    }
}

/// Focus as toggled by the user with `/away` and `/back`
pub struct TerminalFocus {
    away: AtomicBool,
}

impl TerminalFocus {
    pub fn new(away: bool) -> Self {
        Self {
            away: AtomicBool::new(away),
        }
    }

    pub fn set_away(&self, away: bool) {
        self.away.store(away, Ordering::SeqCst);
    }
}

impl FocusState for TerminalFocus {
    fn is_visible(&self) -> bool {
        true
    }

    fn has_focus(&self) -> bool {
        !self.away.load(Ordering::SeqCst)
    }
}

/// A terminal has no windows; "opening" prints the destination
pub struct TerminalWindows;

#[async_trait]
impl WindowClients for TerminalWindows {
    async fn urls(&self) -> Vec<String> {
        Vec::new()
    }

    async fn focus(&self, _url: &str) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn open(&self, url: &str) -> Result<(), NotifyError> {
        println!("🔗 {}", url);
        Ok(())
    }
}
