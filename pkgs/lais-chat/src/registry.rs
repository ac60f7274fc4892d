//! Seller conversation registry
//!
//! Keeps a snapshot of every conversation the seller owns, grouped by
//! listing, and at most one active [`ChatSession`] for the conversation the
//! seller has selected. While the panel is open the snapshot is polled;
//! opening the panel only refreshes a snapshot older than the minimum
//! refresh interval.

use futures::channel::mpsc;
use futures::future::join_all;
use futures::StreamExt;
use lais_store::DurableStore;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::models::{buyer_label, fallback_title, Actor, ConversationSummary, ListingInfo};
use crate::session::{ChatDeps, ChatSession, SessionEvent};

/// What the registry reports to the UI
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// The snapshot was replaced
    GroupsUpdated { unread_total: u32 },
    RefreshFailed(String),
    /// An event of the active conversation
    Session { chat_id: i64, event: SessionEvent },
    /// User-facing error message
    Error(String),
}

/// A listing's conversations as shown in the panel
#[derive(Debug, Clone, PartialEq)]
pub struct GroupView {
    pub listing_id: i64,
    pub title: String,
    pub conversations: Vec<ConversationSummary>,
    pub unread: u32,
    pub collapsed: bool,
}

impl GroupView {
    pub fn count(&self) -> usize {
        self.conversations.len()
    }
}

/// Durable key of a group's collapsed flag
pub fn collapsed_key(listing_id: i64) -> String {
    format!("chat-group-{}-collapsed", listing_id)
}

/// Badge text for an unread total; hidden at zero
pub fn badge_label(unread_total: u32) -> Option<String> {
    match unread_total {
        0 => None,
        n if n > 99 => Some("99+".to_string()),
        n => Some(n.to_string()),
    }
}

struct ActiveConversation {
    chat_id: i64,
    session: ChatSession,
}

struct RegistryInner {
    deps: ChatDeps,
    store: Arc<dyn DurableStore>,
    events: mpsc::UnboundedSender<RegistryEvent>,
    seller_id: Mutex<Option<i64>>,
    groups: Mutex<BTreeMap<i64, Vec<ConversationSummary>>>,
    last_refresh: Mutex<Option<Instant>>,
    listings: Mutex<HashMap<i64, ListingInfo>>,
    active: tokio::sync::Mutex<Option<ActiveConversation>>,
    poller: Mutex<Option<CancellationToken>>,
}

pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(
        deps: ChatDeps,
        store: Arc<dyn DurableStore>,
    ) -> (Self, mpsc::UnboundedReceiver<RegistryEvent>) {
        let (events, rx) = mpsc::unbounded();
        let registry = Self {
            inner: Arc::new(RegistryInner {
                deps,
                store,
                events,
                seller_id: Mutex::new(None),
                groups: Mutex::new(BTreeMap::new()),
                last_refresh: Mutex::new(None),
                listings: Mutex::new(HashMap::new()),
                active: tokio::sync::Mutex::new(None),
                poller: Mutex::new(None),
            }),
        };
        (registry, rx)
    }

    /// Resolve the seller. Anonymous visitors have no conversations to manage.
    pub async fn init(&self) -> Result<Actor, RegistryError> {
        let actor = self.inner.deps.identity.resolve_actor().await;
        if !actor.is_registered {
            info!("Seller panel unavailable for anonymous visitor");
            return Err(RegistryError::NotAuthorized);
        }

        let seller_id = actor
            .id
            .parse::<i64>()
            .map_err(|_| RegistryError::InvalidSellerId(actor.id.clone()))?;
        *self.inner.seller_id.lock() = Some(seller_id);
        info!("Seller panel ready for seller {}", seller_id);
        Ok(actor)
    }

    /// Show the panel: refresh a stale snapshot and start polling
    pub async fn open_panel(&self) -> Result<(), RegistryError> {
        if self.inner.seller_id.lock().is_none() {
            return Err(RegistryError::NotAuthorized);
        }

        let min_interval = self.inner.deps.config.refresh_min_interval();
        let stale = match *self.inner.last_refresh.lock() {
            Some(at) => at.elapsed() > min_interval,
            None => true,
        };
        if stale {
            if let Err(e) = self.inner.refresh().await {
                warn!("Failed to refresh conversations: {}", e);
            }
        } else {
            debug!("Conversation snapshot still fresh");
        }

        self.start_polling();
        Ok(())
    }

    fn start_polling(&self) {
        let mut poller = self.inner.poller.lock();
        if poller.is_some() {
            return;
        }

        let token = CancellationToken::new();
        *poller = Some(token.clone());

        let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let period = self.inner.deps.config.poll_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = inner.refresh().await {
                    debug!("Polling refresh failed: {}", e);
                }
            }
            debug!("Conversation polling stopped");
        });
    }

    /// Hide the panel: stop polling and close the active conversation
    pub async fn close_panel(&self) {
        self.inner.stop_polling();
        if let Some(active) = self.inner.active.lock().await.take() {
            active.session.close();
        }
    }

    /// Fetch the grouped conversations now
    pub async fn refresh(&self) -> Result<(), RegistryError> {
        self.inner.refresh().await
    }

    pub fn groups(&self) -> BTreeMap<i64, Vec<ConversationSummary>> {
        self.inner.groups.lock().clone()
    }

    /// Sum of unread messages across every conversation
    pub fn unread_total(&self) -> u32 {
        self.inner.unread_total()
    }

    pub fn badge_label(&self) -> Option<String> {
        badge_label(self.unread_total())
    }

    /// Listing metadata, fetched once per listing for the registry's lifetime
    pub async fn listing(&self, listing_id: i64) -> Option<ListingInfo> {
        if let Some(info) = self.inner.listings.lock().get(&listing_id) {
            return Some(info.clone());
        }

        match self.inner.deps.api.listing(listing_id).await {
            Ok(info) => {
                self.inner
                    .listings
                    .lock()
                    .insert(listing_id, info.clone());
                Some(info)
            }
            Err(e) => {
                warn!("Failed to load listing {}: {}", listing_id, e);
                None
            }
        }
    }

    /// The snapshot shaped for display, in listing id order
    pub async fn group_views(&self) -> Vec<GroupView> {
        let groups = self.groups();
        let listings = join_all(groups.keys().map(|id| self.listing(*id))).await;

        let mut views = Vec::with_capacity(groups.len());
        for ((listing_id, conversations), listing) in groups.into_iter().zip(listings) {
            let collapsed = match self.inner.store.get(&collapsed_key(listing_id)).await {
                Ok(flag) => flag.as_deref() == Some("true"),
                Err(e) => {
                    warn!("Failed to read group flag: {}", e);
                    false
                }
            };
            views.push(GroupView {
                listing_id,
                title: listing
                    .map(|l| l.title())
                    .unwrap_or_else(|| fallback_title(listing_id)),
                unread: conversations.iter().map(|c| c.unread_count).sum(),
                conversations,
                collapsed,
            });
        }
        views
    }

    /// Flip and persist a group's collapsed flag, returning the new value
    pub async fn toggle_group(&self, listing_id: i64) -> bool {
        let key = collapsed_key(listing_id);
        let collapsed = match self.inner.store.get(&key).await {
            Ok(flag) => flag.as_deref() != Some("true"),
            Err(e) => {
                warn!("Failed to read group flag: {}", e);
                true
            }
        };

        let value = if collapsed { "true" } else { "false" };
        if let Err(e) = self.inner.store.set(&key, value).await {
            warn!("Failed to store group flag: {}", e);
        }
        collapsed
    }

    /// Make `chat_id` the active conversation, closing the previous one
    pub async fn select_conversation(&self, chat_id: i64) -> Result<(), RegistryError> {
        let info = match self.inner.deps.api.conversation_info(chat_id).await {
            Ok(info) => info,
            Err(e) => {
                warn!("Failed to open chat {}: {}", chat_id, e);
                self.inner
                    .emit(RegistryEvent::Error("Could not open chat".to_string()));
                return Err(e.into());
            }
        };
        let label = buyer_label(&info.buyer_id, info.buyer_is_registered);

        let mut active = self.inner.active.lock().await;
        if let Some(previous) = active.take() {
            debug!("Closing chat {}", previous.chat_id);
            previous.session.close();
        }

        let (session, session_events) = ChatSession::new(self.inner.deps.clone());
        self.forward(chat_id, session_events);

        info!("Opening chat {} with {}", chat_id, label);
        session.open_existing(chat_id, &label).await?;
        *active = Some(ActiveConversation { chat_id, session });
        drop(active);

        if let Err(e) = self.inner.refresh().await {
            warn!("Failed to refresh conversations: {}", e);
        }
        Ok(())
    }

    fn forward(&self, chat_id: i64, mut session_events: mpsc::UnboundedReceiver<SessionEvent>) {
        let events = self.inner.events.clone();
        tokio::spawn(async move {
            while let Some(event) = session_events.next().await {
                if events
                    .unbounded_send(RegistryEvent::Session { chat_id, event })
                    .is_err()
                {
                    break;
                }
            }
        });
    }

    /// Send in the active conversation
    pub async fn send(&self, text: &str) -> Result<(), RegistryError> {
        let active = self.inner.active.lock().await;
        let active = active.as_ref().ok_or(RegistryError::NoActiveConversation)?;
        active.session.send(text).await?;
        Ok(())
    }

    pub async fn input_changed(&self) {
        if let Some(active) = self.inner.active.lock().await.as_ref() {
            active.session.input_changed();
        }
    }

    /// Delete the active conversation on the server and deselect it
    pub async fn delete_selected(&self) -> Result<(), RegistryError> {
        let mut active = self.inner.active.lock().await;
        let chat_id = active
            .as_ref()
            .map(|a| a.chat_id)
            .ok_or(RegistryError::NoActiveConversation)?;

        if let Err(e) = self.inner.deps.api.delete_conversation(chat_id).await {
            warn!("Failed to delete chat {}: {}", chat_id, e);
            self.inner
                .emit(RegistryEvent::Error("Could not delete chat".to_string()));
            return Err(e.into());
        }

        info!("Deleted chat {}", chat_id);
        if let Some(previous) = active.take() {
            previous.session.close();
        }
        drop(active);

        if let Err(e) = self.inner.refresh().await {
            warn!("Failed to refresh conversations: {}", e);
        }
        Ok(())
    }

    /// Id of the active conversation
    pub async fn selected(&self) -> Option<i64> {
        self.inner.active.lock().await.as_ref().map(|a| a.chat_id)
    }

    pub fn is_polling(&self) -> bool {
        self.inner.poller.lock().is_some()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.inner.stop_polling();
    }
}

impl RegistryInner {
    fn emit(&self, event: RegistryEvent) {
        let _ = self.events.unbounded_send(event);
    }

    fn unread_total(&self) -> u32 {
        self.groups
            .lock()
            .values()
            .flatten()
            .map(|c| c.unread_count)
            .sum()
    }

    fn stop_polling(&self) {
        if let Some(token) = self.poller.lock().take() {
            token.cancel();
        }
    }

    async fn refresh(&self) -> Result<(), RegistryError> {
        let seller_id = (*self.seller_id.lock()).ok_or(RegistryError::NotAuthorized)?;
        debug!("Refreshing conversations for seller {}", seller_id);

        match self.deps.api.seller_groups(seller_id).await {
            Ok(groups) => {
                *self.groups.lock() = groups;
                *self.last_refresh.lock() = Some(Instant::now());
                let unread_total = self.unread_total();
                self.emit(RegistryEvent::GroupsUpdated { unread_total });
                Ok(())
            }
            Err(e) => {
                self.emit(RegistryEvent::RefreshFailed(e.to_string()));
                Err(e.into())
            }
        }
    }
}
