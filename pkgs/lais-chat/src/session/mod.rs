//! Chat session
//!
//! A [`ChatSession`] owns one conversation at a time. Opening it resolves the
//! actor, finds the conversation (buyer side) and, when one exists, loads its
//! history and connects the realtime socket. Without a conversation the
//! session waits: the first [`ChatSession::send`] creates the record and then
//! connects.
//!
//! Every open creates a lifetime [`CancellationToken`]. Socket tasks, timers
//! and request completions race against it, so nothing reaches the event
//! channel after [`ChatSession::close`].

mod driver;
mod events;

pub use events::{SessionEvent, SessionState};

use futures::channel::mpsc;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lais_store::{DurableStore, ResponseCache, SystemClock};

use crate::api::ChatApi;
use crate::cached_fetch::CachedFetch;
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::http::HttpClient;
use crate::identity::IdentityResolver;
use crate::models::{Actor, DisplayMessage, NewConversation};
use crate::notifications::NotificationBridge;
use crate::protocol::OutboundFrame;
use crate::socket::SocketConnector;

/// Label of the other side in a buyer's chat
pub const SELLER_LABEL: &str = "Seller";

/// Shared collaborators of chat sessions
#[derive(Clone)]
pub struct ChatDeps {
    pub api: Arc<ChatApi>,
    pub identity: Arc<IdentityResolver>,
    pub connector: Arc<dyn SocketConnector>,
    pub notifications: Option<Arc<NotificationBridge>>,
    pub config: Arc<ChatConfig>,
}

impl ChatDeps {
    /// Wire the REST client, response cache and identity resolver on top of
    /// `store` and `http`
    pub async fn assemble(
        config: ChatConfig,
        store: Arc<dyn DurableStore>,
        http: Arc<dyn HttpClient>,
        connector: Arc<dyn SocketConnector>,
    ) -> Self {
        let config = Arc::new(config);
        let cache = ResponseCache::with_default_ttl(
            store.clone(),
            Arc::new(SystemClock),
            config.cache_ttl(),
        )
        .await;
        let fetch = Arc::new(CachedFetch::new(http, Arc::new(cache)));
        let api = Arc::new(ChatApi::new(fetch, config.clone()));
        let identity = Arc::new(IdentityResolver::new(api.clone(), store));

        Self {
            api,
            identity,
            connector,
            notifications: None,
            config,
        }
    }

    pub fn with_notifications(mut self, bridge: Arc<NotificationBridge>) -> Self {
        self.notifications = Some(bridge);
        self
    }
}

/// The conversation a session is bound to
#[derive(Debug, Clone)]
struct Target {
    listing_id: Option<i64>,
    seller_id: Option<i64>,
    chat_id: Option<i64>,
    peer_label: String,
}

pub(crate) struct Inner {
    deps: ChatDeps,
    events: mpsc::UnboundedSender<SessionEvent>,
    identity: OnceCell<Actor>,
    state: Mutex<SessionState>,
    lifetime: Mutex<Option<CancellationToken>>,
    target: Mutex<Option<Target>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    online: watch::Sender<bool>,
    typing_timer: Mutex<Option<JoinHandle<()>>>,
    creating: tokio::sync::Mutex<()>,
}

/// One buyer-seller conversation
pub struct ChatSession {
    inner: Arc<Inner>,
}

impl ChatSession {
    /// Create an idle session and the receiver of its events
    pub fn new(deps: ChatDeps) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded();
        (Self::with_events(deps, tx), rx)
    }

    /// Create an idle session reporting to an existing channel
    pub fn with_events(deps: ChatDeps, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        let (online, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                deps,
                events,
                identity: OnceCell::new(),
                state: Mutex::new(SessionState::Idle),
                lifetime: Mutex::new(None),
                target: Mutex::new(None),
                outbound: Mutex::new(None),
                online,
                typing_timer: Mutex::new(None),
                creating: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// The acting user, resolved once per session
    pub async fn actor(&self) -> Actor {
        self.inner.actor().await
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.inner.target.lock().as_ref().and_then(|t| t.chat_id)
    }

    pub fn is_online(&self) -> bool {
        *self.inner.online.borrow()
    }

    /// Open the buyer's conversation about `listing_id` with `seller_id`.
    ///
    /// Without an existing conversation the session ends up in
    /// [`SessionState::AwaitingFirstMessage`].
    pub async fn open(
        &self,
        listing_id: Option<i64>,
        seller_id: Option<i64>,
    ) -> Result<(), ChatError> {
        let (listing_id, seller_id) = match (listing_id, seller_id) {
            (Some(l), Some(s)) if l > 0 && s > 0 => (l, s),
            _ => {
                warn!("Refusing to open chat without listing and seller");
                self.inner.emit(SessionEvent::Error(
                    ChatError::MissingIdentifiers.to_string(),
                ));
                return Err(ChatError::MissingIdentifiers);
            }
        };

        let token = self.inner.begin(Target {
            listing_id: Some(listing_id),
            seller_id: Some(seller_id),
            chat_id: None,
            peer_label: SELLER_LABEL.to_string(),
        });
        self.inner.emit(SessionEvent::Opened {
            listing_id: Some(listing_id),
            chat_id: None,
        });
        self.inner.set_state(SessionState::Discovering);

        let actor = guarded(&token, self.inner.actor())
            .await
            .ok_or(ChatError::SessionClosed)?;

        let found = guarded(
            &token,
            self.inner
                .deps
                .api
                .find_conversation(listing_id, seller_id, &actor.id),
        )
        .await
        .ok_or(ChatError::SessionClosed)?;

        match found {
            Ok(Some(conversation)) => {
                let Some(chat_id) = conversation.id else {
                    self.inner.await_first_message();
                    return Ok(());
                };
                info!("Found conversation {} for listing {}", chat_id, listing_id);
                self.inner.attach(chat_id);
                self.inner.load_history(chat_id, &token, &actor).await;
                self.inner.start_driver(chat_id, token, actor);
            }
            Ok(None) => {
                debug!("No conversation yet for listing {}", listing_id);
                self.inner.await_first_message();
            }
            Err(e) => {
                warn!("Conversation lookup failed: {}", e);
                self.inner.await_first_message();
            }
        }

        Ok(())
    }

    /// Open a known conversation, as the seller does from the registry
    pub async fn open_existing(&self, chat_id: i64, peer_label: &str) -> Result<(), ChatError> {
        let token = self.inner.begin(Target {
            listing_id: None,
            seller_id: None,
            chat_id: Some(chat_id),
            peer_label: peer_label.to_string(),
        });
        self.inner.emit(SessionEvent::Opened {
            listing_id: None,
            chat_id: Some(chat_id),
        });
        self.inner.set_state(SessionState::Discovering);

        let actor = guarded(&token, self.inner.actor())
            .await
            .ok_or(ChatError::SessionClosed)?;

        self.inner.load_history(chat_id, &token, &actor).await;
        self.inner.start_driver(chat_id, token, actor);
        Ok(())
    }

    /// Send a message. Blank text is ignored.
    ///
    /// The first send of a new conversation creates it and waits for the
    /// socket; creation failures are reported and not retried.
    pub async fn send(&self, text: &str) -> Result<(), ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let token = self.inner.token().ok_or(ChatError::SessionClosed)?;
        let actor = guarded(&token, self.inner.actor())
            .await
            .ok_or(ChatError::SessionClosed)?;

        if self.chat_id().is_none() {
            self.create_conversation(&token, &actor).await?;
        }

        let frame = OutboundFrame::Message {
            message_text: text.to_string(),
            sender_is_registered: actor.is_registered,
        }
        .encode()?;

        if !self.inner.send_frame(frame) {
            self.inner
                .emit(SessionEvent::Error(ChatError::NotConnected.to_string()));
            return Err(ChatError::NotConnected);
        }
        Ok(())
    }

    async fn create_conversation(
        &self,
        token: &CancellationToken,
        actor: &Actor,
    ) -> Result<(), ChatError> {
        let _creating = guarded(token, self.inner.creating.lock())
            .await
            .ok_or(ChatError::SessionClosed)?;

        // A concurrent send may have created it while we waited
        let target = self
            .inner
            .target
            .lock()
            .clone()
            .ok_or(ChatError::SessionClosed)?;
        if target.chat_id.is_some() {
            return Ok(());
        }
        let (Some(listing_id), Some(seller_id)) = (target.listing_id, target.seller_id) else {
            return Err(ChatError::MissingIdentifiers);
        };

        let request = NewConversation {
            listing_id,
            seller_id,
            buyer_id: actor.id.clone(),
            buyer_is_registered: actor.is_registered,
        };
        let created = guarded(token, self.inner.deps.api.create_conversation(&request))
            .await
            .ok_or(ChatError::SessionClosed)?;

        let chat_id = match created {
            Ok(conversation) => conversation.id,
            Err(e) => {
                warn!("Failed to create conversation: {}", e);
                None
            }
        };
        let Some(chat_id) = chat_id else {
            let err = ChatError::CreateFailed("the conversation could not be created".to_string());
            self.inner.emit(SessionEvent::Error(err.to_string()));
            return Err(err);
        };

        info!("Created conversation {} for listing {}", chat_id, listing_id);
        self.inner.attach(chat_id);
        self.inner.load_history(chat_id, token, actor).await;
        self.inner
            .start_driver(chat_id, token.clone(), actor.clone());

        let mut online = self.inner.online.subscribe();
        let timeout = self.inner.deps.config.connect_timeout();
        let in_time = guarded(
            token,
            tokio::time::timeout(timeout, online.wait_for(|online| *online)),
        )
        .await
        .ok_or(ChatError::SessionClosed)?
        .is_ok();
        if !in_time {
            warn!("Socket for chat {} not online after {:?}", chat_id, timeout);
        }
        Ok(())
    }

    /// Report a change of the message input; drives the typing indicator
    pub fn input_changed(&self) {
        self.inner.input_changed();
    }

    /// Close the session. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl Inner {
    async fn actor(&self) -> Actor {
        self.identity
            .get_or_init(|| self.deps.identity.resolve_actor())
            .await
            .clone()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.unbounded_send(event);
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!("Session state {:?} -> {:?}", *current, state);
            *current = state;
            drop(current);
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn token(&self) -> Option<CancellationToken> {
        self.lifetime
            .lock()
            .as_ref()
            .filter(|t| !t.is_cancelled())
            .cloned()
    }

    /// Start a new lifetime bound to `target`, ending the previous one
    fn begin(&self, target: Target) -> CancellationToken {
        self.teardown();
        let token = CancellationToken::new();
        *self.lifetime.lock() = Some(token.clone());
        *self.target.lock() = Some(target);
        token
    }

    fn attach(&self, chat_id: i64) {
        if let Some(target) = self.target.lock().as_mut() {
            target.chat_id = Some(chat_id);
        }
    }

    fn peer_label(&self) -> String {
        self.target
            .lock()
            .as_ref()
            .map(|t| t.peer_label.clone())
            .unwrap_or_else(|| SELLER_LABEL.to_string())
    }

    fn await_first_message(&self) {
        self.emit(SessionEvent::EmptyConversation);
        self.set_state(SessionState::AwaitingFirstMessage);
    }

    /// Load and publish the full history, then mark it read
    async fn load_history(&self, chat_id: i64, token: &CancellationToken, actor: &Actor) {
        debug!("Loading history for chat {}", chat_id);

        let Some(result) = guarded(token, self.deps.api.messages(chat_id)).await else {
            return;
        };
        let history = match result {
            Ok(messages) => messages
                .into_iter()
                .map(|m| DisplayMessage::for_actor(m, actor))
                .collect(),
            Err(e) => {
                warn!("Failed to load history for chat {}: {}", chat_id, e);
                Vec::new()
            }
        };
        self.emit(SessionEvent::HistoryLoaded(history));

        if let Some(Err(e)) = guarded(token, self.deps.api.mark_read(chat_id, &actor.id)).await {
            warn!("Failed to mark chat {} read: {}", chat_id, e);
        }
    }

    fn start_driver(self: &Arc<Self>, chat_id: i64, token: CancellationToken, actor: Actor) {
        tokio::spawn(driver::run(self.clone(), chat_id, token, actor));
    }

    fn send_frame(&self, frame: String) -> bool {
        if !*self.online.borrow() {
            return false;
        }
        match self.outbound.lock().as_ref() {
            Some(tx) => tx.unbounded_send(frame).is_ok(),
            None => false,
        }
    }

    fn send_typing(&self, is_typing: bool) {
        match (OutboundFrame::Typing { is_typing }).encode() {
            Ok(frame) => {
                self.send_frame(frame);
            }
            Err(e) => warn!("Failed to encode typing frame: {}", e),
        }
    }

    fn input_changed(self: &Arc<Self>) {
        let Some(token) = self.token() else {
            return;
        };
        if !*self.online.borrow() {
            return;
        }

        self.send_typing(true);

        let inner = self.clone();
        let idle = self.deps.config.typing_idle();
        let timer = tokio::spawn(async move {
            if guarded(&token, tokio::time::sleep(idle)).await.is_some() {
                inner.send_typing(false);
            }
        });
        if let Some(previous) = self.typing_timer.lock().replace(timer) {
            previous.abort();
        }
    }

    fn set_online(&self, online: bool, outbound: Option<mpsc::UnboundedSender<String>>) {
        *self.outbound.lock() = outbound;
        let was = self.online.send_replace(online);
        if was != online {
            self.emit(SessionEvent::ConnectionChanged { online });
        }
    }

    /// Cancel the current lifetime and drop its socket and timers
    fn teardown(&self) {
        if let Some(token) = self.lifetime.lock().take() {
            token.cancel();
        }
        if let Some(timer) = self.typing_timer.lock().take() {
            timer.abort();
        }
        self.outbound.lock().take();
        self.online.send_replace(false);
    }

    fn close(&self) {
        if *self.state.lock() == SessionState::Closed {
            return;
        }
        info!("Closing chat session");
        self.teardown();
        self.set_state(SessionState::Closed);
        self.emit(SessionEvent::Closed);
    }
}

/// Run `fut` unless `token` is cancelled first
pub(crate) async fn guarded<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}
