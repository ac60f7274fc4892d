//! Socket driver: connects, pumps inbound frames and reconnects
//!
//! One driver task runs per attached conversation. After a closure it retries
//! up to `max_reconnect_attempts` times, `reconnect_delay` apart; the counter
//! resets on every successful connection. Each reconnection reloads the full
//! history so messages sent during the gap are not lost.

use futures::channel::mpsc;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{guarded, Inner, SessionEvent, SessionState};
use crate::models::{Actor, DisplayMessage};
use crate::protocol::{user_id_of, InboundFrame};
use crate::socket::SocketSignal;

pub(super) async fn run(inner: Arc<Inner>, chat_id: i64, token: CancellationToken, actor: Actor) {
    let url = match inner.deps.api.socket_url(chat_id, &actor.id) {
        Ok(url) => url,
        Err(e) => {
            warn!("Cannot build socket URL for chat {}: {}", chat_id, e);
            inner.set_state(SessionState::Disconnected);
            return;
        }
    };

    let max_attempts = inner.deps.config.max_reconnect_attempts;
    let delay = inner.deps.config.reconnect_delay();
    let mut attempts = 0u32;
    let mut reconnecting = false;

    loop {
        debug!("Connecting socket for chat {}", chat_id);
        match guarded(&token, inner.deps.connector.connect(&url)).await {
            None => return,
            Some(Ok(link)) => {
                if token.is_cancelled() {
                    return;
                }
                info!("Socket online for chat {}", chat_id);
                attempts = 0;
                inner.set_online(true, Some(link.outbound));
                inner.set_state(SessionState::Connected);

                if reconnecting {
                    inner.load_history(chat_id, &token, &actor).await;
                }
                reconnecting = true;

                let cancelled = pump(&inner, chat_id, &token, &actor, link.inbound).await;
                // Teardown already reset the link; a later lifetime may own it now
                if cancelled || token.is_cancelled() {
                    return;
                }
                inner.set_online(false, None);
            }
            Some(Err(e)) => {
                warn!("Socket connection for chat {} failed: {}", chat_id, e);
                reconnecting = true;
            }
        }

        if token.is_cancelled() {
            return;
        }
        if attempts >= max_attempts {
            info!(
                "Giving up on chat {} after {} reconnection attempts",
                chat_id, attempts
            );
            inner.set_state(SessionState::Disconnected);
            return;
        }

        attempts += 1;
        inner.set_state(SessionState::Reconnecting);
        debug!(
            "Reconnecting chat {} in {:?} (attempt {}/{})",
            chat_id, delay, attempts, max_attempts
        );
        if guarded(&token, tokio::time::sleep(delay)).await.is_none() {
            return;
        }
    }
}

/// Dispatch inbound signals until the socket closes. Returns true if the
/// session lifetime ended first.
async fn pump(
    inner: &Arc<Inner>,
    chat_id: i64,
    token: &CancellationToken,
    actor: &Actor,
    mut inbound: mpsc::UnboundedReceiver<SocketSignal>,
) -> bool {
    loop {
        let Some(signal) = guarded(token, inbound.next()).await else {
            return true;
        };

        match signal {
            Some(SocketSignal::Frame(raw)) => match InboundFrame::decode(&raw) {
                Ok(frame) => dispatch(inner, chat_id, token, actor, frame),
                Err(e) => warn!("Skipping malformed frame on chat {}: {}", chat_id, e),
            },
            Some(SocketSignal::Error(e)) => {
                warn!("Socket error on chat {}: {}", chat_id, e);
                inner.set_online(false, None);
            }
            Some(SocketSignal::Closed { code, reason }) => {
                info!(
                    "Socket closed for chat {} (code {:?}, reason '{}')",
                    chat_id, code, reason
                );
                return false;
            }
            None => return false,
        }
    }
}

fn dispatch(
    inner: &Arc<Inner>,
    chat_id: i64,
    token: &CancellationToken,
    actor: &Actor,
    frame: InboundFrame,
) {
    match frame {
        InboundFrame::Message { message } => {
            let display = DisplayMessage::for_actor(message, actor);
            let incoming = !display.own;
            let text = display.message.text.clone();
            inner.emit(SessionEvent::MessageReceived(display));

            if incoming {
                spawn_incoming_side_effects(inner, chat_id, token, actor, text);
            }
        }
        InboundFrame::Typing { user_id, is_typing } => {
            if user_id != actor.id {
                inner.emit(SessionEvent::PeerTyping(is_typing));
            }
        }
        InboundFrame::OnlineUsers { users } => {
            inner.emit(SessionEvent::OnlineUsers(
                users.iter().map(user_id_of).collect(),
            ));
        }
        InboundFrame::MessagesRead { count, .. } => {
            inner.emit(SessionEvent::MessagesRead { count });
        }
        InboundFrame::UserDisconnected { user_id } => {
            inner.emit(SessionEvent::PeerDisconnected { user_id });
        }
        InboundFrame::Unknown => debug!("Ignoring unknown frame on chat {}", chat_id),
    }
}

/// Read receipt and notification for a message written by the peer
fn spawn_incoming_side_effects(
    inner: &Arc<Inner>,
    chat_id: i64,
    token: &CancellationToken,
    actor: &Actor,
    text: String,
) {
    let api = inner.deps.api.clone();
    let user_id = actor.id.clone();
    let receipt_token = token.clone();
    tokio::spawn(async move {
        if let Some(Err(e)) = guarded(&receipt_token, api.mark_read(chat_id, &user_id)).await {
            warn!("Failed to mark chat {} read: {}", chat_id, e);
        }
    });

    if let Some(bridge) = inner.deps.notifications.clone() {
        let label = inner.peer_label();
        let notify_token = token.clone();
        tokio::spawn(async move {
            if let Some(outcome) = guarded(&notify_token, bridge.notify(&label, &text, chat_id)).await {
                debug!("Notification for chat {}: {:?}", chat_id, outcome);
            }
        });
    }
}
