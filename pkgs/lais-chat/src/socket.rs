//! Realtime socket transport
//!
//! A connected socket is exposed as a [`SocketLink`]: a sender for outgoing
//! text frames and a stream of [`SocketSignal`]s. Dropping the outbound sender
//! closes the connection.

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// What the socket reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum SocketSignal {
    /// A text frame
    Frame(String),
    /// A transport error; the socket may still close afterwards
    Error(String),
    /// The connection ended. Always the last signal.
    Closed { code: Option<u16>, reason: String },
}

/// Both halves of an open socket
pub struct SocketLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<SocketSignal>,
}

/// Opens sockets. Implemented over tungstenite in production and faked in tests.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<SocketLink, TransportError>;
}

/// [`SocketConnector`] backed by `tokio-tungstenite`
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<SocketLink, TransportError> {
        let (ws_stream, _) = connect_async(url).await?;
        info!("Socket connected: {}", url);

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded::<String>();
        let (in_tx, in_rx) = mpsc::unbounded::<SocketSignal>();

        tokio::spawn(async move {
            while let Some(text) = out_rx.next().await {
                if let Err(e) = write.send(WsMessage::Text(text)).await {
                    warn!("Socket write failed: {}", e);
                    break;
                }
            }
            debug!("Socket writer finished, closing");
            let _ = write.close().await;
        });

        tokio::spawn(async move {
            let mut close_code = None;
            let mut close_reason = String::new();

            while let Some(frame) = read.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        if in_tx.unbounded_send(SocketSignal::Frame(text)).is_err() {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        if let Some(frame) = frame {
                            close_code = Some(u16::from(frame.code));
                            close_reason = frame.reason.to_string();
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = in_tx.unbounded_send(SocketSignal::Error(e.to_string()));
                        break;
                    }
                }
            }

            debug!("Socket reader finished (code {:?})", close_code);
            let _ = in_tx.unbounded_send(SocketSignal::Closed {
                code: close_code,
                reason: close_reason,
            });
        });

        Ok(SocketLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
