// In-process fakes for the backend, the socket server and the notification platform

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use lais_chat::{
    ChatConfig, ChatDeps, FocusState, HttpClient, HttpError, HttpRequest, HttpResponse, Method,
    Notification, NotificationBridge, NotificationPlatform, NotifyError, Permission,
    SocketConnector, SocketLink, SocketSignal, TransportError,
};
use lais_store::MemoryStore;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const ORIGIN: &str = "http://market.test";

type Handler = Box<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

struct Route {
    method: Method,
    fragment: String,
    delay: Duration,
    handler: Handler,
}

/// Fake backend. A request goes to the route with the longest matching URL
/// fragment; among equals the latest registered wins. Unmatched requests get 404.
#[derive(Default)]
pub struct FakeHttp {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(
        &self,
        method: Method,
        fragment: &str,
        handler: impl Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    ) {
        self.route_delayed(method, fragment, Duration::ZERO, handler);
    }

    pub fn route_delayed(
        &self,
        method: Method,
        fragment: &str,
        delay: Duration,
        handler: impl Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    ) {
        self.routes.lock().push(Route {
            method,
            fragment: fragment.to_string(),
            delay,
            handler: Box::new(handler),
        });
    }

    pub fn json(&self, method: Method, fragment: &str, value: Value) {
        self.route(method, fragment, move |_| HttpResponse::json_ok(&value));
    }

    pub fn status(&self, method: Method, fragment: &str, status: u16) {
        self.route(method, fragment, move |_| status_response(status));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self, method: Method, fragment: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.url.contains(fragment))
            .count()
    }
}

pub fn status_response(status: u16) -> HttpResponse {
    HttpResponse {
        status,
        content_type: Some("application/json".to_string()),
        body: Bytes::from_static(b"{\"detail\":\"error\"}"),
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.lock().push(request.clone());

        let (delay, response) = {
            let routes = self.routes.lock();
            let route = routes
                .iter()
                .enumerate()
                .filter(|(_, r)| r.method == request.method && request.url.contains(&r.fragment))
                .max_by_key(|(i, r)| (r.fragment.len(), *i))
                .map(|(_, r)| r);
            match route {
                Some(route) => (route.delay, (route.handler)(&request)),
                None => (Duration::ZERO, status_response(404)),
            }
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(response)
    }
}

/// The server side of one fake socket connection
pub struct ServerEnd {
    pub url: String,
    pub to_client: mpsc::UnboundedSender<SocketSignal>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn push(&self, value: Value) {
        self.push_raw(&value.to_string());
    }

    pub fn push_raw(&self, raw: &str) {
        let _ = self
            .to_client
            .unbounded_send(SocketSignal::Frame(raw.to_string()));
    }

    /// Close abnormally
    pub fn drop_connection(&self) {
        let _ = self.to_client.unbounded_send(SocketSignal::Closed {
            code: Some(1006),
            reason: String::new(),
        });
    }

    /// Next frame the client sent, as JSON
    pub async fn next_frame(&mut self) -> Option<Value> {
        let raw = self.from_client.next().await?;
        serde_json::from_str(&raw).ok()
    }

    /// Frames already sent by the client, without waiting
    pub fn drain_frames(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(Some(raw)) = self.from_client.try_next() {
            if let Ok(value) = serde_json::from_str(&raw) {
                frames.push(value);
            }
        }
        frames
    }
}

/// Fake socket server. Each accepted connection is handed to the test as a
/// [`ServerEnd`].
pub struct FakeConnector {
    refuse: AtomicBool,
    attempts: Mutex<Vec<(String, Instant)>>,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, rx) = mpsc::unbounded();
        let connector = Arc::new(Self {
            refuse: AtomicBool::new(false),
            attempts: Mutex::new(Vec::new()),
            servers,
        });
        (connector, rx)
    }

    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> Vec<(String, Instant)> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl SocketConnector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<SocketLink, TransportError> {
        self.attempts.lock().push((url.to_string(), Instant::now()));

        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Refused(url.to_string()));
        }

        let (out_tx, out_rx) = mpsc::unbounded();
        let (in_tx, in_rx) = mpsc::unbounded();
        let _ = self.servers.unbounded_send(ServerEnd {
            url: url.to_string(),
            to_client: in_tx,
            from_client: out_rx,
        });

        Ok(SocketLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Notification platform that records what it shows. A notification replaces
/// an earlier one with the same tag.
pub struct RecordingPlatform {
    pub permission: Mutex<Permission>,
    pub shown: Mutex<Vec<Notification>>,
}

impl RecordingPlatform {
    pub fn granted() -> Arc<Self> {
        Arc::new(Self {
            permission: Mutex::new(Permission::Granted),
            shown: Mutex::new(Vec::new()),
        })
    }

    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().clone()
    }
}

#[async_trait]
impl NotificationPlatform for RecordingPlatform {
    fn is_supported(&self) -> bool {
        true
    }

    fn permission(&self) -> Permission {
        *self.permission.lock()
    }

    async fn request_permission(&self) -> Result<Permission, NotifyError> {
        Ok(*self.permission.lock())
    }

    async fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut shown = self.shown.lock();
        shown.retain(|n| n.tag != notification.tag);
        shown.push(notification.clone());
        Ok(())
    }
}

pub struct StaticFocus {
    pub visible: bool,
    pub focused: bool,
}

impl FocusState for StaticFocus {
    fn is_visible(&self) -> bool {
        self.visible
    }

    fn has_focus(&self) -> bool {
        self.focused
    }
}

pub struct Harness {
    pub http: Arc<FakeHttp>,
    pub connector: Arc<FakeConnector>,
    pub servers: mpsc::UnboundedReceiver<ServerEnd>,
    pub store: Arc<MemoryStore>,
    pub platform: Arc<RecordingPlatform>,
    pub deps: ChatDeps,
}

impl Harness {
    /// Next socket connection accepted by the fake server
    pub async fn next_server(&mut self) -> ServerEnd {
        tokio::time::timeout(Duration::from_secs(30), self.servers.next())
            .await
            .expect("no socket connection")
            .expect("connector dropped")
    }
}

/// Fakes wired into [`ChatDeps`]; the client is in the background so
/// notifications are shown
pub async fn harness() -> Harness {
    let http = FakeHttp::new();
    http.status(Method::Get, "/auth/me", 401);

    let (connector, servers) = FakeConnector::new();
    let store = Arc::new(MemoryStore::new());
    let platform = RecordingPlatform::granted();
    let config = ChatConfig::with_origin(ORIGIN);

    let bridge = Arc::new(NotificationBridge::new(
        platform.clone(),
        Arc::new(StaticFocus {
            visible: false,
            focused: false,
        }),
        store.clone(),
        Arc::new(config.clone()),
    ));
    let deps = ChatDeps::assemble(config, store.clone(), http.clone(), connector.clone())
        .await
        .with_notifications(bridge);

    Harness {
        http,
        connector,
        servers,
        store,
        platform,
        deps,
    }
}

/// Wait for the first event matching `pred`, returning it
pub async fn wait_for<E, F>(events: &mut mpsc::UnboundedReceiver<E>, mut pred: F) -> E
where
    F: FnMut(&E) -> bool,
{
    tokio::time::timeout(Duration::from_secs(120), async {
        while let Some(event) = events.next().await {
            if pred(&event) {
                return event;
            }
        }
        panic!("event stream ended");
    })
    .await
    .expect("timed out waiting for event")
}

/// Events already queued, without waiting
pub fn drain<E>(events: &mut mpsc::UnboundedReceiver<E>) -> Vec<E> {
    let mut out = Vec::new();
    while let Ok(Some(event)) = events.try_next() {
        out.push(event);
    }
    out
}

pub fn conversation_json(id: i64, listing_id: i64, seller_id: i64, buyer_id: &str) -> Value {
    serde_json::json!({
        "id": id,
        "iphone_id": listing_id,
        "seller_id": seller_id,
        "buyer_id": buyer_id,
        "buyer_is_registered": false,
        "created_at": "2024-05-01T10:00:00",
        "updated_at": "2024-05-01T10:00:00",
        "unread_count": 0
    })
}

pub fn message_json(id: i64, chat_id: i64, sender_id: &str, text: &str) -> Value {
    serde_json::json!({
        "id": id,
        "chat_id": chat_id,
        "sender_id": sender_id,
        "sender_is_registered": false,
        "message_text": text,
        "is_read": false,
        "created_at": "2024-05-01T10:00:00"
    })
}
