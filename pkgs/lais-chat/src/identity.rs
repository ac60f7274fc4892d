//! Actor identity resolution
//!
//! A visitor is either a registered user (the backend's auth check returns an
//! id) or an anonymous visitor identified by a UUID generated once and kept in
//! durable storage under [`ANONYMOUS_ID_KEY`].

use lais_store::DurableStore;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::ChatApi;
use crate::models::Actor;

pub const ANONYMOUS_ID_KEY: &str = "anonymous_user_id";

pub struct IdentityResolver {
    api: Arc<ChatApi>,
    store: Arc<dyn DurableStore>,
    cached: Mutex<Option<(Actor, Instant)>>,
    // Serialises anonymous id creation so concurrent callers agree on one id
    creating: tokio::sync::Mutex<()>,
}

impl IdentityResolver {
    pub fn new(api: Arc<ChatApi>, store: Arc<dyn DurableStore>) -> Self {
        Self {
            api,
            store,
            cached: Mutex::new(None),
            creating: tokio::sync::Mutex::new(()),
        }
    }

    /// Resolve the acting user. Never fails: anything short of a successful
    /// auth check yields the anonymous identity.
    pub async fn resolve_actor(&self) -> Actor {
        let ttl = self.api.config().auth_cache_ttl();
        if let Some((actor, at)) = self.cached.lock().clone() {
            if at.elapsed() < ttl {
                debug!("Using cached identity {}", actor.id);
                return actor;
            }
        }

        match self.api.current_user().await {
            Ok(body) => {
                if let Some(id) = registered_id(&body) {
                    info!("Resolved registered user {}", id);
                    let actor = Actor::registered(id);
                    // Only a successful auth check is cached
                    *self.cached.lock() = Some((actor.clone(), Instant::now()));
                    return actor;
                }
            }
            Err(e) => debug!("Auth check failed, continuing anonymously: {}", e),
        }

        Actor::anonymous(self.anonymous_id().await)
    }

    /// The persisted anonymous id, created on first use.
    ///
    /// If storage is unavailable an ephemeral id is returned for this call.
    pub async fn anonymous_id(&self) -> String {
        let _guard = self.creating.lock().await;

        match self.store.get(ANONYMOUS_ID_KEY).await {
            Ok(Some(id)) if !id.is_empty() => return id,
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to read anonymous id: {}", e);
                return Uuid::new_v4().to_string();
            }
        }

        let id = Uuid::new_v4().to_string();
        match self.store.set(ANONYMOUS_ID_KEY, &id).await {
            Ok(()) => info!("Created anonymous id {}", id),
            Err(e) => warn!("Failed to persist anonymous id: {}", e),
        }
        id
    }

    /// Drop the cached identity so the next resolution re-checks auth
    pub fn forget(&self) {
        self.cached.lock().take();
    }
}

fn registered_id(body: &Value) -> Option<String> {
    match body.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
