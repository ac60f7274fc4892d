//! REST client for the chat, auth and listing endpoints

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::cached_fetch::CachedFetch;
use crate::config::ChatConfig;
use crate::error::HttpError;
use crate::http::{HttpRequest, HttpResponse};
use crate::models::{Conversation, ConversationSummary, ListingInfo, Message, NewConversation};

/// Typed access to the backend
///
/// Chat data is live and always goes to the network; listing metadata goes
/// through the response cache.
pub struct ChatApi {
    fetch: Arc<CachedFetch>,
    config: Arc<ChatConfig>,
}

impl ChatApi {
    pub fn new(fetch: Arc<CachedFetch>, config: Arc<ChatConfig>) -> Self {
        Self { fetch, config }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &Arc<CachedFetch> {
        &self.fetch
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<String, HttpError> {
        let base = self.config.api_url(path);
        if params.is_empty() {
            return Ok(Url::parse(&base)?.to_string());
        }
        Ok(Url::parse_with_params(&base, params)?.to_string())
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.fetch.fetch(request, Duration::ZERO).await
    }

    /// `GET /auth/me` with credentials; the raw JSON body on success
    pub async fn current_user(&self) -> Result<Value, HttpError> {
        let url = self.url("/auth/me", &[])?;
        let response = self.send(HttpRequest::get(&url).with_credentials()).await?;
        response.json_success(&url)
    }

    /// Look up the conversation for a listing, seller and buyer
    pub async fn find_conversation(
        &self,
        listing_id: i64,
        seller_id: i64,
        buyer_id: &str,
    ) -> Result<Option<Conversation>, HttpError> {
        let listing = listing_id.to_string();
        let seller = seller_id.to_string();
        let url = self.url(
            "/chat/chats/find",
            &[
                ("iphone_id", listing.as_str()),
                ("seller_id", seller.as_str()),
                ("buyer_id", buyer_id),
            ],
        )?;
        debug!("Looking up conversation: {}", url);

        let response = self.send(HttpRequest::get(&url)).await?;
        let found: Option<Conversation> = response.json_success(&url)?;
        Ok(found.filter(|c| c.id.is_some()))
    }

    /// Create the conversation, or return the existing one with the same triple
    pub async fn create_conversation(
        &self,
        conversation: &NewConversation,
    ) -> Result<Conversation, HttpError> {
        let url = self.url("/chat/chats", &[])?;
        let body = serde_json::to_value(conversation)?;
        let response = self.send(HttpRequest::post(&url, Some(body))).await?;
        response.json_success(&url)
    }

    pub async fn messages(&self, chat_id: i64) -> Result<Vec<Message>, HttpError> {
        let url = self.url(&format!("/chat/chats/{}/messages", chat_id), &[])?;
        let response = self.send(HttpRequest::get(&url)).await?;
        response.json_success(&url)
    }

    /// Mark every message not written by `user_id` as read
    pub async fn mark_read(&self, chat_id: i64, user_id: &str) -> Result<(), HttpError> {
        let url = self.url(
            &format!("/chat/chats/{}/read", chat_id),
            &[("user_id", user_id)],
        )?;
        let response = self.send(HttpRequest::post(&url, None)).await?;
        response.ensure_success(&url)
    }

    /// Seller conversations keyed by listing id
    pub async fn seller_groups(
        &self,
        seller_id: i64,
    ) -> Result<BTreeMap<i64, Vec<ConversationSummary>>, HttpError> {
        let url = self.url(&format!("/chat/chats/seller/{}/grouped", seller_id), &[])?;
        let response = self.send(HttpRequest::get(&url)).await?;
        response.json_success(&url)
    }

    pub async fn conversation_info(&self, chat_id: i64) -> Result<Conversation, HttpError> {
        let url = self.url(&format!("/chat/chats/{}/info", chat_id), &[])?;
        let response = self.send(HttpRequest::get(&url)).await?;
        response.json_success(&url)
    }

    pub async fn delete_conversation(&self, chat_id: i64) -> Result<(), HttpError> {
        let url = self.url(&format!("/chat/chats/{}", chat_id), &[])?;
        let response = self.send(HttpRequest::delete(&url)).await?;
        response.ensure_success(&url)
    }

    /// Listing metadata, served from the response cache when fresh
    pub async fn listing(&self, listing_id: i64) -> Result<ListingInfo, HttpError> {
        let id = listing_id.to_string();
        let url = self.url("/posts/iphone", &[("id", id.as_str())])?;
        let response = self
            .fetch
            .fetch(HttpRequest::get(&url), self.config.cache_ttl())
            .await?;
        response.json_success(&url)
    }

    /// Socket URL for a conversation
    pub fn socket_url(&self, chat_id: i64, user_id: &str) -> Result<String, HttpError> {
        self.config
            .socket_url(chat_id, user_id)
            .map(|u| u.to_string())
            .map_err(|e| HttpError::Transport(e.to_string()))
    }
}
