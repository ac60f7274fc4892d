//! Chat client configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Backend origin, e.g. `https://market.example`
    pub origin: String,

    /// Path prefix of the REST and socket API (default: `/api/v1`)
    pub api_prefix: String,

    /// Delay between reconnection attempts (default: 2000ms)
    pub reconnect_delay_ms: u64,

    /// Reconnection attempts after an abnormal close (default: 5)
    pub max_reconnect_attempts: u32,

    /// Idle time after the last keystroke before `typing:false` is sent (default: 1000ms)
    pub typing_idle_ms: u64,

    /// How long a first send waits for the socket to come online (default: 5000ms)
    pub connect_timeout_ms: u64,

    /// TTL of cached GET responses (default: 5 minutes)
    pub cache_ttl_ms: u64,

    /// TTL of the resolved identity (default: 5 minutes)
    pub auth_cache_ttl_ms: u64,

    /// Minimum age of the seller snapshot before opening the panel refreshes it (default: 10s)
    pub refresh_min_interval_ms: u64,

    /// Seller panel polling period (default: 30s)
    pub poll_interval_ms: u64,

    /// Notification body length before truncation (default: 100 chars)
    pub notification_body_limit: usize,

    /// Page opened when a notification is clicked
    pub notification_path: String,

    /// Directory holding the local database
    pub data_dir: PathBuf,
}

impl Default for ChatConfig {
    fn default() -> Self {
        let mut data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        data_dir.push("lais");

        Self {
            origin: "http://localhost:8000".to_string(),
            api_prefix: "/api/v1".to_string(),
            reconnect_delay_ms: 2000,
            max_reconnect_attempts: 5,
            typing_idle_ms: 1000,
            connect_timeout_ms: 5000,
            cache_ttl_ms: 5 * 60 * 1000,
            auth_cache_ttl_ms: 5 * 60 * 1000,
            refresh_min_interval_ms: 10_000,
            poll_interval_ms: 30_000,
            notification_body_limit: 100,
            notification_path: "/profile".to_string(),
            data_dir,
        }
    }
}

impl ChatConfig {
    /// Load a config from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        Url::parse(&config.origin)?;
        Ok(config)
    }

    /// Config pointing at `origin` with every other field defaulted
    pub fn with_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }

    /// Absolute URL of an API path, e.g. `/chat/chats` -> `{origin}/api/v1/chat/chats`
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}{}{}",
            self.origin.trim_end_matches('/'),
            self.api_prefix,
            path
        )
    }

    /// Socket URL for a conversation. `wss` iff the origin is `https`.
    pub fn socket_url(&self, chat_id: i64, user_id: &str) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.origin)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // http(s) -> ws(s) is an allowed special-scheme switch
        let _ = url.set_scheme(scheme);
        url.set_path(&format!("{}/chat/ws/{}", self.api_prefix, chat_id));
        url.query_pairs_mut().clear().append_pair("user_id", user_id);
        Ok(url)
    }

    /// URL a notification click navigates to
    pub fn notification_url(&self) -> String {
        format!(
            "{}{}",
            self.origin.trim_end_matches('/'),
            self.notification_path
        )
    }

    /// Location of the SQLite database inside `data_dir`
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("lais.db")
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn auth_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.auth_cache_ttl_ms)
    }

    pub fn refresh_min_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_min_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.api_prefix, "/api/v1");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.typing_idle(), Duration::from_secs(1));
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert!(config.data_dir.ends_with("lais"));
    }

    #[test]
    fn test_socket_url_scheme_follows_origin() {
        let plain = ChatConfig::with_origin("http://localhost:8000");
        assert_eq!(
            plain.socket_url(42, "abc").unwrap().as_str(),
            "ws://localhost:8000/api/v1/chat/ws/42?user_id=abc"
        );

        let secure = ChatConfig::with_origin("https://market.example");
        assert_eq!(
            secure.socket_url(42, "7").unwrap().as_str(),
            "wss://market.example/api/v1/chat/ws/42?user_id=7"
        );
    }

    #[test]
    fn test_api_and_notification_urls() {
        let config = ChatConfig::with_origin("https://market.example/");
        assert_eq!(
            config.api_url("/auth/me"),
            "https://market.example/api/v1/auth/me"
        );
        assert_eq!(config.notification_url(), "https://market.example/profile");
    }

    #[test]
    fn test_load_fills_missing_fields() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"{"origin": "https://market.example", "poll_interval_ms": 5000}"#,
        )
        .unwrap();

        let config = ChatConfig::load(file.path()).unwrap();
        assert_eq!(config.origin, "https://market.example");
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.reconnect_delay_ms, 2000);
    }

    #[test]
    fn test_load_rejects_bad_origin() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"origin": "not a url"}"#).unwrap();
        assert!(ChatConfig::load(file.path()).is_err());
    }
}
