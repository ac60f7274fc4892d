//! Lais Store - durable local storage for the Lais chat client
//!
//! This crate provides the storage layer the chat core sits on:
//!
//! - **DurableStore**: string key/value storage that survives restarts, with an
//!   in-memory backend ([`MemoryStore`]) and a SQLite backend built on Sea-ORM
//!   ([`SqliteStore`])
//! - **ResponseCache**: TTL-keyed cache of GET responses, persisted as a single
//!   blob inside a `DurableStore`
//! - **Clock**: injectable wall clock so expiry can be driven from tests
//!
//! # Sharing
//!
//! A durable store may be shared by several processes pointing at the same
//! database file. Writes are last-writer-wins with no cross-process locking.
//! Everything written here is derived from idempotent server responses, so a
//! lost update only costs one extra network request.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use lais_store::{ResponseCache, SqliteStore, SystemClock};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::open("lais.db".into()).await?);
//! let cache = ResponseCache::open(store, Arc::new(SystemClock)).await;
//!
//! cache
//!     .set_with_ttl("GET:/api/v1/feed", serde_json::json!([1, 2, 3]), Duration::from_secs(60))
//!     .await;
//! assert!(cache.get("GET:/api/v1/feed").await.is_some());
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod entities;
pub mod error;
pub mod migration;
pub mod response_cache;
pub mod sqlite_store;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::StoreError;
pub use response_cache::{CacheEntry, ResponseCache, CACHE_STORAGE_KEY, DEFAULT_TTL};
pub use sqlite_store::SqliteStore;
pub use storage::{DurableStore, MemoryStore};

/// Configuration for the SQLite-backed store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub db_path: std::path::PathBuf,

    /// Upper bound on the total size of stored keys and values in bytes.
    /// Writes that would exceed it fail with [`StoreError::QuotaExceeded`].
    pub max_bytes: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: std::path::PathBuf::from("lais-store.db"),
            max_bytes: Some(5 * 1024 * 1024), // 5MB
        }
    }
}
