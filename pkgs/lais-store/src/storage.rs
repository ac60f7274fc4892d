//! Durable key/value storage
//!
//! The chat core keeps a handful of small string values locally: the response
//! cache blob, the anonymous user id, per-listing UI flags and the
//! notification prompt flag. [`DurableStore`] is the seam those components
//! depend on; [`MemoryStore`] backs tests and volatile per-process state,
//! [`crate::SqliteStore`] backs real installs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

use crate::error::StoreError;

/// String key/value storage that outlives a single session
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite a value
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value, returning whether it existed
    async fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// List every stored key
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// In-memory store with an optional size quota
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    max_bytes: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an in-memory store that rejects writes beyond `max_bytes`
    pub fn with_quota(max_bytes: usize) -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            max_bytes: Some(max_bytes),
        }
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock();

        if let Some(limit) = self.max_bytes {
            let others: usize = values
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > limit {
                debug!("Rejecting write of '{}': {} > {} bytes", key, needed, limit);
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }

        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.values.lock().remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.values.lock().keys().cloned().collect())
    }
}
