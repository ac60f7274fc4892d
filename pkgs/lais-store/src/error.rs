//! Error types for storage operations

use thiserror::Error;

/// Errors that can occur while reading or writing durable storage
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage quota exceeded writing '{key}' ({needed} bytes, limit {limit})")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid database path: {0}")]
    InvalidPath(String),
}

impl StoreError {
    /// Whether the failure was caused by running out of storage space
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }
}
