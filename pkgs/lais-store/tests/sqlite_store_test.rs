// Tests for the SQLite-backed durable store and cache persistence on top of it

use lais_store::{
    DurableStore, ManualClock, ResponseCache, SqliteStore, StoreConfig, CACHE_STORAGE_KEY,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

async fn create_test_store(path: &NamedTempFile) -> SqliteStore {
    SqliteStore::open(path.path().to_path_buf())
        .await
        .expect("Failed to open store")
}

#[tokio::test]
async fn test_set_and_get_value() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;

    store
        .set("anonymous_user_id", "3f0c")
        .await
        .expect("Failed to set value");

    let value = store.get("anonymous_user_id").await.unwrap();
    assert_eq!(value.as_deref(), Some("3f0c"));
}

#[tokio::test]
async fn test_update_existing_value() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;

    store.set("k", "initial").await.unwrap();
    store.set("k", "updated").await.unwrap();

    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("updated"));
    assert_eq!(store.keys().await.unwrap(), vec!["k".to_string()]);
}

#[tokio::test]
async fn test_get_missing_value() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;

    assert!(store.get("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_value() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;

    store.set("k", "v").await.unwrap();
    assert!(store.remove("k").await.unwrap());
    assert!(!store.remove("k").await.unwrap());
    assert!(store.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn test_values_survive_reopen() {
    let temp_file = NamedTempFile::new().unwrap();
    {
        let store = create_test_store(&temp_file).await;
        store.set("notification_permission_asked", "true").await.unwrap();
    }

    let reopened = create_test_store(&temp_file).await;
    assert_eq!(
        reopened
            .get("notification_permission_asked")
            .await
            .unwrap()
            .as_deref(),
        Some("true")
    );
}

#[tokio::test]
async fn test_quota_rejects_oversized_write() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = SqliteStore::with_config(StoreConfig {
        db_path: temp_file.path().to_path_buf(),
        max_bytes: Some(32),
    })
    .await
    .unwrap();

    store.set("a", "small").await.unwrap();
    let err = store.set("b", &"x".repeat(64)).await.unwrap_err();

    assert!(err.is_quota_exceeded());
    assert!(store.get("b").await.unwrap().is_none());
    assert_eq!(store.get("a").await.unwrap().as_deref(), Some("small"));
}

#[tokio::test]
async fn test_response_cache_persists_in_sqlite() {
    let temp_file = NamedTempFile::new().unwrap();
    let clock = ManualClock::new(1_000);

    {
        let store = Arc::new(create_test_store(&temp_file).await);
        let cache = ResponseCache::open(store, Arc::new(clock.clone())).await;
        cache
            .set_with_ttl(
                "GET:/api/v1/posts/iphone?id=7",
                json!({"model": "iPhone 13"}),
                Duration::from_secs(60),
            )
            .await;
    }

    let store = Arc::new(create_test_store(&temp_file).await);
    assert!(store.get(CACHE_STORAGE_KEY).await.unwrap().is_some());

    let cache = ResponseCache::open(store, Arc::new(clock)).await;
    assert_eq!(
        cache.get("GET:/api/v1/posts/iphone?id=7").await,
        Some(json!({"model": "iPhone 13"}))
    );
}
