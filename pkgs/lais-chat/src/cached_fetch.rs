//! GET requests served through the response cache

use lais_store::ResponseCache;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::HttpError;
use crate::http::{HttpClient, HttpRequest, HttpResponse, Method};

/// HTTP client wrapper that answers cacheable GETs from [`ResponseCache`]
pub struct CachedFetch {
    http: Arc<dyn HttpClient>,
    cache: Arc<ResponseCache>,
}

impl CachedFetch {
    pub fn new(http: Arc<dyn HttpClient>, cache: Arc<ResponseCache>) -> Self {
        Self { http, cache }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Perform `request`, consulting the cache for GETs with a non-zero `ttl`.
    ///
    /// Only 2xx responses whose body is valid JSON are stored.
    pub async fn fetch(
        &self,
        request: HttpRequest,
        ttl: Duration,
    ) -> Result<HttpResponse, HttpError> {
        if request.method != Method::Get || ttl.is_zero() {
            return self.http.execute(request).await;
        }

        let key = cache_key(&request);
        if let Some(data) = self.cache.get(&key).await {
            return Ok(HttpResponse::json_ok(&data));
        }

        let response = self.http.execute(request).await?;
        if response.is_success() {
            match serde_json::from_slice::<Value>(&response.body) {
                Ok(data) => self.cache.set_with_ttl(&key, data, ttl).await,
                Err(_) => debug!("Not caching non-JSON response for {}", key),
            }
        }

        Ok(response)
    }
}

/// Cache key of a request: `METHOD:URL`
pub fn cache_key(request: &HttpRequest) -> String {
    format!("{}:{}", request.method.as_str(), request.url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use lais_store::{ManualClock, MemoryStore};
    use parking_lot::Mutex;
    use serde_json::json;

    struct CountingHttp {
        calls: Mutex<usize>,
        response: HttpResponse,
    }

    #[async_trait]
    impl HttpClient for CountingHttp {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, HttpError> {
            *self.calls.lock() += 1;
            Ok(self.response.clone())
        }
    }

    async fn fetcher(response: HttpResponse) -> (CachedFetch, Arc<CountingHttp>, ManualClock) {
        let http = Arc::new(CountingHttp {
            calls: Mutex::new(0),
            response,
        });
        let clock = ManualClock::new(0);
        let cache = ResponseCache::open(Arc::new(MemoryStore::new()), Arc::new(clock.clone())).await;
        (
            CachedFetch::new(http.clone(), Arc::new(cache)),
            http,
            clock,
        )
    }

    #[tokio::test]
    async fn test_get_hit_skips_network() {
        let (fetch, http, _) = fetcher(HttpResponse::json_ok(&json!({"model": "iPhone"}))).await;
        let request = HttpRequest::get("http://h/api/v1/posts/iphone?id=1");

        fetch.fetch(request.clone(), Duration::from_secs(60)).await.unwrap();
        let second = fetch.fetch(request, Duration::from_secs(60)).await.unwrap();

        assert_eq!(*http.calls.lock(), 1);
        assert_eq!(second.status, 200);
        assert_eq!(second.json::<Value>().unwrap(), json!({"model": "iPhone"}));
    }

    #[tokio::test]
    async fn test_expired_entry_refetches() {
        let (fetch, http, clock) = fetcher(HttpResponse::json_ok(&json!(1))).await;
        let request = HttpRequest::get("http://h/a");

        fetch.fetch(request.clone(), Duration::from_secs(1)).await.unwrap();
        clock.advance(Duration::from_millis(1001));
        fetch.fetch(request, Duration::from_secs(1)).await.unwrap();

        assert_eq!(*http.calls.lock(), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_and_post_bypass_cache() {
        let (fetch, http, _) = fetcher(HttpResponse::json_ok(&json!(1))).await;

        fetch.fetch(HttpRequest::get("http://h/a"), Duration::ZERO).await.unwrap();
        fetch.fetch(HttpRequest::get("http://h/a"), Duration::ZERO).await.unwrap();
        fetch
            .fetch(HttpRequest::post("http://h/a", None), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(*http.calls.lock(), 3);
        assert!(fetch.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_and_non_json_responses_not_cached() {
        let (fetch, _, _) = fetcher(HttpResponse {
            status: 500,
            content_type: None,
            body: Bytes::from_static(b"{}"),
        })
        .await;
        fetch.fetch(HttpRequest::get("http://h/a"), Duration::from_secs(60)).await.unwrap();
        assert!(fetch.cache().is_empty().await);

        let (fetch, _, _) = fetcher(HttpResponse {
            status: 200,
            content_type: Some("text/html".to_string()),
            body: Bytes::from_static(b"<html>"),
        })
        .await;
        fetch.fetch(HttpRequest::get("http://h/a"), Duration::from_secs(60)).await.unwrap();
        assert!(fetch.cache().is_empty().await);
    }

    #[test]
    fn test_cache_key_format() {
        let request = HttpRequest::get("http://h/api/v1/feed");
        assert_eq!(cache_key(&request), "GET:http://h/api/v1/feed");
    }
}
