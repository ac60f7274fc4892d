//! Request/response transport
//!
//! [`HttpClient`] is the seam every backend call goes through. The production
//! implementation wraps `reqwest`; tests substitute an in-process fake.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::HttpError;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// An outgoing request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    /// Send ambient credentials (session cookies) with the request
    pub credentials: bool,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            credentials: false,
        }
    }

    pub fn post(url: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body,
            credentials: false,
        }
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            url: url.into(),
            body: None,
            credentials: false,
        }
    }

    pub fn with_credentials(mut self) -> Self {
        self.credentials = true;
        self
    }
}

/// A completed response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// A 200 response carrying `value` as its JSON body
    pub fn json_ok(value: &Value) -> Self {
        Self {
            status: 200,
            content_type: Some(JSON_CONTENT_TYPE.to_string()),
            body: Bytes::from(value.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Fail on non-2xx, otherwise decode the body
    pub fn json_success<T: DeserializeOwned>(&self, url: &str) -> Result<T, HttpError> {
        self.ensure_success(url)?;
        self.json()
    }

    pub fn ensure_success(&self, url: &str) -> Result<(), HttpError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(HttpError::Status {
                status: self.status,
                url: url.to_string(),
            })
        }
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// [`HttpClient`] backed by `reqwest`
///
/// Credentialed requests share a cookie jar; anonymous requests never see it.
pub struct ReqwestClient {
    anonymous: reqwest::Client,
    credentialed: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self, HttpError> {
        Ok(Self {
            anonymous: reqwest::Client::builder().build()?,
            credentialed: reqwest::Client::builder().cookie_store(true).build()?,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        debug!("{} {}", request.method.as_str(), request.url);

        let client = if request.credentials {
            &self.credentialed
        } else {
            &self.anonymous
        };

        let builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Post => client.post(&request.url),
            Method::Delete => client.delete(&request.url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}
