//! HTTP transport abstraction.
//!
//! Thin seam between client orchestration and the concrete HTTP stack so
//! challenge replays, identify reports, and tests all drive the same path.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http transport error: {0}")]
    Transport(String),
}

/// Minimal response representation shared across the crate.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
}

impl TransportResponse {
    /// Header value as UTF-8, when present and readable.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Contract that abstracts the underlying HTTP stack.
///
/// Implementations should preserve cookies and other stateful data between
/// calls so the session behaves consistently across replays.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<TransportResponse, TransportError>;
}

/// Context about a request captured before its first send, so a replay can
/// resend identical content. Bodies are owned bytes by construction; there
/// is no one-shot stream to lose.
#[derive(Debug, Clone)]
pub struct OriginalRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl OriginalRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Option<Vec<u8>>) -> Self {
        self.body = body;
        self
    }
}

/// Reqwest-backed transport with a cookie store, so replays carry the same
/// session the original request established.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing reqwest client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers.clone());
        if let Some(data) = body {
            builder = builder.body(data.to_vec());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| TransportError::Transport(err.to_string()))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::Transport(err.to_string()))?;

        Ok(TransportResponse {
            status,
            headers,
            body,
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn original_request_captures_body_before_send() {
        let request = OriginalRequest::new(
            Method::POST,
            Url::parse("https://example.com/session").unwrap(),
        )
        .with_body(Some(b"payload".to_vec()));
        assert_eq!(request.body.as_deref(), Some(b"payload".as_slice()));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("x-pow-reason", "slow down".parse().unwrap());
        let response = TransportResponse {
            status: 423,
            headers,
            body: Bytes::new(),
            url: Url::parse("https://example.com").unwrap(),
        };
        assert_eq!(response.header_str("X-PoW-Reason"), Some("slow down"));
        assert_eq!(response.header_str("x-pow-reason"), Some("slow down"));
        assert!(response.header_str("x-missing").is_none());
    }
}
