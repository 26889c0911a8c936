// Base transport contract and the reqwest-backed implementation

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};

use crate::auth::Headers;
use crate::error::TransportError;

/// Per-call request options
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: Headers,
    pub body: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Headers::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Result<Self> {
        let body = serde_json::to_string(value).context("Failed to serialize JSON body")?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self.body = Some(body);
        Ok(self)
    }
}

/// The lower-level HTTP layer the authenticated fetch wraps.
///
/// Non-success responses must surface as [`TransportError::Status`] so the
/// fetch wrapper can recognize a 401.
#[async_trait]
pub trait Transport: Send + Sync {
    type Output: Send;

    async fn fetch(&self, path: &str, options: RequestOptions) -> Result<Self::Output, TransportError>;
}

/// Transport backed by a closure
pub struct TransportFn<F>(F);

/// Adapt `Fn(path, options) -> Future` into a [`Transport`]
pub fn transport_fn<F>(f: F) -> TransportFn<F> {
    TransportFn(f)
}

#[async_trait]
impl<F, Fut, O> Transport for TransportFn<F>
where
    F: Fn(String, RequestOptions) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, TransportError>> + Send + 'static,
    O: Send + 'static,
{
    type Output = O;

    async fn fetch(&self, path: &str, options: RequestOptions) -> Result<O, TransportError> {
        (self.0)(path.to_string(), options).await
    }
}

/// Successful HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    /// Deserialize the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).context("Failed to parse response body as JSON")
    }
}

/// reqwest-backed transport. Owns timeouts and connection pooling.
pub struct ReqwestTransport {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Prefix for relative paths
    base_url: String,
}

impl ReqwestTransport {
    /// Create a new transport
    pub fn new(
        base_url: impl Into<String>,
        max_connections: usize,
        connect_timeout: u64,
        request_timeout: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Absolute URLs pass through; anything else is joined onto the base URL
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    type Output = HttpResponse;

    async fn fetch(&self, path: &str, options: RequestOptions) -> Result<HttpResponse, TransportError> {
        let url = self.resolve_url(path);
        let method = options.method.clone();

        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let mut request = self.client.request(options.method, &url);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = options.body {
            request = request.body(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                // Categorize the error for better debugging
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection_failed"
                } else if e.is_request() {
                    "request_error"
                } else if e.is_body() {
                    "body_error"
                } else if e.is_decode() {
                    "decode_error"
                } else {
                    "unknown"
                };

                tracing::warn!(
                    error_kind = error_kind,
                    error = %e,
                    url = %url,
                    "HTTP request error"
                );

                return Err(TransportError::Other(anyhow::anyhow!(
                    "HTTP request failed: {} (kind: {})",
                    e,
                    error_kind
                )));
            }
        };

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Other(anyhow::Error::new(e).context("Failed to read response body")))?;

        if !status.is_success() {
            tracing::warn!(
                status = status.as_u16(),
                url = %url,
                "Received error response"
            );
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(status = %status, "Request successful");

        Ok(HttpResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}
