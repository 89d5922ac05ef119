//! The transport seam and its reqwest-backed default.

use crate::error::TransportError;
use crate::response::Response;
use async_trait::async_trait;
use bytes::Bytes;
use rebound_config::TransportConfig;
use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, Method};

/// A fully resolved request handed to the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Performs a single HTTP exchange.
///
/// Implementations must be cancel-safe: the client cancels an attempt by
/// dropping the returned future when its timeout elapses.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<Response, TransportError>;
}

/// Build a configured reqwest client.
///
/// No overall request timeout is set here; deadlines are enforced per attempt
/// by the client.
pub fn build_client(config: &TransportConfig) -> Result<Client, TransportError> {
    let mut builder = ClientBuilder::new()
        .connect_timeout(config.connect_timeout())
        .user_agent(&config.user_agent)
        .pool_max_idle_per_host(config.pool_max_idle_per_host);

    if config.gzip {
        builder = builder.gzip(true);
    }

    builder
        .build()
        .map_err(|e| TransportError::with_source("failed to build HTTP client", e))
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: Client,
}

impl ReqwestTransport {
    /// Create a transport with default settings.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(&TransportConfig::default())
    }

    /// Create a transport with custom settings.
    pub fn with_config(config: &TransportConfig) -> Result<Self, TransportError> {
        Ok(Self {
            inner: build_client(config)?,
        })
    }

    /// Wrap an existing client.
    pub fn from_client(inner: Client) -> Self {
        Self { inner }
    }

    /// Get the inner reqwest client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<Response, TransportError> {
        let mut builder = self
            .inner
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        let body = response.bytes().await?;

        Ok(Response::new(status, body)
            .with_headers(headers)
            .with_url(url))
    }
}
