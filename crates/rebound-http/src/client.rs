//! The retrying HTTP client.

use crate::error::{HttpError, RequestError, TransportError};
use crate::events::{EventBus, EventKind, RequestEvent};
use crate::request::{header_map, join_url, merge_headers, RequestOptions};
use crate::response::Response;
use crate::retry::{RetryPolicy, ShouldRetry};
use crate::transport::{ReqwestTransport, Transport, TransportRequest};
use rebound_config::{ClientConfig, RetryConfig, TransportConfig};
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// HTTP client with per-attempt timeouts, retries and lifecycle events.
///
/// Cloning is cheap; clones share the transport and the listener table.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    default_headers: HeaderMap,
    retry: RetryPolicy,
    events: Arc<EventBus>,
}

impl HttpClient {
    /// Create a client with default config and the reqwest transport.
    pub fn new() -> Result<Self, TransportError> {
        Self::builder().build()
    }

    /// Create a client with custom config and the reqwest transport.
    pub fn with_config(config: ClientConfig) -> Result<Self, TransportError> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to lifecycle events.
    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&RequestEvent<'_>) + Send + Sync + 'static,
    {
        self.events.on(kind, listener);
    }

    /// Issue a request, retrying classified failures per the retry policy.
    ///
    /// Resolves with the first successful response. Otherwise fails with the
    /// last attempt's error: an [`HttpError`] for a non-success status, a
    /// timeout, or the raw transport error.
    pub async fn request(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, RequestError> {
        let url = join_url(self.config.base_url.as_deref(), url);
        let mut attempt = 1;

        loop {
            let error = match self.attempt(&url, &options, attempt).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            self.events.emit(&RequestEvent::Error {
                url: &url,
                error: &error,
                attempt,
            });

            let http_error = match error {
                RequestError::Http(e) if self.retry.allows(&e, attempt) => e,
                error => {
                    tracing::debug!(attempt, "{} {} failed: {}", options.method, url, error);
                    return Err(error);
                }
            };

            self.events.emit(&RequestEvent::Retry {
                url: &url,
                error: &http_error,
                attempt,
            });

            let delay = self.retry.compute_delay(attempt);
            tracing::warn!(
                attempt,
                status = http_error.status(),
                delay_ms = delay.as_millis() as u64,
                "Retrying {} {}",
                options.method,
                url
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Issue a request and deserialize the successful body as JSON.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<T, RequestError> {
        let response = self.request(url, options).await?;
        Ok(response.json()?)
    }

    /// Make a GET request.
    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<Response, RequestError> {
        self.request(url, options.method(Method::GET)).await
    }

    /// Make a POST request.
    pub async fn post(&self, url: &str, options: RequestOptions) -> Result<Response, RequestError> {
        self.request(url, options.method(Method::POST)).await
    }

    /// Make a PUT request.
    pub async fn put(&self, url: &str, options: RequestOptions) -> Result<Response, RequestError> {
        self.request(url, options.method(Method::PUT)).await
    }

    /// Make a DELETE request.
    pub async fn delete(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, RequestError> {
        self.request(url, options.method(Method::DELETE)).await
    }

    /// Make a PATCH request.
    pub async fn patch(&self, url: &str, options: RequestOptions) -> Result<Response, RequestError> {
        self.request(url, options.method(Method::PATCH)).await
    }

    /// Make a HEAD request.
    pub async fn head(&self, url: &str, options: RequestOptions) -> Result<Response, RequestError> {
        self.request(url, options.method(Method::HEAD)).await
    }

    /// One attempt: send, enforce the deadline, classify the response.
    async fn attempt(
        &self,
        url: &str,
        options: &RequestOptions,
        attempt: u32,
    ) -> Result<Response, RequestError> {
        self.events.emit(&RequestEvent::Start { url, options });

        let request = TransportRequest {
            method: options.method.clone(),
            url: url.to_string(),
            headers: merge_headers(&self.default_headers, &options.headers),
            body: options.body.clone(),
        };

        tracing::debug!(attempt, "Making {} request to: {}", options.method, url);
        let started = Instant::now();
        let sent = self.transport.send(request);

        // Dropping the in-flight future on expiry cancels the attempt; the
        // timer never outlives it.
        let result = match self.config.timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, sent).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(attempt, ?timeout, "{} {} timed out", options.method, url);
                    return Err(RequestError::Timeout {
                        url: url.to_string(),
                        timeout,
                    });
                }
            },
            None => sent.await,
        };

        let response = result?;
        let duration = started.elapsed();

        self.events.emit(&RequestEvent::End {
            url,
            response: &response,
            duration,
        });
        tracing::debug!(
            "{} response: {} {} ({:?})",
            options.method,
            response.status(),
            url,
            duration
        );

        if !response.is_success() {
            return Err(HttpError::from_response(&response, url).into());
        }
        Ok(response)
    }

}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Builder for [`HttpClient`].
#[derive(Default)]
pub struct HttpClientBuilder {
    config: ClientConfig,
    transport_config: TransportConfig,
    transport: Option<Arc<dyn Transport>>,
    should_retry: ShouldRetry,
}

impl HttpClientBuilder {
    /// Replace the whole client config.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the retry config.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the custom retry predicate.
    ///
    /// It runs only for retryable statuses on attempts within `max_retries`.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&HttpError, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = ShouldRetry::new(predicate);
        self
    }

    /// Set the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    /// Add a default header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config = self.config.with_header(name, value);
        self
    }

    /// Set the base URL for relative paths.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Settings for the default transport. Ignored if a transport is supplied.
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    /// Use a custom transport.
    pub fn transport<T: Transport + 'static>(mut self, transport: Arc<T>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<HttpClient, TransportError> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::with_config(&self.transport_config)?),
        };

        Ok(HttpClient {
            transport,
            default_headers: header_map(&self.config.headers),
            retry: RetryPolicy::new(self.config.retry.clone()).with_should_retry(self.should_retry),
            config: self.config,
            events: Arc::new(EventBus::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use std::collections::VecDeque;

    /// Replays canned statuses in order, repeating the last one.
    struct StatusSequence {
        statuses: Mutex<VecDeque<u16>>,
        requests: Mutex<Vec<TransportRequest>>,
    }

    impl StatusSequence {
        fn new(statuses: &[u16]) -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(statuses.iter().copied().collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl Transport for StatusSequence {
        async fn send(&self, request: TransportRequest) -> Result<Response, TransportError> {
            self.requests.lock().push(request);
            let mut statuses = self.statuses.lock();
            let next = if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().copied()
            };
            let status = next.ok_or_else(|| TransportError::new("no scripted status"))?;
            let status = StatusCode::from_u16(status)
                .map_err(|e| TransportError::with_source("bad status", e))?;
            Ok(Response::new(status, r#"{"ok":false}"#))
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            initial_delay_ms: 1,
            max_delay_ms: 4,
            jitter: 0.0,
            ..RetryConfig::default()
        }
    }

    /// Answers 200 after a fixed latency.
    struct Delayed(Duration);

    #[async_trait]
    impl Transport for Delayed {
        async fn send(&self, _request: TransportRequest) -> Result<Response, TransportError> {
            tokio::time::sleep(self.0).await;
            Ok(Response::new(StatusCode::OK, ""))
        }
    }

    #[test]
    fn test_client_creation() {
        let client = HttpClient::new();
        assert!(client.is_ok());
    }

    #[test]
    fn test_builder_applies_config() {
        let client = HttpClient::builder()
            .base_url("https://api.example.com")
            .header("x-api-key", "secret")
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();

        assert_eq!(client.config().base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(client.config().timeout(), Some(Duration::from_millis(500)));
        assert_eq!(client.default_headers.get("x-api-key").unwrap(), "secret");
        assert_eq!(client.retry_policy().config().max_retries, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_millisecond_timeout_is_not_truncated() {
        let client = HttpClient::builder()
            .transport(Arc::new(Delayed(Duration::from_micros(100))))
            .timeout(Duration::from_micros(900))
            .build()
            .unwrap();

        assert_eq!(client.config().timeout(), Some(Duration::from_millis(1)));
        let response = client.get("/fast", RequestOptions::new()).await.unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_success_is_not_retried() {
        let transport = StatusSequence::new(&[200]);
        let client = HttpClient::builder()
            .transport(transport.clone())
            .build()
            .unwrap();

        let response = client.get("/ok", RequestOptions::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let transport = StatusSequence::new(&[503, 502, 200]);
        let client = HttpClient::builder()
            .transport(transport.clone())
            .retry(fast_retry())
            .build()
            .unwrap();

        let response = client.get("/flaky", RequestOptions::new()).await.unwrap();
        assert!(response.is_success());
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_status() {
        let transport = StatusSequence::new(&[500, 500, 503]);
        let client = HttpClient::builder()
            .transport(transport.clone())
            .retry(RetryConfig {
                max_retries: 2,
                ..fast_retry()
            })
            .build()
            .unwrap();

        let error = client.get("/down", RequestOptions::new()).await.unwrap_err();
        assert_eq!(error.status(), Some(503));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_shorthands_fix_the_method() {
        let transport = StatusSequence::new(&[204]);
        let client = HttpClient::builder()
            .transport(transport.clone())
            .build()
            .unwrap();

        let options = RequestOptions::new().method(Method::OPTIONS);
        client.post("/a", options.clone()).await.unwrap();
        client.put("/a", options.clone()).await.unwrap();
        client.delete("/a", options.clone()).await.unwrap();
        client.patch("/a", options.clone()).await.unwrap();
        client.head("/a", options.clone()).await.unwrap();
        client.get("/a", options).await.unwrap();

        let methods: Vec<Method> = transport
            .requests
            .lock()
            .iter()
            .map(|r| r.method.clone())
            .collect();
        assert_eq!(
            methods,
            vec![
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
                Method::HEAD,
                Method::GET
            ]
        );
    }

    #[tokio::test]
    async fn test_request_json_decode_error() {
        let transport = StatusSequence::new(&[200]);
        let client = HttpClient::builder()
            .transport(transport)
            .build()
            .unwrap();

        let result: Result<Vec<u32>, _> = client.request_json("/a", RequestOptions::new()).await;
        assert!(matches!(result, Err(RequestError::Decode(_))));
    }
}
