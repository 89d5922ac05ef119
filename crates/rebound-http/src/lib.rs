//! Resilient HTTP client for rebound.
//!
//! [`HttpClient`] wraps a [`Transport`] with per-attempt timeouts, automatic
//! retries with exponential backoff and jitter, and synchronous lifecycle
//! events (`request:start`, `request:end`, `request:error`, `request:retry`).

pub mod client;
pub mod error;
pub mod events;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;

pub use client::{HttpClient, HttpClientBuilder};
pub use error::{HttpError, RequestError, TransportError};
pub use events::{EventBus, EventKind, Listener, RequestEvent};
pub use request::{headers, RequestOptions};
pub use response::{Response, ResponseError};
pub use retry::{RetryPolicy, ShouldRetry};
pub use transport::{build_client, ReqwestTransport, Transport, TransportRequest};

pub use rebound_config::{ClientConfig, RetryConfig, TransportConfig};
pub use reqwest::{Method, StatusCode};
