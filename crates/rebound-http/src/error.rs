//! Error types for request execution.

use crate::response::{Response, ResponseError};
use serde_json::Value;
use std::time::Duration;

/// A non-success HTTP response, classified.
///
/// Carries the status, the URL that produced it and the response body parsed
/// as JSON. Immutable once built.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct HttpError {
    message: String,
    status: u16,
    url: String,
    response_body: Option<Value>,
}

impl HttpError {
    /// Create a new HTTP error.
    pub fn new(
        message: impl Into<String>,
        status: u16,
        url: impl Into<String>,
        response_body: Option<Value>,
    ) -> Self {
        Self {
            message: message.into(),
            status,
            url: url.into(),
            response_body,
        }
    }

    /// Classify a non-success response.
    ///
    /// The body is read as JSON; anything unparseable becomes an empty object.
    pub fn from_response(response: &Response, url: impl Into<String>) -> Self {
        let status = response.status();
        let message = match status.canonical_reason() {
            Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
            None => format!("HTTP {}", status.as_u16()),
        };
        Self::new(message, status.as_u16(), url, Some(response.json_or_empty()))
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Parsed body, if one was captured.
    pub fn response_body(&self) -> Option<&Value> {
        self.response_body.as_ref()
    }

    /// Whether the status equals `status`.
    pub fn has_status(&self, status: u16) -> bool {
        self.status == status
    }

    /// Whether the status lies in `min..=max`.
    pub fn has_status_in_range(&self, min: u16, max: u16) -> bool {
        (min..=max).contains(&self.status)
    }

    /// 4xx status.
    pub fn is_client_error(&self) -> bool {
        self.has_status_in_range(400, 499)
    }

    /// 5xx status.
    pub fn is_server_error(&self) -> bool {
        self.has_status_in_range(500, 599)
    }

    /// Substring search over the JSON-serialized body.
    ///
    /// Returns `false` when no body was captured.
    pub fn response_contains(&self, needle: &str) -> bool {
        self.response_body
            .as_ref()
            .map(|body| body.to_string().contains(needle))
            .unwrap_or(false)
    }
}

/// Failure of the underlying transport (DNS, connection reset, bad request).
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    /// Create a transport error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let message = if e.is_connect() {
            "connection failed"
        } else if e.is_body() || e.is_decode() {
            "failed to read response body"
        } else if e.is_builder() {
            "invalid request"
        } else {
            "request failed"
        };
        Self::with_source(message, e)
    }
}

/// Terminal failure of a request, after any retries.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Non-success response.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The attempt exceeded its deadline. Never retried.
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// Any other transport rejection. Never retried.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A successful body could not be decoded.
    #[error(transparent)]
    Decode(#[from] ResponseError),
}

impl RequestError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout { .. })
    }

    /// The classified HTTP error, if this is one.
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            RequestError::Http(e) => Some(e),
            _ => None,
        }
    }

    /// Status of the classified response, if any.
    pub fn status(&self) -> Option<u16> {
        self.as_http().map(HttpError::status)
    }
}
