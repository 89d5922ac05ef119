//! Buffered HTTP responses.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A fully buffered response.
///
/// The body is held in memory, so it can be read as JSON or text any number
/// of times: once by the client when classifying a failure, and again by the
/// caller.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: String,
    body: Bytes,
}

impl Response {
    /// Create a response with the given status and body.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            url: String::new(),
            body: body.into(),
        }
    }

    /// Set the URL the response was received from.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Replace all headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Status in the 200-299 range.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A single header value as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ResponseError> {
        serde_json::from_slice(&self.body).map_err(|e| ResponseError::Parse {
            status: self.status.as_u16(),
            body: self.text(),
            source: e,
        })
    }

    /// Body as JSON, or an empty object when it does not parse.
    pub(crate) fn json_or_empty(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|_| Value::Object(Default::default()))
    }
}

/// Response parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("failed to parse JSON (status {status}): {source}")]
    Parse {
        status: u16,
        body: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        message: String,
        value: i32,
    }

    #[test]
    fn test_json_can_be_read_twice() {
        let response = Response::new(StatusCode::OK, r#"{"message":"hi","value":7}"#);

        let first: TestData = response.json().unwrap();
        let second: TestData = response.json().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.value, 7);
        assert_eq!(response.text(), r#"{"message":"hi","value":7}"#);
    }

    #[test]
    fn test_response_error_display() {
        let response = Response::new(StatusCode::BAD_REQUEST, "invalid json");
        let parse_error = response.json::<TestData>().unwrap_err();

        let error_string = format!("{}", parse_error);
        assert!(error_string.contains("failed to parse JSON"));
        assert!(error_string.contains("status 400"));
        let ResponseError::Parse { body, .. } = parse_error;
        assert_eq!(body, "invalid json");
    }

    #[test]
    fn test_json_or_empty() {
        let valid = Response::new(StatusCode::OK, r#"[1,2,3]"#);
        assert_eq!(valid.json_or_empty(), json!([1, 2, 3]));

        let invalid = Response::new(StatusCode::OK, "");
        assert_eq!(invalid.json_or_empty(), json!({}));
    }

    #[test]
    fn test_headers() {
        let response = Response::new(StatusCode::OK, "")
            .with_header("retry-after", "30")
            .with_header("bad header", "ignored")
            .with_url("https://api.example.com/");

        assert_eq!(response.header("retry-after"), Some("30"));
        assert_eq!(response.headers().len(), 1);
        assert_eq!(response.url(), "https://api.example.com/");
        assert!(response.is_success());
    }
}
