//! Test utilities for rebound crates.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rebound_http::{
    EventKind, HttpClient, RequestEvent, Response, StatusCode, Transport, TransportError,
    TransportRequest,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Install a test-friendly tracing subscriber once per process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,rebound_http=debug"));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// One scripted outcome for a URL.
#[derive(Debug, Clone)]
pub enum Step {
    /// Answer with a status and body, optionally after a delay.
    Respond {
        status: u16,
        body: Bytes,
        delay: Option<Duration>,
    },
    /// Reject at the transport level.
    Fail(String),
}

impl Step {
    pub fn status(status: u16) -> Self {
        Self::json(status, serde_json::json!({}))
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::Respond {
            status,
            body: Bytes::from(body.to_string()),
            delay: None,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::Respond {
            status,
            body: Bytes::copy_from_slice(body.as_bytes()),
            delay: None,
        }
    }

    /// Delay this step's response.
    pub fn after(self, latency: Duration) -> Self {
        match self {
            Self::Respond { status, body, .. } => Self::Respond {
                status,
                body,
                delay: Some(latency),
            },
            fail => fail,
        }
    }
}

/// In-memory transport replaying scripted steps per URL.
///
/// Steps are consumed in order; the last step for a URL repeats forever.
/// Unscripted URLs fail at the transport level.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Step>>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append steps for `url`.
    pub fn script(&self, url: &str, steps: impl IntoIterator<Item = Step>) -> &Self {
        self.routes
            .lock()
            .entry(url.to_string())
            .or_default()
            .extend(steps);
        self
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received for `url`.
    pub fn calls(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.url == url).count()
    }

    fn next_step(&self, url: &str) -> Option<Step> {
        let mut routes = self.routes.lock();
        let steps = routes.get_mut(url)?;
        if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<Response, TransportError> {
        let url = request.url.clone();
        self.requests.lock().push(request);

        match self.next_step(&url) {
            Some(Step::Respond {
                status,
                body,
                delay,
            }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let status = StatusCode::from_u16(status)
                    .map_err(|e| TransportError::with_source("invalid scripted status", e))?;
                Ok(Response::new(status, body).with_url(url))
            }
            Some(Step::Fail(message)) => Err(TransportError::new(message)),
            None => Err(TransportError::new(format!("no script for {}", url))),
        }
    }
}

/// A lifecycle event reduced to owned, comparable data.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub kind: EventKind,
    pub url: String,
    pub attempt: Option<u32>,
    pub status: Option<u16>,
}

impl RecordedEvent {
    fn from_event(event: &RequestEvent<'_>) -> Self {
        let status = match event {
            RequestEvent::End { response, .. } => Some(response.status().as_u16()),
            RequestEvent::Error { error, .. } => error.status(),
            RequestEvent::Retry { error, .. } => Some(error.status()),
            RequestEvent::Start { .. } => None,
        };
        Self {
            kind: event.kind(),
            url: event.url().to_string(),
            attempt: event.attempt(),
            status,
        }
    }
}

/// Records every lifecycle event a client emits.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl EventRecorder {
    /// Subscribe a new recorder to all event kinds of `client`.
    pub fn attach(client: &HttpClient) -> Self {
        let recorder = Self::default();
        for kind in EventKind::ALL {
            let events = recorder.events.clone();
            client.on(kind, move |event| {
                events.lock().push(RecordedEvent::from_event(event));
            });
        }
        recorder
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    /// Events recorded for one URL.
    pub fn for_url(&self, url: &str) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.url == url)
            .cloned()
            .collect()
    }
}

/// Assert that a Result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

/// Assert that a Result is Err and return the error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
            Err(e) => e,
        }
    };
}
