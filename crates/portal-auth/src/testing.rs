//! Test doubles for the transport and navigator seams.
//!
//! Available to this crate's tests and, with the `testing` feature, to
//! downstream test code.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Method, StatusCode};
use tokio::sync::watch;
use url::Url;

use crate::config::request_path;
use crate::error::{AuthError, Result};
use crate::navigator::Navigator;
use crate::transport::{ApiRequest, ApiResponse, Transport};

// ─────────────────────────────────────────────────────────────────────────────
// MockTransport
// ─────────────────────────────────────────────────────────────────────────────

/// A scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Empty body with the given status.
    Status(StatusCode),
    /// JSON body with the given status.
    Json(StatusCode, serde_json::Value),
    /// Fail at the network level.
    NetworkError(String),
}

impl MockReply {
    /// Shorthand for `Status(200)`.
    pub fn ok() -> Self {
        MockReply::Status(StatusCode::OK)
    }

    /// Shorthand for `Status(401)`.
    pub fn unauthorized() -> Self {
        MockReply::Status(StatusCode::UNAUTHORIZED)
    }

    /// Shorthand for a 200 JSON reply.
    pub fn json(body: serde_json::Value) -> Self {
        MockReply::Json(StatusCode::OK, body)
    }

    fn into_result(self) -> Result<ApiResponse> {
        match self {
            MockReply::Status(status) => Ok(ApiResponse::new(status)),
            MockReply::Json(status, body) => Ok(ApiResponse::with_json(status, &body)),
            MockReply::NetworkError(message) => Err(AuthError::Network(message)),
        }
    }
}

/// Holds replies on a route until opened.
#[derive(Debug)]
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    /// Release every held and future request on the route.
    pub fn open(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Default)]
struct Route {
    replies: VecDeque<MockReply>,
    gate: Option<watch::Receiver<bool>>,
}

type RouteKey = (Method, String);

/// Transport that answers from per-route scripts and records every request.
///
/// Replies for a route are consumed in order; the last one repeats. Routes
/// without a script answer 404.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<RouteKey, Route>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reply to the script for `method path`.
    pub fn on(&self, method: Method, path: &str, reply: MockReply) -> &Self {
        self.routes
            .lock()
            .entry((method, request_path(path)))
            .or_default()
            .replies
            .push_back(reply);
        self
    }

    /// Append `times` copies of a reply.
    pub fn on_times(&self, method: Method, path: &str, reply: MockReply, times: usize) -> &Self {
        for _ in 0..times {
            self.on(method.clone(), path, reply.clone());
        }
        self
    }

    /// Hold replies on `method path` until the returned gate is opened.
    pub fn gate(&self, method: Method, path: &str) -> Gate {
        let (tx, rx) = watch::channel(false);
        self.routes
            .lock()
            .entry((method, request_path(path)))
            .or_default()
            .gate = Some(rx);
        Gate { tx }
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().clone()
    }

    /// Requests sent to `path`, in order.
    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        let path = request_path(path);
        self.log
            .lock()
            .iter()
            .filter(|r| r.path() == path)
            .cloned()
            .collect()
    }

    /// Number of requests sent to `method path`.
    pub fn calls(&self, method: Method, path: &str) -> usize {
        let path = request_path(path);
        self.log
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path() == path)
            .count()
    }

    /// Total number of requests sent.
    pub fn total_calls(&self) -> usize {
        self.log.lock().len()
    }

    fn next_reply(&self, key: &RouteKey) -> (Option<MockReply>, Option<watch::Receiver<bool>>) {
        let mut routes = self.routes.lock();
        match routes.get_mut(key) {
            Some(route) => {
                let reply = if route.replies.len() > 1 {
                    route.replies.pop_front()
                } else {
                    route.replies.front().cloned()
                };
                (reply, route.gate.clone())
            }
            None => (None, None),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let key = (request.method.clone(), request.path());
        self.log.lock().push(request);

        let (reply, gate) = self.next_reply(&key);

        if let Some(mut gate) = gate {
            // A dropped gate counts as open
            let _ = gate.wait_for(|open| *open).await;
        }

        match reply {
            Some(reply) => reply.into_result(),
            None => Ok(ApiResponse::new(StatusCode::NOT_FOUND)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RecordingNavigator
// ─────────────────────────────────────────────────────────────────────────────

/// Navigator that records navigations and follows them.
#[derive(Debug)]
pub struct RecordingNavigator {
    current: Mutex<String>,
    visits: Mutex<Vec<String>>,
}

impl Default for RecordingNavigator {
    fn default() -> Self {
        Self::at("/")
    }
}

impl RecordingNavigator {
    /// Create a navigator showing `path`.
    pub fn at(path: &str) -> Self {
        Self {
            current: Mutex::new(path.to_string()),
            visits: Mutex::new(Vec::new()),
        }
    }

    /// Move to `path` without recording a navigation (user clicked a link).
    pub fn set_path(&self, path: &str) {
        *self.current.lock() = path.to_string();
    }

    /// URLs navigated to, in order.
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().clone()
    }

    /// Number of navigations.
    pub fn visit_count(&self) -> usize {
        self.visits.lock().len()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) {
        self.visits.lock().push(url.to_string());
        // External URLs (the OAuth entry point) leave the app route alone
        if Url::parse(url).is_err() {
            *self.current.lock() = request_path(url);
        }
    }

    fn current_path(&self) -> String {
        self.current.lock().clone()
    }
}
