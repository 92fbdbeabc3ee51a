//! Test doubles shared by the unit tests.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{FetchError, FetchErrorKind};
use crate::fetch::{FetchFuture, FetchRequest, FetchResponse, Fetcher};

type FetchOutcome = Result<FetchResponse, FetchError>;

/// A scripted fetcher: returns queued outcomes in order, repeating the last
/// one once the queue is exhausted, and records every request it saw.
pub(crate) struct MockFetcher {
    outcomes: Mutex<Vec<FetchOutcome>>,
    cursor: Mutex<usize>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
}

impl MockFetcher {
    pub fn sequence(outcomes: Vec<FetchOutcome>) -> Self {
        assert!(!outcomes.is_empty(), "MockFetcher needs at least one outcome");
        Self {
            outcomes: Mutex::new(outcomes),
            cursor: Mutex::new(0),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A single HTTP 200 response with the given JSON body.
    pub fn ok(body: Value) -> Self {
        Self::sequence(vec![Ok(Self::response(200, "OK", &body.to_string()))])
    }

    /// A fixed HTTP response with arbitrary status and body text.
    pub fn http(status: u16, status_text: &str, body: &str) -> Self {
        Self::sequence(vec![Ok(Self::response(status, status_text, body))])
    }

    /// One connect failure, then HTTP 200 with the given body.
    pub fn connect_error_then_ok(body: Value) -> Self {
        Self::sequence(vec![
            Err(FetchError {
                message: "connection refused".to_string(),
                url: "http://mock".to_string(),
                kind: FetchErrorKind::Connect,
            }),
            Ok(Self::response(200, "OK", &body.to_string())),
        ])
    }

    pub fn response(status: u16, status_text: &str, body: &str) -> FetchResponse {
        FetchResponse {
            status,
            status_text: status_text.to_string(),
            headers: Default::default(),
            body: body.to_string(),
            http_version: "HTTP/1.1".to_string(),
            url: "http://mock".to_string(),
        }
    }

    /// All requests seen so far, in order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, request: FetchRequest) -> FetchFuture<'_> {
        self.requests.lock().push(request);
        let outcomes = self.outcomes.lock();
        let mut cursor = self.cursor.lock();
        let index = (*cursor).min(outcomes.len() - 1);
        *cursor += 1;
        let outcome = outcomes[index].clone();
        Box::pin(async move { outcome })
    }
}

impl std::fmt::Debug for MockFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFetcher")
            .field("requests", &self.requests.lock().len())
            .finish()
    }
}
