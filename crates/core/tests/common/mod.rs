//! Scripted transport shared by the integration tests.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use astra::runtime::error::FetchError;
use astra::runtime::fetch::{FetchFuture, FetchRequest, FetchResponse, Fetcher};
use astra::{ClientOptions, DataApiClient, Db, DbOptions, HttpClientOptions};

pub const ENDPOINT: &str =
    "https://12341234-1234-4321-8765-123456789012-us-east-2.apps.astra.datastax.com";

/// Returns queued responses in order (repeating the last) and records every
/// request.
pub struct ScriptedFetcher {
    responses: Mutex<Vec<FetchResponse>>,
    cursor: Mutex<usize>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
}

impl ScriptedFetcher {
    pub fn new(bodies: Vec<Value>) -> Arc<Self> {
        assert!(!bodies.is_empty(), "scripted fetcher needs at least one response");
        let responses = bodies
            .into_iter()
            .map(|body| FetchResponse {
                status: 200,
                status_text: "OK".to_string(),
                headers: Default::default(),
                body: body.to_string(),
                http_version: "HTTP/2.0".to_string(),
                url: "http://scripted".to_string(),
            })
            .collect();
        Arc::new(Self {
            responses: Mutex::new(responses),
            cursor: Mutex::new(0),
            requests: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }

    pub fn request_bodies(&self) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter_map(|request| request.body)
            .filter_map(|body| serde_json::from_str(&body).ok())
            .collect()
    }
}

impl std::fmt::Debug for ScriptedFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedFetcher")
            .field("requests", &self.requests.lock().len())
            .finish()
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, request: FetchRequest) -> FetchFuture<'_> {
        self.requests.lock().push(request);
        let responses = self.responses.lock();
        let mut cursor = self.cursor.lock();
        let index = (*cursor).min(responses.len() - 1);
        *cursor += 1;
        let response = responses[index].clone();
        Box::pin(async move { Ok::<FetchResponse, FetchError>(response) })
    }
}

/// A client wired to a scripted transport.
pub fn scripted_client(fetcher: Arc<ScriptedFetcher>, options: ClientOptions) -> DataApiClient {
    let options = options.http_options(HttpClientOptions {
        version: None,
        custom_fetcher: Some(fetcher),
    });
    DataApiClient::with_options(None, options).expect("client options should be valid")
}

/// A db on the scripted client.
pub fn scripted_db(fetcher: Arc<ScriptedFetcher>, options: ClientOptions) -> Db {
    scripted_client(fetcher, options)
        .db_with_options(ENDPOINT, DbOptions::empty().token("AstraCS:test"))
        .expect("db options should be valid")
}
