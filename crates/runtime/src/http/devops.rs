//! The DevOps API client and its long-running command pattern.
//!
//! DevOps commands are ordinary HTTP requests (`GET`/`POST`/`DELETE`), but
//! lifecycle operations (create/terminate database, keyspace changes)
//! complete asynchronously on the server. For those, the client issues the
//! initial request and then *observes* the resource's state through a status
//! endpoint, polling at a configured interval until a target state is
//! reached. Any state outside the declared legal set aborts the poll with an
//! [`UnexpectedStateError`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::auth::{HeaderContext, TokenProvider, auth_headers, merge_headers};
use crate::error::{DevOpsResponseError, Error, Result, UnexpectedStateError};
use crate::events::{ClientEvent, ClientEventKind, EventContext, EventTarget};
use crate::fetch::{FetchRequest, Fetcher, HttpMethod};
use crate::http::{base_headers, join_url, new_request_id};
use crate::timeouts::TimeoutManager;

/// Construction-time configuration for [`DevOpsHttpClient`].
pub struct DevOpsHttpClientConfig {
    /// DevOps API base URL (e.g. `https://api.astra.datastax.com/v2`).
    pub base_url: String,
    /// The transport.
    pub fetcher: Arc<dyn Fetcher>,
    /// Auth token provider; maps to `Authorization: Bearer <token>`.
    pub token: Option<Arc<dyn TokenProvider>>,
    /// Extra headers merged over the computed set.
    pub additional_headers: HashMap<String, String>,
    /// Prebuilt User-Agent value.
    pub user_agent: String,
}

/// Stateless DevOps API client.
pub struct DevOpsHttpClient {
    config: DevOpsHttpClientConfig,
}

/// One DevOps request: method, path below the base URL, optional JSON body.
#[derive(Debug, Clone)]
pub struct DevOpsRequestSpec {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

/// A parsed DevOps response.
#[derive(Debug, Clone)]
pub struct DevOpsResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Parsed JSON body, when the body was valid JSON.
    pub body: Option<Value>,
    /// The raw body text.
    pub raw_body: String,
}

impl DevOpsResponse {
    /// The `status` field of the JSON body, if present.
    pub fn state(&self) -> Option<String> {
        self.body
            .as_ref()?
            .get("status")?
            .as_str()
            .map(str::to_string)
    }

    /// The `location` response header (new resource id on creation).
    pub fn location(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("location"))
            .map(|(_, value)| value.as_str())
    }
}

/// Event routing information for one admin method call.
pub struct AdminCommandInfo<'a> {
    /// Operation name for events (e.g. `createDatabase`).
    pub name: &'a str,
    /// Originating entity kind.
    pub target: EventTarget,
    /// Keyspace involved, if any.
    pub keyspace: Option<&'a str>,
    /// Database/resource name involved, if any.
    pub source: Option<&'a str>,
    /// The originating entity's event context.
    pub events: &'a EventContext,
}

/// A long-running admin command: the initial request plus the polling
/// contract that observes it to completion.
pub struct LongRunningCommand<'a> {
    /// Event routing.
    pub info: AdminCommandInfo<'a>,
    /// The request that starts the operation.
    pub initial: DevOpsRequestSpec,
    /// Derives the status-poll path from the initial response (e.g. from
    /// its `location` header). Returning `None` fails the command.
    pub poll_path: Box<dyn Fn(&DevOpsResponse) -> Option<String> + Send + Sync + 'a>,
    /// Extracts the observed state from a poll response; defaults to the
    /// body's `status` field via [`DevOpsResponse::state`].
    pub extract_state: Box<dyn Fn(&DevOpsResponse) -> Option<String> + Send + Sync + 'a>,
    /// The state that completes the command.
    pub target_state: String,
    /// States the poll may pass through on the way there.
    pub legal_states: Vec<String>,
    /// Delay between polls.
    pub poll_interval: Duration,
    /// `false` returns right after the initial request is accepted.
    pub blocking: bool,
}

impl DevOpsHttpClient {
    /// Creates a client from its configuration.
    pub fn new(config: DevOpsHttpClientConfig) -> Self {
        Self { config }
    }

    /// Runs a short (non-polling) admin command with full event bracketing.
    pub async fn run_command(
        &self,
        spec: &DevOpsRequestSpec,
        info: &AdminCommandInfo<'_>,
        tm: &mut TimeoutManager,
    ) -> Result<DevOpsResponse> {
        let request_id = new_request_id();
        let started_at = Instant::now();

        let mut started = self.event(ClientEventKind::AdminCommandStarted, &request_id, info, tm);
        started.url = Some(join_url(&self.config.base_url, &[spec.path.as_str()]));
        info.events.emit(started);

        match self.dispatch(spec, tm).await {
            Ok(response) => {
                let mut done =
                    self.event(ClientEventKind::AdminCommandSucceeded, &request_id, info, tm);
                done.duration_ms = Some(started_at.elapsed().as_millis() as u64);
                info.events.emit(done);
                Ok(response)
            }
            Err(error) => {
                self.emit_failed(&request_id, info, tm, started_at, &error);
                Err(error)
            }
        }
    }

    /// Runs a long-running admin command, polling to completion when
    /// blocking.
    pub async fn run_long_running(
        &self,
        command: LongRunningCommand<'_>,
        tm: &mut TimeoutManager,
    ) -> Result<DevOpsResponse> {
        let request_id = new_request_id();
        let info = &command.info;
        let started_at = Instant::now();

        let mut started = self.event(ClientEventKind::AdminCommandStarted, &request_id, info, tm);
        started.url = Some(join_url(&self.config.base_url, &[command.initial.path.as_str()]));
        info.events.emit(started);

        let initial = match self.dispatch(&command.initial, tm).await {
            Ok(response) => response,
            Err(error) => {
                self.emit_failed(&request_id, info, tm, started_at, &error);
                return Err(error);
            }
        };

        if !command.blocking {
            let mut done = self.event(ClientEventKind::AdminCommandSucceeded, &request_id, info, tm);
            done.duration_ms = Some(started_at.elapsed().as_millis() as u64);
            info.events.emit(done);
            return Ok(initial);
        }

        let poll_path = match (command.poll_path)(&initial) {
            Some(path) => path,
            None => {
                let error = Error::DevOpsResponse(DevOpsResponseError {
                    status: initial.status,
                    message: "could not locate created resource to poll".to_string(),
                    errors: Vec::new(),
                    raw_body: initial.raw_body.clone(),
                });
                self.emit_failed(&request_id, info, tm, started_at, &error);
                return Err(error);
            }
        };
        let poll_spec = DevOpsRequestSpec {
            method: HttpMethod::Get,
            path: poll_path,
            body: None,
        };

        loop {
            tokio::time::sleep(command.poll_interval).await;

            let response = match self.dispatch(&poll_spec, tm).await {
                Ok(response) => response,
                Err(error) => {
                    self.emit_failed(&request_id, info, tm, started_at, &error);
                    return Err(error);
                }
            };

            let mut polling = self.event(ClientEventKind::AdminCommandPolling, &request_id, info, tm);
            polling.elapsed_ms = Some(started_at.elapsed().as_millis() as u64);
            polling.interval_ms = Some(command.poll_interval.as_millis() as u64);
            info.events.emit(polling);

            let observed = (command.extract_state)(&response)
                .unwrap_or_else(|| "<missing>".to_string());
            tracing::debug!(state = %observed, target = %command.target_state, "long-running poll");

            if observed == command.target_state {
                let mut done =
                    self.event(ClientEventKind::AdminCommandSucceeded, &request_id, info, tm);
                done.duration_ms = Some(started_at.elapsed().as_millis() as u64);
                info.events.emit(done);
                return Ok(response);
            }

            if !command.legal_states.iter().any(|s| *s == observed) {
                let error = Error::UnexpectedState(UnexpectedStateError {
                    observed,
                    legal: command.legal_states.clone(),
                    target: command.target_state.clone(),
                    raw: response.body.clone().unwrap_or(Value::Null),
                });
                self.emit_failed(&request_id, info, tm, started_at, &error);
                return Err(error);
            }
        }
    }

    async fn dispatch(
        &self,
        spec: &DevOpsRequestSpec,
        tm: &mut TimeoutManager,
    ) -> Result<DevOpsResponse> {
        let deadline = tm.advance();
        if deadline.exhausted() {
            return Err(deadline.timeout_error().into());
        }

        let url = join_url(&self.config.base_url, &[spec.path.as_str()]);
        let mut headers = base_headers(&self.config.user_agent);
        if let Some(provider) = &self.config.token {
            let token = provider.token().await?;
            headers = merge_headers(headers, auth_headers(token.as_deref(), HeaderContext::DevOps));
        }
        headers = merge_headers(headers, self.config.additional_headers.clone());

        let request = FetchRequest {
            url: url.clone(),
            method: spec.method,
            headers,
            body: spec.body.as_ref().map(Value::to_string),
            timeout: deadline.duration(),
        };

        let response =
            match tokio::time::timeout(deadline.duration(), self.config.fetcher.fetch(request))
                .await
            {
                Err(_) => return Err(deadline.timeout_error().into()),
                Ok(Err(fetch_error)) => return Err(fetch_error.into()),
                Ok(Ok(response)) => response,
            };

        if response.status >= 400 {
            return Err(DevOpsResponseError::from_body(
                response.status,
                &response.status_text,
                &response.body,
            )
            .into());
        }

        let body = serde_json::from_str(&response.body).ok();
        Ok(DevOpsResponse {
            status: response.status,
            headers: response.headers,
            body,
            raw_body: response.body,
        })
    }

    fn event(
        &self,
        kind: ClientEventKind,
        request_id: &str,
        info: &AdminCommandInfo<'_>,
        tm: &TimeoutManager,
    ) -> ClientEvent {
        let mut event = ClientEvent::new(kind, request_id, info.name);
        event.target = info.target;
        event.keyspace = info.keyspace.map(str::to_string);
        event.source = info.source.map(str::to_string);
        event.timeouts = Some(tm.initial());
        event
    }

    fn emit_failed(
        &self,
        request_id: &str,
        info: &AdminCommandInfo<'_>,
        tm: &TimeoutManager,
        started_at: Instant,
        error: &Error,
    ) {
        let mut event = self.event(ClientEventKind::AdminCommandFailed, request_id, info, tm);
        event.duration_ms = Some(started_at.elapsed().as_millis() as u64);
        event.error = Some(error.to_string());
        info.events.emit(event);
    }
}

impl std::fmt::Debug for DevOpsHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevOpsHttpClient")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use crate::events::{LoggingConfig, EventPropagation};
    use crate::testing::MockFetcher;
    use crate::timeouts::{TimeoutCategory, TimeoutDescriptor, TimeoutMode};
    use parking_lot::Mutex;
    use serde_json::json;

    fn client(fetcher: Arc<MockFetcher>) -> DevOpsHttpClient {
        DevOpsHttpClient::new(DevOpsHttpClientConfig {
            base_url: "https://api.astra.datastax.com/v2".to_string(),
            fetcher,
            token: Some(Arc::new(StaticTokenProvider::new("tok"))),
            additional_headers: HashMap::new(),
            user_agent: "astra-db-rs/0.1.0".to_string(),
        })
    }

    fn manager() -> TimeoutManager {
        TimeoutManager::new(
            TimeoutMode::Multipart,
            TimeoutCategory::DatabaseAdmin,
            &TimeoutDescriptor::default(),
            None,
        )
    }

    fn events() -> (Arc<EventContext>, Arc<Mutex<Vec<ClientEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ctx = EventContext::root(LoggingConfig::all_to_events().resolve().unwrap());
        for kind in ClientEventKind::ALL {
            let seen = Arc::clone(&seen);
            std::mem::forget(ctx.on(kind, move |e: &ClientEvent, _: &mut EventPropagation| {
                seen.lock().push(e.clone());
            }));
        }
        (ctx, seen)
    }

    fn info<'a>(ctx: &'a EventContext) -> AdminCommandInfo<'a> {
        AdminCommandInfo {
            name: "createDatabase",
            target: EventTarget::Database,
            keyspace: None,
            source: Some("my_db"),
            events: ctx,
        }
    }

    fn poll_body(
        state: &str,
    ) -> std::result::Result<crate::fetch::FetchResponse, crate::error::FetchError> {
        Ok(MockFetcher::response(
            200,
            "OK",
            &json!({ "id": "db-1", "status": state }).to_string(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_command_polls_to_target_state() {
        let mut initial = MockFetcher::response(201, "Created", "{}");
        initial
            .headers
            .insert("location".to_string(), "db-1".to_string());

        let fetcher = Arc::new(MockFetcher::sequence(vec![
            Ok(initial),
            poll_body("INITIALIZING"),
            poll_body("PENDING"),
            poll_body("ACTIVE"),
        ]));
        let client = client(Arc::clone(&fetcher));
        let (ctx, seen) = events();
        let call_info = info(&ctx);

        let command = LongRunningCommand {
            info: call_info,
            initial: DevOpsRequestSpec {
                method: HttpMethod::Post,
                path: "databases".to_string(),
                body: Some(json!({ "name": "my_db" })),
            },
            poll_path: Box::new(|r| r.location().map(|id| format!("databases/{id}"))),
            extract_state: Box::new(DevOpsResponse::state),
            target_state: "ACTIVE".to_string(),
            legal_states: vec!["INITIALIZING".to_string(), "PENDING".to_string()],
            poll_interval: Duration::from_secs(10),
            blocking: true,
        };

        let response = client.run_long_running(command, &mut manager()).await.unwrap();
        assert_eq!(response.state().as_deref(), Some("ACTIVE"));

        let kinds: Vec<ClientEventKind> = seen.lock().iter().map(|e| e.kind).collect();
        assert_eq!(kinds[0], ClientEventKind::AdminCommandStarted);
        assert_eq!(kinds[kinds.len() - 1], ClientEventKind::AdminCommandSucceeded);
        let polls = kinds
            .iter()
            .filter(|k| **k == ClientEventKind::AdminCommandPolling)
            .count();
        assert_eq!(polls, 3);

        let polling = seen
            .lock()
            .iter()
            .find(|e| e.kind == ClientEventKind::AdminCommandPolling)
            .cloned()
            .unwrap();
        assert_eq!(polling.interval_ms, Some(10_000));
        assert!(polling.elapsed_ms.is_some());

        // Initial POST plus three GET polls.
        assert_eq!(fetcher.requests().len(), 4);
        assert_eq!(
            fetcher.requests()[1].url,
            "https://api.astra.datastax.com/v2/databases/db-1"
        );
        assert_eq!(
            fetcher.requests()[0]
                .headers
                .get("Authorization")
                .map(String::as_str),
            Some("Bearer tok")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deviant_state_aborts_with_unexpected_state() {
        let mut initial = MockFetcher::response(201, "Created", "{}");
        initial
            .headers
            .insert("location".to_string(), "db-1".to_string());

        let fetcher = Arc::new(MockFetcher::sequence(vec![
            Ok(initial),
            poll_body("ERROR"),
        ]));
        let client = client(fetcher);
        let (ctx, seen) = events();

        let command = LongRunningCommand {
            info: info(&ctx),
            initial: DevOpsRequestSpec {
                method: HttpMethod::Post,
                path: "databases".to_string(),
                body: None,
            },
            poll_path: Box::new(|r| r.location().map(|id| format!("databases/{id}"))),
            extract_state: Box::new(DevOpsResponse::state),
            target_state: "ACTIVE".to_string(),
            legal_states: vec!["INITIALIZING".to_string(), "PENDING".to_string()],
            poll_interval: Duration::from_secs(10),
            blocking: true,
        };

        let error = client.run_long_running(command, &mut manager()).await.unwrap_err();
        match error {
            Error::UnexpectedState(e) => {
                assert_eq!(e.observed, "ERROR");
                assert_eq!(e.target, "ACTIVE");
            }
            other => panic!("expected UnexpectedState, got {other:?}"),
        }
        assert!(
            seen.lock()
                .iter()
                .any(|e| e.kind == ClientEventKind::AdminCommandFailed)
        );
    }

    #[tokio::test]
    async fn non_blocking_returns_after_initial_request() {
        let mut initial = MockFetcher::response(201, "Created", "{}");
        initial
            .headers
            .insert("location".to_string(), "db-1".to_string());

        let fetcher = Arc::new(MockFetcher::sequence(vec![Ok(initial)]));
        let client = client(Arc::clone(&fetcher));
        let (ctx, seen) = events();

        let command = LongRunningCommand {
            info: info(&ctx),
            initial: DevOpsRequestSpec {
                method: HttpMethod::Post,
                path: "databases".to_string(),
                body: None,
            },
            poll_path: Box::new(|r| r.location().map(|id| format!("databases/{id}"))),
            extract_state: Box::new(DevOpsResponse::state),
            target_state: "ACTIVE".to_string(),
            legal_states: vec![],
            poll_interval: Duration::from_secs(10),
            blocking: false,
        };

        let response = client.run_long_running(command, &mut manager()).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(fetcher.requests().len(), 1);

        let kinds: Vec<ClientEventKind> = seen.lock().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ClientEventKind::AdminCommandStarted,
                ClientEventKind::AdminCommandSucceeded
            ]
        );
    }

    #[tokio::test]
    async fn http_errors_become_devops_response_errors() {
        let fetcher = Arc::new(MockFetcher::http(
            401,
            "Unauthorized",
            r#"{"errors":[{"message":"invalid token"}]}"#,
        ));
        let client = client(fetcher);
        let (ctx, _) = events();
        let call_info = info(&ctx);

        let error = client
            .run_command(
                &DevOpsRequestSpec {
                    method: HttpMethod::Get,
                    path: "databases".to_string(),
                    body: None,
                },
                &call_info,
                &mut manager(),
            )
            .await
            .unwrap_err();

        match error {
            Error::DevOpsResponse(e) => {
                assert_eq!(e.status, 401);
                assert_eq!(e.message, "invalid token");
            }
            other => panic!("expected DevOpsResponse, got {other:?}"),
        }
    }
}
