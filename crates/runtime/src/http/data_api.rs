//! The Data API command executor.
//!
//! One instance serves every entity spawned from a `Db`; all per-call state
//! (request id, timeout manager, event origin) flows in through
//! [`CommandInfo`]. The executor:
//!
//! 1. assembles the command URL and headers (auth, extras, content-type, UA)
//! 2. emits `commandStarted` before dispatch
//! 3. races the fetch against the attempt deadline, retrying only
//!    safely-retryable transport failures of read-only commands
//! 4. parses the response envelope, promoting a non-empty `errors` array to
//!    a [`DataApiResponseError`] even on HTTP 200
//! 5. emits `commandWarnings` and one of `commandSucceeded` /
//!    `commandFailed`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use astra_protocol::command::Command;
use astra_protocol::response::{ErrorDescriptor, RawDataApiResponse};

use crate::auth::{HeaderContext, HeadersProvider, TokenProvider, auth_headers, merge_headers};
use crate::error::{DataApiResponseError, Error, Result};
use crate::events::{ClientEvent, ClientEventKind, EventContext, EventTarget};
use crate::fetch::{FetchRequest, Fetcher, HttpMethod};
use crate::http::retry::RetryPolicy;
use crate::http::{base_headers, join_url, new_request_id};
use crate::timeouts::TimeoutManager;

/// Construction-time configuration for [`DataApiHttpClient`].
#[derive(Clone)]
pub struct DataApiHttpClientConfig {
    /// Database endpoint URL.
    pub base_url: String,
    /// API path segment (default `api/json/v1`).
    pub api_path: String,
    /// The transport.
    pub fetcher: Arc<dyn Fetcher>,
    /// Auth token provider, consulted per request.
    pub token: Option<Arc<dyn TokenProvider>>,
    /// Extra headers merged over the computed set.
    pub additional_headers: HashMap<String, String>,
    /// Embedding API key provider, if configured.
    pub embedding_headers: Option<Arc<dyn HeadersProvider>>,
    /// Reranking API key provider, if configured.
    pub reranking_headers: Option<Arc<dyn HeadersProvider>>,
    /// Prebuilt User-Agent value.
    pub user_agent: String,
    /// Transport retry policy.
    pub retry: RetryPolicy,
}

/// Stateless Data API command executor.
pub struct DataApiHttpClient {
    config: DataApiHttpClientConfig,
}

/// Per-call routing and event information.
pub struct CommandInfo<'a> {
    /// Keyspace path segment, if the command is keyspace-scoped.
    pub keyspace: Option<&'a str>,
    /// Collection/table path segment, if the command is table-scoped.
    pub target_name: Option<&'a str>,
    /// Originating entity kind, for events.
    pub target: EventTarget,
    /// The originating entity's event context.
    pub events: &'a EventContext,
    /// True for read-only commands that may be retried on connect failures.
    pub retryable: bool,
    /// True when this is an admin command (routes to the admin event kinds).
    pub admin: bool,
}

impl DataApiHttpClient {
    /// Creates an executor from its configuration.
    pub fn new(config: DataApiHttpClientConfig) -> Self {
        Self { config }
    }

    /// The configured endpoint URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// A copy of this executor with different embedding/reranking header
    /// providers (for spawn-time overrides on a single collection/table).
    pub fn with_header_providers(
        &self,
        embedding: Option<Arc<dyn HeadersProvider>>,
        reranking: Option<Arc<dyn HeadersProvider>>,
    ) -> Self {
        let mut config = self.config.clone();
        if embedding.is_some() {
            config.embedding_headers = embedding;
        }
        if reranking.is_some() {
            config.reranking_headers = reranking;
        }
        Self { config }
    }

    /// Executes one command and returns the parsed envelope.
    pub async fn execute_command(
        &self,
        command: &Command,
        info: CommandInfo<'_>,
        tm: &mut TimeoutManager,
    ) -> Result<RawDataApiResponse> {
        let request_id = new_request_id();
        let url = join_url(
            &self.config.base_url,
            &[
                self.config.api_path.as_str(),
                info.keyspace.unwrap_or(""),
                info.target_name.unwrap_or(""),
            ],
        );

        let headers = self.resolve_headers().await?;
        let body = serde_json::to_string(command)?;
        let command_value = serde_json::to_value(command)?;

        let started_at = Instant::now();
        let mut started = self.event(started_kind(info.admin), &request_id, command, &info, tm);
        started.url = Some(url.clone());
        started.command = Some(command_value);
        info.events.emit(started);

        let response = match self.dispatch(&url, &headers, &body, &info, tm).await {
            Ok(response) => response,
            Err(error) => {
                self.emit_failed(&request_id, command, &info, tm, started_at, &error);
                return Err(error);
            }
        };

        let raw = match self.parse_envelope(&response.body, response.status, &response.status_text)
        {
            Ok(raw) => raw,
            Err(error) => {
                self.emit_failed(&request_id, command, &info, tm, started_at, &error);
                return Err(error);
            }
        };

        if raw.errors().is_some() {
            let error = Error::DataApiResponse(DataApiResponseError::from_response(raw));
            self.emit_failed(&request_id, command, &info, tm, started_at, &error);
            return Err(error);
        }

        let warnings = raw.warnings();
        if !warnings.is_empty() {
            let mut event = self.event(warnings_kind(info.admin), &request_id, command, &info, tm);
            event.warnings = Some(warnings);
            info.events.emit(event);
        }

        let mut succeeded = self.event(succeeded_kind(info.admin), &request_id, command, &info, tm);
        succeeded.duration_ms = Some(started_at.elapsed().as_millis() as u64);
        info.events.emit(succeeded);

        Ok(raw)
    }

    async fn dispatch(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: &str,
        info: &CommandInfo<'_>,
        tm: &mut TimeoutManager,
    ) -> Result<crate::fetch::FetchResponse> {
        let mut attempt = 0u32;
        loop {
            let deadline = tm.advance();
            if deadline.exhausted() {
                return Err(deadline.timeout_error().into());
            }

            let request = FetchRequest {
                url: url.to_string(),
                method: HttpMethod::Post,
                headers: headers.clone(),
                body: Some(body.to_string()),
                timeout: deadline.duration(),
            };

            let raced =
                tokio::time::timeout(deadline.duration(), self.config.fetcher.fetch(request)).await;

            match raced {
                // Deadline elapsed: dropping the fetch future cancels the
                // in-flight request cooperatively. Timeouts are not retried.
                Err(_) => return Err(deadline.timeout_error().into()),
                Ok(Err(fetch_error)) => {
                    if self.config.retry.should_retry(attempt, &fetch_error, info.retryable) {
                        let delay = self.config.retry.backoff_delay(attempt);
                        tracing::debug!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %fetch_error,
                            "retrying after transport failure"
                        );
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(fetch_error.into());
                }
                Ok(Ok(response)) => return Ok(response),
            }
        }
    }

    fn parse_envelope(
        &self,
        body: &str,
        status: u16,
        status_text: &str,
    ) -> Result<RawDataApiResponse> {
        match serde_json::from_str::<RawDataApiResponse>(body) {
            Ok(raw) => Ok(raw),
            Err(parse_error) => {
                if (200..300).contains(&status) {
                    return Err(parse_error.into());
                }
                // Non-JSON error page from a proxy or gateway; synthesize a
                // descriptor so the failure is still inspectable.
                let raw = RawDataApiResponse {
                    status: None,
                    data: None,
                    errors: Some(vec![ErrorDescriptor {
                        error_code: Some("UNEXPECTED_RESPONSE".to_string()),
                        message: Some(format!("HTTP {status} {status_text}")),
                        ..ErrorDescriptor::default()
                    }]),
                };
                Err(DataApiResponseError::from_response(raw).into())
            }
        }
    }

    async fn resolve_headers(&self) -> Result<HashMap<String, String>> {
        let mut headers = base_headers(&self.config.user_agent);

        if let Some(provider) = &self.config.token {
            let token = provider.token().await?;
            headers = merge_headers(headers, auth_headers(token.as_deref(), HeaderContext::DataApi));
        }
        if let Some(provider) = &self.config.embedding_headers {
            headers = merge_headers(headers, provider.headers(HeaderContext::DataApi).await?);
        }
        if let Some(provider) = &self.config.reranking_headers {
            headers = merge_headers(headers, provider.headers(HeaderContext::DataApi).await?);
        }
        headers = merge_headers(headers, self.config.additional_headers.clone());

        Ok(headers)
    }

    fn event(
        &self,
        kind: ClientEventKind,
        request_id: &str,
        command: &Command,
        info: &CommandInfo<'_>,
        tm: &TimeoutManager,
    ) -> ClientEvent {
        let mut event = ClientEvent::new(kind, request_id, command.name());
        event.target = info.target;
        event.keyspace = info.keyspace.map(str::to_string);
        event.source = info.target_name.map(str::to_string);
        event.timeouts = Some(tm.initial());
        event
    }

    fn emit_failed(
        &self,
        request_id: &str,
        command: &Command,
        info: &CommandInfo<'_>,
        tm: &TimeoutManager,
        started_at: Instant,
        error: &Error,
    ) {
        let mut event = self.event(failed_kind(info.admin), request_id, command, info, tm);
        event.duration_ms = Some(started_at.elapsed().as_millis() as u64);
        event.error = Some(error.to_string());
        info.events.emit(event);
    }
}

impl std::fmt::Debug for DataApiHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataApiHttpClient")
            .field("base_url", &self.config.base_url)
            .field("api_path", &self.config.api_path)
            .finish()
    }
}

fn started_kind(admin: bool) -> ClientEventKind {
    if admin {
        ClientEventKind::AdminCommandStarted
    } else {
        ClientEventKind::CommandStarted
    }
}

fn succeeded_kind(admin: bool) -> ClientEventKind {
    if admin {
        ClientEventKind::AdminCommandSucceeded
    } else {
        ClientEventKind::CommandSucceeded
    }
}

fn failed_kind(admin: bool) -> ClientEventKind {
    if admin {
        ClientEventKind::AdminCommandFailed
    } else {
        ClientEventKind::CommandFailed
    }
}

fn warnings_kind(admin: bool) -> ClientEventKind {
    if admin {
        ClientEventKind::AdminCommandWarnings
    } else {
        ClientEventKind::CommandWarnings
    }
}
