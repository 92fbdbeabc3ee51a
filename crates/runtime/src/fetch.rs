//! The pluggable HTTP transport abstraction.
//!
//! A [`Fetcher`] executes exactly one HTTP request and returns a uniform
//! response envelope. It never retries and never interprets status codes;
//! both concerns live in the HTTP client layer above.
//!
//! [`DefaultFetcher`] is backed by reqwest. With
//! [`HttpVersionPreference::PreferHttp2`] it negotiates HTTP/2 via ALPN and
//! falls back to HTTP/1.1; [`HttpVersionPreference::Http1Only`] pins the
//! protocol. Cancellation is cooperative: dropping the future returned by
//! [`Fetcher::fetch`] aborts the in-flight request.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{FetchError, FetchErrorKind};

/// HTTP methods used by the Data API and DevOps endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// The method name on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// One HTTP request, fully assembled by the client layer.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Absolute request URL.
    pub url: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Complete header set (auth, content-type, user-agent, extras).
    pub headers: HashMap<String, String>,
    /// Serialized request body, if any.
    pub body: Option<String>,
    /// Attempt deadline computed by the timeout manager. Implementations
    /// should enforce it as a backstop; the client layer also races the
    /// returned future against the same deadline.
    pub timeout: Duration,
}

/// The uniform response envelope every fetcher produces.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Status reason phrase (empty if the transport does not surface one).
    pub status_text: String,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body as text.
    pub body: String,
    /// Negotiated protocol version (e.g. `HTTP/2.0`).
    pub http_version: String,
    /// Final URL after any redirects.
    pub url: String,
}

/// Boxed future returned by [`Fetcher::fetch`].
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<FetchResponse, FetchError>> + Send + 'a>>;

/// Executes one HTTP request. Implementations must be shareable across
/// concurrent tasks.
pub trait Fetcher: Send + Sync + std::fmt::Debug {
    /// Performs the request, resolving to the response envelope or a
    /// transport-level error.
    fn fetch(&self, request: FetchRequest) -> FetchFuture<'_>;
}

/// Which HTTP version(s) the default fetcher may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HttpVersionPreference {
    /// Negotiate HTTP/2 when the server supports it, else HTTP/1.1.
    #[default]
    PreferHttp2,
    /// Pin to HTTP/1.1.
    Http1Only,
}

/// The built-in reqwest-backed fetcher.
///
/// The underlying client maintains a connection pool and is cheap to clone;
/// a single instance is shared by every entity spawned from one client.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    client: reqwest::Client,
}

impl DefaultFetcher {
    /// Builds a fetcher with the given protocol preference.
    pub fn new(preference: HttpVersionPreference) -> std::result::Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder();
        if preference == HttpVersionPreference::Http1Only {
            builder = builder.http1_only();
        }
        let client = builder.build().map_err(|e| FetchError {
            message: format!("failed to build HTTP client: {e}"),
            url: String::new(),
            kind: FetchErrorKind::Request,
        })?;
        Ok(Self { client })
    }

    fn map_error(url: &str, error: reqwest::Error) -> FetchError {
        let kind = if error.is_connect() {
            FetchErrorKind::Connect
        } else if error.is_timeout() {
            FetchErrorKind::Cancelled
        } else if error.is_body() || error.is_decode() {
            FetchErrorKind::Body
        } else {
            FetchErrorKind::Request
        };
        FetchError {
            message: error.to_string(),
            url: url.to_string(),
            kind,
        }
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, request: FetchRequest) -> FetchFuture<'_> {
        let client = self.client.clone();
        Box::pin(async move {
            let method = match request.method {
                HttpMethod::Get => reqwest::Method::GET,
                HttpMethod::Post => reqwest::Method::POST,
                HttpMethod::Put => reqwest::Method::PUT,
                HttpMethod::Delete => reqwest::Method::DELETE,
            };

            let mut builder = client
                .request(method, &request.url)
                .timeout(request.timeout);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            tracing::debug!(url = %request.url, method = request.method.as_str(), "dispatching request");

            let response = builder
                .send()
                .await
                .map_err(|e| Self::map_error(&request.url, e))?;

            let status = response.status();
            let http_version = format!("{:?}", response.version());
            let final_url = response.url().to_string();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();

            let body = response
                .text()
                .await
                .map_err(|e| Self::map_error(&request.url, e))?;

            Ok(FetchResponse {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                headers,
                body,
                http_version,
                url: final_url,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names() {
        assert_eq!(HttpMethod::Get.as_str(), "GET");
        assert_eq!(HttpMethod::Post.as_str(), "POST");
        assert_eq!(HttpMethod::Delete.as_str(), "DELETE");
    }

    #[test]
    fn default_fetcher_builds_for_both_preferences() {
        assert!(DefaultFetcher::new(HttpVersionPreference::PreferHttp2).is_ok());
        assert!(DefaultFetcher::new(HttpVersionPreference::Http1Only).is_ok());
    }

    #[tokio::test]
    async fn connect_failures_are_classified_retryable() {
        let fetcher = DefaultFetcher::new(HttpVersionPreference::Http1Only).unwrap();
        // Reserved TEST-NET address; nothing listens there.
        let err = fetcher
            .fetch(FetchRequest {
                url: "http://192.0.2.1:9/".to_string(),
                method: HttpMethod::Get,
                headers: HashMap::new(),
                body: None,
                timeout: Duration::from_millis(250),
            })
            .await
            .unwrap_err();
        // Either the connection is refused outright or the attempt times
        // out; both must surface as a FetchError, and only the former may
        // be retried.
        match err.kind {
            FetchErrorKind::Connect => assert!(err.is_safely_retryable()),
            _ => assert!(!err.is_safely_retryable()),
        }
    }
}
