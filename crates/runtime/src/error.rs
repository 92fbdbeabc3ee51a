//! Error types for the client runtime.
//!
//! Each failure kind is its own struct with structured fields for
//! programmatic inspection; [`Error`] is the crate-level sum over them.
//! Every kind's message starts with a stable, kind-specific prefix.

use astra_protocol::response::{ErrorDescriptor, RawDataApiResponse};
use serde_json::Value;
use thiserror::Error;

use crate::timeouts::{TimeoutCategory, TimeoutDefaults};

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the client runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// An option failed validation.
    #[error(transparent)]
    InvalidOptions(#[from] InvalidOptionsError),

    /// A deadline elapsed before the operation completed.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// The transport failed below the HTTP semantics layer.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The Data API reported one or more command errors.
    #[error(transparent)]
    DataApiResponse(#[from] DataApiResponseError),

    /// The DevOps API rejected a request or returned an error payload.
    #[error(transparent)]
    DevOpsResponse(#[from] DevOpsResponseError),

    /// A long-running admin command left its legal states.
    #[error(transparent)]
    UnexpectedState(#[from] UnexpectedStateError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// Returns the Data API error descriptors if this is a response error.
    pub fn error_descriptors(&self) -> Option<&[ErrorDescriptor]> {
        match self {
            Error::DataApiResponse(e) => Some(&e.errors),
            _ => None,
        }
    }
}

/// An option failed parsing or validation.
///
/// Carries the dotted path of the offending field and the reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid options: `{path}` {reason}")]
pub struct InvalidOptionsError {
    /// Dotted path to the offending field (e.g. `logging.events`).
    pub path: String,
    /// Why the value was rejected.
    pub reason: String,
}

impl InvalidOptionsError {
    /// Creates a new error for the given field path.
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A deadline elapsed; names the binding timeout category(ies).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("command timed out after {timeout_ms}ms (blamed: {})", self.blamed_fields())]
pub struct TimeoutError {
    /// The effective deadline that elapsed, in milliseconds.
    pub timeout_ms: u64,
    /// Which timeout categories bound the deadline (at least one).
    pub categories: Vec<TimeoutCategory>,
    /// The effective partial descriptor in force for the call.
    pub described: TimeoutDefaults,
}

impl TimeoutError {
    fn blamed_fields(&self) -> String {
        self.categories
            .iter()
            .map(TimeoutCategory::field_name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// How a transport failure happened, for retry classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Connection could not be established (DNS, TCP, TLS). The request was
    /// never sent, so retrying is safe.
    Connect,
    /// The request may have reached the server before failing.
    Request,
    /// The response body could not be read.
    Body,
    /// The in-flight request was cancelled.
    Cancelled,
}

/// Transport-level failure (connect, DNS, TLS, cancelled).
#[derive(Debug, Clone, Error)]
#[error("fetch failed: {message}")]
pub struct FetchError {
    /// Human-readable failure description.
    pub message: String,
    /// The request URL.
    pub url: String,
    /// Failure classification.
    pub kind: FetchErrorKind,
}

impl FetchError {
    /// True when the request demonstrably never reached the server, so a
    /// retry cannot duplicate work.
    pub fn is_safely_retryable(&self) -> bool {
        self.kind == FetchErrorKind::Connect
    }
}

/// The Data API returned a non-empty `errors` array.
///
/// The top-level message is the first descriptor's message; the full
/// descriptor array and the raw envelope are carried for inspection.
#[derive(Debug, Clone, Error)]
#[error("Data API error: {message}")]
pub struct DataApiResponseError {
    /// The first descriptor's message.
    pub message: String,
    /// All error descriptors from the response.
    pub errors: Vec<ErrorDescriptor>,
    /// The complete raw response envelope.
    pub raw: RawDataApiResponse,
}

impl DataApiResponseError {
    /// Promotes a raw envelope known to contain errors.
    pub fn from_response(raw: RawDataApiResponse) -> Self {
        let errors = raw.errors.clone().unwrap_or_default();
        let message = errors
            .first()
            .map(|d| d.message_or_code().to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        Self {
            message,
            errors,
            raw,
        }
    }
}

/// Non-2xx status or error payload from the DevOps API.
#[derive(Debug, Clone, Error)]
#[error("DevOps API error (HTTP {status}): {message}")]
pub struct DevOpsResponseError {
    /// HTTP status code of the failing response.
    pub status: u16,
    /// First error message, or the status text.
    pub message: String,
    /// Error descriptors from the response payload, if parseable.
    pub errors: Vec<ErrorDescriptor>,
    /// The raw response body.
    pub raw_body: String,
}

impl DevOpsResponseError {
    /// Builds an error from a failing DevOps response body.
    pub fn from_body(status: u16, status_text: &str, body: &str) -> Self {
        let errors: Vec<ErrorDescriptor> = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("errors").cloned())
            .and_then(|e| serde_json::from_value(e).ok())
            .unwrap_or_default();
        let message = errors
            .first()
            .map(|d| d.message_or_code().to_string())
            .unwrap_or_else(|| status_text.to_string());
        Self {
            status,
            message,
            errors,
            raw_body: body.to_string(),
        }
    }
}

/// A long-running admin command was observed in a state outside its legal
/// set before reaching the target state.
#[derive(Debug, Clone, Error)]
#[error("unexpected state: observed '{observed}', expected one of [{}] or '{target}'", self.legal.join(", "))]
pub struct UnexpectedStateError {
    /// The state the server reported.
    pub observed: String,
    /// The states the poll was allowed to pass through.
    pub legal: Vec<String>,
    /// The state the poll was waiting for.
    pub target: String,
    /// The raw poll response.
    pub raw: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_api_error_message_is_first_descriptor() {
        let raw: RawDataApiResponse = serde_json::from_value(json!({
            "errors": [
                { "errorCode": "A", "message": "first" },
                { "errorCode": "B", "message": "second" }
            ]
        }))
        .unwrap();
        let err = DataApiResponseError::from_response(raw);
        assert_eq!(err.message, "first");
        assert_eq!(err.errors.len(), 2);
        assert!(err.to_string().starts_with("Data API error: "));
    }

    #[test]
    fn devops_error_parses_payload() {
        let err = DevOpsResponseError::from_body(
            409,
            "Conflict",
            r#"{"errors":[{"message":"database already exists","id":"4096"}]}"#,
        );
        assert_eq!(err.status, 409);
        assert_eq!(err.message, "database already exists");
    }

    #[test]
    fn devops_error_falls_back_to_status_text() {
        let err = DevOpsResponseError::from_body(503, "Service Unavailable", "garbage");
        assert_eq!(err.message, "Service Unavailable");
    }

    #[test]
    fn fetch_retryability_is_connect_only() {
        let connect = FetchError {
            message: "dns".into(),
            url: "http://x".into(),
            kind: FetchErrorKind::Connect,
        };
        let request = FetchError {
            kind: FetchErrorKind::Request,
            ..connect.clone()
        };
        assert!(connect.is_safely_retryable());
        assert!(!request.is_safely_retryable());
    }

    #[test]
    fn error_prefixes_are_stable() {
        let invalid = InvalidOptionsError::new("caller", "must not be empty");
        assert!(invalid.to_string().starts_with("invalid options: "));

        let unexpected = UnexpectedStateError {
            observed: "ERROR".into(),
            legal: vec!["PENDING".into()],
            target: "ACTIVE".into(),
            raw: json!({}),
        };
        assert!(unexpected.to_string().starts_with("unexpected state: "));
    }
}
