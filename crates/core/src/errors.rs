//! User-facing error types.
//!
//! The runtime's transport/response errors are wrapped transparently; this
//! module adds the client-side kinds (argument validation, cursor misuse,
//! serdes failures, partial bulk results). Every kind keeps a stable message
//! prefix and structured fields for programmatic inspection.

use astra_protocol::paths::FieldPathError;
use astra_protocol::response::ErrorDescriptor;
use thiserror::Error;

use crate::cursor::CursorState;
use crate::results::{BulkWriteResult, InsertManyResult};

pub use astra_runtime::error::{
    DataApiResponseError, DevOpsResponseError, FetchError, FetchErrorKind, InvalidOptionsError,
    TimeoutError, UnexpectedStateError,
};

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Every error the client can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// An option failed parsing or validation.
    #[error(transparent)]
    InvalidOptions(#[from] InvalidOptionsError),

    /// An illegal combination of arguments at a call site.
    #[error(transparent)]
    InvalidArguments(#[from] InvalidArgumentsError),

    /// A deadline elapsed.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// Transport-level failure.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The Data API reported command errors.
    #[error(transparent)]
    DataApiResponse(#[from] DataApiResponseError),

    /// The DevOps API rejected a request.
    #[error(transparent)]
    DevOpsResponse(#[from] DevOpsResponseError),

    /// A long-running admin command left its legal states.
    #[error(transparent)]
    UnexpectedState(#[from] UnexpectedStateError),

    /// `insert_many` failed after inserting part of its input.
    #[error(transparent)]
    InsertMany(#[from] InsertManyError),

    /// A table `insert_many` failed after inserting part of its input.
    #[error(transparent)]
    TableInsertMany(#[from] TableInsertManyError),

    /// `bulk_write` failed after applying part of its operations.
    #[error(transparent)]
    BulkWrite(#[from] BulkWriteError),

    /// Illegal cursor builder use or consumption after close.
    #[error(transparent)]
    Cursor(#[from] CursorError),

    /// A codec raised during ser/des traversal.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// `count_documents` exceeded its upper bound.
    #[error(transparent)]
    TooManyDocuments(#[from] TooManyDocumentsError),

    /// A field path failed to parse.
    #[error(transparent)]
    FieldPath(#[from] FieldPathError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<astra_runtime::Error> for Error {
    fn from(error: astra_runtime::Error) -> Self {
        match error {
            astra_runtime::Error::InvalidOptions(e) => Error::InvalidOptions(e),
            astra_runtime::Error::Timeout(e) => Error::Timeout(e),
            astra_runtime::Error::Fetch(e) => Error::Fetch(e),
            astra_runtime::Error::DataApiResponse(e) => Error::DataApiResponse(e),
            astra_runtime::Error::DevOpsResponse(e) => Error::DevOpsResponse(e),
            astra_runtime::Error::UnexpectedState(e) => Error::UnexpectedState(e),
            astra_runtime::Error::Json(e) => Error::Json(e),
        }
    }
}

impl Error {
    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// The Data API error descriptors, if this is a response error.
    pub fn error_descriptors(&self) -> Option<&[ErrorDescriptor]> {
        match self {
            Error::DataApiResponse(e) => Some(&e.errors),
            Error::InsertMany(e) => Some(&e.descriptors),
            _ => None,
        }
    }
}

/// An illegal combination of arguments (e.g. both a sort and a vector
/// shortcut).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid arguments: {message}")]
pub struct InvalidArgumentsError {
    /// What was wrong with the call.
    pub message: String,
}

impl InvalidArgumentsError {
    /// Creates a new error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Illegal builder use or consumption of a running/closed cursor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cursor error: {message} (cursor is {state})")]
pub struct CursorError {
    /// The cursor's state at the time of the call.
    pub state: CursorState,
    /// What was attempted.
    pub message: String,
}

impl CursorError {
    /// Creates a new error.
    pub fn new(state: CursorState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }
}

/// A codec raised during traversal; carries the path to the failing node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("serialization error at '{}': {message}", self.rendered_path())]
pub struct SerializationError {
    /// Path segments from the root to the failing node.
    pub path: Vec<String>,
    /// What went wrong.
    pub message: String,
}

impl SerializationError {
    /// Creates an error at the given path.
    pub fn at(path: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }

    fn rendered_path(&self) -> String {
        if self.path.is_empty() {
            "<root>".to_string()
        } else {
            astra_protocol::paths::escape_field_names(self.path.iter())
        }
    }
}

/// `insert_many` inserted part of its input before failing.
#[derive(Debug, Clone, Error)]
#[error("insertMany partially failed: {} document(s) inserted before error: {}", partial_result.inserted_count, self.first_message())]
pub struct InsertManyError {
    /// Ids and count for the documents that were inserted.
    pub partial_result: InsertManyResult,
    /// Error descriptors from the failing response(s).
    pub descriptors: Vec<ErrorDescriptor>,
}

impl InsertManyError {
    fn first_message(&self) -> &str {
        self.descriptors
            .first()
            .map(ErrorDescriptor::message_or_code)
            .unwrap_or("unknown error")
    }
}

/// A table `insert_many` inserted part of its rows before failing.
#[derive(Debug, Clone, Error)]
#[error("insertMany partially failed: {} row(s) inserted before error: {}", partial_result.inserted_count, self.first_message())]
pub struct TableInsertManyError {
    /// Primary keys and count for the rows that were inserted.
    pub partial_result: crate::results::TableInsertManyResult,
    /// Error descriptors from the failing response(s).
    pub descriptors: Vec<ErrorDescriptor>,
}

impl TableInsertManyError {
    fn first_message(&self) -> &str {
        self.descriptors
            .first()
            .map(ErrorDescriptor::message_or_code)
            .unwrap_or("unknown error")
    }
}

/// Per-operation failure detail inside a [`BulkWriteError`].
#[derive(Debug, Clone)]
pub struct BulkWriteErrorDescriptor {
    /// Index of the failing operation in the input.
    pub index: usize,
    /// Error descriptors for that operation.
    pub descriptors: Vec<ErrorDescriptor>,
}

/// `bulk_write` applied part of its operations before failing.
#[derive(Debug, Clone, Error)]
#[error("bulkWrite partially failed: {} operation(s) failed", detailed_error_descriptors.len())]
pub struct BulkWriteError {
    /// Result for the operations that succeeded.
    pub partial_result: BulkWriteResult,
    /// Per-operation failure details.
    pub detailed_error_descriptors: Vec<BulkWriteErrorDescriptor>,
}

impl BulkWriteError {
    /// All descriptors across the failing operations, flattened.
    pub fn error_descriptors(&self) -> Vec<&ErrorDescriptor> {
        self.detailed_error_descriptors
            .iter()
            .flat_map(|d| d.descriptors.iter())
            .collect()
    }
}

/// `count_documents` found more documents than the caller's upper bound (or
/// the server's own counting limit).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("too many documents to count (beyond the limit of {limit})")]
pub struct TooManyDocumentsError {
    /// The bound that was exceeded.
    pub limit: u64,
    /// True when the server's counting limit was hit rather than the
    /// caller's upper bound.
    pub server_limited: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_error_renders_escaped_path() {
        let err = SerializationError::at(
            vec!["websites".into(), "www.datastax.com".into()],
            "bad value",
        );
        assert_eq!(
            err.to_string(),
            "serialization error at 'websites.www&.datastax&.com': bad value"
        );
    }

    #[test]
    fn serialization_error_at_root() {
        let err = SerializationError::at(vec![], "cycle depth exceeded");
        assert!(err.to_string().contains("<root>"));
    }

    #[test]
    fn runtime_errors_map_variant_for_variant() {
        let err: Error = astra_runtime::Error::InvalidOptions(InvalidOptionsError::new(
            "logging",
            "conflicting outputs",
        ))
        .into();
        assert!(matches!(err, Error::InvalidOptions(_)));
    }

    #[test]
    fn stable_prefixes() {
        assert!(
            InvalidArgumentsError::new("sort and vector")
                .to_string()
                .starts_with("invalid arguments: ")
        );
        assert!(
            TooManyDocumentsError {
                limit: 1000,
                server_limited: true
            }
            .to_string()
            .starts_with("too many documents to count")
        );
    }
}
