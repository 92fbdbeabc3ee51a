//! The Data API response envelope.
//!
//! Responses are JSON objects with up to three top-level sections:
//!
//! - `status` — command-specific status fields (counts, inserted ids,
//!   warnings, the projection schema, pagination markers)
//! - `data` — returned documents/rows plus the next page state
//! - `errors` — error descriptors; may be present even on HTTP 200

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::ProjectionSchema;

/// A parsed Data API response envelope, prior to any schema-aware
/// deserialization of the payload documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDataApiResponse {
    /// Command status object (counts, warnings, projection schema, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Map<String, Value>>,

    /// Returned documents/rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,

    /// Error descriptors. A non-empty array means the command failed,
    /// regardless of the HTTP status code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorDescriptor>>,
}

impl RawDataApiResponse {
    /// Returns the descriptors if the response carries at least one error.
    pub fn errors(&self) -> Option<&[ErrorDescriptor]> {
        match self.errors.as_deref() {
            Some([]) | None => None,
            Some(errors) => Some(errors),
        }
    }

    /// Looks up a field in the `status` section.
    pub fn status_field(&self, key: &str) -> Option<&Value> {
        self.status.as_ref()?.get(key)
    }

    /// Warnings reported under `status.warnings`, if any.
    pub fn warnings(&self) -> Vec<ErrorDescriptor> {
        self.status_field("warnings")
            .and_then(|w| serde_json::from_value(w.clone()).ok())
            .unwrap_or_default()
    }

    /// The server-returned projection schema under `status.projectionSchema`.
    pub fn projection_schema(&self) -> Option<ProjectionSchema> {
        self.status_field("projectionSchema")
            .and_then(|s| serde_json::from_value(s.clone()).ok())
    }
}

/// The `data` section of a response envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    /// Single returned document (`findOne`, `findOneAndUpdate`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,

    /// Returned document page (`find`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Value>>,

    /// Opaque pagination token; `None` when the result set is exhausted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_state: Option<String>,
}

/// A single error descriptor from the `errors` array.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDescriptor {
    /// Stable machine-readable error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Error family (e.g. `REQUEST`, `SERVER`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    /// Scope within the family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Short title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Server-assigned id for this error instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ErrorDescriptor {
    /// The message, falling back to the error code, falling back to a stub.
    pub fn message_or_code(&self) -> &str {
        self.message
            .as_deref()
            .or(self.error_code.as_deref())
            .unwrap_or("unknown error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_success_envelope() {
        let raw: RawDataApiResponse = serde_json::from_value(json!({
            "status": { "insertedIds": ["a"] },
            "data": { "documents": [{ "_id": "a" }], "nextPageState": "tok" }
        }))
        .unwrap();

        assert!(raw.errors().is_none());
        assert_eq!(raw.status_field("insertedIds"), Some(&json!(["a"])));
        let data = raw.data.unwrap();
        assert_eq!(data.documents.unwrap().len(), 1);
        assert_eq!(data.next_page_state.as_deref(), Some("tok"));
    }

    #[test]
    fn errors_present_even_on_success_shape() {
        let raw: RawDataApiResponse = serde_json::from_value(json!({
            "status": { "insertedIds": [] },
            "errors": [{ "errorCode": "DOCUMENT_ALREADY_EXISTS", "message": "duplicate" }]
        }))
        .unwrap();

        let errors = raw.errors().expect("errors should be detected");
        assert_eq!(errors[0].message_or_code(), "duplicate");
    }

    #[test]
    fn empty_errors_array_is_not_a_failure() {
        let raw: RawDataApiResponse =
            serde_json::from_value(json!({ "status": {}, "errors": [] })).unwrap();
        assert!(raw.errors().is_none());
    }

    #[test]
    fn extracts_warnings() {
        let raw: RawDataApiResponse = serde_json::from_value(json!({
            "status": {
                "warnings": [{ "errorCode": "ZERO_FILTER_OPERATIONS", "message": "full scan" }]
            }
        }))
        .unwrap();

        let warnings = raw.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].error_code.as_deref(), Some("ZERO_FILTER_OPERATIONS"));
    }

    #[test]
    fn extracts_projection_schema() {
        let raw: RawDataApiResponse = serde_json::from_value(json!({
            "status": {
                "projectionSchema": {
                    "id": { "type": "uuid" },
                    "tags": { "type": "set", "valueType": "text" }
                }
            }
        }))
        .unwrap();

        let schema = raw.projection_schema().unwrap();
        assert_eq!(schema.len(), 2);
    }
}
