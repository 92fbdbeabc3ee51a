//! HTTP clients for the Data API and DevOps endpoints.
//!
//! Both clients compose the fetcher, auth providers, timeout manager, and
//! event context into a single request path; neither holds per-call state.

pub mod data_api;
pub mod devops;
pub mod retry;

use std::collections::HashMap;

/// The default Data API path segment.
pub const DEFAULT_DATA_API_PATH: &str = "api/json/v1";

/// The client identifier appended to every User-Agent.
pub const CLIENT_NAME: &str = "astra-db-rs";

/// One entry in the caller chain used to compose the User-Agent header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Application or library name.
    pub name: String,
    /// Optional version.
    pub version: Option<String>,
}

impl Caller {
    /// Creates a caller entry.
    pub fn new(name: impl Into<String>, version: Option<impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            version: version.map(Into::into),
        }
    }
}

/// Composes the single User-Agent header value from the caller chain
/// (most-important first) plus the client's own `name/version`.
pub fn build_user_agent(callers: &[Caller]) -> String {
    let mut parts: Vec<String> = callers
        .iter()
        .map(|caller| match &caller.version {
            Some(version) => format!("{}/{}", caller.name, version),
            None => caller.name.clone(),
        })
        .collect();
    parts.push(format!("{CLIENT_NAME}/{}", env!("CARGO_PKG_VERSION")));
    parts.join(" ")
}

/// Generates the per-call request id shared by all events of one method.
pub(crate) fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Joins URL path segments without doubling separators.
pub(crate) fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if !segment.is_empty() {
            url.push('/');
            url.push_str(segment);
        }
    }
    url
}

/// The fixed headers every request carries.
pub(crate) fn base_headers(user_agent: &str) -> HashMap<String, String> {
    HashMap::from([
        ("User-Agent".to_string(), user_agent.to_string()),
        ("Content-Type".to_string(), "application/json".to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_preserves_caller_order() {
        let callers = vec![
            Caller::new("my-app", Some("1.2.3")),
            Caller::new("my-framework", None::<String>),
        ];
        let ua = build_user_agent(&callers);
        assert!(ua.starts_with("my-app/1.2.3 my-framework "));
        assert!(ua.contains(&format!("{CLIENT_NAME}/")));
    }

    #[test]
    fn user_agent_without_callers_is_just_the_client() {
        let ua = build_user_agent(&[]);
        assert_eq!(ua, format!("{CLIENT_NAME}/{}", env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://example.com/", &["api/json/v1", "ks", "coll"]),
            "https://example.com/api/json/v1/ks/coll"
        );
        assert_eq!(
            join_url("https://example.com", &["v2", "", "databases"]),
            "https://example.com/v2/databases"
        );
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(new_request_id(), new_request_id());
    }
}
