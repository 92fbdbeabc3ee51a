//! Token and header providers.
//!
//! Providers are created eagerly from configuration but consulted lazily on
//! every request, so a provider may perform I/O per call (e.g. refreshing a
//! short-lived credential). All provider methods return boxed futures;
//! synchronous providers return an immediately-ready one.
//!
//! Header composition is monoidal: maps merge key-wise with the right-hand
//! side winning, and an absent token contributes no header at all.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::Result;

/// Which API family a request is headed for. The same token maps to a
/// different header per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderContext {
    /// Data API requests: the token goes in a `Token` header.
    DataApi,
    /// DevOps requests: the token goes in `Authorization: Bearer <token>`.
    DevOps,
}

/// Boxed future returned by [`TokenProvider::token`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>>;

/// Boxed future returned by [`HeadersProvider::headers`].
pub type HeadersFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HashMap<String, String>>> + Send + 'a>>;

/// Produces the auth token for a request.
///
/// `Ok(None)` means "no token": the request goes out without an auth header.
pub trait TokenProvider: Send + Sync + fmt::Debug {
    /// Returns the token to authenticate the next request with.
    fn token(&self) -> TokenFuture<'_>;
}

/// A fixed token known at construction time.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wraps an application token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token(&self) -> TokenFuture<'_> {
        let token = self.token.clone();
        Box::pin(async move { Ok(Some(token)) })
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never leak the credential through Debug output.
        f.debug_struct("StaticTokenProvider")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Encodes username/password credentials as `Cassandra:<b64 user>:<b64 pass>`.
#[derive(Clone)]
pub struct UsernamePasswordTokenProvider {
    token: String,
}

impl UsernamePasswordTokenProvider {
    /// Encodes the credentials once; the resulting token is reused per call.
    pub fn new(username: &str, password: &str) -> Self {
        let token = format!(
            "Cassandra:{}:{}",
            BASE64.encode(username),
            BASE64.encode(password)
        );
        Self { token }
    }
}

impl TokenProvider for UsernamePasswordTokenProvider {
    fn token(&self) -> TokenFuture<'_> {
        let token = self.token.clone();
        Box::pin(async move { Ok(Some(token)) })
    }
}

impl fmt::Debug for UsernamePasswordTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsernamePasswordTokenProvider")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Produces arbitrary per-request headers (embedding/reranking keys, custom
/// auth schemes).
pub trait HeadersProvider: Send + Sync + fmt::Debug {
    /// Returns the headers to attach to the next request.
    fn headers(&self, ctx: HeaderContext) -> HeadersFuture<'_>;
}

/// Provides the `x-embedding-api-key` header for vectorize-enabled
/// collections.
#[derive(Clone)]
pub struct EmbeddingApiKeyHeadersProvider {
    api_key: String,
}

impl EmbeddingApiKeyHeadersProvider {
    /// Wraps an embedding provider API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl HeadersProvider for EmbeddingApiKeyHeadersProvider {
    fn headers(&self, _ctx: HeaderContext) -> HeadersFuture<'_> {
        let key = self.api_key.clone();
        Box::pin(async move {
            Ok(HashMap::from([(
                "x-embedding-api-key".to_string(),
                key,
            )]))
        })
    }
}

impl fmt::Debug for EmbeddingApiKeyHeadersProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingApiKeyHeadersProvider")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Provides the `reranking-api-key` header for find-and-rerank commands.
#[derive(Clone)]
pub struct RerankingApiKeyHeadersProvider {
    api_key: String,
}

impl RerankingApiKeyHeadersProvider {
    /// Wraps a reranking provider API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl HeadersProvider for RerankingApiKeyHeadersProvider {
    fn headers(&self, _ctx: HeaderContext) -> HeadersFuture<'_> {
        let key = self.api_key.clone();
        Box::pin(async move { Ok(HashMap::from([("reranking-api-key".to_string(), key)])) })
    }
}

impl fmt::Debug for RerankingApiKeyHeadersProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RerankingApiKeyHeadersProvider")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Maps a token to the auth header for the given API family.
pub fn auth_headers(token: Option<&str>, ctx: HeaderContext) -> HashMap<String, String> {
    let Some(token) = token else {
        return HashMap::new();
    };
    match ctx {
        HeaderContext::DataApi => HashMap::from([("Token".to_string(), token.to_string())]),
        HeaderContext::DevOps => HashMap::from([(
            "Authorization".to_string(),
            format!("Bearer {token}"),
        )]),
    }
}

/// Key-level monoidal merge: entries in `overrides` win.
pub fn merge_headers(
    mut base: HashMap<String, String>,
    overrides: HashMap<String, String>,
) -> HashMap<String, String> {
    base.extend(overrides);
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token_is_returned_verbatim() {
        let provider = StaticTokenProvider::new("AstraCS:xyz");
        assert_eq!(provider.token().await.unwrap().as_deref(), Some("AstraCS:xyz"));
    }

    #[tokio::test]
    async fn username_password_encodes_cassandra_scheme() {
        let provider = UsernamePasswordTokenProvider::new("cassandra", "cassandra");
        let token = provider.token().await.unwrap().unwrap();
        assert_eq!(token, "Cassandra:Y2Fzc2FuZHJh:Y2Fzc2FuZHJh");
    }

    #[test]
    fn token_maps_per_family() {
        let data = auth_headers(Some("tok"), HeaderContext::DataApi);
        assert_eq!(data.get("Token").map(String::as_str), Some("tok"));

        let devops = auth_headers(Some("tok"), HeaderContext::DevOps);
        assert_eq!(
            devops.get("Authorization").map(String::as_str),
            Some("Bearer tok")
        );
    }

    #[test]
    fn absent_token_contributes_no_header() {
        assert!(auth_headers(None, HeaderContext::DataApi).is_empty());
        assert!(auth_headers(None, HeaderContext::DevOps).is_empty());
    }

    #[test]
    fn merge_is_right_biased() {
        let base = HashMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        let over = HashMap::from([("b".to_string(), "3".to_string())]);
        let merged = merge_headers(base, over);
        assert_eq!(merged.get("a").map(String::as_str), Some("1"));
        assert_eq!(merged.get("b").map(String::as_str), Some("3"));
    }

    #[tokio::test]
    async fn embedding_and_reranking_use_distinct_header_names() {
        let embedding = EmbeddingApiKeyHeadersProvider::new("ek");
        let reranking = RerankingApiKeyHeadersProvider::new("rk");

        let e = embedding.headers(HeaderContext::DataApi).await.unwrap();
        let r = reranking.headers(HeaderContext::DataApi).await.unwrap();

        assert_eq!(e.get("x-embedding-api-key").map(String::as_str), Some("ek"));
        assert_eq!(r.get("reranking-api-key").map(String::as_str), Some("rk"));
    }

    #[test]
    fn debug_never_prints_credentials() {
        let provider = StaticTokenProvider::new("super-secret");
        assert!(!format!("{provider:?}").contains("super-secret"));
    }
}
