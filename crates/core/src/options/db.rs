//! Db, collection/table spawn, and admin option layers.

use std::collections::HashMap;
use std::sync::Arc;

use astra_runtime::auth::{
    EmbeddingApiKeyHeadersProvider, HeadersProvider, RerankingApiKeyHeadersProvider,
    StaticTokenProvider, TokenProvider,
};
use astra_runtime::error::InvalidOptionsError;
use astra_runtime::events::LoggingConfig;
use astra_runtime::timeouts::TimeoutDefaults;

use crate::serdes::SerdesOptions;

use super::merge_header_maps;

/// Checks a keyspace name against the server's identifier rules.
pub(crate) fn validate_keyspace_name(name: &str) -> Result<(), InvalidOptionsError> {
    let valid = !name.is_empty()
        && name.len() <= 48
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(InvalidOptionsError::new(
            "keyspace",
            format!("'{name}' is not a valid keyspace name (expected [a-zA-Z0-9_]{{1,48}})"),
        ))
    }
}

/// The per-db override layer.
#[derive(Clone, Default)]
pub struct DbOptions {
    /// Default keyspace for entities spawned from the db.
    pub keyspace: Option<String>,
    /// Token override for this db.
    pub token: Option<Arc<dyn TokenProvider>>,
    /// Extra headers on this db's requests.
    pub additional_headers: HashMap<String, String>,
    /// Embedding API key provider for vectorize.
    pub embedding_api_key: Option<Arc<dyn HeadersProvider>>,
    /// Reranking API key provider.
    pub reranking_api_key: Option<Arc<dyn HeadersProvider>>,
    /// Logging overrides.
    pub logging: LoggingConfig,
    /// Timeout overrides.
    pub timeout_defaults: TimeoutDefaults,
    /// Serdes defaults for spawned collections/tables.
    pub serdes: SerdesOptions,
}

impl DbOptions {
    /// The identity element.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Right-biased field-wise merge.
    pub fn concat(self, other: DbOptions) -> DbOptions {
        DbOptions {
            keyspace: other.keyspace.or(self.keyspace),
            token: other.token.or(self.token),
            additional_headers: merge_header_maps(self.additional_headers, other.additional_headers),
            embedding_api_key: other.embedding_api_key.or(self.embedding_api_key),
            reranking_api_key: other.reranking_api_key.or(self.reranking_api_key),
            logging: self.logging.concat(other.logging),
            timeout_defaults: self.timeout_defaults.concat(other.timeout_defaults),
            serdes: self.serdes.concat(other.serdes),
        }
    }

    /// Validates the assembled options.
    pub fn validate(&self) -> Result<(), InvalidOptionsError> {
        if let Some(keyspace) = &self.keyspace {
            validate_keyspace_name(keyspace)?;
        }
        self.logging.resolve().map(drop)
    }

    /// Sets the default keyspace.
    pub fn keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    /// Overrides the token with a static application token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(Arc::new(StaticTokenProvider::new(token)));
        self
    }

    /// Overrides the token with a custom provider.
    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token = Some(provider);
        self
    }

    /// Sets a static embedding API key.
    pub fn embedding_api_key(mut self, key: impl Into<String>) -> Self {
        self.embedding_api_key = Some(Arc::new(EmbeddingApiKeyHeadersProvider::new(key)));
        self
    }

    /// Sets a static reranking API key.
    pub fn reranking_api_key(mut self, key: impl Into<String>) -> Self {
        self.reranking_api_key = Some(Arc::new(RerankingApiKeyHeadersProvider::new(key)));
        self
    }

    /// Sets the logging configuration.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Sets the timeout overrides.
    pub fn timeout_defaults(mut self, timeout_defaults: TimeoutDefaults) -> Self {
        self.timeout_defaults = timeout_defaults;
        self
    }

    /// Sets the serdes defaults.
    pub fn serdes(mut self, serdes: SerdesOptions) -> Self {
        self.serdes = serdes;
        self
    }
}

impl std::fmt::Debug for DbOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbOptions")
            .field("keyspace", &self.keyspace)
            .field("token", &self.token.is_some())
            .field("timeout_defaults", &self.timeout_defaults)
            .finish()
    }
}

macro_rules! spawn_options {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Default)]
        pub struct $name {
            /// Keyspace override for this entity.
            pub keyspace: Option<String>,
            /// Embedding API key provider for vectorize.
            pub embedding_api_key: Option<Arc<dyn HeadersProvider>>,
            /// Reranking API key provider.
            pub reranking_api_key: Option<Arc<dyn HeadersProvider>>,
            /// Logging overrides.
            pub logging: LoggingConfig,
            /// Timeout overrides.
            pub timeout_defaults: TimeoutDefaults,
            /// Serdes configuration.
            pub serdes: SerdesOptions,
        }

        impl $name {
            /// The identity element.
            pub fn empty() -> Self {
                Self::default()
            }

            /// Right-biased field-wise merge.
            pub fn concat(self, other: $name) -> $name {
                $name {
                    keyspace: other.keyspace.or(self.keyspace),
                    embedding_api_key: other.embedding_api_key.or(self.embedding_api_key),
                    reranking_api_key: other.reranking_api_key.or(self.reranking_api_key),
                    logging: self.logging.concat(other.logging),
                    timeout_defaults: self.timeout_defaults.concat(other.timeout_defaults),
                    serdes: self.serdes.concat(other.serdes),
                }
            }

            /// Validates the assembled options.
            pub fn validate(&self) -> Result<(), InvalidOptionsError> {
                if let Some(keyspace) = &self.keyspace {
                    validate_keyspace_name(keyspace)?;
                }
                self.logging.resolve().map(drop)
            }

            /// Sets the keyspace override.
            pub fn keyspace(mut self, keyspace: impl Into<String>) -> Self {
                self.keyspace = Some(keyspace.into());
                self
            }

            /// Sets a static embedding API key.
            pub fn embedding_api_key(mut self, key: impl Into<String>) -> Self {
                self.embedding_api_key = Some(Arc::new(EmbeddingApiKeyHeadersProvider::new(key)));
                self
            }

            /// Sets a static reranking API key.
            pub fn reranking_api_key(mut self, key: impl Into<String>) -> Self {
                self.reranking_api_key = Some(Arc::new(RerankingApiKeyHeadersProvider::new(key)));
                self
            }

            /// Sets the logging configuration.
            pub fn logging(mut self, logging: LoggingConfig) -> Self {
                self.logging = logging;
                self
            }

            /// Sets the timeout overrides.
            pub fn timeout_defaults(mut self, timeout_defaults: TimeoutDefaults) -> Self {
                self.timeout_defaults = timeout_defaults;
                self
            }

            /// Sets the serdes configuration.
            pub fn serdes(mut self, serdes: SerdesOptions) -> Self {
                self.serdes = serdes;
                self
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("keyspace", &self.keyspace)
                    .field("timeout_defaults", &self.timeout_defaults)
                    .finish()
            }
        }
    };
}

spawn_options! {
    /// Options for spawning a collection from a db.
    CollectionOptions
}

spawn_options! {
    /// Options for spawning a table from a db.
    TableOptions
}

/// Options for the admin facades.
#[derive(Clone, Default)]
pub struct AdminOptions {
    /// Token override for DevOps requests (falls back to the client token).
    pub admin_token: Option<Arc<dyn TokenProvider>>,
    /// DevOps endpoint override (environment-derived by default).
    pub endpoint_url: Option<String>,
    /// Logging overrides.
    pub logging: LoggingConfig,
    /// Timeout overrides.
    pub timeout_defaults: TimeoutDefaults,
    /// Extra headers on admin requests.
    pub additional_headers: HashMap<String, String>,
}

impl AdminOptions {
    /// The identity element.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Right-biased field-wise merge.
    pub fn concat(self, other: AdminOptions) -> AdminOptions {
        AdminOptions {
            admin_token: other.admin_token.or(self.admin_token),
            endpoint_url: other.endpoint_url.or(self.endpoint_url),
            logging: self.logging.concat(other.logging),
            timeout_defaults: self.timeout_defaults.concat(other.timeout_defaults),
            additional_headers: merge_header_maps(self.additional_headers, other.additional_headers),
        }
    }

    /// Overrides the admin token with a static application token.
    pub fn admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(Arc::new(StaticTokenProvider::new(token)));
        self
    }

    /// Overrides the DevOps endpoint.
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    /// Sets the timeout overrides.
    pub fn timeout_defaults(mut self, timeout_defaults: TimeoutDefaults) -> Self {
        self.timeout_defaults = timeout_defaults;
        self
    }
}

impl std::fmt::Debug for AdminOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminOptions")
            .field("admin_token", &self.admin_token.is_some())
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyspace_names_are_validated() {
        assert!(validate_keyspace_name("default_keyspace").is_ok());
        assert!(validate_keyspace_name("ks_42").is_ok());
        assert!(validate_keyspace_name("").is_err());
        assert!(validate_keyspace_name("has-dash").is_err());
        assert!(validate_keyspace_name(&"x".repeat(49)).is_err());
    }

    #[test]
    fn db_options_merge_right_biased() {
        let parent = DbOptions::empty().keyspace("parent_ks").token("parent-token");
        let child = DbOptions::empty().keyspace("child_ks");
        let merged = parent.concat(child);
        assert_eq!(merged.keyspace.as_deref(), Some("child_ks"));
        // Parent token survives because the child didn't override it.
        assert!(merged.token.is_some());
    }

    #[test]
    fn timeout_defaults_inherit_field_wise() {
        let parent = DbOptions::empty().timeout_defaults(TimeoutDefaults {
            request_timeout_ms: Some(5_000),
            general_method_timeout_ms: Some(20_000),
            ..TimeoutDefaults::empty()
        });
        let child = CollectionOptions::empty().timeout_defaults(TimeoutDefaults {
            general_method_timeout_ms: Some(2_000),
            ..TimeoutDefaults::empty()
        });

        let merged = parent.timeout_defaults.concat(child.timeout_defaults);
        assert_eq!(merged.request_timeout_ms, Some(5_000));
        assert_eq!(merged.general_method_timeout_ms, Some(2_000));
    }

    #[test]
    fn spawn_options_identity_law() {
        let a = CollectionOptions::empty().keyspace("ks").embedding_api_key("ek");
        let merged = a.clone().concat(CollectionOptions::empty());
        assert_eq!(merged.keyspace, a.keyspace);
        assert!(merged.embedding_api_key.is_some());

        let merged = CollectionOptions::empty().concat(a.clone());
        assert_eq!(merged.keyspace, a.keyspace);
    }
}
