//! Root client options.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use astra_runtime::error::InvalidOptionsError;
use astra_runtime::events::LoggingConfig;
use astra_runtime::fetch::{Fetcher, HttpVersionPreference};
use astra_runtime::http::Caller;
use astra_runtime::timeouts::TimeoutDefaults;

use super::db::{AdminOptions, DbOptions};
use super::merge_header_maps;

/// Which Data API backend the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataApiEnvironment {
    #[default]
    Astra,
    Dse,
    Hcd,
    Cassandra,
    Other,
}

impl DataApiEnvironment {
    /// The config-facing name.
    pub fn name(&self) -> &'static str {
        match self {
            DataApiEnvironment::Astra => "astra",
            DataApiEnvironment::Dse => "dse",
            DataApiEnvironment::Hcd => "hcd",
            DataApiEnvironment::Cassandra => "cassandra",
            DataApiEnvironment::Other => "other",
        }
    }

    /// Parses a config name; rejects unknown members.
    pub fn parse(name: &str) -> Result<Self, InvalidOptionsError> {
        match name {
            "astra" => Ok(DataApiEnvironment::Astra),
            "dse" => Ok(DataApiEnvironment::Dse),
            "hcd" => Ok(DataApiEnvironment::Hcd),
            "cassandra" => Ok(DataApiEnvironment::Cassandra),
            "other" => Ok(DataApiEnvironment::Other),
            other => Err(InvalidOptionsError::new(
                "environment",
                format!("unknown environment '{other}'"),
            )),
        }
    }
}

/// HTTP transport options: a protocol preference for the built-in fetcher,
/// or a user-supplied fetcher that replaces it.
#[derive(Clone, Default)]
pub struct HttpClientOptions {
    /// Protocol preference for the built-in fetcher.
    pub version: Option<HttpVersionPreference>,
    /// A custom transport; wins over `version` when set.
    pub custom_fetcher: Option<Arc<dyn Fetcher>>,
}

impl HttpClientOptions {
    /// The identity element.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Right-biased merge.
    pub fn concat(self, other: HttpClientOptions) -> HttpClientOptions {
        HttpClientOptions {
            version: other.version.or(self.version),
            custom_fetcher: other.custom_fetcher.or(self.custom_fetcher),
        }
    }
}

impl std::fmt::Debug for HttpClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientOptions")
            .field("version", &self.version)
            .field("custom_fetcher", &self.custom_fetcher.is_some())
            .finish()
    }
}

/// Options accepted by the root client; the outermost layer of the
/// configuration hierarchy.
#[derive(Clone, Default)]
pub struct ClientOptions {
    /// Backend flavor; defaults to Astra.
    pub environment: Option<DataApiEnvironment>,
    /// Caller chain for the User-Agent, most-important first.
    pub caller: Vec<Caller>,
    /// Event logging configuration.
    pub logging: LoggingConfig,
    /// Transport options.
    pub http_options: HttpClientOptions,
    /// Defaults inherited by every spawned `Db`.
    pub db_options: DbOptions,
    /// Defaults inherited by admin facades.
    pub admin_options: AdminOptions,
    /// Timeout overrides inherited by everything.
    pub timeout_defaults: TimeoutDefaults,
    /// Extra headers on every request.
    pub additional_headers: HashMap<String, String>,
}

impl ClientOptions {
    /// The identity element.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merges `other` over this layer. Callers concatenate (parent chain
    /// first); every other field merges right-biased.
    pub fn concat(mut self, other: ClientOptions) -> ClientOptions {
        self.caller.extend(other.caller);
        ClientOptions {
            environment: other.environment.or(self.environment),
            caller: self.caller,
            logging: self.logging.concat(other.logging),
            http_options: self.http_options.concat(other.http_options),
            db_options: self.db_options.concat(other.db_options),
            admin_options: self.admin_options.concat(other.admin_options),
            timeout_defaults: self.timeout_defaults.concat(other.timeout_defaults),
            additional_headers: merge_header_maps(self.additional_headers, other.additional_headers),
        }
    }

    /// Validates the assembled options, naming the offending path on
    /// failure.
    pub fn validate(&self) -> Result<(), InvalidOptionsError> {
        for (index, caller) in self.caller.iter().enumerate() {
            if caller.name.is_empty() {
                return Err(InvalidOptionsError::new(
                    format!("caller[{index}].name"),
                    "must not be empty",
                ));
            }
            if caller.name.chars().any(char::is_whitespace) {
                return Err(InvalidOptionsError::new(
                    format!("caller[{index}].name"),
                    "must not contain whitespace",
                ));
            }
            if let Some(version) = &caller.version {
                if version.is_empty() || version.chars().any(char::is_whitespace) {
                    return Err(InvalidOptionsError::new(
                        format!("caller[{index}].version"),
                        "must be a non-empty token",
                    ));
                }
            }
        }
        self.db_options.validate()?;
        self.logging.resolve().map(drop)
    }

    /// Sets the environment.
    pub fn environment(mut self, environment: DataApiEnvironment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Appends a caller to the chain.
    pub fn caller(mut self, name: impl Into<String>, version: Option<&str>) -> Self {
        self.caller.push(Caller::new(name, version));
        self
    }

    /// Sets the logging configuration.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Sets the HTTP options.
    pub fn http_options(mut self, http_options: HttpClientOptions) -> Self {
        self.http_options = http_options;
        self
    }

    /// Sets the db-level defaults.
    pub fn db_options(mut self, db_options: DbOptions) -> Self {
        self.db_options = db_options;
        self
    }

    /// Sets the admin-level defaults.
    pub fn admin_options(mut self, admin_options: AdminOptions) -> Self {
        self.admin_options = admin_options;
        self
    }

    /// Sets the timeout overrides.
    pub fn timeout_defaults(mut self, timeout_defaults: TimeoutDefaults) -> Self {
        self.timeout_defaults = timeout_defaults;
        self
    }

    /// Adds a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_headers.insert(name.into(), value.into());
        self
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("environment", &self.environment)
            .field("caller", &self.caller)
            .field("http_options", &self.http_options)
            .field("timeout_defaults", &self.timeout_defaults)
            .finish()
    }
}
