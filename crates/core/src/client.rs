//! The root client facade.

use std::sync::Arc;

use astra_runtime::auth::{StaticTokenProvider, TokenProvider};
use astra_runtime::events::{
    ClientEventKind, EventContext, EventPropagation, ClientEvent, LoggingConfig, Subscription,
};
use astra_runtime::fetch::{DefaultFetcher, Fetcher};
use astra_runtime::http::build_user_agent;

use crate::admin::AstraAdmin;
use crate::db::Db;
use crate::errors::Result;
use crate::options::{AdminOptions, ClientOptions, DataApiEnvironment, DbOptions};

/// The process-wide root of the client hierarchy.
///
/// Owns the environment, the transport, the caller chain, the base token,
/// the default timeouts, and the root event context. Spawn a [`Db`] per
/// database endpoint and an [`AstraAdmin`] for DevOps operations.
///
/// # Example
///
/// ```ignore
/// use astra::DataApiClient;
///
/// #[tokio::main]
/// async fn main() -> astra::Result<()> {
///     let client = DataApiClient::new("AstraCS:...")?;
///     let db = client.db("https://<id>-<region>.apps.astra.datastax.com")?;
///     let users = db.collection::<serde_json::Value>("users");
///     let found = users.find_one(serde_json::json!({ "name": "t" }), None).await?;
///     println!("{found:?}");
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct DataApiClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub environment: DataApiEnvironment,
    pub options: ClientOptions,
    pub logging: LoggingConfig,
    pub fetcher: Arc<dyn Fetcher>,
    pub user_agent: String,
    pub token: Option<Arc<dyn TokenProvider>>,
    pub events: Arc<EventContext>,
}

impl DataApiClient {
    /// Creates a client with a static application token and default
    /// options.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_options(
            Some(Arc::new(StaticTokenProvider::new(token))),
            ClientOptions::empty(),
        )
    }

    /// Creates a client with an optional token provider and explicit
    /// options.
    pub fn with_options(
        token: Option<Arc<dyn TokenProvider>>,
        options: ClientOptions,
    ) -> Result<Self> {
        options.validate()?;

        let environment = options.environment.unwrap_or_default();
        let user_agent = build_user_agent(&options.caller);

        let fetcher: Arc<dyn Fetcher> = match &options.http_options.custom_fetcher {
            Some(custom) => Arc::clone(custom),
            None => Arc::new(
                DefaultFetcher::new(options.http_options.version.unwrap_or_default())
                    .map_err(crate::errors::Error::Fetch)?,
            ),
        };

        // Default routing (everything to listeners) underneath whatever the
        // caller layered on top.
        let logging = LoggingConfig::all_to_events().concat(options.logging.clone());
        let events = EventContext::root(logging.resolve()?);

        Ok(Self {
            inner: Arc::new(ClientInner {
                environment,
                options,
                logging,
                fetcher,
                user_agent,
                token,
                events,
            }),
        })
    }

    /// The backend environment this client targets.
    pub fn environment(&self) -> DataApiEnvironment {
        self.inner.environment
    }

    /// Spawns a [`Db`] for the given endpoint with inherited options.
    pub fn db(&self, endpoint: &str) -> Result<Db> {
        self.db_with_options(endpoint, DbOptions::empty())
    }

    /// Spawns a [`Db`] with per-db overrides.
    pub fn db_with_options(&self, endpoint: &str, options: DbOptions) -> Result<Db> {
        Db::new(self.clone(), endpoint, options)
    }

    /// Spawns the Astra admin facade with inherited options.
    pub fn admin(&self) -> Result<AstraAdmin> {
        self.admin_with_options(AdminOptions::empty())
    }

    /// Spawns the Astra admin facade with overrides.
    pub fn admin_with_options(&self, options: AdminOptions) -> Result<AstraAdmin> {
        AstraAdmin::new(self.clone(), options)
    }

    /// The client's root event context.
    pub fn events(&self) -> &Arc<EventContext> {
        &self.inner.events
    }

    /// Registers an event listener at the client level (the last stop of
    /// event propagation).
    pub fn on<F>(&self, kind: ClientEventKind, listener: F) -> Subscription
    where
        F: Fn(&ClientEvent, &mut EventPropagation) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, listener)
    }

    pub(crate) fn inner(&self) -> &ClientInner {
        &self.inner
    }
}

impl std::fmt::Debug for DataApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataApiClient")
            .field("environment", &self.inner.environment)
            .field("user_agent", &self.inner.user_agent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_builds_with_defaults() {
        let client = DataApiClient::new("AstraCS:test").unwrap();
        assert_eq!(client.environment(), DataApiEnvironment::Astra);
    }

    #[test]
    fn caller_chain_feeds_the_user_agent() {
        let options = ClientOptions::empty().caller("my-app", Some("2.0"));
        let client = DataApiClient::with_options(None, options).unwrap();
        assert!(client.inner.user_agent.starts_with("my-app/2.0 "));
        assert!(client.inner.user_agent.contains("astra-db-rs/"));
    }

    #[test]
    fn invalid_options_surface_at_construction() {
        let options = ClientOptions::empty().caller("", None);
        assert!(DataApiClient::with_options(None, options).is_err());
    }
}
