//! Administrative facades: database lifecycle over DevOps (Astra) and
//! keyspace lifecycle over DevOps or Data API commands.

mod db_admin;

pub use db_admin::{AstraDbAdmin, DataApiDbAdmin, KeyspaceAdminOptions};

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use astra_protocol::devops::{AstraDatabaseInfo, AstraDatabaseStatus, CreateAstraDatabaseRequest};
use astra_runtime::events::{EventContext, EventTarget};
use astra_runtime::http::devops::{
    AdminCommandInfo, DevOpsHttpClient, DevOpsHttpClientConfig, DevOpsRequestSpec, DevOpsResponse,
    LongRunningCommand,
};
use astra_runtime::fetch::HttpMethod;
use astra_runtime::timeouts::{
    Timeout, TimeoutCategory, TimeoutDescriptor, TimeoutManager, TimeoutMode,
};

use crate::client::DataApiClient;
use crate::db::{AstraApiEnvironment, Db};
use crate::errors::{Error, Result};
use crate::options::{AdminOptions, DataApiEnvironment};

/// Default polling interval for database lifecycle operations.
const DATABASE_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// The Astra administration facade: database lifecycle over the DevOps
/// API.
#[derive(Clone)]
pub struct AstraAdmin {
    inner: Arc<AstraAdminInner>,
}

struct AstraAdminInner {
    client: DataApiClient,
    devops: DevOpsHttpClient,
    events: Arc<EventContext>,
    timeouts: TimeoutDescriptor,
}

impl AstraAdmin {
    pub(crate) fn new(client: DataApiClient, overrides: AdminOptions) -> Result<Self> {
        if client.environment() != DataApiEnvironment::Astra {
            return Err(crate::errors::InvalidArgumentsError::new(
                "the admin facade is only available in the 'astra' environment",
            )
            .into());
        }
        let options = client.inner().options.admin_options.clone().concat(overrides);

        let base_url = options
            .endpoint_url
            .clone()
            .unwrap_or_else(|| AstraApiEnvironment::Prod.devops_base_url().to_string());
        let token = options
            .admin_token
            .clone()
            .or_else(|| client.inner().token.clone());

        let logging = client.inner().logging.clone().concat(options.logging.clone());
        let events = client.events().child(logging.resolve()?);
        let timeouts = TimeoutDescriptor::default().apply(
            &client
                .inner()
                .options
                .timeout_defaults
                .concat(options.timeout_defaults),
        );

        let devops = DevOpsHttpClient::new(DevOpsHttpClientConfig {
            base_url,
            fetcher: Arc::clone(&client.inner().fetcher),
            token,
            additional_headers: options.additional_headers.clone(),
            user_agent: client.inner().user_agent.clone(),
        });

        Ok(Self {
            inner: Arc::new(AstraAdminInner {
                client,
                devops,
                events,
                timeouts,
            }),
        })
    }

    /// Lists every database the token can see.
    pub async fn list_databases(
        &self,
        timeout: Option<Timeout>,
    ) -> Result<Vec<AstraDatabaseInfo>> {
        let mut tm = self.manager(TimeoutCategory::DatabaseAdmin, timeout);
        let info = self.command_info("listDatabases", None);
        let response = self
            .inner
            .devops
            .run_command(
                &DevOpsRequestSpec {
                    method: HttpMethod::Get,
                    path: "databases".to_string(),
                    body: None,
                },
                &info,
                &mut tm,
            )
            .await?;
        parse_databases(response)
    }

    /// Fetches one database record.
    pub async fn database_info(
        &self,
        id: &str,
        timeout: Option<Timeout>,
    ) -> Result<AstraDatabaseInfo> {
        let mut tm = self.manager(TimeoutCategory::DatabaseAdmin, timeout);
        let info = self.command_info("getDatabaseInfo", Some(id));
        let response = self
            .inner
            .devops
            .run_command(
                &DevOpsRequestSpec {
                    method: HttpMethod::Get,
                    path: format!("databases/{id}"),
                    body: None,
                },
                &info,
                &mut tm,
            )
            .await?;
        parse_database(response)
    }

    /// Creates a database.
    ///
    /// With `blocking: true` (the default) this polls the database status
    /// every 10 seconds until it reaches `ACTIVE`; otherwise it returns as
    /// soon as the creation is accepted.
    pub async fn create_database(
        &self,
        request: CreateAstraDatabaseRequest,
        options: CreateDatabaseOptions,
    ) -> Result<AstraDatabaseInfo> {
        let mut tm = TimeoutManager::new(
            TimeoutMode::Multipart,
            TimeoutCategory::DatabaseAdmin,
            &self.inner.timeouts,
            options.timeout,
        );
        let info = self.command_info("createDatabase", Some(&request.name));
        let body = serde_json::to_value(&request)?;

        let response = self
            .inner
            .devops
            .run_long_running(
                LongRunningCommand {
                    info,
                    initial: DevOpsRequestSpec {
                        method: HttpMethod::Post,
                        path: "databases".to_string(),
                        body: Some(body),
                    },
                    poll_path: Box::new(|r: &DevOpsResponse| {
                        r.location().map(|id| format!("databases/{id}"))
                    }),
                    extract_state: Box::new(DevOpsResponse::state),
                    target_state: AstraDatabaseStatus::Active.as_str().to_string(),
                    legal_states: vec![
                        AstraDatabaseStatus::Initializing.as_str().to_string(),
                        AstraDatabaseStatus::Pending.as_str().to_string(),
                    ],
                    poll_interval: options.poll_interval.unwrap_or(DATABASE_POLL_INTERVAL),
                    blocking: options.blocking,
                },
                &mut tm,
            )
            .await?;

        if options.blocking {
            parse_database(response)
        } else {
            // The record isn't materialized yet; synthesize it from the
            // accepted request plus the id the server assigned.
            let id = response.location().unwrap_or_default().to_string();
            Ok(AstraDatabaseInfo {
                id,
                status: AstraDatabaseStatus::Pending,
                info: astra_protocol::devops::AstraDatabaseProperties {
                    name: Some(request.name),
                    region: Some(request.region),
                    cloud_provider: Some(request.cloud_provider),
                    keyspaces: request.keyspace.into_iter().collect(),
                },
            })
        }
    }

    /// Terminates a database, polling until `TERMINATED` when blocking.
    pub async fn drop_database(&self, id: &str, options: DropDatabaseOptions) -> Result<()> {
        let mut tm = TimeoutManager::new(
            TimeoutMode::Multipart,
            TimeoutCategory::DatabaseAdmin,
            &self.inner.timeouts,
            options.timeout,
        );
        let info = self.command_info("dropDatabase", Some(id));
        let poll = format!("databases/{id}");

        self.inner
            .devops
            .run_long_running(
                LongRunningCommand {
                    info,
                    initial: DevOpsRequestSpec {
                        method: HttpMethod::Post,
                        path: format!("databases/{id}/terminate"),
                        body: None,
                    },
                    poll_path: Box::new(move |_| Some(poll.clone())),
                    extract_state: Box::new(DevOpsResponse::state),
                    target_state: AstraDatabaseStatus::Terminated.as_str().to_string(),
                    legal_states: vec![
                        AstraDatabaseStatus::Active.as_str().to_string(),
                        AstraDatabaseStatus::Terminating.as_str().to_string(),
                    ],
                    poll_interval: options.poll_interval.unwrap_or(DATABASE_POLL_INTERVAL),
                    blocking: options.blocking,
                },
                &mut tm,
            )
            .await?;
        Ok(())
    }

    /// The DevOps-backed keyspace admin for one of this token's databases.
    pub fn db_admin(&self, db: &Db) -> Result<AstraDbAdmin> {
        AstraDbAdmin::new(db.clone(), self.clone())
    }

    pub(crate) fn devops(&self) -> &DevOpsHttpClient {
        &self.inner.devops
    }

    pub(crate) fn timeouts(&self) -> &TimeoutDescriptor {
        &self.inner.timeouts
    }

    pub(crate) fn events(&self) -> &Arc<EventContext> {
        &self.inner.events
    }

    pub(crate) fn client(&self) -> &DataApiClient {
        &self.inner.client
    }

    fn manager(&self, category: TimeoutCategory, timeout: Option<Timeout>) -> TimeoutManager {
        TimeoutManager::new(TimeoutMode::SingleCall, category, &self.inner.timeouts, timeout)
    }

    fn command_info<'a>(
        &'a self,
        name: &'a str,
        source: Option<&'a str>,
    ) -> AdminCommandInfo<'a> {
        AdminCommandInfo {
            name,
            target: EventTarget::Database,
            keyspace: None,
            source,
            events: &self.inner.events,
        }
    }
}

impl std::fmt::Debug for AstraAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AstraAdmin")
            .field("devops", &self.inner.devops)
            .finish()
    }
}

/// The admin facade for one database: DevOps-backed on Astra,
/// command-backed everywhere else.
#[derive(Debug, Clone)]
pub enum DbAdmin {
    /// Keyspace lifecycle over the DevOps API.
    Astra(AstraDbAdmin),
    /// Keyspace lifecycle over Data API commands.
    DataApi(DataApiDbAdmin),
}

impl DbAdmin {
    pub(crate) fn for_db(db: &Db) -> Result<DbAdmin> {
        if db.client().environment() == DataApiEnvironment::Astra && db.astra_endpoint().is_some() {
            let admin = db.client().admin()?;
            Ok(DbAdmin::Astra(AstraDbAdmin::new(db.clone(), admin)?))
        } else {
            Ok(DbAdmin::DataApi(DataApiDbAdmin::new(db.clone())))
        }
    }

    /// Lists the keyspaces on the database.
    pub async fn list_keyspaces(&self, timeout: Option<Timeout>) -> Result<Vec<String>> {
        match self {
            DbAdmin::Astra(admin) => admin.list_keyspaces(timeout).await,
            DbAdmin::DataApi(admin) => admin.list_keyspaces(timeout).await,
        }
    }

    /// Creates a keyspace.
    pub async fn create_keyspace(
        &self,
        name: &str,
        options: KeyspaceAdminOptions,
    ) -> Result<()> {
        match self {
            DbAdmin::Astra(admin) => admin.create_keyspace(name, options).await,
            DbAdmin::DataApi(admin) => admin.create_keyspace(name, options).await,
        }
    }

    /// Drops a keyspace.
    pub async fn drop_keyspace(&self, name: &str, options: KeyspaceAdminOptions) -> Result<()> {
        match self {
            DbAdmin::Astra(admin) => admin.drop_keyspace(name, options).await,
            DbAdmin::DataApi(admin) => admin.drop_keyspace(name, options).await,
        }
    }

    /// Discovers the embedding providers the database supports.
    pub async fn find_embedding_providers(
        &self,
        timeout: Option<Timeout>,
    ) -> Result<Map<String, Value>> {
        let db = match self {
            DbAdmin::Astra(admin) => admin.db(),
            DbAdmin::DataApi(admin) => admin.db(),
        };
        find_providers(db, "findEmbeddingProviders", "embeddingProviders", timeout).await
    }

    /// Discovers the reranking providers the database supports.
    pub async fn find_reranking_providers(
        &self,
        timeout: Option<Timeout>,
    ) -> Result<Map<String, Value>> {
        let db = match self {
            DbAdmin::Astra(admin) => admin.db(),
            DbAdmin::DataApi(admin) => admin.db(),
        };
        find_providers(db, "findRerankingProviders", "rerankingProviders", timeout).await
    }
}

async fn find_providers(
    db: &Db,
    command_name: &str,
    status_key: &str,
    timeout: Option<Timeout>,
) -> Result<Map<String, Value>> {
    let command = astra_protocol::command::Command::new(command_name);
    let raw = db
        .run_database_admin_command(&command, TimeoutCategory::DatabaseAdmin, timeout)
        .await?;
    Ok(raw
        .status_field(status_key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default())
}

fn parse_databases(response: DevOpsResponse) -> Result<Vec<AstraDatabaseInfo>> {
    let body = response.body.unwrap_or(Value::Null);
    serde_json::from_value(body).map_err(Error::from)
}

fn parse_database(response: DevOpsResponse) -> Result<AstraDatabaseInfo> {
    let body = response.body.unwrap_or(Value::Null);
    serde_json::from_value(body).map_err(Error::from)
}

/// Options for [`AstraAdmin::create_database`].
#[derive(Debug, Clone)]
pub struct CreateDatabaseOptions {
    /// Poll until `ACTIVE` (default) or return on acceptance.
    pub blocking: bool,
    /// Poll interval override (default 10s).
    pub poll_interval: Option<Duration>,
    /// Per-call timeout.
    pub timeout: Option<Timeout>,
}

impl Default for CreateDatabaseOptions {
    fn default() -> Self {
        Self {
            blocking: true,
            poll_interval: None,
            timeout: None,
        }
    }
}

/// Options for [`AstraAdmin::drop_database`].
#[derive(Debug, Clone)]
pub struct DropDatabaseOptions {
    /// Poll until `TERMINATED` (default) or return on acceptance.
    pub blocking: bool,
    /// Poll interval override (default 10s).
    pub poll_interval: Option<Duration>,
    /// Per-call timeout.
    pub timeout: Option<Timeout>,
}

impl Default for DropDatabaseOptions {
    fn default() -> Self {
        Self {
            blocking: true,
            poll_interval: None,
            timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_requires_the_astra_environment() {
        let options = crate::options::ClientOptions::empty()
            .environment(DataApiEnvironment::Hcd);
        let client = DataApiClient::with_options(None, options).unwrap();
        assert!(client.admin().is_err());
    }

    #[test]
    fn astra_clients_spawn_admins() {
        let client = DataApiClient::new("AstraCS:test").unwrap();
        assert!(client.admin().is_ok());
    }
}
