//! The database facade.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;

use astra_protocol::command::Command;
use astra_protocol::response::RawDataApiResponse;
use astra_runtime::events::{
    ClientEvent, ClientEventKind, EventContext, EventPropagation, EventTarget, LoggingConfig,
    Subscription,
};
use astra_runtime::http::DEFAULT_DATA_API_PATH;
use astra_runtime::http::data_api::{CommandInfo, DataApiHttpClient, DataApiHttpClientConfig};
use astra_runtime::http::retry::RetryPolicy;
use astra_runtime::timeouts::{
    Timeout, TimeoutCategory, TimeoutDescriptor, TimeoutManager, TimeoutMode,
};

use crate::client::DataApiClient;
use crate::collection::Collection;
use crate::errors::{Error, Result};
use crate::options::{
    CollectionOptions, DataApiEnvironment, DbOptions, TableOptions, validate_keyspace_name,
};
use crate::results::{CollectionDescriptor, TableDescriptor};
use crate::table::Table;

/// The keyspace used when none is configured.
pub const DEFAULT_KEYSPACE: &str = "default_keyspace";

/// Which Astra deployment an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstraApiEnvironment {
    Prod,
    Dev,
    Test,
}

impl AstraApiEnvironment {
    /// The DevOps API base URL for this deployment.
    pub fn devops_base_url(&self) -> &'static str {
        match self {
            AstraApiEnvironment::Prod => "https://api.astra.datastax.com/v2",
            AstraApiEnvironment::Dev => "https://api.dev.cloud.datastax.com/v2",
            AstraApiEnvironment::Test => "https://api.test.cloud.datastax.com/v2",
        }
    }

    fn host_suffix(&self) -> &'static str {
        match self {
            AstraApiEnvironment::Prod => ".apps.astra.datastax.com",
            AstraApiEnvironment::Dev => ".apps.astra-dev.datastax.com",
            AstraApiEnvironment::Test => ".apps.astra-test.datastax.com",
        }
    }
}

/// The parsed form of an Astra database endpoint
/// (`https://<uuid>-<region>.apps.astra[-dev|-test].datastax.com`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstraEndpoint {
    /// The database id.
    pub database_id: String,
    /// The deployment region (e.g. `us-east-2`).
    pub region: String,
    /// Which Astra deployment the endpoint belongs to.
    pub environment: AstraApiEnvironment,
}

/// Parses an Astra endpoint URL into `(id, region, environment)`.
///
/// Returns `None` for anything that is not an Astra endpoint; never
/// misclassifies arbitrary URLs.
pub fn parse_astra_endpoint(endpoint: &str) -> Option<AstraEndpoint> {
    let parsed = url::Url::parse(endpoint).ok()?;
    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        return None;
    }
    let host = parsed.host_str()?;

    let environment = [
        AstraApiEnvironment::Prod,
        AstraApiEnvironment::Dev,
        AstraApiEnvironment::Test,
    ]
    .into_iter()
    .find(|env| host.ends_with(env.host_suffix()))?;

    let prefix = host.strip_suffix(environment.host_suffix())?;
    if prefix.len() < 38 {
        return None;
    }
    let (id_part, rest) = prefix.split_at(36);
    let region = rest.strip_prefix('-')?;

    uuid::Uuid::parse_str(id_part).ok()?;
    if region.is_empty()
        || !region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return None;
    }

    Some(AstraEndpoint {
        database_id: id_part.to_string(),
        region: region.to_string(),
        environment,
    })
}

/// A handle to one database.
///
/// Spawned from a [`DataApiClient`]; holds the endpoint, the default
/// keyspace, per-db option overrides, and the shared command executor.
/// Collections and tables are stateless references spawned from here.
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

pub(crate) struct DbInner {
    pub client: DataApiClient,
    pub endpoint: String,
    pub astra: Option<AstraEndpoint>,
    pub keyspace: RwLock<String>,
    pub options: DbOptions,
    pub logging: LoggingConfig,
    pub http: Arc<DataApiHttpClient>,
    pub events: Arc<EventContext>,
    pub timeouts: TimeoutDescriptor,
}

impl Db {
    pub(crate) fn new(client: DataApiClient, endpoint: &str, overrides: DbOptions) -> Result<Db> {
        overrides.validate()?;
        let options = client.inner().options.db_options.clone().concat(overrides);

        let astra = parse_astra_endpoint(endpoint);
        let keyspace = options
            .keyspace
            .clone()
            .unwrap_or_else(|| DEFAULT_KEYSPACE.to_string());
        validate_keyspace_name(&keyspace)?;

        let token = options.token.clone().or_else(|| client.inner().token.clone());
        let timeouts = TimeoutDescriptor::default().apply(
            &client
                .inner()
                .options
                .timeout_defaults
                .concat(options.timeout_defaults),
        );

        let logging = client.inner().logging.clone().concat(options.logging.clone());
        let events = client.events().child(logging.resolve()?);

        let additional_headers = crate::options::merge_header_maps(
            client.inner().options.additional_headers.clone(),
            options.additional_headers.clone(),
        );

        let http = Arc::new(DataApiHttpClient::new(DataApiHttpClientConfig {
            base_url: endpoint.trim_end_matches('/').to_string(),
            api_path: DEFAULT_DATA_API_PATH.to_string(),
            fetcher: Arc::clone(&client.inner().fetcher),
            token,
            additional_headers,
            embedding_headers: options.embedding_api_key.clone(),
            reranking_headers: options.reranking_api_key.clone(),
            user_agent: client.inner().user_agent.clone(),
            retry: RetryPolicy::default(),
        }));

        Ok(Db {
            inner: Arc::new(DbInner {
                client,
                endpoint: endpoint.trim_end_matches('/').to_string(),
                astra,
                keyspace: RwLock::new(keyspace),
                options,
                logging,
                http,
                events,
                timeouts,
            }),
        })
    }

    /// The database endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// The current default keyspace.
    pub fn keyspace(&self) -> String {
        self.inner.keyspace.read().clone()
    }

    /// Switches the default keyspace for entities spawned after this call.
    pub fn use_keyspace(&self, keyspace: impl Into<String>) -> Result<()> {
        let keyspace = keyspace.into();
        validate_keyspace_name(&keyspace)?;
        *self.inner.keyspace.write() = keyspace;
        Ok(())
    }

    /// The database id, when this is an Astra endpoint.
    pub fn id(&self) -> Option<&str> {
        self.inner.astra.as_ref().map(|a| a.database_id.as_str())
    }

    /// The deployment region, when this is an Astra endpoint.
    pub fn region(&self) -> Option<&str> {
        self.inner.astra.as_ref().map(|a| a.region.as_str())
    }

    /// The parsed Astra endpoint, when applicable.
    pub fn astra_endpoint(&self) -> Option<&AstraEndpoint> {
        self.inner.astra.as_ref()
    }

    /// The owning client.
    pub fn client(&self) -> &DataApiClient {
        &self.inner.client
    }

    /// Registers an event listener at the db level.
    pub fn on<F>(&self, kind: ClientEventKind, listener: F) -> Subscription
    where
        F: Fn(&ClientEvent, &mut EventPropagation) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, listener)
    }

    /// Spawns a collection reference (no server round trip).
    pub fn collection<T: DeserializeOwned>(&self, name: &str) -> Result<Collection<T>> {
        self.collection_with_options(name, CollectionOptions::empty())
    }

    /// Spawns a collection reference with per-collection overrides.
    pub fn collection_with_options<T: DeserializeOwned>(
        &self,
        name: &str,
        options: CollectionOptions,
    ) -> Result<Collection<T>> {
        Collection::spawn(self.clone(), name, options)
    }

    /// Spawns a table reference (no server round trip).
    pub fn table<T: DeserializeOwned>(&self, name: &str) -> Result<Table<T>> {
        self.table_with_options(name, TableOptions::empty())
    }

    /// Spawns a table reference with per-table overrides.
    pub fn table_with_options<T: DeserializeOwned>(
        &self,
        name: &str,
        options: TableOptions,
    ) -> Result<Table<T>> {
        Table::spawn(self.clone(), name, options)
    }

    /// Creates a collection and returns a reference to it.
    pub async fn create_collection<T: DeserializeOwned>(
        &self,
        name: &str,
        options: CreateCollectionOptions,
    ) -> Result<Collection<T>> {
        let mut command = Command::new("createCollection").arg("name", name);
        if let Some(definition) = &options.definition {
            command = command.arg("options", serde_json::to_value(definition)?);
        }
        self.run_keyspace_command(
            &command,
            TimeoutCategory::CollectionAdmin,
            options.timeout,
        )
        .await?;
        self.collection_with_options(name, options.spawn)
    }

    /// Drops a collection.
    pub async fn drop_collection(&self, name: &str, timeout: Option<Timeout>) -> Result<()> {
        let command = Command::new("deleteCollection").arg("name", name);
        self.run_keyspace_command(&command, TimeoutCategory::CollectionAdmin, timeout)
            .await?;
        Ok(())
    }

    /// Lists collections in the default keyspace, with their definitions.
    pub async fn list_collections(
        &self,
        timeout: Option<Timeout>,
    ) -> Result<Vec<CollectionDescriptor>> {
        let command = Command::new("findCollections")
            .arg("options", serde_json::json!({ "explain": true }));
        let raw = self
            .run_keyspace_command(&command, TimeoutCategory::CollectionAdmin, timeout)
            .await?;
        Ok(raw
            .status_field("collections")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default())
    }

    /// Lists collection names in the default keyspace.
    pub async fn list_collection_names(&self, timeout: Option<Timeout>) -> Result<Vec<String>> {
        let command = Command::new("findCollections");
        let raw = self
            .run_keyspace_command(&command, TimeoutCategory::CollectionAdmin, timeout)
            .await?;
        Ok(raw
            .status_field("collections")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default())
    }

    /// Creates a table from a definition and returns a reference to it.
    pub async fn create_table<T: DeserializeOwned>(
        &self,
        name: &str,
        definition: Value,
        options: CreateTableOptions,
    ) -> Result<Table<T>> {
        let mut command = Command::new("createTable")
            .arg("name", name)
            .arg("definition", definition);
        if options.if_not_exists {
            command = command.arg("options", serde_json::json!({ "ifNotExists": true }));
        }
        self.run_keyspace_command(&command, TimeoutCategory::TableAdmin, options.timeout)
            .await?;
        self.table(name)
    }

    /// Drops a table.
    pub async fn drop_table(&self, name: &str, options: DropTableOptions) -> Result<()> {
        let mut command = Command::new("dropTable").arg("name", name);
        if options.if_exists {
            command = command.arg("options", serde_json::json!({ "ifExists": true }));
        }
        self.run_keyspace_command(&command, TimeoutCategory::TableAdmin, options.timeout)
            .await?;
        Ok(())
    }

    /// Lists tables in the default keyspace, with their definitions.
    pub async fn list_tables(&self, timeout: Option<Timeout>) -> Result<Vec<TableDescriptor>> {
        let command =
            Command::new("listTables").arg("options", serde_json::json!({ "explain": true }));
        let raw = self
            .run_keyspace_command(&command, TimeoutCategory::TableAdmin, timeout)
            .await?;
        Ok(raw
            .status_field("tables")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default())
    }

    /// Lists table names in the default keyspace.
    pub async fn list_table_names(&self, timeout: Option<Timeout>) -> Result<Vec<String>> {
        let command = Command::new("listTables");
        let raw = self
            .run_keyspace_command(&command, TimeoutCategory::TableAdmin, timeout)
            .await?;
        Ok(raw
            .status_field("tables")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default())
    }

    /// Drops a table index by name.
    pub async fn drop_table_index(&self, name: &str, options: DropTableIndexOptions) -> Result<()> {
        let mut command = Command::new("dropIndex").arg("name", name);
        if options.if_exists {
            command = command.arg("options", serde_json::json!({ "ifExists": true }));
        }
        self.run_keyspace_command(&command, TimeoutCategory::TableAdmin, options.timeout)
            .await?;
        Ok(())
    }

    /// Runs an arbitrary command against this database (escape hatch for
    /// commands the typed surface does not cover).
    pub async fn command(
        &self,
        command: Command,
        options: RunCommandOptions,
    ) -> Result<RawDataApiResponse> {
        let keyspace = if options.database_level {
            None
        } else {
            Some(options.keyspace.unwrap_or_else(|| self.keyspace()))
        };
        let mut tm = TimeoutManager::new(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            &self.inner.timeouts,
            options.timeout,
        );
        let info = CommandInfo {
            keyspace: keyspace.as_deref(),
            target_name: options.collection_or_table.as_deref(),
            target: if options.collection_or_table.is_some() {
                EventTarget::Collection
            } else if keyspace.is_some() {
                EventTarget::Keyspace
            } else {
                EventTarget::Database
            },
            events: &self.inner.events,
            retryable: false,
            admin: false,
        };
        self.inner
            .http
            .execute_command(&command, info, &mut tm)
            .await
            .map_err(Error::from)
    }

    /// The admin facade for this database: DevOps-backed on Astra,
    /// command-backed elsewhere.
    pub fn admin(&self) -> Result<crate::admin::DbAdmin> {
        crate::admin::DbAdmin::for_db(self)
    }

    pub(crate) fn inner(&self) -> &DbInner {
        &self.inner
    }

    /// Runs a keyspace-scoped admin-ish command with keyspace event target.
    async fn run_keyspace_command(
        &self,
        command: &Command,
        category: TimeoutCategory,
        timeout: Option<Timeout>,
    ) -> Result<RawDataApiResponse> {
        let keyspace = self.keyspace();
        let mut tm =
            TimeoutManager::new(TimeoutMode::SingleCall, category, &self.inner.timeouts, timeout);
        let info = CommandInfo {
            keyspace: Some(&keyspace),
            target_name: None,
            target: EventTarget::Keyspace,
            events: &self.inner.events,
            retryable: false,
            admin: false,
        };
        self.inner
            .http
            .execute_command(command, info, &mut tm)
            .await
            .map_err(Error::from)
    }

    /// Runs a database-level admin command (no keyspace path segment).
    pub(crate) async fn run_database_admin_command(
        &self,
        command: &Command,
        category: TimeoutCategory,
        timeout: Option<Timeout>,
    ) -> Result<RawDataApiResponse> {
        let mut tm =
            TimeoutManager::new(TimeoutMode::SingleCall, category, &self.inner.timeouts, timeout);
        let info = CommandInfo {
            keyspace: None,
            target_name: None,
            target: EventTarget::Database,
            events: &self.inner.events,
            retryable: false,
            admin: true,
        };
        self.inner
            .http
            .execute_command(command, info, &mut tm)
            .await
            .map_err(Error::from)
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("endpoint", &self.inner.endpoint)
            .field("keyspace", &*self.inner.keyspace.read())
            .field("astra", &self.inner.astra)
            .finish()
    }
}

/// How `_id` values are generated for documents inserted without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultIdKind {
    #[serde(rename = "uuid")]
    Uuid,
    #[serde(rename = "uuidv6")]
    UuidV6,
    #[serde(rename = "uuidv7")]
    UuidV7,
    #[serde(rename = "objectId")]
    ObjectId,
}

/// The `defaultId` block of a collection definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultIdDefinition {
    /// Which id flavor the server generates.
    #[serde(rename = "type")]
    pub kind: DefaultIdKind,
}

/// Vector similarity function for a vector-enabled collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorMetric {
    Cosine,
    DotProduct,
    Euclidean,
}

/// The `vector` block of a collection definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorDefinition {
    /// Embedding dimension.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
    /// Similarity metric.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<VectorMetric>,
    /// Vectorize service configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Value>,
}

/// Creation-time collection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDefinition {
    /// Default id generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_id: Option<DefaultIdDefinition>,
    /// Vector search configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<VectorDefinition>,
    /// Indexing allow/deny lists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexing: Option<Value>,
}

/// Options for [`Db::create_collection`].
#[derive(Debug, Clone, Default)]
pub struct CreateCollectionOptions {
    /// The collection definition sent to the server.
    pub definition: Option<CollectionDefinition>,
    /// Spawn options for the returned reference.
    pub spawn: CollectionOptions,
    /// Per-call timeout.
    pub timeout: Option<Timeout>,
}

/// Options for [`Db::create_table`].
#[derive(Debug, Clone, Default)]
pub struct CreateTableOptions {
    /// Skip the error when the table already exists.
    pub if_not_exists: bool,
    /// Per-call timeout.
    pub timeout: Option<Timeout>,
}

/// Options for [`Db::drop_table`].
#[derive(Debug, Clone, Default)]
pub struct DropTableOptions {
    /// Skip the error when the table does not exist.
    pub if_exists: bool,
    /// Per-call timeout.
    pub timeout: Option<Timeout>,
}

/// Options for [`Db::drop_table_index`].
#[derive(Debug, Clone, Default)]
pub struct DropTableIndexOptions {
    /// Skip the error when the index does not exist.
    pub if_exists: bool,
    /// Per-call timeout.
    pub timeout: Option<Timeout>,
}

/// Options for [`Db::command`].
#[derive(Debug, Clone, Default)]
pub struct RunCommandOptions {
    /// Keyspace override (`None` uses the db default).
    pub keyspace: Option<String>,
    /// Run at the database level, without any keyspace path segment.
    pub database_level: bool,
    /// Collection/table path segment.
    pub collection_or_table: Option<String>,
    /// Per-call timeout.
    pub timeout: Option<Timeout>,
}

/// A non-Astra environment still parses as a plain endpoint; expose the
/// check used by admin spawning.
pub(crate) fn requires_astra(db: &Db) -> Result<&AstraEndpoint> {
    match (&db.inner().astra, db.client().environment()) {
        (Some(astra), DataApiEnvironment::Astra) => Ok(astra),
        _ => Err(crate::errors::InvalidArgumentsError::new(
            "this operation requires an Astra database (environment 'astra' and an Astra endpoint URL)",
        )
        .into()),
    }
}
