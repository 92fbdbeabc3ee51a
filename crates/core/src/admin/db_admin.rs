//! Keyspace lifecycle for one database.

use std::time::Duration;

use astra_protocol::command::Command;
use astra_protocol::devops::AstraDatabaseStatus;
use astra_runtime::events::EventTarget;
use astra_runtime::fetch::HttpMethod;
use astra_runtime::http::devops::{
    AdminCommandInfo, DevOpsRequestSpec, DevOpsResponse, LongRunningCommand,
};
use astra_runtime::timeouts::{Timeout, TimeoutCategory, TimeoutManager, TimeoutMode};

use crate::db::{Db, requires_astra};
use crate::errors::Result;
use crate::options::validate_keyspace_name;

use super::AstraAdmin;

/// Default polling interval for keyspace lifecycle operations.
const KEYSPACE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Options shared by keyspace create/drop operations.
#[derive(Debug, Clone)]
pub struct KeyspaceAdminOptions {
    /// Poll until the database is back to `ACTIVE` (default) or return on
    /// acceptance. Only meaningful for the DevOps-backed admin.
    pub blocking: bool,
    /// Poll interval override (default 1s).
    pub poll_interval: Option<Duration>,
    /// Also switch the owning [`Db`]'s working keyspace to the one being
    /// created.
    pub update_db_keyspace: bool,
    /// Per-call timeout.
    pub timeout: Option<Timeout>,
}

impl Default for KeyspaceAdminOptions {
    fn default() -> Self {
        Self {
            blocking: true,
            poll_interval: None,
            update_db_keyspace: false,
            timeout: None,
        }
    }
}

/// DevOps-backed keyspace administration for one Astra database.
#[derive(Clone)]
pub struct AstraDbAdmin {
    db: Db,
    admin: AstraAdmin,
    database_id: String,
}

impl AstraDbAdmin {
    pub(crate) fn new(db: Db, admin: AstraAdmin) -> Result<Self> {
        let astra = requires_astra(&db)?;
        let database_id = astra.database_id.clone();
        Ok(Self {
            db,
            admin,
            database_id,
        })
    }

    /// The database this admin manages.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Lists the keyspaces on the database.
    pub async fn list_keyspaces(&self, timeout: Option<Timeout>) -> Result<Vec<String>> {
        let info = self
            .admin
            .database_info(&self.database_id, timeout)
            .await?;
        Ok(info.info.keyspaces)
    }

    /// Creates a keyspace, polling the database back to `ACTIVE` when
    /// blocking.
    pub async fn create_keyspace(
        &self,
        name: &str,
        options: KeyspaceAdminOptions,
    ) -> Result<()> {
        validate_keyspace_name(name)?;

        let mut tm = TimeoutManager::new(
            TimeoutMode::Multipart,
            TimeoutCategory::KeyspaceAdmin,
            self.admin.timeouts(),
            options.timeout,
        );
        self.run_keyspace_lifecycle(
            "createKeyspace",
            name,
            DevOpsRequestSpec {
                method: HttpMethod::Post,
                path: format!("databases/{}/keyspaces/{name}", self.database_id),
                body: None,
            },
            &options,
            &mut tm,
        )
        .await?;

        if options.update_db_keyspace {
            self.db.use_keyspace(name)?;
        }
        Ok(())
    }

    /// Drops a keyspace, polling the database back to `ACTIVE` when
    /// blocking.
    pub async fn drop_keyspace(&self, name: &str, options: KeyspaceAdminOptions) -> Result<()> {
        validate_keyspace_name(name)?;

        let mut tm = TimeoutManager::new(
            TimeoutMode::Multipart,
            TimeoutCategory::KeyspaceAdmin,
            self.admin.timeouts(),
            options.timeout,
        );
        self.run_keyspace_lifecycle(
            "dropKeyspace",
            name,
            DevOpsRequestSpec {
                method: HttpMethod::Delete,
                path: format!("databases/{}/keyspaces/{name}", self.database_id),
                body: None,
            },
            &options,
            &mut tm,
        )
        .await
    }

    async fn run_keyspace_lifecycle(
        &self,
        op_name: &str,
        keyspace: &str,
        initial: DevOpsRequestSpec,
        options: &KeyspaceAdminOptions,
        tm: &mut TimeoutManager,
    ) -> Result<()> {
        let poll = format!("databases/{}", self.database_id);
        self.admin
            .devops()
            .run_long_running(
                LongRunningCommand {
                    info: AdminCommandInfo {
                        name: op_name,
                        target: EventTarget::Keyspace,
                        keyspace: Some(keyspace),
                        source: Some(&self.database_id),
                        events: self.admin.events(),
                    },
                    initial,
                    poll_path: Box::new(move |_| Some(poll.clone())),
                    extract_state: Box::new(DevOpsResponse::state),
                    target_state: AstraDatabaseStatus::Active.as_str().to_string(),
                    legal_states: vec![AstraDatabaseStatus::Maintenance.as_str().to_string()],
                    poll_interval: options.poll_interval.unwrap_or(KEYSPACE_POLL_INTERVAL),
                    blocking: options.blocking,
                },
                tm,
            )
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for AstraDbAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AstraDbAdmin")
            .field("database_id", &self.database_id)
            .finish()
    }
}

/// Command-backed keyspace administration for dse/hcd/cassandra backends.
#[derive(Clone)]
pub struct DataApiDbAdmin {
    db: Db,
}

impl DataApiDbAdmin {
    pub(crate) fn new(db: Db) -> Self {
        Self { db }
    }

    /// The database this admin manages.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Lists the keyspaces on the database.
    pub async fn list_keyspaces(&self, timeout: Option<Timeout>) -> Result<Vec<String>> {
        let command = Command::new("findKeyspaces");
        let raw = self
            .db
            .run_database_admin_command(&command, TimeoutCategory::KeyspaceAdmin, timeout)
            .await?;
        Ok(raw
            .status_field("keyspaces")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default())
    }

    /// Creates a keyspace. Data API keyspace commands complete
    /// synchronously; the blocking/polling options are inert here.
    pub async fn create_keyspace(
        &self,
        name: &str,
        options: KeyspaceAdminOptions,
    ) -> Result<()> {
        validate_keyspace_name(name)?;
        let command = Command::new("createKeyspace")
            .arg("name", name)
            .arg(
                "options",
                serde_json::json!({ "replication": { "class": "SimpleStrategy", "replicationFactor": 1 } }),
            );
        self.db
            .run_database_admin_command(&command, TimeoutCategory::KeyspaceAdmin, options.timeout)
            .await?;

        if options.update_db_keyspace {
            self.db.use_keyspace(name)?;
        }
        Ok(())
    }

    /// Drops a keyspace.
    pub async fn drop_keyspace(&self, name: &str, options: KeyspaceAdminOptions) -> Result<()> {
        validate_keyspace_name(name)?;
        let command = Command::new("dropKeyspace").arg("name", name);
        self.db
            .run_database_admin_command(&command, TimeoutCategory::KeyspaceAdmin, options.timeout)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for DataApiDbAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataApiDbAdmin")
            .field("endpoint", &self.db.endpoint())
            .finish()
    }
}
