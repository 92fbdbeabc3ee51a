//! Shared per-entity command execution context.

use std::sync::Arc;

use astra_protocol::command::Command;
use astra_protocol::response::RawDataApiResponse;
use astra_runtime::events::{EventContext, EventTarget};
use astra_runtime::http::data_api::{CommandInfo, DataApiHttpClient};
use astra_runtime::timeouts::{
    Timeout, TimeoutCategory, TimeoutDescriptor, TimeoutManager, TimeoutMode,
};

use crate::errors::{Error, Result};
use crate::serdes::SerDes;

/// Everything a collection/table (or a cursor spawned from one) needs to
/// execute commands: the shared HTTP client plus this entity's identity,
/// serdes pipeline, event context, and resolved timeouts.
#[derive(Clone)]
pub(crate) struct EntityRef {
    pub http: Arc<DataApiHttpClient>,
    pub serdes: SerDes,
    pub keyspace: String,
    pub name: String,
    pub target: EventTarget,
    pub events: Arc<EventContext>,
    pub timeouts: TimeoutDescriptor,
}

impl EntityRef {
    /// Creates a timeout manager for one method call.
    pub fn manager(
        &self,
        mode: TimeoutMode,
        category: TimeoutCategory,
        timeout: Option<Timeout>,
    ) -> TimeoutManager {
        TimeoutManager::new(mode, category, &self.timeouts, timeout)
    }

    /// Executes one command against this entity.
    pub async fn run(
        &self,
        command: &Command,
        retryable: bool,
        tm: &mut TimeoutManager,
    ) -> Result<RawDataApiResponse> {
        let info = CommandInfo {
            keyspace: Some(&self.keyspace),
            target_name: Some(&self.name),
            target: self.target,
            events: &self.events,
            retryable,
            admin: false,
        };
        self.http
            .execute_command(command, info, tm)
            .await
            .map_err(Error::from)
    }
}

impl std::fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRef")
            .field("keyspace", &self.keyspace)
            .field("name", &self.name)
            .field("target", &self.target)
            .finish()
    }
}
