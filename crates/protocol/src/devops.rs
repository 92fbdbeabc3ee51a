//! DevOps API wire shapes for Astra database lifecycle.

use serde::{Deserialize, Serialize};

/// Lifecycle states a database reports through the DevOps API.
///
/// The client only ever *observes* these; all transitions happen server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AstraDatabaseStatus {
    Initializing,
    Pending,
    Active,
    Maintenance,
    Terminating,
    Terminated,
    Error,
    Hibernated,
    Hibernating,
    Resuming,
    #[serde(other)]
    Unknown,
}

impl AstraDatabaseStatus {
    /// The wire representation of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            AstraDatabaseStatus::Initializing => "INITIALIZING",
            AstraDatabaseStatus::Pending => "PENDING",
            AstraDatabaseStatus::Active => "ACTIVE",
            AstraDatabaseStatus::Maintenance => "MAINTENANCE",
            AstraDatabaseStatus::Terminating => "TERMINATING",
            AstraDatabaseStatus::Terminated => "TERMINATED",
            AstraDatabaseStatus::Error => "ERROR",
            AstraDatabaseStatus::Hibernated => "HIBERNATED",
            AstraDatabaseStatus::Hibernating => "HIBERNATING",
            AstraDatabaseStatus::Resuming => "RESUMING",
            AstraDatabaseStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for AstraDatabaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A database record returned by the DevOps API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstraDatabaseInfo {
    /// Database id (a UUID).
    pub id: String,

    /// Current lifecycle state.
    pub status: AstraDatabaseStatus,

    /// Creation-time and mutable database properties.
    pub info: AstraDatabaseProperties,
}

/// The `info` block of a DevOps database record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstraDatabaseProperties {
    /// Human-readable database name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Deployment region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Cloud provider identifier (`AWS`, `GCP`, `AZURE`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider: Option<String>,

    /// All keyspaces present on the database.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyspaces: Vec<String>,
}

/// Request body for creating a database through the DevOps API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAstraDatabaseRequest {
    /// Human-readable database name.
    pub name: String,

    /// Deployment region.
    pub region: String,

    /// Cloud provider identifier.
    pub cloud_provider: String,

    /// Initial keyspace name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyspace: Option<String>,

    /// Database flavor (`vector` for Data API databases).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_round_trips_wire_casing() {
        let status: AstraDatabaseStatus = serde_json::from_value(json!("ACTIVE")).unwrap();
        assert_eq!(status, AstraDatabaseStatus::Active);
        assert_eq!(serde_json::to_value(status).unwrap(), json!("ACTIVE"));
    }

    #[test]
    fn unknown_status_is_tolerated() {
        let status: AstraDatabaseStatus =
            serde_json::from_value(json!("PARKED_ON_THE_MOON")).unwrap();
        assert_eq!(status, AstraDatabaseStatus::Unknown);
    }

    #[test]
    fn parses_database_record() {
        let info: AstraDatabaseInfo = serde_json::from_value(json!({
            "id": "4711e0a2-0e4f-4c34-92a7-2f6b51c0e8f9",
            "status": "ACTIVE",
            "info": {
                "name": "my_db",
                "region": "us-east-2",
                "cloudProvider": "AWS",
                "keyspaces": ["default_keyspace"]
            }
        }))
        .unwrap();

        assert_eq!(info.status, AstraDatabaseStatus::Active);
        assert_eq!(info.info.keyspaces, vec!["default_keyspace"]);
    }
}
