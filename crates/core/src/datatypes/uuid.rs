//! The `$uuid` wire type.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// A UUID as the Data API represents it.
///
/// Collections encode UUIDs as `{"$uuid": "..."}`; tables use a bare
/// string. Deserialization accepts both; serialization always produces the
/// tagged form (table serdes rewrites it where needed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataApiUuid(uuid::Uuid);

impl DataApiUuid {
    /// Generates a random (version 4) UUID.
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Generates a time-ordered (version 7) UUID.
    pub fn new_v7() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// The UUID version number (4, 7, ...).
    pub fn version(&self) -> usize {
        self.0.get_version_num()
    }

    /// The wrapped [`uuid::Uuid`].
    pub fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }

    /// The tagged wire form.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({ "$uuid": self.0.to_string() })
    }
}

impl From<uuid::Uuid> for DataApiUuid {
    fn from(inner: uuid::Uuid) -> Self {
        Self(inner)
    }
}

impl FromStr for DataApiUuid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for DataApiUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for DataApiUuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("$uuid", &self.0.to_string())?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for DataApiUuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let text = match &value {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map
                .get("$uuid")
                .and_then(Value::as_str)
                .ok_or_else(|| de::Error::custom("expected {\"$uuid\": \"...\"}"))?,
            other => {
                return Err(de::Error::custom(format!(
                    "expected a UUID string or $uuid object, got {other}"
                )));
            }
        };
        text.parse().map_err(de::Error::custom)
    }
}
