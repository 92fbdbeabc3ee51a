//! The `$objectId` wire type.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// A 12-byte ObjectId: 4 bytes of epoch seconds plus 8 random bytes,
/// rendered as 24 lowercase hex characters on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

/// Parse failure for an ObjectId string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ObjectId: expected 24 hex characters, got '{0}'")]
pub struct ParseObjectIdError(String);

impl ObjectId {
    /// Generates a fresh id stamped with the current time.
    pub fn new() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        rand::thread_rng().fill_bytes(&mut bytes[4..]);
        Self(bytes)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// The embedded creation time as epoch seconds.
    pub fn timestamp_secs(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// The tagged wire form.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({ "$objectId": self.to_string() })
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = ParseObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 24 {
            return Err(ParseObjectIdError(s.to_string()));
        }
        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &s[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16).map_err(|_| ParseObjectIdError(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("$objectId", &self.to_string())?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let text = match &value {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map
                .get("$objectId")
                .and_then(Value::as_str)
                .ok_or_else(|| de::Error::custom("expected {\"$objectId\": \"...\"}"))?,
            other => {
                return Err(de::Error::custom(format!(
                    "expected an ObjectId string or $objectId object, got {other}"
                )));
            }
        };
        text.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_hex() {
        let id: ObjectId = "507f191e810c19729de860ea".parse().unwrap();
        assert_eq!(id.to_string(), "507f191e810c19729de860ea");
    }

    #[test]
    fn serializes_to_tagged_form() {
        let id: ObjectId = "507f191e810c19729de860ea".parse().unwrap();
        assert_eq!(
            serde_json::to_value(id).unwrap(),
            json!({ "$objectId": "507f191e810c19729de860ea" })
        );
    }

    #[test]
    fn fresh_ids_embed_a_recent_timestamp() {
        let id = ObjectId::new();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as u32;
        assert!(id.timestamp_secs() <= now);
        assert!(id.timestamp_secs() >= now - 60);
    }

    #[test]
    fn rejects_bad_input() {
        assert!("xyz".parse::<ObjectId>().is_err());
        assert!("507f191e810c19729de860e".parse::<ObjectId>().is_err());
        assert!("507f191e810c19729de860zz".parse::<ObjectId>().is_err());
    }
}
