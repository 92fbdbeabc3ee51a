//! The `blob` column wire type.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// Raw bytes, carried as `{"$binary": <base64>}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataApiBlob(Vec<u8>);

impl DataApiBlob {
    /// Wraps raw bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Unwraps into the byte vector.
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for DataApiBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for DataApiBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("$binary", &BASE64.encode(&self.0))?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for DataApiBlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match &value {
            Value::Object(map) => {
                let encoded = map
                    .get("$binary")
                    .and_then(Value::as_str)
                    .ok_or_else(|| de::Error::custom("expected {\"$binary\": \"...\"}"))?;
                BASE64
                    .decode(encoded)
                    .map(Self)
                    .map_err(|e| de::Error::custom(format!("invalid base64 in $binary: {e}")))
            }
            Value::String(encoded) => BASE64
                .decode(encoded)
                .map(Self)
                .map_err(|e| de::Error::custom(format!("invalid base64: {e}"))),
            other => Err(de::Error::custom(format!(
                "expected a $binary object or base64 string, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_round_trip() {
        let blob = DataApiBlob::new(vec![0, 1, 2, 255]);
        let wire = serde_json::to_value(&blob).unwrap();
        assert!(wire.get("$binary").is_some());
        let back: DataApiBlob = serde_json::from_value(wire).unwrap();
        assert_eq!(blob, back);
    }

    #[test]
    fn accepts_bare_base64_strings() {
        let blob: DataApiBlob = serde_json::from_value(json!("AAEC")).unwrap();
        assert_eq!(blob.as_bytes(), &[0, 1, 2]);
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(serde_json::from_value::<DataApiBlob>(json!({ "$binary": "!!!" })).is_err());
    }
}
