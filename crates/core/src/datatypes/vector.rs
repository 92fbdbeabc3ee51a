//! The `$binary` vector wire type.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// An embedding vector.
///
/// Serializes to the compact `{"$binary": <base64 float32-LE>}` form;
/// deserialization also accepts a plain JSON array of numbers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataApiVector(Vec<f32>);

impl DataApiVector {
    /// Wraps raw components.
    pub fn new(components: Vec<f32>) -> Self {
        Self(components)
    }

    /// The components.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Unwraps into the component vector.
    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Number of dimensions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the vector has no components.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encodes the components as base64 of little-endian float32s.
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(self.0.len() * 4);
        for component in &self.0 {
            bytes.extend_from_slice(&component.to_le_bytes());
        }
        BASE64.encode(bytes)
    }

    /// Decodes a base64 float32-LE payload.
    pub fn from_base64(encoded: &str) -> Result<Self, String> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| format!("invalid base64 in $binary: {e}"))?;
        if bytes.len() % 4 != 0 {
            return Err(format!(
                "binary vector length {} is not a multiple of 4",
                bytes.len()
            ));
        }
        let components = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self(components))
    }
}

impl From<Vec<f32>> for DataApiVector {
    fn from(components: Vec<f32>) -> Self {
        Self(components)
    }
}

impl Serialize for DataApiVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("$binary", &self.to_base64())?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for DataApiVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match &value {
            Value::Object(map) => {
                let encoded = map
                    .get("$binary")
                    .and_then(Value::as_str)
                    .ok_or_else(|| de::Error::custom("expected {\"$binary\": \"...\"}"))?;
                Self::from_base64(encoded).map_err(de::Error::custom)
            }
            Value::Array(items) => {
                let components = items
                    .iter()
                    .map(|item| {
                        item.as_f64()
                            .map(|f| f as f32)
                            .ok_or_else(|| de::Error::custom("vector components must be numbers"))
                    })
                    .collect::<Result<Vec<f32>, D::Error>>()?;
                Ok(Self(components))
            }
            other => Err(de::Error::custom(format!(
                "expected a $binary object or number array, got {other}"
            ))),
        }
    }
}
