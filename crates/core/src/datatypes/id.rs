//! The document id union.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::Value;

use super::{DataApiTimestamp, DataApiUuid, ObjectId};

/// Every value a collection `_id` can take, as a tagged union.
#[derive(Debug, Clone, PartialEq)]
pub enum SomeId {
    /// An explicit `null` id (persisted as-is, never auto-generated over).
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Date(DataApiTimestamp),
    Uuid(DataApiUuid),
    ObjectId(ObjectId),
}

impl SomeId {
    /// The UUID, if this id is one.
    pub fn as_uuid(&self) -> Option<DataApiUuid> {
        match self {
            SomeId::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// The ObjectId, if this id is one.
    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            SomeId::ObjectId(o) => Some(*o),
            _ => None,
        }
    }

    /// The string, if this id is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SomeId::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SomeId::Null => f.write_str("null"),
            SomeId::Bool(b) => b.fmt(f),
            SomeId::Int(i) => i.fmt(f),
            SomeId::Double(d) => d.fmt(f),
            SomeId::Str(s) => f.write_str(s),
            SomeId::Date(d) => d.fmt(f),
            SomeId::Uuid(u) => u.fmt(f),
            SomeId::ObjectId(o) => o.fmt(f),
        }
    }
}

impl From<&str> for SomeId {
    fn from(s: &str) -> Self {
        SomeId::Str(s.to_string())
    }
}

impl From<String> for SomeId {
    fn from(s: String) -> Self {
        SomeId::Str(s)
    }
}

impl From<i64> for SomeId {
    fn from(i: i64) -> Self {
        SomeId::Int(i)
    }
}

impl From<DataApiUuid> for SomeId {
    fn from(u: DataApiUuid) -> Self {
        SomeId::Uuid(u)
    }
}

impl From<ObjectId> for SomeId {
    fn from(o: ObjectId) -> Self {
        SomeId::ObjectId(o)
    }
}

impl Serialize for SomeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SomeId::Null => serializer.serialize_unit(),
            SomeId::Bool(b) => serializer.serialize_bool(*b),
            SomeId::Int(i) => serializer.serialize_i64(*i),
            SomeId::Double(d) => serializer.serialize_f64(*d),
            SomeId::Str(s) => serializer.serialize_str(s),
            SomeId::Date(d) => d.serialize(serializer),
            SomeId::Uuid(u) => u.serialize(serializer),
            SomeId::ObjectId(o) => o.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SomeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Null => Ok(SomeId::Null),
            Value::Bool(b) => Ok(SomeId::Bool(b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(SomeId::Int(i))
                } else if let Some(d) = n.as_f64() {
                    Ok(SomeId::Double(d))
                } else {
                    Err(de::Error::custom(format!("unrepresentable id number {n}")))
                }
            }
            Value::String(s) => Ok(SomeId::Str(s)),
            Value::Object(map) => {
                if map.contains_key("$uuid") {
                    serde_json::from_value(Value::Object(map))
                        .map(SomeId::Uuid)
                        .map_err(de::Error::custom)
                } else if map.contains_key("$objectId") {
                    serde_json::from_value(Value::Object(map))
                        .map(SomeId::ObjectId)
                        .map_err(de::Error::custom)
                } else if map.contains_key("$date") {
                    serde_json::from_value(Value::Object(map))
                        .map(SomeId::Date)
                        .map_err(de::Error::custom)
                } else {
                    Err(de::Error::custom("unrecognized tagged id object"))
                }
            }
            Value::Array(_) => Err(de::Error::custom("an id cannot be an array")),
        }
    }
}
