//! The `$date` wire type.

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// A point in time as the Data API represents it.
///
/// Collections encode datetimes as `{"$date": <epoch millis>}`; tables use
/// an RFC 3339 string. Deserialization accepts both; serialization produces
/// the tagged form (table serdes rewrites it on the way out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataApiTimestamp(DateTime<Utc>);

impl DataApiTimestamp {
    /// The current instant.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wraps a chrono datetime.
    pub fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// From epoch milliseconds.
    pub fn from_epoch_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    /// As epoch milliseconds.
    pub fn epoch_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// The wrapped chrono datetime.
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// The RFC 3339 rendering tables use.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl From<DateTime<Utc>> for DataApiTimestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }
}

impl fmt::Display for DataApiTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for DataApiTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("$date", &self.epoch_millis())?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for DataApiTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match &value {
            Value::Object(map) => {
                let millis = map
                    .get("$date")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| de::Error::custom("expected {\"$date\": <epoch millis>}"))?;
                Self::from_epoch_millis(millis)
                    .ok_or_else(|| de::Error::custom("epoch millis out of range"))
            }
            Value::String(text) => DateTime::parse_from_rfc3339(text)
                .map(|dt| Self(dt.with_timezone(&Utc)))
                .map_err(de::Error::custom),
            other => Err(de::Error::custom(format!(
                "expected a $date object or RFC 3339 string, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_to_epoch_millis() {
        let ts = DataApiTimestamp::from_epoch_millis(1_700_000_000_000).unwrap();
        assert_eq!(
            serde_json::to_value(ts).unwrap(),
            json!({ "$date": 1_700_000_000_000i64 })
        );
    }

    #[test]
    fn deserializes_both_forms() {
        let tagged: DataApiTimestamp =
            serde_json::from_value(json!({ "$date": 1_700_000_000_000i64 })).unwrap();
        let bare: DataApiTimestamp =
            serde_json::from_value(json!(tagged.to_rfc3339())).unwrap();
        assert_eq!(tagged, bare);
    }

    #[test]
    fn wire_round_trip() {
        let original = DataApiTimestamp::from_epoch_millis(123_456_789).unwrap();
        let back: DataApiTimestamp =
            serde_json::from_value(serde_json::to_value(original).unwrap()).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn rejects_non_date_values() {
        assert!(serde_json::from_value::<DataApiTimestamp>(json!(true)).is_err());
        assert!(serde_json::from_value::<DataApiTimestamp>(json!({ "$date": "soon" })).is_err());
    }
}
