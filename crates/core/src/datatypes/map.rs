//! The table `map` column type.

use std::fmt;

use serde::de::{self, Deserialize, DeserializeOwned, Deserializer};
use serde::ser::{self, Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;

/// An insertion-ordered map supporting non-string keys.
///
/// Maps with string keys serialize as JSON objects; any other key type
/// serializes as `[[k, v], ...]` entry pairs. Deserialization accepts both
/// shapes regardless of key type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataApiMap<K, V>(Vec<(K, V)>);

impl<K, V> DataApiMap<K, V> {
    /// An empty map.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(K, V)> {
        self.0.iter()
    }

    /// Unwraps into the entry vector.
    pub fn into_entries(self) -> Vec<(K, V)> {
        self.0
    }
}

impl<K: PartialEq, V> DataApiMap<K, V> {
    /// Inserts an entry, replacing any existing entry with an equal key.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    /// Looks up the value for a key.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl<K, V> FromIterator<(K, V)> for DataApiMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<K, V> IntoIterator for DataApiMap<K, V> {
    type Item = (K, V);
    type IntoIter = std::vec::IntoIter<(K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Serialize, V: Serialize> Serialize for DataApiMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Probe the keys: all-string keys render as a JSON object,
        // anything else as entry pairs.
        let keys: Vec<Value> = self
            .0
            .iter()
            .map(|(k, _)| serde_json::to_value(k).map_err(ser::Error::custom))
            .collect::<Result<_, S::Error>>()?;

        if keys.iter().all(Value::is_string) {
            let mut map = serializer.serialize_map(Some(self.0.len()))?;
            for (key, (_, value)) in keys.iter().zip(&self.0) {
                map.serialize_entry(key, value)?;
            }
            map.end()
        } else {
            let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
            for entry in &self.0 {
                seq.serialize_element(&(&entry.0, &entry.1))?;
            }
            seq.end()
        }
    }
}

impl<'de, K, V> Deserialize<'de> for DataApiMap<K, V>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| {
                    let key = serde_json::from_value(Value::String(k)).map_err(de::Error::custom)?;
                    let value = serde_json::from_value(v).map_err(de::Error::custom)?;
                    Ok((key, value))
                })
                .collect::<Result<Vec<_>, D::Error>>()
                .map(Self),
            Value::Array(entries) => entries
                .into_iter()
                .map(|entry| serde_json::from_value::<(K, V)>(entry).map_err(de::Error::custom))
                .collect::<Result<Vec<_>, D::Error>>()
                .map(Self),
            other => Err(de::Error::custom(format!(
                "expected a map object or entry pairs, got {other}"
            ))),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Display for DataApiMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataApiMap({:?})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_keys_serialize_as_object() {
        let map: DataApiMap<String, i32> =
            [("a".to_string(), 1), ("b".to_string(), 2)].into_iter().collect();
        assert_eq!(serde_json::to_value(&map).unwrap(), json!({ "a": 1, "b": 2 }));
    }

    #[test]
    fn non_string_keys_serialize_as_pairs() {
        let map: DataApiMap<i64, String> =
            [(1, "one".to_string()), (2, "two".to_string())].into_iter().collect();
        assert_eq!(
            serde_json::to_value(&map).unwrap(),
            json!([[1, "one"], [2, "two"]])
        );
    }

    #[test]
    fn deserializes_both_shapes() {
        let from_object: DataApiMap<String, i32> =
            serde_json::from_value(json!({ "a": 1 })).unwrap();
        let from_pairs: DataApiMap<String, i32> =
            serde_json::from_value(json!([["a", 1]])).unwrap();
        assert_eq!(from_object, from_pairs);
    }

    #[test]
    fn non_string_key_round_trip() {
        let original: DataApiMap<i64, bool> = [(10, true), (20, false)].into_iter().collect();
        let wire = serde_json::to_value(&original).unwrap();
        let back: DataApiMap<i64, bool> = serde_json::from_value(wire).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn insert_replaces_existing_keys() {
        let mut map: DataApiMap<String, i32> = DataApiMap::new();
        map.insert("k".to_string(), 1);
        map.insert("k".to_string(), 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&"k".to_string()), Some(&2));
    }
}
