//! Case-insensitive string-keyed map

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Map with ASCII-case-insensitive key lookup.
///
/// Insertion preserves the caller's key casing; lookups fold case. Serde
/// round-trips as a plain JSON object keyed by the preserved casing.
#[derive(Debug, Clone, PartialEq)]
pub struct CiMap<V> {
    entries: BTreeMap<String, (String, V)>,
}

impl<V> CiMap<V> {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    fn fold(key: &str) -> String {
        key.to_ascii_lowercase()
    }

    /// Insert a value, replacing any entry under a case-equivalent key
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        self.entries
            .insert(Self::fold(&key), (key, value))
            .map(|(_, v)| v)
    }

    /// Look up a value ignoring key case
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(&Self::fold(key)).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&Self::fold(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(&Self::fold(key)).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries with their preserved key casing
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys with their preserved casing
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(k, _)| k.as_str())
    }
}

impl<V> Default for CiMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FromIterator<(String, V)> for CiMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl From<Map<String, Value>> for CiMap<Value> {
    fn from(object: Map<String, Value>) -> Self {
        object.into_iter().collect()
    }
}

impl<V: Serialize> Serialize for CiMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for CiMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CiMapVisitor<V>(std::marker::PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for CiMapVisitor<V> {
            type Value = CiMap<V>;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a string-keyed object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = CiMap::new();
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(CiMapVisitor(std::marker::PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_ignores_case() {
        let mut map = CiMap::new();
        map.insert("ToolResult", json!(42));

        assert_eq!(map.get("toolresult"), Some(&json!(42)));
        assert_eq!(map.get("TOOLRESULT"), Some(&json!(42)));
        assert!(map.contains_key("toolResult"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_insert_replaces_case_equivalent_key() {
        let mut map = CiMap::new();
        map.insert("alpha", json!(1));
        let previous = map.insert("ALPHA", json!(2));

        assert_eq!(previous, Some(json!(1)));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("Alpha"), Some(&json!(2)));
        // latest insertion wins the preserved casing
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["ALPHA"]);
    }

    #[test]
    fn test_serde_round_trip_preserves_casing() {
        let mut map = CiMap::new();
        map.insert("toolResult", json!("hello"));

        let encoded = serde_json::to_string(&map).unwrap();
        assert!(encoded.contains("toolResult"));

        let decoded: CiMap<Value> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.get("TOOLRESULT"), Some(&json!("hello")));
    }
}
