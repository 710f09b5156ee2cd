use std::collections::HashMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    Name(String),
    Index(usize),
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowKey::Name(name) => f.write_str(name),
            RowKey::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Which keys a fetched row carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchShape {
    /// Keyed by 0-based column position.
    Index,
    /// Keyed by (case-folded) column name.
    Assoc,
    /// Name keys followed by position keys.
    Both,
}

impl FetchShape {
    pub fn with_names(self) -> bool {
        matches!(self, FetchShape::Assoc | FetchShape::Both)
    }

    pub fn with_indexes(self) -> bool {
        matches!(self, FetchShape::Index | FetchShape::Both)
    }
}

/// One fetched row: insertion-ordered `(key, value)` pairs with unique keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(RowKey, Value)>,
    /// Position of each key in `entries`.
    index: HashMap<RowKey, usize>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
            index: HashMap::with_capacity(n),
        }
    }

    /// Insert or replace; a duplicate column name keeps its first position.
    pub fn insert(&mut self, key: RowKey, value: Value) {
        match self.index.get(&key) {
            Some(&at) => self.entries[at].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &RowKey) -> Option<&Value> {
        self.index.get(key).map(|&at| &self.entries[at].1)
    }

    pub fn by_name(&self, name: &str) -> Option<&Value> {
        self.get(&RowKey::Name(name.to_string()))
    }

    pub fn by_index(&self, index: usize) -> Option<&Value> {
        self.get(&RowKey::Index(index))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(RowKey, Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RowKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    fn is_positional(&self) -> bool {
        self.entries
            .iter()
            .all(|(k, _)| matches!(k, RowKey::Index(_)))
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_positional() {
            let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
            for (_, v) in &self.entries {
                seq.serialize_element(v)?;
            }
            seq.end()
        } else {
            let mut map = serializer.serialize_map(Some(self.entries.len()))?;
            for (k, v) in &self.entries {
                map.serialize_entry(&k.to_string(), v)?;
            }
            map.end()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_existing_key() {
        let mut row = Row::new();
        row.insert(RowKey::Name("ID".to_string()), Value::Int(1));
        row.insert(RowKey::Name("NAME".to_string()), Value::from("a"));
        row.insert(RowKey::Name("ID".to_string()), Value::Int(2));
        assert_eq!(row.len(), 2);
        assert_eq!(row.by_name("ID"), Some(&Value::Int(2)));
        assert_eq!(
            row.keys().next(),
            Some(&RowKey::Name("ID".to_string()))
        );
    }

    #[test]
    fn test_wide_row_lookups_by_name_and_index() {
        let mut row = Row::with_capacity(2000);
        for i in 0..1000 {
            row.insert(RowKey::Name(format!("C{}", i)), Value::Int(i as i64));
            row.insert(RowKey::Index(i), Value::Int(i as i64));
        }
        row.insert(RowKey::Name("C500".to_string()), Value::Null);
        assert_eq!(row.len(), 2000);
        assert_eq!(row.by_name("C500"), Some(&Value::Null));
        assert_eq!(row.by_index(999), Some(&Value::Int(999)));
        assert_eq!(row.keys().nth(1000), Some(&RowKey::Name("C500".to_string())));
        assert_eq!(row.by_name("C1000"), None);
    }

    #[test]
    fn test_positional_row_serializes_as_array() {
        let mut row = Row::new();
        row.insert(RowKey::Index(0), Value::Int(7));
        row.insert(RowKey::Index(1), Value::Null);
        assert_eq!(serde_json::to_string(&row).unwrap(), "[7,null]");
    }

    #[test]
    fn test_both_shape_serializes_as_object() {
        let mut row = Row::new();
        row.insert(RowKey::Name("id".to_string()), Value::Int(7));
        row.insert(RowKey::Index(0), Value::Int(7));
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"id":7,"0":7}"#
        );
    }

    #[test]
    fn test_fetch_shape_flags() {
        assert!(FetchShape::Both.with_names() && FetchShape::Both.with_indexes());
        assert!(!FetchShape::Index.with_names());
        assert!(!FetchShape::Assoc.with_indexes());
    }
}
