use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::TYPENAME_FIELD;

/// Value held in one record slot.
///
/// Tagged explicitly so snapshots stay unambiguous when serialized: a
/// reference and a scalar string are distinct on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum StoreValue {
    /// Scalar (or opaque JSON) value stored verbatim.
    Scalar(Value),
    /// Link to another record by identity.
    Ref(String),
    /// Ordered list of values.
    List(Vec<StoreValue>),
    /// Object without identity, embedded in its parent.
    Object(Record),
}

impl StoreValue {
    /// Identity referenced by this value, if any.
    pub fn as_ref_id(&self) -> Option<&str> {
        match self {
            StoreValue::Ref(id) => Some(id),
            _ => None,
        }
    }
}

impl From<Value> for StoreValue {
    fn from(value: Value) -> Self {
        StoreValue::Scalar(value)
    }
}

/// Flat mapping from store field key to value for one identity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, StoreValue>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record holding only a declared type name.
    pub fn with_typename(typename: impl Into<String>) -> Self {
        let mut record = Self::new();
        record.insert(
            TYPENAME_FIELD,
            StoreValue::Scalar(Value::String(typename.into())),
        );
        record
    }

    /// Value stored under `key`; `None` means the field is not present.
    pub fn get(&self, key: &str) -> Option<&StoreValue> {
        self.fields.get(key)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Replaces the value under `key`, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: StoreValue) -> Option<StoreValue> {
        self.fields.insert(key.into(), value)
    }

    /// Removes `key`.
    pub fn remove(&mut self, key: &str) -> Option<StoreValue> {
        self.fields.remove(key)
    }

    /// Writes `value` under `key` with last-write-wins semantics.
    ///
    /// Embedded objects are merged field by field so that two queries selecting
    /// different fields of the same embedded object do not clobber each other.
    pub fn merge_field(&mut self, key: String, value: StoreValue) {
        match (self.fields.get_mut(&key), value) {
            (Some(StoreValue::Object(existing)), StoreValue::Object(incoming)) => {
                existing.merge(incoming);
            }
            (_, value) => {
                self.fields.insert(key, value);
            }
        }
    }

    /// Merges every field of `other` into `self`.
    pub fn merge(&mut self, other: Record) {
        for (key, value) in other.fields {
            self.merge_field(key, value);
        }
    }

    /// Declared type name, when stored.
    pub fn typename(&self) -> Option<&str> {
        match self.fields.get(TYPENAME_FIELD) {
            Some(StoreValue::Scalar(Value::String(name))) => Some(name),
            _ => None,
        }
    }

    /// Iterates fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoreValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, StoreValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, StoreValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
