use std::borrow::Cow;

use rustc_hash::FxHashMap;

use super::record::Record;
use super::snapshot::NormalizedSnapshot;

/// Read access to records by identity.
///
/// Implemented by the confirmed store, by layered optimistic views, and by the
/// one-record views used while matching fragments during a write.
pub trait StoreRead {
    /// Record stored under `id`.
    fn get(&self, id: &str) -> Option<Cow<'_, Record>>;

    /// Whether a record exists under `id`.
    fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }
}

/// Flat arena of records keyed by identity.
///
/// Records link to one another only through identity strings, so cycles in
/// the data graph need no special handling.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordStore {
    records: FxHashMap<String, Record>,
}

impl RecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrowed record under `id`.
    pub fn record(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    /// Merges `record` into the record under `id`, field by field.
    pub fn merge_record(&mut self, id: &str, record: Record) {
        match self.records.get_mut(id) {
            Some(existing) => existing.merge(record),
            None => {
                self.records.insert(id.to_owned(), record);
            }
        }
    }

    /// Merges every record of `batch` into this store.
    pub fn merge(&mut self, batch: RecordStore) {
        for (id, record) in batch.records {
            self.merge_record(&id, record);
        }
    }

    /// Replaces the whole content with `snapshot`.
    pub fn replace_all(&mut self, snapshot: NormalizedSnapshot) {
        self.records = snapshot.into_records().into_iter().collect();
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Removes the record under `id`.
    pub fn remove(&mut self, id: &str) -> Option<Record> {
        self.records.remove(id)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates identities in arbitrary order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Iterates records in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Serializable copy of the content.
    pub fn to_snapshot(&self) -> NormalizedSnapshot {
        self.records
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl StoreRead for RecordStore {
    fn get(&self, id: &str) -> Option<Cow<'_, Record>> {
        self.records.get(id).map(Cow::Borrowed)
    }

    fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }
}

impl FromIterator<(String, Record)> for RecordStore {
    fn from_iter<I: IntoIterator<Item = (String, Record)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

/// View exposing exactly one record.
pub struct SingleRecord<'a> {
    id: &'a str,
    record: &'a Record,
}

impl<'a> SingleRecord<'a> {
    /// Wraps `record` under `id`.
    pub fn new(id: &'a str, record: &'a Record) -> Self {
        Self { id, record }
    }
}

impl StoreRead for SingleRecord<'_> {
    fn get(&self, id: &str) -> Option<Cow<'_, Record>> {
        (id == self.id).then_some(Cow::Borrowed(self.record))
    }
}
