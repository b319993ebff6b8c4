//! Reading selections back out of a store view.
//!
//! A diff reconstructs the result tree a selection describes, following
//! references through whatever [`StoreRead`] it is given, and reports which
//! selected fields could not be found.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{CacheError, Result};
use crate::fragment::{FragmentMatcher, ReadContext};
use crate::normalize::join;
use crate::query::{should_include, store_field_name, Field, Selection, SelectionSet, Variables};
use crate::storage::{Record, SingleRecord, StoreRead, StoreValue};

/// Result of reading a selection from a store view.
#[derive(Clone, Debug, PartialEq)]
pub struct Diff {
    /// Reconstructed result; missing fields are omitted.
    pub result: Arc<Value>,
    /// Whether every selected field was found and no fragment match was guessed.
    pub complete: bool,
    /// Paths of fields that could not be found, in traversal order.
    pub missing: Vec<String>,
}

impl Diff {
    /// Whether `self.result` is the same allocation as `previous`.
    pub fn is_same_result(&self, previous: &Arc<Value>) -> bool {
        Arc::ptr_eq(&self.result, previous)
    }
}

#[derive(Default)]
struct ReadState {
    missing: Vec<String>,
    partial: bool,
}

/// Reads selections from a store view.
pub struct DiffReader<'a> {
    store: &'a dyn StoreRead,
    matcher: &'a dyn FragmentMatcher,
    variables: &'a Variables,
}

impl<'a> DiffReader<'a> {
    /// Creates a reader over `store`.
    pub fn new(
        store: &'a dyn StoreRead,
        matcher: &'a dyn FragmentMatcher,
        variables: &'a Variables,
    ) -> Self {
        Self {
            store,
            matcher,
            variables,
        }
    }

    /// Reads `selection` rooted at `root_id`.
    ///
    /// An absent root behaves like an empty record: every selected field is
    /// missing. When the rebuilt result equals `previous`, `previous` itself is
    /// returned.
    pub fn diff(
        &self,
        root_id: &str,
        selection: &SelectionSet,
        previous: Option<&Arc<Value>>,
    ) -> Result<Diff> {
        let mut state = ReadState::default();
        let root = self.store.get(root_id).unwrap_or_default();
        let object = self.read_record(Some(root_id), &root, selection, "", &mut state)?;
        let value = Value::Object(object);
        let result = match previous {
            Some(previous) if **previous == value => Arc::clone(previous),
            _ => Arc::new(value),
        };
        let complete = state.missing.is_empty() && !state.partial;
        trace!(root_id, complete, missing = state.missing.len(), "read.diff");
        Ok(Diff {
            result,
            complete,
            missing: state.missing,
        })
    }

    fn read_record(
        &self,
        id: Option<&str>,
        record: &Record,
        selection: &SelectionSet,
        path: &str,
        state: &mut ReadState,
    ) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        self.collect(id, record, selection, path, &mut out, state)?;
        Ok(out)
    }

    fn collect(
        &self,
        id: Option<&str>,
        record: &Record,
        selection: &SelectionSet,
        path: &str,
        out: &mut Map<String, Value>,
        state: &mut ReadState,
    ) -> Result<()> {
        for item in &selection.selections {
            match item {
                Selection::Field(field) => {
                    if !should_include(&field.directives, self.variables)? {
                        continue;
                    }
                    let field_path = join(path, field.response_key());
                    let key = store_field_name(field, self.variables);
                    let Some(stored) = record.get(&key) else {
                        state.missing.push(field_path);
                        continue;
                    };
                    if let Some(value) = self.read_value(stored, field, &field_path, state)? {
                        merge_into(out, field.response_key(), value);
                    }
                }
                Selection::InlineFragment(fragment) => {
                    if !should_include(&fragment.directives, self.variables)? {
                        continue;
                    }
                    if let Some(condition) = &fragment.type_condition {
                        if !self.fragment_applies(id, record, path, condition, state)? {
                            continue;
                        }
                    }
                    self.collect(id, record, &fragment.selection_set, path, out, state)?;
                }
            }
        }
        Ok(())
    }

    /// Returns `None` when the value resolves to nothing (dangling reference).
    fn read_value(
        &self,
        stored: &StoreValue,
        field: &Field,
        path: &str,
        state: &mut ReadState,
    ) -> Result<Option<Value>> {
        match (stored, &field.selection_set) {
            (StoreValue::Scalar(value), None) => Ok(Some(value.clone())),
            (StoreValue::Scalar(Value::Null), Some(_)) => Ok(Some(Value::Null)),
            (StoreValue::Scalar(_), Some(_)) => Err(CacheError::InvalidQuery(format!(
                "field '{path}' has a selection set but the store holds a scalar"
            ))),
            (StoreValue::List(items), _) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{path}.{index}");
                    let value = self.read_value(item, field, &item_path, state)?;
                    out.push(value.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Array(out)))
            }
            (StoreValue::Ref(id), Some(selection)) => match self.store.get(id) {
                Some(record) => {
                    let object =
                        self.read_record(Some(id.as_str()), &record, selection, path, state)?;
                    Ok(Some(Value::Object(object)))
                }
                None => {
                    trace!(path, id = %id, "read.dangling_ref");
                    state.missing.push(path.to_owned());
                    Ok(None)
                }
            },
            (StoreValue::Object(record), Some(selection)) => {
                let object = self.read_record(None, record, selection, path, state)?;
                Ok(Some(Value::Object(object)))
            }
            (StoreValue::Ref(_) | StoreValue::Object(_), None) => Err(CacheError::InvalidQuery(
                format!("field '{path}' holds an object but has no selection set"),
            )),
        }
    }

    fn fragment_applies(
        &self,
        id: Option<&str>,
        record: &Record,
        path: &str,
        type_condition: &str,
        state: &mut ReadState,
    ) -> Result<bool> {
        let (matched, partial) = match id {
            Some(id) => {
                let mut ctx = ReadContext::new(self.store);
                let matched = self.matcher.matches(id, type_condition, &mut ctx)?;
                (matched, ctx.is_partial())
            }
            None => {
                let view = SingleRecord::new(path, record);
                let mut ctx = ReadContext::new(&view);
                let matched = self.matcher.matches(path, type_condition, &mut ctx)?;
                (matched, ctx.is_partial())
            }
        };
        state.partial |= partial;
        Ok(matched)
    }
}

/// Inserts `value` under `key`, merging objects selected more than once.
fn merge_into(out: &mut Map<String, Value>, key: &str, value: Value) {
    match (out.get_mut(key), value) {
        (Some(Value::Object(existing)), Value::Object(incoming)) => {
            for (k, v) in incoming {
                merge_into(existing, &k, v);
            }
        }
        (_, value) => {
            out.insert(key.to_owned(), value);
        }
    }
}
