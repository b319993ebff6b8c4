//! Splitting result trees into flat identity-keyed records.
//!
//! A pass walks the selection and the result together and stages every record
//! it produces in a batch. The batch is merged into a store only after the
//! whole pass succeeded, so readers never observe half a write.

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{CacheError, Result};
use crate::fragment::{FragmentMatcher, ReadContext};
use crate::identity::{IdentityResolver, TYPENAME_FIELD};
use crate::query::{should_include, store_field_name, Field, Selection, SelectionSet, Variables};
use crate::storage::{Record, RecordStore, SingleRecord, StoreValue};

/// Outcome of a normalization pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Number of distinct records written.
    pub records: usize,
    /// Paths of selected fields absent from the result; nothing was written for them.
    pub missing: Vec<String>,
    /// Paths of objects skipped because a required field was absent.
    pub skipped: Vec<String>,
}

impl WriteReport {
    /// Whether every selected field was present.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.skipped.is_empty()
    }

    pub(crate) fn absorb(&mut self, other: WriteReport) {
        self.missing.extend(other.missing);
        self.skipped.extend(other.skipped);
    }
}

/// Walks results against selections, producing record batches.
pub struct Normalizer<'a> {
    identity: &'a IdentityResolver,
    matcher: &'a dyn FragmentMatcher,
    variables: &'a Variables,
}

#[derive(Default)]
struct Pass {
    batch: RecordStore,
    report: WriteReport,
}

impl<'a> Normalizer<'a> {
    /// Creates a normalizer resolving arguments against `variables`.
    pub fn new(
        identity: &'a IdentityResolver,
        matcher: &'a dyn FragmentMatcher,
        variables: &'a Variables,
    ) -> Self {
        Self {
            identity,
            matcher,
            variables,
        }
    }

    /// Normalizes `result` as the fields of the record `root_id`.
    ///
    /// Returns the staged batch (to be merged by the caller) and the report.
    pub fn normalize(
        &self,
        root_id: &str,
        result: &Value,
        selection: &SelectionSet,
    ) -> Result<(RecordStore, WriteReport)> {
        let Value::Object(object) = result else {
            return Err(CacheError::InvalidQuery(format!(
                "result for '{root_id}' must be an object"
            )));
        };
        let mut pass = Pass::default();
        if let Some(record) = self.write_object(Some(root_id), object, selection, "", &mut pass)? {
            pass.batch.merge_record(root_id, record);
        }
        pass.report.records = pass.batch.len();
        Ok((pass.batch, pass.report))
    }

    fn write_object(
        &self,
        id: Option<&str>,
        object: &Map<String, Value>,
        selection: &SelectionSet,
        path: &str,
        pass: &mut Pass,
    ) -> Result<Option<Record>> {
        // Child records are staged apart and kept only if this object is.
        let outer = std::mem::take(&mut pass.batch);
        let mut record = Record::new();
        let written = self.collect(id, object, selection, path, &mut record, pass);
        let staged = std::mem::replace(&mut pass.batch, outer);
        if written? {
            pass.batch.merge(staged);
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    /// Writes the selected fields of `object` into `record`.
    ///
    /// Returns `false` when a required field is missing and the object must be skipped.
    fn collect(
        &self,
        id: Option<&str>,
        object: &Map<String, Value>,
        selection: &SelectionSet,
        path: &str,
        record: &mut Record,
        pass: &mut Pass,
    ) -> Result<bool> {
        for item in &selection.selections {
            match item {
                Selection::Field(field) => {
                    if !should_include(&field.directives, self.variables)? {
                        continue;
                    }
                    let field_path = join(path, field.response_key());
                    let Some(value) = object.get(field.response_key()) else {
                        if field.required {
                            let at = if path.is_empty() { id.unwrap_or_default() } else { path };
                            trace!(path = at, field = %field.name, "normalize.required_missing");
                            pass.report.skipped.push(at.to_owned());
                            return Ok(false);
                        }
                        trace!(path = %field_path, "normalize.field_missing");
                        pass.report.missing.push(field_path);
                        continue;
                    };
                    if let Some(stored) = self.write_value(value, field, &field_path, pass)? {
                        record.merge_field(store_field_name(field, self.variables), stored);
                    }
                }
                Selection::InlineFragment(fragment) => {
                    if !should_include(&fragment.directives, self.variables)? {
                        continue;
                    }
                    if let Some(condition) = &fragment.type_condition {
                        let match_id = id.unwrap_or(path);
                        if !self.fragment_applies(match_id, object, condition)? {
                            continue;
                        }
                    }
                    if !self.collect(id, object, &fragment.selection_set, path, record, pass)? {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    fn write_value(
        &self,
        value: &Value,
        field: &Field,
        path: &str,
        pass: &mut Pass,
    ) -> Result<Option<StoreValue>> {
        let Some(selection) = &field.selection_set else {
            return Ok(Some(StoreValue::Scalar(value.clone())));
        };
        match value {
            Value::Null => Ok(Some(StoreValue::Scalar(Value::Null))),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{path}.{index}");
                    match self.write_value(item, field, &item_path, pass)? {
                        Some(stored) => out.push(stored),
                        None => return Ok(None),
                    }
                }
                Ok(Some(StoreValue::List(out)))
            }
            Value::Object(object) => {
                let id = self.identity.identity_of(object);
                let Some(record) = self.write_object(id.as_deref(), object, selection, path, pass)?
                else {
                    return Ok(None);
                };
                match id {
                    Some(id) => {
                        pass.batch.merge_record(&id, record);
                        Ok(Some(StoreValue::Ref(id)))
                    }
                    None => Ok(Some(StoreValue::Object(record))),
                }
            }
            other => Err(CacheError::InvalidQuery(format!(
                "field '{path}' has a selection set but the result holds a scalar ({other})"
            ))),
        }
    }

    /// Consults the matcher against a one-record view holding the object's type name.
    fn fragment_applies(
        &self,
        match_id: &str,
        object: &Map<String, Value>,
        type_condition: &str,
    ) -> Result<bool> {
        let record = object
            .get(TYPENAME_FIELD)
            .and_then(Value::as_str)
            .map(Record::with_typename)
            .unwrap_or_default();
        let view = SingleRecord::new(match_id, &record);
        let mut ctx = ReadContext::new(&view);
        let matched = self.matcher.matches(match_id, type_condition, &mut ctx)?;
        if ctx.is_partial() {
            trace!(id = match_id, type_condition, "normalize.fragment_guessed");
        }
        Ok(matched)
    }
}

pub(crate) fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_owned()
    } else {
        format!("{path}.{key}")
    }
}
