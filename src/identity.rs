//! Derivation of store identities for result objects.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Field carrying an object's declared type name.
pub const TYPENAME_FIELD: &str = "__typename";

/// Fixed identity of the record holding top-level query fields.
pub const ROOT_QUERY: &str = "ROOT_QUERY";

/// Fixed identity of the record holding top-level mutation fields.
pub const ROOT_MUTATION: &str = "ROOT_MUTATION";

/// Type name assumed for a root record that stores no `__typename`.
pub fn root_typename(id: &str) -> Option<&'static str> {
    match id {
        ROOT_QUERY => Some("Query"),
        ROOT_MUTATION => Some("Mutation"),
        _ => None,
    }
}

/// Signature of a caller-supplied identity function.
pub type DataIdFn = dyn Fn(&Map<String, Value>) -> Option<String> + Send + Sync;

/// Default identity policy: `<__typename>:<id>`, falling back to `_id`.
///
/// Returns `None` (the object is embedded in its parent) when `__typename` is
/// missing or empty, or when neither id field carries a non-null value.
pub fn default_data_id_from_object(object: &Map<String, Value>) -> Option<String> {
    let typename = object.get(TYPENAME_FIELD)?.as_str()?;
    if typename.is_empty() {
        return None;
    }
    ["id", "_id"]
        .iter()
        .filter_map(|field| object.get(*field))
        .find(|value| !value.is_null())
        .map(|id| format!("{typename}:{}", id_text(id)))
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolves the identity of result objects.
///
/// A custom function replaces the default policy entirely.
#[derive(Clone, Default)]
pub struct IdentityResolver {
    custom: Option<Arc<DataIdFn>>,
}

impl IdentityResolver {
    /// Creates a resolver using [`default_data_id_from_object`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a resolver backed by `f` instead of the default policy.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            custom: Some(Arc::new(f)),
        }
    }

    /// Returns the identity of `object`, or `None` if it should be embedded.
    pub fn identity_of(&self, object: &Map<String, Value>) -> Option<String> {
        match &self.custom {
            Some(f) => f(object),
            None => default_data_id_from_object(object),
        }
    }

    /// Whether a custom policy is installed.
    pub fn is_custom(&self) -> bool {
        self.custom.is_some()
    }
}

impl fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("custom", &self.custom.is_some())
            .finish()
    }
}
