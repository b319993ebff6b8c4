//! Argument resolution and argument-qualified store keys.

use serde_json::{Map, Value};

use crate::error::{CacheError, Result};

use super::ast::{Argument, Directive, Field, InputValue};

/// Variable bindings supplied alongside a query.
pub type Variables = Map<String, Value>;

/// Resolves `value` against `variables`.
///
/// Returns `None` for an unbound variable so callers can omit the argument,
/// matching how an undefined value disappears from a JSON encoding.
pub fn resolve_input(value: &InputValue, variables: &Variables) -> Option<Value> {
    match value {
        InputValue::Variable(name) => variables.get(name).cloned(),
        InputValue::Literal(v) => Some(v.clone()),
        InputValue::List(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| resolve_input(item, variables).unwrap_or(Value::Null))
                .collect(),
        )),
        InputValue::Object(entries) => Some(Value::Object(
            entries
                .iter()
                .filter_map(|(k, v)| resolve_input(v, variables).map(|v| (k.clone(), v)))
                .collect(),
        )),
    }
}

/// Resolves all arguments into a JSON object, dropping unbound variables.
pub fn resolve_arguments(arguments: &[Argument], variables: &Variables) -> Map<String, Value> {
    arguments
        .iter()
        .filter_map(|arg| resolve_input(&arg.value, variables).map(|v| (arg.name.clone(), v)))
        .collect()
}

/// Store key for `field`: its name, qualified by resolved arguments when present.
///
/// `todos(first: 2)` becomes `todos({"first":2})`. Object keys are emitted in
/// sorted order so the key does not depend on argument order in the document.
pub fn store_field_name(field: &Field, variables: &Variables) -> String {
    if field.arguments.is_empty() {
        return field.name.clone();
    }
    let args = Value::Object(resolve_arguments(&field.arguments, variables));
    format!("{}({})", field.name, args)
}

/// Evaluates `@skip` / `@include` for a selection.
pub fn should_include(directives: &[Directive], variables: &Variables) -> Result<bool> {
    for directive in directives {
        let (arg, skip) = match directive {
            Directive::Skip(arg) => (arg, true),
            Directive::Include(arg) => (arg, false),
        };
        let flag = match resolve_input(arg, variables) {
            Some(Value::Bool(b)) => b,
            other => {
                return Err(CacheError::InvalidQuery(format!(
                    "directive argument 'if' must resolve to a boolean (got {})",
                    other.map_or_else(|| "undefined".to_owned(), |v| v.to_string())
                )))
            }
        };
        if flag == skip {
            return Ok(false);
        }
    }
    Ok(true)
}
