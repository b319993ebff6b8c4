//! Parsed selection tree consumed by the normalizer and the read engine.
//!
//! These structures are produced by an external document parser. Named
//! fragment spreads are expected to arrive already inlined as
//! [`InlineFragment`]s carrying their type condition.

use serde_json::Value;

/// Ordered list of selections under one object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionSet {
    /// Selections in document order.
    pub selections: Vec<Selection>,
}

impl SelectionSet {
    /// Creates a selection set from `selections`.
    pub fn new(selections: Vec<Selection>) -> Self {
        Self { selections }
    }

    /// Whether no selections are present.
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Whether a plain field with this name is selected directly (not via a fragment).
    pub fn selects_field(&self, name: &str) -> bool {
        self.selections
            .iter()
            .any(|s| matches!(s, Selection::Field(f) if f.name == name && f.alias.is_none()))
    }
}

/// A single entry in a selection set.
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    /// A field, optionally with a nested selection.
    Field(Field),
    /// An inline fragment, optionally guarded by a type condition.
    InlineFragment(InlineFragment),
}

/// A selected field.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    /// Schema field name.
    pub name: String,
    /// Response key override.
    pub alias: Option<String>,
    /// Arguments in document order.
    pub arguments: Vec<Argument>,
    /// `@skip` / `@include` conditions.
    pub directives: Vec<Directive>,
    /// Nested selection for object-valued fields.
    pub selection_set: Option<SelectionSet>,
    /// When set, a write whose result lacks this field skips the enclosing object.
    pub required: bool,
}

impl Field {
    /// Creates a leaf field with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: Vec::new(),
            directives: Vec::new(),
            selection_set: None,
            required: false,
        }
    }

    /// Key under which the field appears in result trees.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A named argument.
#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    /// Argument name.
    pub name: String,
    /// Argument value, possibly referencing variables.
    pub value: InputValue,
}

/// Argument value as written in the document.
#[derive(Clone, Debug, PartialEq)]
pub enum InputValue {
    /// `$name` reference resolved against the caller's variables.
    Variable(String),
    /// Literal JSON value.
    Literal(Value),
    /// List literal whose items may reference variables.
    List(Vec<InputValue>),
    /// Object literal whose values may reference variables.
    Object(Vec<(String, InputValue)>),
}

impl InputValue {
    /// Shorthand for [`InputValue::Variable`].
    pub fn var(name: impl Into<String>) -> Self {
        InputValue::Variable(name.into())
    }
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        InputValue::Literal(value)
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        InputValue::Literal(Value::String(value.to_owned()))
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        InputValue::Literal(Value::String(value))
    }
}

impl From<bool> for InputValue {
    fn from(value: bool) -> Self {
        InputValue::Literal(Value::Bool(value))
    }
}

impl From<i32> for InputValue {
    fn from(value: i32) -> Self {
        InputValue::Literal(Value::from(value))
    }
}

impl From<i64> for InputValue {
    fn from(value: i64) -> Self {
        InputValue::Literal(Value::from(value))
    }
}

impl From<f64> for InputValue {
    fn from(value: f64) -> Self {
        InputValue::Literal(Value::from(value))
    }
}

/// Conditional-inclusion directives.
#[derive(Clone, Debug, PartialEq)]
pub enum Directive {
    /// `@skip(if: ...)`
    Skip(InputValue),
    /// `@include(if: ...)`
    Include(InputValue),
}

/// Inline fragment (`... on Type { ... }`).
#[derive(Clone, Debug, PartialEq)]
pub struct InlineFragment {
    /// Type condition; `None` always applies.
    pub type_condition: Option<String>,
    /// `@skip` / `@include` conditions.
    pub directives: Vec<Directive>,
    /// Selections applied when the fragment matches.
    pub selection_set: SelectionSet,
}
