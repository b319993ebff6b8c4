//! Fluent construction of selection sets.
//!
//! ```
//! use shade::query::{FieldBuilder, SelectionBuilder};
//!
//! let query = SelectionBuilder::new()
//!     .field_with(
//!         FieldBuilder::new("author")
//!             .arg("id", 1)
//!             .selection(|s| s.field("id").field("name")),
//!     )
//!     .build();
//! assert_eq!(query.selections.len(), 1);
//! ```

use super::ast::{Argument, Directive, Field, InlineFragment, InputValue, Selection, SelectionSet};

/// Builder for a [`SelectionSet`].
#[derive(Clone, Debug, Default)]
pub struct SelectionBuilder {
    selections: Vec<Selection>,
}

impl SelectionBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a leaf field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.selections.push(Selection::Field(Field::new(name)));
        self
    }

    /// Adds an object field with a nested selection.
    pub fn object<F>(self, name: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(SelectionBuilder) -> SelectionBuilder,
    {
        self.field_with(FieldBuilder::new(name).selection(build))
    }

    /// Adds a field configured through a [`FieldBuilder`].
    pub fn field_with(mut self, field: FieldBuilder) -> Self {
        self.selections.push(Selection::Field(field.build()));
        self
    }

    /// Adds an inline fragment guarded by `type_condition`.
    pub fn on<F>(mut self, type_condition: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(SelectionBuilder) -> SelectionBuilder,
    {
        self.selections
            .push(Selection::InlineFragment(InlineFragment {
                type_condition: Some(type_condition.into()),
                directives: Vec::new(),
                selection_set: build(SelectionBuilder::new()).build(),
            }));
        self
    }

    /// Adds a pre-built selection.
    pub fn selection(mut self, selection: Selection) -> Self {
        self.selections.push(selection);
        self
    }

    /// Finishes the selection set.
    pub fn build(self) -> SelectionSet {
        SelectionSet::new(self.selections)
    }
}

/// Builder for a single [`Field`].
#[derive(Clone, Debug)]
pub struct FieldBuilder {
    field: Field,
}

impl FieldBuilder {
    /// Starts a field named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            field: Field::new(name),
        }
    }

    /// Sets the response alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.field.alias = Some(alias.into());
        self
    }

    /// Appends an argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.field.arguments.push(Argument {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Marks the field as required for writes.
    pub fn required(mut self) -> Self {
        self.field.required = true;
        self
    }

    /// Adds `@skip(if: value)`.
    pub fn skip_if(mut self, value: impl Into<InputValue>) -> Self {
        self.field.directives.push(Directive::Skip(value.into()));
        self
    }

    /// Adds `@include(if: value)`.
    pub fn include_if(mut self, value: impl Into<InputValue>) -> Self {
        self.field.directives.push(Directive::Include(value.into()));
        self
    }

    /// Sets the nested selection.
    pub fn selection<F>(mut self, build: F) -> Self
    where
        F: FnOnce(SelectionBuilder) -> SelectionBuilder,
    {
        self.field.selection_set = Some(build(SelectionBuilder::new()).build());
        self
    }

    /// Finishes the field.
    pub fn build(self) -> Field {
        self.field
    }
}

impl From<FieldBuilder> for Selection {
    fn from(builder: FieldBuilder) -> Self {
        Selection::Field(builder.build())
    }
}
