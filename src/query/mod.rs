#![forbid(unsafe_code)]

//! Query shapes consumed by the cache.
//!
//! The cache never parses documents. It receives selection trees built by an
//! external parser (or by [`SelectionBuilder`]) and resolves arguments and
//! directives against caller-supplied variables.

/// Selection tree types.
pub mod ast;

/// Fluent selection builder.
pub mod builder;

/// Argument resolution and store keys.
pub mod key;

/// Document transforms applied before reads and writes.
pub mod transform;

pub use ast::{Argument, Directive, Field, InlineFragment, InputValue, Selection, SelectionSet};
pub use builder::{FieldBuilder, SelectionBuilder};
pub use key::{resolve_arguments, should_include, store_field_name, Variables};
pub use transform::add_typename;
