use crate::identity::TYPENAME_FIELD;

use super::ast::{Field, Selection, SelectionSet};

/// Returns a copy of `root` with `__typename` selected in every nested object selection.
///
/// The root selection set itself is left alone: root records are addressed by a
/// fixed identity and never need a declared type.
pub fn add_typename(root: &SelectionSet) -> SelectionSet {
    SelectionSet::new(root.selections.iter().map(add_to_selection).collect())
}

fn add_to_selection(selection: &Selection) -> Selection {
    match selection {
        Selection::Field(field) => {
            let mut field = field.clone();
            if let Some(nested) = field.selection_set.take() {
                field.selection_set = Some(with_typename(&nested));
            }
            Selection::Field(field)
        }
        Selection::InlineFragment(fragment) => {
            let mut fragment = fragment.clone();
            fragment.selection_set = add_typename(&fragment.selection_set);
            Selection::InlineFragment(fragment)
        }
    }
}

fn with_typename(set: &SelectionSet) -> SelectionSet {
    let mut out = add_typename(set);
    if !out.selects_field(TYPENAME_FIELD) {
        out.selections.push(Selection::Field(Field::new(TYPENAME_FIELD)));
    }
    out
}
