//! Fragment type matching.
//!
//! Decides whether the object stored under an identity satisfies a fragment's
//! type condition. Two strategies share the [`FragmentMatcher`] trait and are
//! selected when the cache is constructed:
//!
//! * [`HeuristicFragmentMatcher`] needs no schema knowledge and guesses when it
//!   cannot decide, flagging the read as partial.
//! * [`IntrospectionFragmentMatcher`] answers from the possible-types map of a
//!   schema introspection result and never guesses.

use async_trait::async_trait;

use crate::error::Result;
use crate::storage::StoreRead;

mod heuristic;
mod introspection;

pub use heuristic::HeuristicFragmentMatcher;
pub use introspection::{
    possible_types_map, IntrospectionFragmentMatcher, IntrospectionResult, IntrospectionSchema,
    IntrospectionType, NamedTypeRef, PossibleTypesMap,
};

/// State shared between a read (or write) and the matcher it consults.
pub struct ReadContext<'a> {
    store: &'a dyn StoreRead,
    partial: bool,
}

impl<'a> ReadContext<'a> {
    /// Context reading objects from `store`.
    pub fn new(store: &'a dyn StoreRead) -> Self {
        Self {
            store,
            partial: false,
        }
    }

    /// Store the matcher should resolve identities against.
    pub fn store(&self) -> &'a dyn StoreRead {
        self.store
    }

    /// Flags the surrounding read as incomplete.
    pub fn mark_partial(&mut self) {
        self.partial = true;
    }

    /// Whether a matcher flagged the read as incomplete.
    pub fn is_partial(&self) -> bool {
        self.partial
    }
}

/// Strategy deciding fragment applicability.
#[async_trait]
pub trait FragmentMatcher: Send + Sync {
    /// Whether [`FragmentMatcher::matches`] may be called now.
    fn is_ready(&self) -> bool;

    /// Resolves once the matcher is usable. Calling it again after readiness is a no-op.
    async fn become_ready(&self) -> Result<()>;

    /// Whether the object stored under `id` satisfies `type_condition`.
    fn matches(&self, id: &str, type_condition: &str, ctx: &mut ReadContext<'_>) -> Result<bool>;
}
