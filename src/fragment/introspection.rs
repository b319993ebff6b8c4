use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::identity::root_typename;

use super::{FragmentMatcher, ReadContext};

/// Abstract type name → names of the concrete types it covers.
pub type PossibleTypesMap = BTreeMap<String, BTreeSet<String>>;

/// `{ "__schema": { "types": [...] } }` as returned by an introspection query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntrospectionResult {
    /// Schema section.
    #[serde(rename = "__schema")]
    pub schema: IntrospectionSchema,
}

/// Schema section of an introspection result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntrospectionSchema {
    /// Every named type in the schema.
    pub types: Vec<IntrospectionType>,
}

/// One named type; fields other than these are ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntrospectionType {
    /// Type kind, e.g. `UNION`, `INTERFACE`, `OBJECT`.
    pub kind: String,
    /// Type name.
    pub name: String,
    /// Member or implementing types, present for abstract kinds.
    #[serde(default, rename = "possibleTypes")]
    pub possible_types: Option<Vec<NamedTypeRef>>,
}

/// Reference to a type by name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedTypeRef {
    /// Type name.
    pub name: String,
}

/// Builds the possible-types map, keeping only `UNION` and `INTERFACE` entries.
pub fn possible_types_map(result: &IntrospectionResult) -> PossibleTypesMap {
    result
        .schema
        .types
        .iter()
        .filter(|ty| ty.kind == "UNION" || ty.kind == "INTERFACE")
        .map(|ty| {
            let members = ty
                .possible_types
                .iter()
                .flatten()
                .map(|member| member.name.clone())
                .collect();
            (ty.name.clone(), members)
        })
        .collect()
}

/// Schema-aware matcher driven by an introspection result.
///
/// Created empty it is not ready: [`IntrospectionFragmentMatcher::load`] must
/// seed it before [`FragmentMatcher::matches`] can be used.
#[derive(Debug, Default)]
pub struct IntrospectionFragmentMatcher {
    possible_types: RwLock<Option<PossibleTypesMap>>,
}

impl IntrospectionFragmentMatcher {
    /// Creates an unseeded matcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a matcher seeded from `result`.
    pub fn with_introspection(result: &IntrospectionResult) -> Self {
        let matcher = Self::new();
        matcher.load(result);
        matcher
    }

    /// Creates a matcher seeded from a raw JSON introspection result.
    pub fn from_json(value: Value) -> Result<Self> {
        let result: IntrospectionResult = serde_json::from_value(value)?;
        Ok(Self::with_introspection(&result))
    }

    /// Seeds (or reseeds) the possible-types map.
    pub fn load(&self, result: &IntrospectionResult) {
        let map = possible_types_map(result);
        debug!(abstract_types = map.len(), "fragment.introspection.seeded");
        *self.possible_types.write() = Some(map);
    }

    /// Copy of the possible-types map; `None` until seeded.
    pub fn possible_types(&self) -> Option<PossibleTypesMap> {
        self.possible_types.read().clone()
    }
}

#[async_trait]
impl FragmentMatcher for IntrospectionFragmentMatcher {
    fn is_ready(&self) -> bool {
        self.possible_types.read().is_some()
    }

    async fn become_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(CacheError::Configuration(
                "introspection fragment matcher requires an introspection result".into(),
            ))
        }
    }

    fn matches(&self, id: &str, type_condition: &str, ctx: &mut ReadContext<'_>) -> Result<bool> {
        let guard = self.possible_types.read();
        let Some(possible_types) = guard.as_ref() else {
            return Err(CacheError::Configuration(
                "fragment matcher used before it was ready".into(),
            ));
        };
        let Some(record) = ctx.store().get(id) else {
            return Ok(false);
        };
        let Some(typename) = record.typename().or_else(|| root_typename(id)) else {
            return Err(CacheError::type_resolution(id, type_condition));
        };
        if typename == type_condition {
            return Ok(true);
        }
        Ok(possible_types
            .get(type_condition)
            .is_some_and(|members| members.contains(typename)))
    }
}
