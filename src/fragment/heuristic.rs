use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{trace, warn};

use crate::error::Result;
use crate::identity::{root_typename, ROOT_QUERY};

use super::{FragmentMatcher, ReadContext};

/// Best-effort matcher usable without schema knowledge.
///
/// When it cannot decide (no `__typename`, or a type name that differs from a
/// possibly abstract condition) it answers "match" and marks the read partial.
#[derive(Debug, Default)]
pub struct HeuristicFragmentMatcher {
    warned: AtomicBool,
}

impl HeuristicFragmentMatcher {
    /// Creates the matcher.
    pub fn new() -> Self {
        Self::default()
    }

    fn warn_once(&self, id: &str, type_condition: &str, reason: &'static str) {
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!(
                id,
                type_condition,
                reason,
                "fragment.heuristic.guessing"
            );
        }
    }
}

#[async_trait]
impl FragmentMatcher for HeuristicFragmentMatcher {
    fn is_ready(&self) -> bool {
        true
    }

    async fn become_ready(&self) -> Result<()> {
        Ok(())
    }

    fn matches(&self, id: &str, type_condition: &str, ctx: &mut ReadContext<'_>) -> Result<bool> {
        let typename = match ctx.store().get(id) {
            Some(record) => record.typename().or_else(|| root_typename(id)).map(str::to_owned),
            None => return Ok(id == ROOT_QUERY),
        };
        match typename {
            Some(name) if name == type_condition => Ok(true),
            Some(name) => {
                trace!(id, typename = %name, type_condition, "fragment.heuristic.mismatch");
                self.warn_once(id, type_condition, "type name differs from condition");
                ctx.mark_partial();
                Ok(true)
            }
            None => {
                self.warn_once(id, type_condition, "object has no __typename");
                ctx.mark_partial();
                Ok(true)
            }
        }
    }
}
