use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::fragment::{FragmentMatcher, HeuristicFragmentMatcher};
use crate::identity::IdentityResolver;
use crate::query::{add_typename, SelectionSet};
use crate::storage::CacheMetrics;

/// Configuration options supplied when constructing an [`super::InMemoryCache`].
#[derive(Clone)]
pub struct CacheOptions {
    /// Identity policy for result objects
    pub identity: IdentityResolver,
    /// Strategy used to evaluate type-conditioned fragments
    pub fragment_matcher: Arc<dyn FragmentMatcher>,
    /// Whether `__typename` is added to every nested selection before reads and writes
    pub add_typename: bool,
    /// Optional metrics collection implementation
    pub metrics: Option<Arc<dyn CacheMetrics>>,
}

impl CacheOptions {
    /// Creates options with the default identity policy and heuristic matching.
    pub fn new() -> Self {
        Self {
            identity: IdentityResolver::new(),
            fragment_matcher: Arc::new(HeuristicFragmentMatcher::new()),
            add_typename: true,
            metrics: None,
        }
    }

    /// Sets the identity resolver.
    pub fn identity(mut self, identity: IdentityResolver) -> Self {
        self.identity = identity;
        self
    }

    /// Replaces the default identity policy with `f`.
    pub fn data_id_from_object<F>(self, f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Option<String> + Send + Sync + 'static,
    {
        self.identity(IdentityResolver::custom(f))
    }

    /// Sets the fragment matcher.
    pub fn fragment_matcher(mut self, matcher: Arc<dyn FragmentMatcher>) -> Self {
        self.fragment_matcher = matcher;
        self
    }

    /// Enables or disables automatic `__typename` selection.
    pub fn add_typename(mut self, enabled: bool) -> Self {
        self.add_typename = enabled;
        self
    }

    /// Sets the metrics collector.
    pub fn metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Applies the configured document transforms to `query`.
    pub(crate) fn prepare<'q>(&self, query: &'q SelectionSet) -> Cow<'q, SelectionSet> {
        if self.add_typename {
            Cow::Owned(add_typename(query))
        } else {
            Cow::Borrowed(query)
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("identity", &self.identity)
            .field("fragment_matcher_ready", &self.fragment_matcher.is_ready())
            .field("add_typename", &self.add_typename)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}
