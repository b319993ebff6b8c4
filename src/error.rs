use thiserror::Error;

/// Result alias used throughout the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors surfaced by cache operations.
///
/// Missing fields are not errors for reads: an incomplete read is reported
/// through [`crate::read::Diff::complete`]. Only the strict
/// [`crate::InMemoryCache::read_query`] turns missing data into
/// [`CacheError::MissingFields`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// A fragment matcher was used before it was ready, or readiness was
    /// requested without the data needed to become ready.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The introspection matcher found a stored object without `__typename`.
    #[error("cannot match fragment on '{type_condition}': object '{id}' has no __typename")]
    TypeResolution {
        /// Identity of the object being matched.
        id: String,
        /// Type condition of the fragment.
        type_condition: String,
    },
    /// Query shape and stored/result data disagree, or a directive argument is malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// A strict read found fields absent from the store.
    #[error("missing fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    /// A caller-supplied transaction aborted.
    #[error("transaction aborted: {0}")]
    Transaction(String),
    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// Builds a [`CacheError::TypeResolution`] for `id` and `type_condition`.
    pub fn type_resolution(id: impl Into<String>, type_condition: impl Into<String>) -> Self {
        CacheError::TypeResolution {
            id: id.into(),
            type_condition: type_condition.into(),
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            CacheError::Configuration(_) => "Configuration",
            CacheError::TypeResolution { .. } => "TypeResolution",
            CacheError::InvalidQuery(_) => "InvalidQuery",
            CacheError::MissingFields(_) => "MissingFields",
            CacheError::Transaction(_) => "Transaction",
            CacheError::Serialization(_) => "Serialization",
        }
    }
}
