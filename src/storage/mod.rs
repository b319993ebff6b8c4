//! Normalized record storage.
//!
//! Implements the identity-keyed record arena, the layered optimistic overlay,
//! serializable snapshots, and metrics hooks.

mod metrics;
mod optimistic;
mod record;
mod snapshot;
mod store;

/// Metrics collection.
pub use metrics::{default_metrics, CacheMetrics, CounterMetrics, NoopMetrics};

/// Optimistic layering.
pub use optimistic::{LayeredView, OptimisticLayer, OptimisticStack};

/// Record and value types.
pub use record::{Record, StoreValue};

/// Serializable store copies.
pub use snapshot::NormalizedSnapshot;

/// Store implementations and the read seam shared by all views.
pub use store::{RecordStore, SingleRecord, StoreRead};
