use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for tracking cache activity.
///
/// Implementations receive a call for every normalized write, diff, optimistic
/// layer change, and broadcast. The cache invokes these hooks inside its
/// exclusive section, so implementations must be cheap.
pub trait CacheMetrics: Send + Sync {
    /// Records a committed normalization pass.
    ///
    /// # Parameters
    /// * `records` - Number of distinct records touched by the pass.
    fn records_written(&self, records: usize);

    /// Records a diff against the store.
    ///
    /// # Parameters
    /// * `complete` - Whether every selected field was found.
    fn diff_computed(&self, complete: bool);

    /// Records an optimistic transaction run, whether first application or replay.
    fn layer_applied(&self);

    /// Records a broadcast.
    ///
    /// # Parameters
    /// * `watches` - Number of callbacks invoked.
    fn broadcast(&self, watches: usize);
}

/// A no-op implementation of [`CacheMetrics`].
#[derive(Default)]
pub struct NoopMetrics;

impl CacheMetrics for NoopMetrics {
    fn records_written(&self, _records: usize) {}
    fn diff_computed(&self, _complete: bool) {}
    fn layer_applied(&self) {}
    fn broadcast(&self, _watches: usize) {}
}

/// A thread-safe counter-based implementation of [`CacheMetrics`].
#[derive(Default)]
pub struct CounterMetrics {
    /// Number of committed normalization passes.
    pub writes: AtomicU64,

    /// Total records touched by committed passes.
    pub records_written: AtomicU64,

    /// Number of diffs that found every field.
    pub complete_diffs: AtomicU64,

    /// Number of diffs with missing fields.
    pub partial_diffs: AtomicU64,

    /// Number of optimistic transaction runs.
    pub layers_applied: AtomicU64,

    /// Number of broadcasts.
    pub broadcasts: AtomicU64,

    /// Total callbacks invoked across broadcasts.
    pub notifications: AtomicU64,
}

impl CacheMetrics for CounterMetrics {
    fn records_written(&self, records: usize) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.records_written
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    fn diff_computed(&self, complete: bool) {
        if complete {
            self.complete_diffs.fetch_add(1, Ordering::Relaxed);
        } else {
            self.partial_diffs.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn layer_applied(&self) {
        self.layers_applied.fetch_add(1, Ordering::Relaxed);
    }

    fn broadcast(&self, watches: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.notifications
            .fetch_add(watches as u64, Ordering::Relaxed);
    }
}

/// Returns the default metrics implementation wrapped in an [`Arc`].
///
/// The default implementation is [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn CacheMetrics> {
    Arc::new(NoopMetrics)
}
