//! The public cache facade.
//!
//! [`InMemoryCache`] owns the confirmed record store, the optimistic layer
//! stack, and the watch registry behind a single exclusive section. Every
//! mutation commits its changes, diffs all watches, and posts the diffs to each
//! watch's mailbox before releasing the section. Callbacks run afterwards, so
//! they may call back into the cache, and each watch sees its diffs in commit
//! order even when several threads mutate at once.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{CacheError, Result};
use crate::identity::ROOT_QUERY;
use crate::normalize::{Normalizer, WriteReport};
use crate::query::{SelectionSet, Variables};
use crate::read::{Diff, DiffReader};
use crate::storage::{
    default_metrics, CacheMetrics, NormalizedSnapshot, OptimisticStack, RecordStore, StoreRead,
};
use crate::watch::{Mailbox, WatchId, WatchOptions, WatchRegistry};

mod options;
mod transaction;

pub use options::CacheOptions;
pub use transaction::CacheTransaction;

mod tests;

/// Recorded optimistic write, replayed whenever an earlier layer is removed.
pub type OptimisticTransaction =
    Arc<dyn Fn(&mut CacheTransaction<'_>) -> Result<()> + Send + Sync>;

struct CacheState {
    data: RecordStore,
    optimistic: OptimisticStack<OptimisticTransaction>,
    watches: WatchRegistry,
}

/// Full-control read request for [`InMemoryCache::diff`].
#[derive(Clone, Debug)]
pub struct DiffRequest {
    query: SelectionSet,
    variables: Variables,
    root_id: String,
    optimistic: bool,
    previous_result: Option<Arc<Value>>,
}

impl DiffRequest {
    /// Reads `query` from the root query record through optimistic layers.
    pub fn new(query: SelectionSet) -> Self {
        Self {
            query,
            variables: Variables::new(),
            root_id: ROOT_QUERY.to_owned(),
            optimistic: true,
            previous_result: None,
        }
    }

    /// Sets the variables used to resolve arguments.
    pub fn variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    /// Reads from `id` instead of the root query record.
    pub fn root_id(mut self, id: impl Into<String>) -> Self {
        self.root_id = id.into();
        self
    }

    /// Whether to read through optimistic layers.
    pub fn optimistic(mut self, optimistic: bool) -> Self {
        self.optimistic = optimistic;
        self
    }

    /// Result to return unchanged when the new read is structurally equal.
    pub fn previous_result(mut self, previous: Arc<Value>) -> Self {
        self.previous_result = Some(previous);
        self
    }
}

/// Handle to a registered watch.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[must_use = "a watch stays registered until `unsubscribe` is called"]
#[derive(Debug)]
pub struct Subscription {
    id: WatchId,
    state: Weak<Mutex<CacheState>>,
}

impl Subscription {
    /// Registry id of the watch.
    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Removes exactly this watch. Returns `false` if the cache is gone.
    pub fn unsubscribe(self) -> bool {
        match self.state.upgrade() {
            Some(state) => state.lock().watches.remove(self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheState")
            .field("records", &self.data.len())
            .field("layers", &self.optimistic.len())
            .field("watches", &self.watches.len())
            .finish()
    }
}

/// Normalized in-memory cache of graph-shaped query results.
///
/// Cloning is cheap; clones share the same store.
#[derive(Clone)]
pub struct InMemoryCache {
    options: Arc<CacheOptions>,
    metrics: Arc<dyn CacheMetrics>,
    state: Arc<Mutex<CacheState>>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("options", &self.options)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl InMemoryCache {
    /// Creates a cache with default options.
    pub fn new() -> Self {
        Self::with_options(CacheOptions::default())
    }

    /// Creates a cache with `options`.
    pub fn with_options(options: CacheOptions) -> Self {
        let metrics = options.metrics.clone().unwrap_or_else(default_metrics);
        Self {
            options: Arc::new(options),
            metrics,
            state: Arc::new(Mutex::new(CacheState {
                data: RecordStore::new(),
                optimistic: OptimisticStack::new(),
                watches: WatchRegistry::default(),
            })),
        }
    }

    /// Options the cache was built with.
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Resolves once the configured fragment matcher can be used.
    pub async fn ready(&self) -> Result<()> {
        self.options.fragment_matcher.become_ready().await
    }

    /// Writes `result` as the fields of the root query record.
    pub fn write(
        &self,
        result: &Value,
        query: &SelectionSet,
        variables: &Variables,
    ) -> Result<WriteReport> {
        self.write_fragment(ROOT_QUERY, result, query, variables)
    }

    /// Writes `data` as the fields of the record `id`.
    ///
    /// The whole pass is staged first; on error the store is untouched and no
    /// broadcast happens.
    pub fn write_fragment(
        &self,
        id: &str,
        data: &Value,
        fragment: &SelectionSet,
        variables: &Variables,
    ) -> Result<WriteReport> {
        let query = self.options.prepare(fragment);
        let (report, pending) = {
            let mut state = self.state.lock();
            let normalizer = Normalizer::new(
                &self.options.identity,
                self.options.fragment_matcher.as_ref(),
                variables,
            );
            let (batch, report) = normalizer.normalize(id, data, &query)?;
            state.data.merge(batch);
            self.metrics.records_written(report.records);
            debug!(
                id,
                records = report.records,
                missing = report.missing.len(),
                skipped = report.skipped.len(),
                "cache.write.committed"
            );
            (report, self.collect_broadcast(&mut state))
        };
        self.deliver(pending);
        Ok(report)
    }

    /// Reads `query` from the root query record.
    pub fn read(
        &self,
        query: &SelectionSet,
        variables: &Variables,
        optimistic: bool,
    ) -> Result<Diff> {
        self.diff_at(ROOT_QUERY, query, variables, optimistic, None)
    }

    /// Reads `query` and fails with [`CacheError::MissingFields`] if any field is missing.
    pub fn read_query(
        &self,
        query: &SelectionSet,
        variables: &Variables,
        optimistic: bool,
    ) -> Result<Value> {
        let diff = self.read(query, variables, optimistic)?;
        if !diff.missing.is_empty() {
            return Err(CacheError::MissingFields(diff.missing));
        }
        Ok(Arc::try_unwrap(diff.result).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Reads `fragment` from the record `id`; `None` when no such record exists.
    pub fn read_fragment(
        &self,
        id: &str,
        fragment: &SelectionSet,
        variables: &Variables,
        optimistic: bool,
    ) -> Result<Option<Diff>> {
        let query = self.options.prepare(fragment);
        let diff = self.with_view(optimistic, |store| {
            if !store.contains(id) {
                return Ok(None);
            }
            self.reader(store, variables).diff(id, &query, None).map(Some)
        })?;
        if let Some(diff) = &diff {
            self.metrics.diff_computed(diff.complete);
        }
        Ok(diff)
    }

    /// Reads with full control over root, view, and previous result.
    pub fn diff(&self, request: DiffRequest) -> Result<Diff> {
        self.diff_at(
            &request.root_id,
            &request.query,
            &request.variables,
            request.optimistic,
            request.previous_result.as_ref(),
        )
    }

    /// Registers a watch. It is first notified on the next broadcast.
    pub fn watch(&self, options: WatchOptions) -> Subscription {
        let id = self.state.lock().watches.register(options);
        trace!(watch = id.0, "cache.watch.registered");
        Subscription {
            id,
            state: Arc::downgrade(&self.state),
        }
    }

    /// Runs `transaction` over the optimistic composite and records the result
    /// as layer `id`.
    ///
    /// If the transaction fails no layer is added and nothing is broadcast.
    pub fn add_optimistic<F>(&self, id: impl Into<String>, transaction: F) -> Result<()>
    where
        F: Fn(&mut CacheTransaction<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let id = id.into();
        let intent: OptimisticTransaction = Arc::new(transaction);
        let pending = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let view = state.optimistic.view(&state.data);
            let delta = self.run_optimistic(&view, &intent)?;
            debug!(layer = %id, records = delta.len(), "cache.optimistic.added");
            state.optimistic.push(id, intent, delta);
            self.collect_broadcast(state)
        };
        self.deliver(pending);
        Ok(())
    }

    /// Removes every layer named `id` and replays the remaining layers.
    ///
    /// Watches are notified even when a replay fails; the replay error is then
    /// returned and the stack should be considered inconsistent until
    /// [`InMemoryCache::reset`] or further removals.
    pub fn remove_optimistic(&self, id: &str) -> Result<()> {
        let (outcome, pending) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let removed = state.optimistic.remove(id);
            let outcome = if removed == 0 {
                Ok(())
            } else {
                state
                    .optimistic
                    .rebuild(&state.data, |layer, intent, view| {
                        trace!(layer, "cache.optimistic.replay");
                        self.run_optimistic(view, intent)
                    })
            };
            debug!(
                layer = id,
                removed,
                remaining = state.optimistic.len(),
                "cache.optimistic.removed"
            );
            if let Err(err) = &outcome {
                warn!(layer = id, error = %err, "cache.optimistic.replay_failed");
            }
            (outcome, self.collect_broadcast(state))
        };
        self.deliver(pending);
        outcome
    }

    /// Runs `transaction` against the confirmed store and commits its writes
    /// with a single broadcast. On error nothing is committed.
    pub fn transact<F>(&self, transaction: F) -> Result<WriteReport>
    where
        F: FnOnce(&mut CacheTransaction<'_>) -> Result<()>,
    {
        let (report, pending) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let mut tx = CacheTransaction::new(&state.data, &self.options);
            transaction(&mut tx)?;
            let (delta, report) = tx.into_parts();
            state.data.merge(delta);
            self.metrics.records_written(report.records);
            debug!(records = report.records, "cache.transact.committed");
            (report, self.collect_broadcast(state))
        };
        self.deliver(pending);
        Ok(report)
    }

    /// Clears the confirmed store and notifies watches. Optimistic layers are kept.
    pub fn reset(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.data.clear();
            debug!(layers = state.optimistic.len(), "cache.reset");
            self.collect_broadcast(&mut state)
        };
        self.deliver(pending);
    }

    /// Copies the confirmed store, or the optimistic composite when `optimistic`.
    pub fn extract(&self, optimistic: bool) -> NormalizedSnapshot {
        let state = self.state.lock();
        if !optimistic || state.optimistic.is_empty() {
            return state.data.to_snapshot();
        }
        let mut ids: BTreeSet<&str> = state.data.ids().collect();
        for layer in state.optimistic.layers() {
            ids.extend(layer.delta().ids());
        }
        let view = state.optimistic.view(&state.data);
        ids.into_iter()
            .filter_map(|id| view.get(id).map(|record| (id.to_owned(), record.into_owned())))
            .collect()
    }

    /// Replaces the confirmed store with `snapshot` and notifies watches.
    pub fn restore(&self, snapshot: NormalizedSnapshot) {
        let pending = {
            let mut state = self.state.lock();
            state.data.replace_all(snapshot);
            debug!(records = state.data.len(), "cache.restore");
            self.collect_broadcast(&mut state)
        };
        self.deliver(pending);
    }

    /// Diffs every watch and delivers the result. Returns the number of watches notified.
    pub fn broadcast_watches(&self) -> usize {
        let pending = {
            let mut state = self.state.lock();
            self.collect_broadcast(&mut state)
        };
        self.deliver(pending)
    }

    /// Identifiers of the live optimistic layers, oldest first.
    pub fn optimistic_layers(&self) -> Vec<String> {
        self.state.lock().optimistic.ids().map(str::to_owned).collect()
    }

    /// Number of registered watches.
    pub fn watch_count(&self) -> usize {
        self.state.lock().watches.len()
    }

    fn diff_at(
        &self,
        root_id: &str,
        query: &SelectionSet,
        variables: &Variables,
        optimistic: bool,
        previous: Option<&Arc<Value>>,
    ) -> Result<Diff> {
        let query = self.options.prepare(query);
        let diff = self.with_view(optimistic, |store| {
            self.reader(store, variables).diff(root_id, &query, previous)
        })?;
        self.metrics.diff_computed(diff.complete);
        Ok(diff)
    }

    fn reader<'a>(&'a self, store: &'a dyn StoreRead, variables: &'a Variables) -> DiffReader<'a> {
        DiffReader::new(store, self.options.fragment_matcher.as_ref(), variables)
    }

    /// Runs `f` inside the exclusive section against the requested view.
    fn with_view<R>(&self, optimistic: bool, f: impl FnOnce(&dyn StoreRead) -> R) -> R {
        let state = self.state.lock();
        if optimistic && !state.optimistic.is_empty() {
            let view = state.optimistic.view(&state.data);
            f(&view)
        } else {
            f(&state.data)
        }
    }

    fn run_optimistic(
        &self,
        base: &dyn StoreRead,
        intent: &OptimisticTransaction,
    ) -> Result<RecordStore> {
        let mut tx = CacheTransaction::new(base, &self.options);
        intent(&mut tx)?;
        self.metrics.layer_applied();
        Ok(tx.into_parts().0)
    }

    /// Diffs every watch against its view and posts the diff to its mailbox.
    /// Must run inside the exclusive section.
    fn collect_broadcast(&self, state: &mut CacheState) -> Vec<Arc<Mailbox>> {
        let CacheState {
            data,
            optimistic,
            watches,
        } = state;
        let composite = optimistic.view(&*data);
        let mut pending = Vec::with_capacity(watches.len());
        for entry in watches.iter_mut() {
            let watch = &mut entry.options;
            let store: &dyn StoreRead = if watch.optimistic { &composite } else { &*data };
            let query = self.options.prepare(&watch.query);
            let result = self.reader(store, &watch.variables).diff(
                &watch.root_id,
                &query,
                watch.previous_result.as_ref(),
            );
            match result {
                Ok(diff) => {
                    self.metrics.diff_computed(diff.complete);
                    watch.previous_result = Some(Arc::clone(&diff.result));
                    entry.mailbox.post(diff);
                    pending.push(Arc::clone(&entry.mailbox));
                }
                Err(err) => warn!(watch = entry.id.0, error = %err, "cache.broadcast.watch_failed"),
            }
        }
        pending
    }

    /// Drains the mailboxes posted to by [`Self::collect_broadcast`]. Must run
    /// outside the section.
    ///
    /// A mailbox already being drained by another caller is left to it, so the
    /// diffs posted here may be delivered by that caller instead. Returns the
    /// number of diffs posted.
    fn deliver(&self, pending: Vec<Arc<Mailbox>>) -> usize {
        let count = pending.len();
        self.metrics.broadcast(count);
        trace!(watches = count, "cache.broadcast");
        for mailbox in pending {
            mailbox.drain();
        }
        count
    }
}
