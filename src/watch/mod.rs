//! Registered watches and their bookkeeping.
//!
//! The registry only stores watches; diffing is driven by the cache. Each
//! watch owns a [`Mailbox`]: diffs are posted inside the cache's exclusive
//! section, so a mailbox holds them in commit order, and drained outside it so
//! that callbacks may call back into the cache.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::identity::ROOT_QUERY;
use crate::query::{SelectionSet, Variables};
use crate::read::Diff;

/// Callback invoked with every broadcast diff.
pub type WatchCallback = Arc<dyn Fn(&Diff) + Send + Sync>;

/// Identifier of a registered watch, unique for the lifetime of a cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

/// Everything needed to register a watch.
#[derive(Clone)]
pub struct WatchOptions {
    pub(crate) query: SelectionSet,
    pub(crate) variables: Variables,
    pub(crate) root_id: String,
    pub(crate) optimistic: bool,
    pub(crate) previous_result: Option<Arc<Value>>,
    pub(crate) callback: WatchCallback,
}

impl WatchOptions {
    /// Watches `query` from the root query record, delivering diffs to `callback`.
    pub fn new<F>(query: SelectionSet, callback: F) -> Self
    where
        F: Fn(&Diff) + Send + Sync + 'static,
    {
        Self {
            query,
            variables: Variables::new(),
            root_id: ROOT_QUERY.to_owned(),
            optimistic: true,
            previous_result: None,
            callback: Arc::new(callback),
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

    /// Whether broadcasts read through optimistic layers. Defaults to `true`.
    pub fn optimistic(mut self, optimistic: bool) -> Self {
        self.optimistic = optimistic;
        self
    }

    /// Result the first broadcast compares against.
    pub fn previous_result(mut self, previous: Arc<Value>) -> Self {
        self.previous_result = Some(previous);
        self
    }
}

impl fmt::Debug for WatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchOptions")
            .field("root_id", &self.root_id)
            .field("optimistic", &self.optimistic)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

/// Per-watch queue of diffs awaiting delivery.
///
/// At most one thread runs a watch's callback at a time. Whoever finds the
/// mailbox idle drains it; later posters only enqueue.
pub(crate) struct Mailbox {
    callback: WatchCallback,
    state: Mutex<MailboxState>,
}

#[derive(Default)]
struct MailboxState {
    queue: VecDeque<Diff>,
    draining: bool,
}

/// Clears the draining flag if a callback unwinds.
struct DrainGuard<'a> {
    mailbox: &'a Mailbox,
    armed: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.mailbox.state.lock().draining = false;
        }
    }
}

impl Mailbox {
    fn new(callback: WatchCallback) -> Self {
        Self {
            callback,
            state: Mutex::new(MailboxState::default()),
        }
    }

    pub(crate) fn post(&self, diff: Diff) {
        self.state.lock().queue.push_back(diff);
    }

    /// Delivers queued diffs in order unless another caller is already draining.
    ///
    /// Returns the number of callbacks this call ran.
    pub(crate) fn drain(&self) -> usize {
        {
            let mut state = self.state.lock();
            if state.draining {
                return 0;
            }
            state.draining = true;
        }
        let mut guard = DrainGuard {
            mailbox: self,
            armed: true,
        };
        let mut delivered = 0;
        loop {
            let next = {
                let mut state = self.state.lock();
                match state.queue.pop_front() {
                    Some(diff) => diff,
                    None => {
                        // Cleared under the same lock that saw the queue empty.
                        state.draining = false;
                        guard.armed = false;
                        break;
                    }
                }
            };
            (self.callback)(&next);
            delivered += 1;
        }
        delivered
    }
}

pub(crate) struct WatchEntry {
    pub(crate) id: WatchId,
    pub(crate) options: WatchOptions,
    pub(crate) mailbox: Arc<Mailbox>,
}

/// Ordered set of live watches.
#[derive(Default)]
pub(crate) struct WatchRegistry {
    next_id: u64,
    entries: Vec<WatchEntry>,
}

impl WatchRegistry {
    pub(crate) fn register(&mut self, options: WatchOptions) -> WatchId {
        let id = WatchId(self.next_id);
        self.next_id += 1;
        let mailbox = Arc::new(Mailbox::new(Arc::clone(&options.callback)));
        self.entries.push(WatchEntry {
            id,
            options,
            mailbox,
        });
        id
    }

    /// Removes the entry registered as `id`; returns whether it was live.
    pub(crate) fn remove(&mut self, id: WatchId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        before != self.entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut WatchEntry> {
        self.entries.iter_mut()
    }
}
