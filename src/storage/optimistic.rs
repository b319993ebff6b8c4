//! Optimistic layers recorded as replayable intents.
//!
//! A layer is not an independent delta: its writes were computed against the
//! composite of the base store and every earlier layer. Removing a layer
//! therefore replays every remaining intent, in order, against the updated
//! prior state.

use std::borrow::Cow;

use crate::error::Result;

use super::record::Record;
use super::store::{RecordStore, StoreRead};

/// Composite of a base view and an ordered list of overlay deltas.
///
/// Lookups fold overlays over the base record field by field; the most recent
/// layer wins per field.
pub struct LayeredView<'a> {
    base: &'a dyn StoreRead,
    layers: Vec<&'a RecordStore>,
}

impl<'a> LayeredView<'a> {
    /// View over `base` with no overlays.
    pub fn new(base: &'a dyn StoreRead) -> Self {
        Self {
            base,
            layers: Vec::new(),
        }
    }

    /// Adds `layer` on top of the existing overlays.
    pub fn with_layer(mut self, layer: &'a RecordStore) -> Self {
        self.layers.push(layer);
        self
    }

    /// Number of overlays.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

impl StoreRead for LayeredView<'_> {
    fn get(&self, id: &str) -> Option<Cow<'_, Record>> {
        let mut overlays = self
            .layers
            .iter()
            .filter_map(|layer| layer.record(id))
            .peekable();
        if overlays.peek().is_none() {
            return self.base.get(id);
        }
        let mut merged = self.base.get(id).map(Cow::into_owned).unwrap_or_default();
        for record in overlays {
            merged.merge(record.clone());
        }
        Some(Cow::Owned(merged))
    }
}

/// One recorded optimistic write.
#[derive(Clone, Debug)]
pub struct OptimisticLayer<T> {
    id: String,
    intent: T,
    delta: RecordStore,
}

impl<T> OptimisticLayer<T> {
    /// External identifier of the layer.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Recorded intent used for replay.
    pub fn intent(&self) -> &T {
        &self.intent
    }

    /// Records written by the most recent run of the intent.
    pub fn delta(&self) -> &RecordStore {
        &self.delta
    }
}

/// Ordered optimistic layers above the confirmed store.
#[derive(Clone, Debug)]
pub struct OptimisticStack<T> {
    layers: Vec<OptimisticLayer<T>>,
}

impl<T> Default for OptimisticStack<T> {
    fn default() -> Self {
        Self { layers: Vec::new() }
    }
}

impl<T> OptimisticStack<T> {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether no layer is pending.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layer ids in application order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|layer| layer.id.as_str())
    }

    /// Layers in application order.
    pub fn layers(&self) -> &[OptimisticLayer<T>] {
        &self.layers
    }

    /// Appends a layer whose `delta` was computed against the current composite.
    pub fn push(&mut self, id: impl Into<String>, intent: T, delta: RecordStore) {
        self.layers.push(OptimisticLayer {
            id: id.into(),
            intent,
            delta,
        });
    }

    /// Removes every layer with `id`, returning how many were removed.
    ///
    /// Remaining layers keep stale deltas until [`OptimisticStack::rebuild`] runs.
    pub fn remove(&mut self, id: &str) -> usize {
        let before = self.layers.len();
        self.layers.retain(|layer| layer.id != id);
        before - self.layers.len()
    }

    /// Composite of `base` and every layer.
    pub fn view<'a>(&'a self, base: &'a dyn StoreRead) -> LayeredView<'a> {
        self.layers
            .iter()
            .fold(LayeredView::new(base), |view, layer| view.with_layer(&layer.delta))
    }

    /// Re-derives every layer by replaying its intent over `base` plus the
    /// already rebuilt layers before it.
    ///
    /// Stops at the first failing replay; layers from that point on keep the
    /// deltas of their previous run.
    pub fn rebuild<F>(&mut self, base: &dyn StoreRead, mut replay: F) -> Result<()>
    where
        F: FnMut(&str, &T, &LayeredView<'_>) -> Result<RecordStore>,
    {
        for index in 0..self.layers.len() {
            let (done, rest) = self.layers.split_at_mut(index);
            let layer = &mut rest[0];
            let view = done
                .iter()
                .fold(LayeredView::new(base), |view, prior| view.with_layer(&prior.delta));
            layer.delta = replay(&layer.id, &layer.intent, &view)?;
        }
        Ok(())
    }
}
