use serde_json::Value;
use tracing::trace;

use crate::error::Result;
use crate::identity::ROOT_QUERY;
use crate::normalize::{Normalizer, WriteReport};
use crate::query::{SelectionSet, Variables};
use crate::read::{Diff, DiffReader};
use crate::storage::{LayeredView, RecordStore, StoreRead};

use super::options::CacheOptions;

/// Write scope handed to transaction callbacks.
///
/// Writes are staged in a private delta; reads observe the base the
/// transaction was opened on with that delta applied on top. Nothing is
/// visible outside the transaction until the cache commits the delta.
pub struct CacheTransaction<'a> {
    base: &'a dyn StoreRead,
    options: &'a CacheOptions,
    delta: RecordStore,
    report: WriteReport,
}

impl<'a> CacheTransaction<'a> {
    pub(crate) fn new(base: &'a dyn StoreRead, options: &'a CacheOptions) -> Self {
        Self {
            base,
            options,
            delta: RecordStore::new(),
            report: WriteReport::default(),
        }
    }

    /// Writes `result` as the fields of the root query record.
    pub fn write(
        &mut self,
        result: &Value,
        query: &SelectionSet,
        variables: &Variables,
    ) -> Result<WriteReport> {
        self.write_fragment(ROOT_QUERY, result, query, variables)
    }

    /// Writes `data` as the fields of the record `id`.
    pub fn write_fragment(
        &mut self,
        id: &str,
        data: &Value,
        fragment: &SelectionSet,
        variables: &Variables,
    ) -> Result<WriteReport> {
        let query = self.options.prepare(fragment);
        let normalizer = Normalizer::new(
            &self.options.identity,
            self.options.fragment_matcher.as_ref(),
            variables,
        );
        let (batch, report) = normalizer.normalize(id, data, &query)?;
        trace!(id, records = report.records, "cache.transaction.write");
        self.delta.merge(batch);
        self.report.absorb(report.clone());
        Ok(report)
    }

    /// Reads `query` from the root query record, including staged writes.
    pub fn read(&self, query: &SelectionSet, variables: &Variables) -> Result<Diff> {
        self.diff_from(ROOT_QUERY, query, variables)
    }

    /// Reads `fragment` from the record `id`; `None` when no such record exists.
    pub fn read_fragment(
        &self,
        id: &str,
        fragment: &SelectionSet,
        variables: &Variables,
    ) -> Result<Option<Diff>> {
        if !self.view().contains(id) {
            return Ok(None);
        }
        self.diff_from(id, fragment, variables).map(Some)
    }

    fn diff_from(&self, id: &str, query: &SelectionSet, variables: &Variables) -> Result<Diff> {
        let query = self.options.prepare(query);
        let view = self.view();
        DiffReader::new(&view, self.options.fragment_matcher.as_ref(), variables).diff(
            id,
            &query,
            None,
        )
    }

    fn view(&self) -> LayeredView<'_> {
        LayeredView::new(self.base).with_layer(&self.delta)
    }

    /// Consumes the transaction, returning the staged delta and the combined report.
    pub(crate) fn into_parts(self) -> (RecordStore, WriteReport) {
        let mut report = self.report;
        report.records = self.delta.len();
        (self.delta, report)
    }
}
