//! Finds records whose embedding is missing or was produced by another model.

use std::collections::VecDeque;

use crate::error::StoreError;
use crate::store::{value_text, DocumentStore, Filter, ScanCursor};

use super::{SyncTarget, EMBEDDING_MODEL_FIELD};

/// A record that needs (re-)embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub id: String,
    pub text: String,
    pub cursor: ScanCursor,
}

/// Store-side predicate for "pending or stale" under `model`: the source
/// text is present and the vector is either absent or tagged with a
/// different model.
pub fn pending_filter(target: &SyncTarget, model: &str) -> Filter {
    Filter::And(vec![
        Filter::non_null(&target.source_field),
        Filter::Or(vec![
            Filter::null(&target.vector_field),
            Filter::not_equal(EMBEDDING_MODEL_FIELD, model),
        ]),
    ])
}

/// Lazy, resumable scan over pending records in store order.
///
/// Records are fetched one page at a time; only the source field is loaded.
/// The cursor only moves forward, so a record that fails later in the run is
/// not revisited until the next run.
pub struct SyncScanner<'a, S> {
    store: &'a S,
    filter: Filter,
    source_field: String,
    page_size: usize,
    cursor: ScanCursor,
    yielded: ScanCursor,
    page: VecDeque<PendingRecord>,
    exhausted: bool,
}

impl<'a, S: DocumentStore> SyncScanner<'a, S> {
    pub fn new(store: &'a S, target: &SyncTarget, model: &str, page_size: usize) -> Self {
        Self {
            store,
            filter: pending_filter(target, model),
            source_field: target.source_field.clone(),
            page_size: page_size.max(1),
            cursor: ScanCursor::default(),
            yielded: ScanCursor::default(),
            page: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Continue a previous scan from `cursor` instead of the beginning.
    pub fn resume_from(mut self, cursor: ScanCursor) -> Self {
        self.cursor = cursor;
        self.yielded = cursor;
        self
    }

    /// Position after the last record handed out.
    pub fn cursor(&self) -> ScanCursor {
        self.yielded
    }

    /// Number of records the scan will visit, counted up front.
    pub fn pending_count(&self) -> Result<usize, StoreError> {
        self.store.count(&self.filter)
    }

    fn fill_page(&mut self) -> Result<(), StoreError> {
        let docs = self.store.scan(
            &self.filter,
            self.cursor,
            self.page_size,
            &[self.source_field.as_str()],
        )?;
        if docs.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = docs.last() {
            self.cursor = last.cursor;
        }
        for doc in docs {
            let text = doc
                .fields
                .get(&self.source_field)
                .and_then(value_text)
                .unwrap_or_default();
            self.page.push_back(PendingRecord {
                id: doc.id,
                text,
                cursor: doc.cursor,
            });
        }
        Ok(())
    }
}

impl<S: DocumentStore> Iterator for SyncScanner<'_, S> {
    type Item = Result<PendingRecord, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.page.is_empty() && !self.exhausted {
            if let Err(e) = self.fill_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        let record = self.page.pop_front()?;
        self.yielded = record.cursor;
        Some(Ok(record))
    }
}
