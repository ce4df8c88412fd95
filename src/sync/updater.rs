//! Writes embeddings back to the store and tracks run progress.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::StoreError;
use crate::store::{Document, DocumentStore};

use super::embedder::Batch;
use super::{EMBEDDING_MODEL_FIELD, EMBEDDING_UPDATED_AT_FIELD};

/// The full embedding state of one record. Applying it overwrites the
/// vector, model tag, and timestamp together, so applying it twice is the
/// same as applying it once.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingUpdate {
    pub id: String,
    pub vector: Vec<f32>,
    pub model: String,
    pub updated_at: DateTime<Utc>,
}

/// A record whose update the store rejected. It stays pending.
#[derive(Debug)]
pub struct WriteFailure {
    pub id: String,
    pub error: StoreError,
}

/// Running count, emitted once per committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    pub batch: usize,
    pub batches: usize,
    pub updated: usize,
    pub total: usize,
}

impl std::fmt::Display for SyncProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.updated, self.total)
    }
}

pub struct RecordUpdater<'a, S> {
    store: &'a S,
    vector_field: String,
    model: String,
    total: usize,
    batches: usize,
    updated: usize,
}

impl<'a, S: DocumentStore> RecordUpdater<'a, S> {
    /// `total` is the pending count found at scan time; `batch_size` is only
    /// used to report the expected number of batches.
    pub fn new(store: &'a S, vector_field: &str, model: &str, total: usize, batch_size: usize) -> Self {
        Self {
            store,
            vector_field: vector_field.to_string(),
            model: model.to_string(),
            total,
            batches: total.div_ceil(batch_size.max(1)),
            updated: 0,
        }
    }

    pub fn updated(&self) -> usize {
        self.updated
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Build the update for one record, stamped `updated_at`.
    pub fn prepare(&self, id: &str, vector: Vec<f32>, updated_at: DateTime<Utc>) -> EmbeddingUpdate {
        EmbeddingUpdate {
            id: id.to_string(),
            vector,
            model: self.model.clone(),
            updated_at,
        }
    }

    /// Write one update as a single atomic field-set.
    pub fn apply(&self, update: &EmbeddingUpdate) -> Result<(), StoreError> {
        let mut fields = Document::new();
        fields.insert(self.vector_field.clone(), serde_json::to_value(&update.vector)?);
        fields.insert(
            EMBEDDING_MODEL_FIELD.to_string(),
            Value::String(update.model.clone()),
        );
        fields.insert(
            EMBEDDING_UPDATED_AT_FIELD.to_string(),
            Value::String(update.updated_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
        self.store.set_fields(&update.id, &fields)
    }

    /// Write every vector of `batch` (aligned with its records), then report
    /// progress. Rejected records are returned; they do not stop the batch.
    pub fn commit_batch(
        &mut self,
        batch: &Batch,
        vectors: Vec<Vec<f32>>,
    ) -> (SyncProgress, Vec<WriteFailure>) {
        let now = Utc::now();
        let mut failures = Vec::new();

        for (record, vector) in batch.records.iter().zip(vectors) {
            let update = self.prepare(&record.id, vector, now);
            match self.apply(&update) {
                Ok(()) => self.updated += 1,
                Err(error) => {
                    tracing::warn!(id = %record.id, error = %error, "store rejected embedding update");
                    failures.push(WriteFailure {
                        id: record.id.clone(),
                        error,
                    });
                }
            }
        }

        let progress = SyncProgress {
            batch: batch.number,
            batches: self.batches,
            updated: self.updated,
            total: self.total,
        };
        tracing::info!(
            batch = batch.number,
            batches = self.batches,
            failed = failures.len(),
            "updated {progress} documents"
        );
        (progress, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use serde_json::json;

    #[test]
    fn apply_is_idempotent() {
        let store = SqliteStore::open_in_memory("movies").unwrap();
        store
            .insert_document(Some("a"), json!({"plot": "x"}).as_object().unwrap())
            .unwrap();
        let updater = RecordUpdater::new(&store, "plot_embedding", "m1", 1, 10);
        let update = updater.prepare("a", vec![0.5, 0.25], Utc::now());

        updater.apply(&update).unwrap();
        let once = store.get_document("a").unwrap().unwrap();
        updater.apply(&update).unwrap();
        let twice = store.get_document("a").unwrap().unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice["plot_embedding"], json!([0.5, 0.25]));
        assert_eq!(twice["embedding_model"], "m1");
        assert!(twice["embedding_updated_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn progress_display() {
        let progress = SyncProgress {
            batch: 25,
            batches: 25,
            updated: 245,
            total: 245,
        };
        assert_eq!(progress.to_string(), "245/245");
    }
}
