//! Embedding synchronization.
//!
//! A run finds every record whose vector is missing or was produced by a
//! different model ([`SyncScanner`]), embeds them in bounded batches with
//! retry ([`BatchEmbedder`]), and writes each vector back together with its
//! model tag and timestamp ([`RecordUpdater`]). Failed batches are skipped
//! and stay pending for the next run. [`FieldRetirer`] removes obsolete
//! fields in bulk.

pub mod embedder;
pub mod retire;
pub mod scanner;
pub mod updater;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{EmbedError, StoreError};
use crate::store::DocumentStore;

pub use embedder::{Batch, BatchEmbedder};
pub use retire::{FieldRetirer, RetireReport, RetiredField};
pub use scanner::{pending_filter, PendingRecord, SyncScanner};
pub use updater::{EmbeddingUpdate, RecordUpdater, SyncProgress, WriteFailure};

/// Field holding the tag of the model that produced a record's vector.
pub const EMBEDDING_MODEL_FIELD: &str = "embedding_model";
/// Field holding the UTC time a record's vector was last written.
pub const EMBEDDING_UPDATED_AT_FIELD: &str = "embedding_updated_at";

/// Which field is embedded and where the vector goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub source_field: String,
    pub vector_field: String,
}

/// A batch given up on after its retries ran out. Its records stay pending.
#[derive(Debug)]
pub struct BatchFailure {
    pub batch: usize,
    pub ids: Vec<String>,
    pub error: EmbedError,
}

/// Summary of one sync run.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Pending and stale records found when the run started.
    pub total: usize,
    pub updated: usize,
    pub batches: usize,
    pub skipped: Vec<BatchFailure>,
    pub write_failures: Vec<WriteFailure>,
    /// The run was stopped before the scan was exhausted.
    pub interrupted: bool,
}

impl SyncReport {
    /// True when every pending record was embedded and written.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.write_failures.is_empty() && !self.interrupted
    }

    /// Ids of every record left pending by skipped batches or failed writes.
    pub fn skipped_ids(&self) -> Vec<String> {
        self.skipped
            .iter()
            .flat_map(|b| b.ids.iter().cloned())
            .chain(self.write_failures.iter().map(|f| f.id.clone()))
            .collect()
    }
}

pub struct SyncRunner<'a, S, E> {
    store: &'a S,
    embedder: BatchEmbedder<'a, E>,
    target: SyncTarget,
    model: String,
    stop: Arc<AtomicBool>,
}

impl<'a, S, E> SyncRunner<'a, S, E>
where
    S: DocumentStore,
    E: EmbeddingProvider,
{
    pub fn new(store: &'a S, embedder: BatchEmbedder<'a, E>, target: SyncTarget, model: &str) -> Self {
        Self {
            store,
            embedder,
            target,
            model: model.to_string(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that, once set, ends the run before the next batch starts.
    /// The batch in flight still commits.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Scan, embed, and write back every pending record. `on_progress` is
    /// called once per batch, after its writes.
    ///
    /// Only a failing scan aborts the run; embedding and write failures are
    /// collected in the report.
    pub async fn run<P>(&self, mut on_progress: P) -> Result<SyncReport, StoreError>
    where
        P: FnMut(&SyncProgress),
    {
        let batch_size = self.embedder.batch_size();
        let scanner = SyncScanner::new(self.store, &self.target, &self.model, batch_size);
        let total = scanner.pending_count()?;
        tracing::info!(
            total,
            batch_size,
            model = %self.model,
            source = %self.target.source_field,
            "found records to embed"
        );

        let mut report = SyncReport {
            total,
            ..SyncReport::default()
        };
        if total == 0 {
            return Ok(report);
        }

        let mut updater = RecordUpdater::new(
            self.store,
            &self.target.vector_field,
            &self.model,
            total,
            batch_size,
        );

        for batch in self.embedder.batches(scanner) {
            let batch = batch?;
            if self.stop.load(Ordering::SeqCst) {
                tracing::warn!(batch = batch.number, "sync interrupted, remaining records stay pending");
                report.interrupted = true;
                break;
            }
            report.batches += 1;

            let progress = match self.embedder.embed(&batch).await {
                Ok(vectors) => {
                    let (progress, failures) = updater.commit_batch(&batch, vectors);
                    report.write_failures.extend(failures);
                    progress
                }
                Err(error) => {
                    tracing::error!(
                        batch = batch.number,
                        records = batch.len(),
                        error = %error,
                        "skipping batch"
                    );
                    report.skipped.push(BatchFailure {
                        batch: batch.number,
                        ids: batch.ids(),
                        error,
                    });
                    SyncProgress {
                        batch: batch.number,
                        batches: total.div_ceil(batch_size),
                        updated: updater.updated(),
                        total,
                    }
                }
            };
            on_progress(&progress);
        }

        report.updated = updater.updated();
        tracing::info!(
            updated = report.updated,
            total,
            skipped_batches = report.skipped.len(),
            write_failures = report.write_failures.len(),
            "sync finished"
        );
        Ok(report)
    }
}
