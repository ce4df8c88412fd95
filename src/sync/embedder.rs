//! Groups pending records into bounded batches and embeds each batch with
//! one provider call, retried under the configured [`RetryPolicy`].

use crate::embedding::EmbeddingProvider;
use crate::error::{EmbedError, StoreError};
use crate::retry::RetryPolicy;

use super::scanner::PendingRecord;

/// Records embedded together in one provider call.
#[derive(Debug, Clone)]
pub struct Batch {
    /// 1-based position of this batch within the run.
    pub number: usize,
    pub records: Vec<PendingRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }
}

/// Iterator adapter cutting a record stream into batches of at most `size`.
///
/// A scan error is reported after the records read before it have been
/// handed out as a (short) batch.
pub struct Batches<I> {
    records: I,
    size: usize,
    number: usize,
    pending_error: Option<StoreError>,
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = Result<PendingRecord, StoreError>>,
{
    type Item = Result<Batch, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending_error.take() {
            return Some(Err(err));
        }

        let mut records = Vec::with_capacity(self.size);
        while records.len() < self.size {
            match self.records.next() {
                Some(Ok(record)) => records.push(record),
                Some(Err(err)) if records.is_empty() => return Some(Err(err)),
                Some(Err(err)) => {
                    self.pending_error = Some(err);
                    break;
                }
                None => break,
            }
        }

        if records.is_empty() {
            return None;
        }
        self.number += 1;
        Some(Ok(Batch {
            number: self.number,
            records,
        }))
    }
}

pub struct BatchEmbedder<'a, E> {
    provider: &'a E,
    retry: RetryPolicy,
    batch_size: usize,
    dimensions: Option<usize>,
}

impl<'a, E: EmbeddingProvider> BatchEmbedder<'a, E> {
    pub fn new(provider: &'a E, retry: RetryPolicy, batch_size: usize) -> Self {
        Self {
            provider,
            retry,
            batch_size: batch_size.max(1),
            dimensions: None,
        }
    }

    /// Require every returned vector to have exactly `dimensions` entries.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn provider(&self) -> &'a E {
        self.provider
    }

    /// Cut `records` into batches of at most [`batch_size`](Self::batch_size).
    pub fn batches<I>(&self, records: I) -> Batches<I::IntoIter>
    where
        I: IntoIterator<Item = Result<PendingRecord, StoreError>>,
    {
        Batches {
            records: records.into_iter(),
            size: self.batch_size,
            number: 0,
            pending_error: None,
        }
    }

    /// Embed one batch. The result holds one vector per record, in record
    /// order. A short or long response, or a vector of the wrong dimension,
    /// counts as a failed attempt.
    pub async fn embed(&self, batch: &Batch) -> Result<Vec<Vec<f32>>, EmbedError> {
        let texts: Vec<String> = batch.records.iter().map(|r| r.text.clone()).collect();
        self.embed_texts(&texts, &format!("embedding batch {}", batch.number))
            .await
    }

    /// Embed arbitrary texts with the same validation and retry as a batch.
    pub async fn embed_texts(&self, texts: &[String], what: &str) -> Result<Vec<Vec<f32>>, EmbedError> {
        let provider = self.provider;
        let expected_dim = self.dimensions;
        self.retry
            .run(what, move |attempt| async move {
                tracing::debug!(attempt, inputs = texts.len(), "calling embedding provider");
                let vectors = provider.embed_batch(texts).await?;
                check_vectors(&vectors, texts.len(), expected_dim)?;
                Ok(vectors)
            })
            .await
    }
}

fn check_vectors(
    vectors: &[Vec<f32>],
    expected: usize,
    dimensions: Option<usize>,
) -> Result<(), EmbedError> {
    if vectors.len() != expected {
        return Err(EmbedError::LengthMismatch {
            expected,
            got: vectors.len(),
        });
    }
    if let Some(dim) = dimensions {
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(EmbedError::Dimension {
                expected: dim,
                got: bad.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ScanCursor;

    fn record(i: usize) -> Result<PendingRecord, StoreError> {
        Ok(PendingRecord {
            id: format!("r{i}"),
            text: format!("text {i}"),
            cursor: ScanCursor(i as i64 + 1),
        })
    }

    struct Constant;

    impl EmbeddingProvider for Constant {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[test]
    fn batches_are_bounded_and_numbered() {
        let provider = Constant;
        let embedder = BatchEmbedder::new(&provider, RetryPolicy::immediate(3), 4);
        let batches: Vec<Batch> = embedder
            .batches((0..10).map(record))
            .map(|b| b.unwrap())
            .collect();
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(batches[2].number, 3);
        assert_eq!(batches[1].ids()[0], "r4");
    }

    #[test]
    fn scan_error_follows_partial_batch() {
        let provider = Constant;
        let embedder = BatchEmbedder::new(&provider, RetryPolicy::immediate(3), 4);
        let records = vec![
            record(0),
            Err(StoreError::NotFound("scan".into())),
            record(2),
        ];
        let mut batches = embedder.batches(records);
        assert_eq!(batches.next().unwrap().unwrap().len(), 1);
        assert!(batches.next().unwrap().is_err());
    }

    #[tokio::test]
    async fn wrong_dimension_fails_the_batch() {
        let provider = Constant;
        let embedder =
            BatchEmbedder::new(&provider, RetryPolicy::immediate(2), 4).with_dimensions(3);
        let batch = Batch {
            number: 1,
            records: vec![record(0).unwrap()],
        };
        assert!(matches!(
            embedder.embed(&batch).await,
            Err(EmbedError::Dimension { expected: 3, got: 2 })
        ));
    }
}
