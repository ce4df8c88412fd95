//! Query embedding plus nearest-neighbor lookup.

use crate::embedding::EmbeddingProvider;
use crate::error::{EmbedError, RetrievalError};
use crate::store::{DocumentStore, ScoredDocument, VectorQuery};
use crate::sync::BatchEmbedder;

/// Embedded question and its ranked matches.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub query_vector: Vec<f32>,
    pub documents: Vec<ScoredDocument>,
}

pub struct RetrievalEngine<'a, S, E> {
    store: &'a S,
    embedder: BatchEmbedder<'a, E>,
    index_name: String,
    vector_field: String,
    projection: Vec<String>,
    num_candidates: usize,
}

impl<'a, S, E> RetrievalEngine<'a, S, E>
where
    S: DocumentStore,
    E: EmbeddingProvider,
{
    /// Searches `index_name`, which must be built over `vector_field`.
    /// Each hit carries the `projection` fields.
    pub fn new(
        store: &'a S,
        embedder: BatchEmbedder<'a, E>,
        index_name: &str,
        vector_field: &str,
        projection: Vec<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            index_name: index_name.to_string(),
            vector_field: vector_field.to_string(),
            projection,
            num_candidates: 0,
        }
    }

    /// Candidates the index considers before the top-k cut.
    pub fn with_num_candidates(mut self, num_candidates: usize) -> Self {
        self.num_candidates = num_candidates;
        self
    }

    /// Embed `question` (one provider call, retried like a sync batch) and
    /// return the `top_k` closest documents, best first.
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Retrieval, RetrievalError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        // Checked before embedding so a missing index costs no provider call.
        let index = self
            .store
            .vector_index(&self.index_name)?
            .filter(|index| index.field == self.vector_field)
            .ok_or_else(|| RetrievalError::NoIndex {
                index: self.index_name.clone(),
                field: self.vector_field.clone(),
            })?;

        let vectors = self
            .embedder
            .embed_texts(&[question.to_string()], "embedding query")
            .await
            .map_err(RetrievalError::Embedding)?;
        let query_vector = vectors
            .into_iter()
            .next()
            .ok_or(RetrievalError::Embedding(EmbedError::LengthMismatch {
                expected: 1,
                got: 0,
            }))?;

        let documents = self.store.vector_search(&VectorQuery {
            index: &index.name,
            vector: &query_vector,
            limit: top_k,
            num_candidates: self.num_candidates,
            projection: &self.projection,
        })?;

        tracing::info!(index = %index.name, hits = documents.len(), top_k, "retrieved documents");
        for (rank, doc) in documents.iter().enumerate() {
            tracing::debug!(rank = rank + 1, id = %doc.id, score = doc.score, "retrieval hit");
        }

        Ok(Retrieval {
            query_vector,
            documents,
        })
    }
}
