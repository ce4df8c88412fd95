//! Retrieval-augmented question answering.
//!
//! A question is embedded, matched against the vector index
//! ([`RetrievalEngine`]), rendered with its matches into one prompt
//! ([`PromptAssembler`]), and sent to the generation provider
//! ([`GenerationClient`]). Any failure aborts that one query.

pub mod prompt;
pub mod retrieval;

use crate::embedding::EmbeddingProvider;
use crate::error::{GenerationError, QueryError, RetrievalError};
use crate::generation::{Generation, GenerationClient, GenerationProvider};
use crate::store::{DocumentStore, ScoredDocument};

pub use prompt::PromptAssembler;
pub use retrieval::{Retrieval, RetrievalEngine};

/// Answer returned without calling the generator when nothing was retrieved.
pub const NO_DOCUMENTS_ANSWER: &str = "No relevant documents found to generate an answer.";

/// Everything derived from one question before generation.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub question: String,
    pub query_vector: Vec<f32>,
    pub documents: Vec<ScoredDocument>,
    pub prompt: String,
}

pub struct QueryPipeline<'a, S, E, G> {
    engine: RetrievalEngine<'a, S, E>,
    assembler: PromptAssembler,
    client: GenerationClient<G>,
}

impl<'a, S, E, G> QueryPipeline<'a, S, E, G>
where
    S: DocumentStore,
    E: EmbeddingProvider,
    G: GenerationProvider,
{
    pub fn new(
        engine: RetrievalEngine<'a, S, E>,
        assembler: PromptAssembler,
        client: GenerationClient<G>,
    ) -> Self {
        Self {
            engine,
            assembler,
            client,
        }
    }

    pub fn assembler(&self) -> &PromptAssembler {
        &self.assembler
    }

    /// Retrieve and render; no generation call is made.
    pub async fn build_context(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<QueryContext, RetrievalError> {
        let Retrieval {
            query_vector,
            documents,
        } = self.engine.retrieve(question, top_k).await?;
        let prompt = self.assembler.assemble(question, &documents);
        Ok(QueryContext {
            question: question.trim().to_string(),
            query_vector,
            documents,
            prompt,
        })
    }

    /// Generate the answer for a built context.
    pub async fn generate(&self, context: &QueryContext) -> Result<Generation, GenerationError> {
        if context.documents.is_empty() {
            tracing::warn!("no documents retrieved, skipping generation");
            return Ok(Generation::Complete(NO_DOCUMENTS_ANSWER.to_string()));
        }
        self.client.generate(&context.prompt).await
    }

    pub async fn run(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<(QueryContext, Generation), QueryError> {
        let context = self.build_context(question, top_k).await?;
        let generation = self.generate(&context).await?;
        Ok((context, generation))
    }
}
