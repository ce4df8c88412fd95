//! Text-to-vector embedding.
//!
//! Provides the [`EmbeddingProvider`] trait and an HTTP implementation for
//! Voyage AI and OpenAI-compatible `/embeddings` endpoints. The provider is
//! created via [`create_provider`] from configuration.

pub mod http;

use std::future::Future;

use anyhow::Result;

use crate::error::EmbedError;

pub use http::HttpEmbeddingProvider;

/// Batch text-to-vector function.
///
/// Implementations return exactly one vector per input, in input order, or
/// an [`EmbedError`] that says whether the call may be retried.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, EmbedError>> + Send;

    /// Largest batch the provider accepts in one call, if it has a limit.
    fn max_batch_size(&self) -> Option<usize> {
        None
    }
}

/// Create an embedding provider from config.
///
/// `"voyage"` and `"openai"` share the same request/response shape; they only
/// differ in their default base URL. An API key is required for both.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<HttpEmbeddingProvider> {
    match config.provider.as_str() {
        "voyage" | "openai" => HttpEmbeddingProvider::new(config),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: voyage, openai"),
    }
}
