//! Text generation from an assembled prompt.
//!
//! [`GenerationClient`] sends a prompt to a [`GenerationProvider`] either as
//! one request returning the whole answer or as a [`FragmentStream`] whose
//! fragments concatenate, in arrival order, to the whole answer. Generation
//! is never retried.

pub mod ollama;

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::GenerationError;

pub use ollama::OllamaProvider;

/// Prompt-to-text function, with an optional incremental mode.
pub trait GenerationProvider: Send + Sync {
    /// Generate the complete answer in one response.
    fn complete(&self, prompt: &str)
        -> impl Future<Output = Result<String, GenerationError>> + Send;

    /// Start generation and deliver the answer as it is produced.
    fn stream(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<FragmentStream, GenerationError>> + Send;
}

/// Ordered sequence of generated text fragments.
#[derive(Debug)]
pub struct FragmentStream {
    rx: mpsc::Receiver<Result<String, GenerationError>>,
}

impl FragmentStream {
    /// A stream fed through the returned sender. Dropping the sender ends it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Result<String, GenerationError>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }

    /// A finished stream over already-known fragments.
    pub fn from_fragments<I, T>(fragments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let fragments: Vec<String> = fragments.into_iter().map(Into::into).collect();
        let (tx, stream) = Self::channel(fragments.len());
        for fragment in fragments {
            // capacity equals the fragment count, so this never fills up
            let _ = tx.try_send(Ok(fragment));
        }
        stream
    }

    /// Next fragment, or `None` once the provider is done.
    pub async fn next(&mut self) -> Option<Result<String, GenerationError>> {
        self.rx.recv().await
    }

    /// Drain the stream into the full answer.
    pub async fn concat(mut self) -> Result<String, GenerationError> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

/// Output of one generation call.
#[derive(Debug)]
pub enum Generation {
    Complete(String),
    Streamed(FragmentStream),
}

impl Generation {
    /// Full answer text, draining the stream if there is one.
    pub async fn into_text(self) -> Result<String, GenerationError> {
        match self {
            Self::Complete(text) => Ok(text),
            Self::Streamed(stream) => stream.concat().await,
        }
    }
}

pub struct GenerationClient<G> {
    provider: G,
    stream: bool,
}

impl<G: GenerationProvider> GenerationClient<G> {
    pub fn new(provider: G, stream: bool) -> Self {
        Self { provider, stream }
    }

    pub fn is_streaming(&self) -> bool {
        self.stream
    }

    /// Send `prompt` to the provider. The generated text is returned as-is.
    pub async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError> {
        tracing::info!(stream = self.stream, prompt_chars = prompt.len(), "sending prompt to generator");
        if self.stream {
            Ok(Generation::Streamed(self.provider.stream(prompt).await?))
        } else {
            let text = self.provider.complete(prompt).await?;
            tracing::info!(answer_chars = text.len(), "generation complete");
            Ok(Generation::Complete(text))
        }
    }
}
