//! Ollama `/api/generate` provider.
//!
//! Non-streamed calls return the `response` field of a single JSON object.
//! Streamed calls read newline-delimited JSON objects and forward each
//! `response` piece as a fragment until `done` is set. A body that ends
//! before `done` surfaces as a connection error.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{FragmentStream, GenerationProvider};
use crate::config::GenerationConfig;
use crate::error::GenerationError;

pub struct OllamaProvider {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        anyhow::ensure!(!config.model.trim().is_empty(), "missing generation model name");
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build Ollama HTTP client")?;
        let endpoint = format!("{}/api/generate", config.host.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
        })
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, GenerationError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

impl GenerationProvider for OllamaProvider {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let resp = self.send(prompt, false).await?;
        let body = resp
            .bytes()
            .await
            .map_err(|e| GenerationError::Connection(e.to_string()))?;
        let chunk: GenerateChunk =
            serde_json::from_slice(&body).map_err(|e| GenerationError::Malformed(e.to_string()))?;
        chunk.into_fragment()
    }

    async fn stream(&self, prompt: &str) -> Result<FragmentStream, GenerationError> {
        let resp = self.send(prompt, true).await?;
        let (tx, stream) = FragmentStream::channel(64);
        tokio::spawn(async move {
            let mut resp = resp;
            let mut decoder = StreamDecoder::default();
            loop {
                let items = match resp.chunk().await {
                    Ok(Some(bytes)) => decoder.feed(&bytes),
                    Ok(None) => decoder.finish(),
                    Err(e) => vec![Err(GenerationError::Connection(e.to_string()))],
                };
                let failed = items.iter().any(Result::is_err);
                for item in items {
                    if tx.send(item).await.is_err() {
                        // receiver dropped; stop reading
                        return;
                    }
                }
                if failed || decoder.is_finished() {
                    return;
                }
            }
        });
        Ok(stream)
    }
}

/// Incremental decoder for the newline-delimited stream body.
///
/// Yields non-empty fragments and errors in arrival order. Decoding stops at
/// the first `done` object or error; a body that ends before either yields a
/// connection error so callers never mistake a cut-off answer for a whole one.
#[derive(Default)]
struct StreamDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl StreamDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Vec<Result<String, GenerationError>> {
        if self.finished {
            return Vec::new();
        }
        self.buffer.extend_from_slice(bytes);
        let mut items = Vec::new();
        for chunk in drain_lines(&mut self.buffer) {
            let (fragment, done) = match chunk {
                Ok(chunk) => {
                    let done = chunk.done;
                    (chunk.into_fragment(), done)
                }
                Err(e) => (Err(e), true),
            };
            let failed = fragment.is_err();
            if !matches!(&fragment, Ok(text) if text.is_empty()) {
                items.push(fragment);
            }
            if done || failed {
                self.finished = true;
                self.buffer.clear();
                break;
            }
        }
        items
    }

    /// End of body: decode an unterminated last line, then fail if no
    /// `done` object arrived.
    fn finish(&mut self) -> Vec<Result<String, GenerationError>> {
        let mut items = self.feed(b"\n");
        if !self.finished {
            self.finished = true;
            items.push(Err(GenerationError::Connection(
                "stream ended before done".to_string(),
            )));
        }
        items
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Split complete lines off the front of `buffer` and decode each as one
/// streamed object. Blank lines are ignored; a partial last line stays.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<Result<GenerateChunk, GenerationError>> {
    let mut chunks = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }
        chunks.push(
            serde_json::from_slice(line).map_err(|e| GenerationError::Malformed(e.to_string())),
        );
    }
    chunks
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl GenerateChunk {
    fn into_fragment(self) -> Result<String, GenerationError> {
        match self.error {
            Some(error) => Err(GenerationError::Malformed(error)),
            None => Ok(self.response),
        }
    }
}
