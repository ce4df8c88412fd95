//! HTTP embedding provider for `POST {base_url}/embeddings`.
//!
//! Request: `{"model": ..., "input": [...]}`. Response:
//! `{"data": [{"embedding": [...], "index": n}, ...]}`. Voyage AI and
//! OpenAI both speak this shape.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

pub struct HttpEmbeddingProvider {
    client: Client,
    endpoint: String,
    model: String,
    max_batch_size: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .context("missing embedding API key (set VOYAGE_API_KEY or embedding.api_key)")?;
        anyhow::ensure!(!config.model.trim().is_empty(), "missing embedding model name");

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .context("invalid embedding API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build embedding HTTP client")?;

        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));
        tracing::info!(endpoint = %endpoint, model = %config.model, "embedding provider ready");

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            max_batch_size: config.max_batch_size.max(1),
        })
    }
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > self.max_batch_size {
            return Err(EmbedError::BatchTooLarge {
                size: texts.len(),
                limit: self.max_batch_size,
            });
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbedError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(classify_failure(status, body, texts.len(), self.max_batch_size));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| EmbedError::Transient(e.to_string()))?;
        parse_response(&body, texts.len())
    }

    fn max_batch_size(&self) -> Option<usize> {
        Some(self.max_batch_size)
    }
}

/// Map a non-success status to an error kind the retry policy understands.
fn classify_failure(status: StatusCode, body: String, size: usize, limit: usize) -> EmbedError {
    let lowered = body.to_ascii_lowercase();
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        EmbedError::Transient(format!("HTTP {status}: {body}"))
    } else if status == StatusCode::PAYLOAD_TOO_LARGE
        || (status == StatusCode::BAD_REQUEST
            && lowered.contains("batch")
            && (lowered.contains("limit") || lowered.contains("exceed")))
    {
        EmbedError::BatchTooLarge { size, limit }
    } else {
        EmbedError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

fn parse_response(body: &[u8], expected: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut parsed: EmbeddingResponse =
        serde_json::from_slice(body).map_err(|e| EmbedError::Malformed(e.to_string()))?;
    parsed.data.sort_by_key(|entry| entry.index);
    if parsed.data.len() != expected {
        return Err(EmbedError::LengthMismatch {
            expected,
            got: parsed.data.len(),
        });
    }
    Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sorts_by_index() {
        let body = br#"{"data":[{"embedding":[2.0],"index":1},{"embedding":[1.0],"index":0}]}"#;
        let vectors = parse_response(body, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn parse_detects_length_mismatch() {
        let body = br#"{"data":[{"embedding":[1.0],"index":0}]}"#;
        assert!(matches!(
            parse_response(body, 2),
            Err(EmbedError::LengthMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse_response(b"<html>oops</html>", 1),
            Err(EmbedError::Malformed(_))
        ));
    }

    #[test]
    fn failures_are_classified() {
        assert!(classify_failure(StatusCode::TOO_MANY_REQUESTS, String::new(), 1, 8).is_retryable());
        assert!(classify_failure(StatusCode::BAD_GATEWAY, String::new(), 1, 8).is_retryable());
        assert!(matches!(
            classify_failure(StatusCode::PAYLOAD_TOO_LARGE, String::new(), 9, 8),
            EmbedError::BatchTooLarge { size: 9, limit: 8 }
        ));
        assert!(matches!(
            classify_failure(
                StatusCode::BAD_REQUEST,
                "Batch size exceeds the limit of 128".into(),
                200,
                128
            ),
            EmbedError::BatchTooLarge { .. }
        ));
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, "bad key".into(), 1, 8),
            EmbedError::Rejected { status: 401, .. }
        ));
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_before_sending() {
        let config = EmbeddingConfig {
            api_key: Some("test-key".into()),
            base_url: "http://127.0.0.1:9".into(),
            max_batch_size: 2,
            ..EmbeddingConfig::default()
        };
        let provider = HttpEmbeddingProvider::new(&config).unwrap();
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert!(matches!(
            provider.embed_batch(&texts).await,
            Err(EmbedError::BatchTooLarge { size: 3, limit: 2 })
        ));
    }

    #[test]
    fn missing_api_key_is_an_error() {
        assert!(HttpEmbeddingProvider::new(&EmbeddingConfig::default()).is_err());
    }
}
