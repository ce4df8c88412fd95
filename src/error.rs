//! Error types for the sync and query pipelines.
//!
//! Sync-time errors are collected per batch or per record and never abort a
//! run; query-time errors ([`RetrievalError`], [`GenerationError`]) abort the
//! single query they belong to.

/// Failure of one embedding-provider call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbedError {
    /// Network failure, timeout, rate limit, or provider-side 5xx.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// The batch exceeds the provider's per-request limit. Retrying the same
    /// batch cannot succeed.
    #[error("batch of {size} inputs exceeds provider limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    /// The provider refused the request (bad credentials, bad model, ...).
    #[error("provider rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider returned {got} vectors for {expected} inputs")]
    LengthMismatch { expected: usize, got: usize },

    #[error("provider returned a {got}-dimension vector, expected {expected}")]
    Dimension { expected: usize, got: usize },

    #[error("retry budget of {0:?} exhausted")]
    DeadlineExceeded(std::time::Duration),
}

impl EmbedError {
    /// Whether the same request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient(_)
                | Self::Malformed(_)
                | Self::LengthMismatch { .. }
                | Self::Dimension { .. }
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid field name: {0:?}")]
    InvalidField(String),

    #[error("no vector index named {0:?}")]
    NoIndex(String),

    #[error("vector index {name:?} already belongs to another collection")]
    IndexConflict { name: String },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("query vector has {got} dimensions, index expects {expected}")]
    Dimension { expected: usize, got: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("query text is empty")]
    EmptyQuery,

    #[error("failed to embed query: {0}")]
    Embedding(#[source] EmbedError),

    #[error("no vector index configured for field {field:?} (index {index:?})")]
    NoIndex { index: String, field: String },

    #[error("vector search failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("failed to reach generation provider: {0}")]
    Connection(String),

    #[error("generation provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed generation response: {0}")]
    Malformed(String),
}

/// Error for one step of the query pipeline.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(EmbedError::Transient("timeout".into()).is_retryable());
        assert!(EmbedError::Malformed("bad json".into()).is_retryable());
        assert!(EmbedError::LengthMismatch { expected: 3, got: 2 }.is_retryable());
        assert!(!EmbedError::BatchTooLarge { size: 200, limit: 128 }.is_retryable());
        assert!(!EmbedError::Rejected { status: 401, body: String::new() }.is_retryable());
    }
}
