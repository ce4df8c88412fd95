use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::retry::{Backoff, RetryPolicy};
use crate::store::validate_field;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RagsyncConfig {
    pub log: LogConfig,
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub sync: SyncConfig,
    pub retry: RetryConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub prompt: PromptConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: String,
    pub collection: String,
    pub retire_chunk_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
    pub max_batch_size: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub batch_size: usize,
    pub source_field: String,
    pub vector_field: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub delay_ms: u64,
    pub backoff: String,
    pub max_elapsed_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub index_name: String,
    pub similarity: String,
    pub top_k: usize,
    pub num_candidates: usize,
    pub display_fields: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub host: String,
    pub model: String,
    pub stream: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PromptConfig {
    pub preamble: String,
    pub instruction: String,
    pub max_document_chars: usize,
    pub max_context_chars: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let db_path = default_ragsync_dir()
            .join("documents.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            collection: "movies".into(),
            retire_chunk_size: 1000,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "voyage".into(),
            base_url: "https://api.voyageai.com/v1".into(),
            api_key: None,
            model: "voyage-3-large".into(),
            dimensions: 1024,
            max_batch_size: 128,
            timeout_secs: 30,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            source_field: "fullplot".into(),
            vector_field: "fullplot_embedding".into(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
            backoff: "fixed".into(),
            max_elapsed_secs: 120,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_name: "fullplot_vector_index".into(),
            similarity: "cosine".into(),
            top_k: 3,
            num_candidates: 150,
            display_fields: vec!["title".into()],
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".into(),
            model: "mistral".into(),
            stream: false,
            timeout_secs: 300,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            preamble: "You are a helpful assistant that answers questions based on movie plot information."
                .into(),
            instruction: "Provide a concise and accurate answer (3-6 sentences).".into(),
            max_document_chars: 2000,
            max_context_chars: 8000,
        }
    }
}

impl RetryConfig {
    /// Build the runtime retry policy. Unknown backoff names fall back to fixed.
    pub fn policy(&self) -> RetryPolicy {
        let delay = Duration::from_millis(self.delay_ms);
        let backoff = match self.backoff.as_str() {
            "exponential" => Backoff::Exponential {
                base: delay,
                cap: delay * 8,
            },
            _ => Backoff::Fixed(delay),
        };
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff,
            max_elapsed: Duration::from_secs(self.max_elapsed_secs),
        }
    }
}

/// Returns `~/.ragsync/`
pub fn default_ragsync_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ragsync")
}

/// Returns the default config file path: `~/.ragsync/config.toml`
pub fn default_config_path() -> PathBuf {
    default_ragsync_dir().join("config.toml")
}

impl RagsyncConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            RagsyncConfig::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides. Names follow the ones operators
    /// already export for the embedding and generation services.
    fn apply_env_overrides(&mut self) -> Result<()> {
        let string_overrides: [(&str, &mut String); 10] = [
            ("RAGSYNC_LOG_LEVEL", &mut self.log.level),
            ("RAGSYNC_DB", &mut self.store.db_path),
            ("COLL_NAME", &mut self.store.collection),
            ("EMBEDDING_BASE_URL", &mut self.embedding.base_url),
            ("MODEL_NAME", &mut self.embedding.model),
            ("SOURCE_FIELD", &mut self.sync.source_field),
            ("VECTOR_FIELD", &mut self.sync.vector_field),
            ("INDEX_NAME", &mut self.retrieval.index_name),
            ("OLLAMA_HOST", &mut self.generation.host),
            ("LLM_MODEL", &mut self.generation.model),
        ];
        for (var, slot) in string_overrides {
            if let Ok(val) = std::env::var(var) {
                *slot = val;
            }
        }

        if let Ok(val) = std::env::var("VOYAGE_API_KEY") {
            self.embedding.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("BATCH_SIZE") {
            self.sync.batch_size = val
                .trim()
                .parse()
                .with_context(|| format!("BATCH_SIZE must be a positive integer, got {val:?}"))?;
        }
        if let Ok(val) = std::env::var("NUM_DIMENSIONS") {
            self.embedding.dimensions = val
                .trim()
                .parse()
                .with_context(|| format!("NUM_DIMENSIONS must be a positive integer, got {val:?}"))?;
        }
        Ok(())
    }

    /// Reject settings the pipelines cannot run with.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.sync.batch_size > 0, "sync.batch_size must be at least 1");
        anyhow::ensure!(self.retrieval.top_k > 0, "retrieval.top_k must be at least 1");
        anyhow::ensure!(self.retry.max_attempts > 0, "retry.max_attempts must be at least 1");
        anyhow::ensure!(self.embedding.dimensions > 0, "embedding.dimensions must be at least 1");
        anyhow::ensure!(
            self.store.retire_chunk_size > 0,
            "store.retire_chunk_size must be at least 1"
        );
        for field in [&self.sync.source_field, &self.sync.vector_field]
            .into_iter()
            .chain(self.retrieval.display_fields.iter())
        {
            validate_field(field).with_context(|| format!("invalid field name {field:?}"))?;
        }
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.store.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RagsyncConfig::default();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.sync.batch_size, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.embedding.model, "voyage-3-large");
        assert!(config.store.db_path.ends_with("documents.db"));
        config.validate().unwrap();
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[log]
level = "debug"

[store]
db_path = "/tmp/test.db"
collection = "films"

[sync]
batch_size = 25

[retrieval]
top_k = 5
display_fields = ["title", "year"]
"#;
        let config: RagsyncConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.store.db_path, "/tmp/test.db");
        assert_eq!(config.store.collection, "films");
        assert_eq!(config.sync.batch_size, 25);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.display_fields, vec!["title", "year"]);
        // defaults still apply for unset fields
        assert_eq!(config.sync.vector_field, "fullplot_embedding");
        assert_eq!(config.generation.model, "mistral");
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = RagsyncConfig::default();
        config.sync.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_field_name_is_rejected() {
        let mut config = RagsyncConfig::default();
        config.sync.vector_field = "plot'; DROP".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn retry_policy_from_config() {
        let mut retry = RetryConfig::default();
        retry.backoff = "exponential".into();
        retry.delay_ms = 100;
        let policy = retry.policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(
            policy.backoff,
            Backoff::Exponential {
                base: Duration::from_millis(100),
                cap: Duration::from_millis(800),
            }
        );
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = RagsyncConfig::default();
        std::env::set_var("RAGSYNC_DB", "/tmp/override.db");
        std::env::set_var("MODEL_NAME", "voyage-3.5");
        std::env::set_var("BATCH_SIZE", "32");

        config.apply_env_overrides().unwrap();

        assert_eq!(config.store.db_path, "/tmp/override.db");
        assert_eq!(config.embedding.model, "voyage-3.5");
        assert_eq!(config.sync.batch_size, 32);

        // Clean up
        std::env::remove_var("RAGSYNC_DB");
        std::env::remove_var("MODEL_NAME");
        std::env::remove_var("BATCH_SIZE");
    }
}
