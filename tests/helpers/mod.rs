#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ragsync::error::{EmbedError, GenerationError};
use ragsync::embedding::EmbeddingProvider;
use ragsync::generation::{FragmentStream, GenerationProvider};
use ragsync::store::{Document, SqliteStore, VectorIndex, Similarity};
use ragsync::sync::SyncTarget;
use serde_json::{json, Value};

pub const SOURCE_FIELD: &str = "fullplot";
pub const VECTOR_FIELD: &str = "fullplot_embedding";
pub const INDEX_NAME: &str = "fullplot_vector_index";

/// Open a fresh in-memory store bound to the `movies` collection.
pub fn test_store() -> SqliteStore {
    SqliteStore::open_in_memory("movies").unwrap()
}

pub fn target() -> SyncTarget {
    SyncTarget {
        source_field: SOURCE_FIELD.into(),
        vector_field: VECTOR_FIELD.into(),
    }
}

pub fn doc(value: Value) -> Document {
    value.as_object().unwrap().clone()
}

/// Insert `n` documents with a plot and no embedding. Ids are `m000`, `m001`, ...
pub fn seed_pending(store: &SqliteStore, n: usize) {
    for i in 0..n {
        store
            .insert_document(
                Some(&format!("m{i:03}")),
                &doc(json!({"title": format!("Movie {i}"), SOURCE_FIELD: format!("plot number {i}")})),
            )
            .unwrap();
    }
}

pub fn plot_index(dimensions: usize) -> VectorIndex {
    VectorIndex {
        name: INDEX_NAME.into(),
        field: VECTOR_FIELD.into(),
        dimensions,
        similarity: Similarity::Cosine,
    }
}

/// Keywords the deterministic embedder counts, one dimension each.
pub const KEYWORDS: [&str; 12] = [
    "robot",
    "artificial",
    "intelligence",
    "sentient",
    "android",
    "fish",
    "ocean",
    "love",
    "war",
    "pig",
    "farm",
    "space",
];

/// Keyword dimensions plus one constant bias dimension.
pub const KEYWORD_DIMS: usize = KEYWORDS.len() + 1;

/// Bag-of-keywords embedding, L2 normalized. Texts sharing keywords end up
/// close under cosine similarity.
pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v: Vec<f32> = KEYWORDS
        .iter()
        .map(|k| lower.matches(k).count() as f32)
        .collect();
    v.push(0.1);
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in &mut v {
        *x /= norm;
    }
    v
}

/// Deterministic embedder that counts its calls.
#[derive(Default)]
pub struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for KeywordEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Records the size of every batch it receives and returns constant vectors.
pub struct RecordingEmbedder {
    pub dimensions: usize,
    batches: Mutex<Vec<usize>>,
}

impl RecordingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

impl EmbeddingProvider for RecordingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.batches.lock().unwrap().push(texts.len());
        Ok(texts
            .iter()
            .map(|_| {
                let mut v = vec![0.0; self.dimensions];
                v[0] = 1.0;
                v
            })
            .collect())
    }
}

/// Fails its first `failures` calls with a transient error, then embeds
/// like [`KeywordEmbedder`].
pub struct FlakyEmbedder {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    /// Never succeeds.
    pub fn always_failing() -> Self {
        Self::new(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for FlakyEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            return Err(EmbedError::Transient(format!("simulated outage on call {n}")));
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Generation provider that remembers every prompt and answers with a fixed
/// text, split into fragments when streaming.
pub struct FakeGenerator {
    pub fragments: Vec<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn answer(&self) -> String {
        self.fragments.concat()
    }
}

impl GenerationProvider for &FakeGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer())
    }

    async fn stream(&self, prompt: &str) -> Result<FragmentStream, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(FragmentStream::from_fragments(self.fragments.clone()))
    }
}
