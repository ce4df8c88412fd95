//! Document store boundary.
//!
//! The pipelines only talk to a [`DocumentStore`]: filtered scans with field
//! projection, atomic per-record field updates, bulk field removal, and
//! nearest-neighbor search over a named vector index. [`SqliteStore`] is the
//! bundled implementation (JSON documents in SQLite, vectors in sqlite-vec).

pub mod sqlite;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StoreError;

pub use sqlite::{EnsureOutcome, IndexInfo, SqliteStore};

/// A document body: a JSON object.
pub type Document = Map<String, Value>;

/// Predicate over document fields, evaluated store-side.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field is present (any value, including JSON null).
    Exists(String),
    /// Field is absent.
    Missing(String),
    /// Field is present and not JSON null.
    NonNull(String),
    /// Field is absent or JSON null.
    Null(String),
    /// Field is absent or holds a scalar different from the given one.
    NotEqual(String, Value),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn exists(field: &str) -> Self {
        Self::Exists(field.to_string())
    }

    pub fn missing(field: &str) -> Self {
        Self::Missing(field.to_string())
    }

    pub fn non_null(field: &str) -> Self {
        Self::NonNull(field.to_string())
    }

    pub fn null(field: &str) -> Self {
        Self::Null(field.to_string())
    }

    pub fn not_equal(field: &str, value: impl Into<Value>) -> Self {
        Self::NotEqual(field.to_string(), value.into())
    }
}

/// Position in a store-native scan. Scans resume strictly after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScanCursor(pub i64);

/// One record returned by a scan, with only the projected fields.
#[derive(Debug, Clone)]
pub struct ScannedDocument {
    pub id: String,
    pub cursor: ScanCursor,
    pub fields: Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    Cosine,
    Euclidean,
}

impl Similarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
        }
    }

    /// Map a raw index distance onto a "higher is closer" score in `[0, 1]`.
    pub fn score(&self, distance: f64) -> f64 {
        match self {
            // sqlite-vec cosine distance is 1 - cos, so this is (1 + cos) / 2
            Self::Cosine => 1.0 - distance / 2.0,
            Self::Euclidean => 1.0 / (1.0 + distance),
        }
    }
}

impl std::fmt::Display for Similarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Similarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(Self::Cosine),
            "euclidean" => Ok(Self::Euclidean),
            _ => Err(format!("unknown similarity: {s}")),
        }
    }
}

/// Definition of a vector index over one field of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VectorIndex {
    pub name: String,
    pub field: String,
    pub dimensions: usize,
    pub similarity: Similarity,
}

/// Nearest-neighbor request against a named index.
#[derive(Debug, Clone)]
pub struct VectorQuery<'a> {
    pub index: &'a str,
    pub vector: &'a [f32],
    pub limit: usize,
    pub num_candidates: usize,
    pub projection: &'a [String],
}

/// A search hit: id, projected fields, and the index's similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredDocument {
    pub id: String,
    pub score: f64,
    pub fields: Document,
}

impl ScoredDocument {
    /// Text of a projected field, rendered the way prompts display it.
    pub fn text(&self, field: &str) -> Option<String> {
        self.fields.get(field).and_then(value_text)
    }
}

/// Operations the pipelines need from a persistent document collection.
pub trait DocumentStore {
    /// Number of records matching `filter`.
    fn count(&self, filter: &Filter) -> Result<usize, StoreError>;

    /// Up to `limit` records matching `filter` that come strictly after
    /// `after` in store order, with only the `projection` fields loaded.
    fn scan(
        &self,
        filter: &Filter,
        after: ScanCursor,
        limit: usize,
        projection: &[&str],
    ) -> Result<Vec<ScannedDocument>, StoreError>;

    /// Atomically set every field in `fields` on record `id`. Either all of
    /// them are written or none are.
    fn set_fields(&self, id: &str, fields: &Document) -> Result<(), StoreError>;

    /// Remove every field in `fields` from each record that has any of them,
    /// `chunk_size` records per write. Each record loses all of its listed
    /// fields in one update. Returns the number of records modified.
    fn unset_fields(&self, fields: &[&str], chunk_size: usize) -> Result<usize, StoreError>;

    /// Remove `field` from every record that has it.
    fn unset_field(&self, field: &str, chunk_size: usize) -> Result<usize, StoreError> {
        self.unset_fields(&[field], chunk_size)
    }

    /// Look up a vector index definition by name.
    fn vector_index(&self, name: &str) -> Result<Option<VectorIndex>, StoreError>;

    /// Top-k nearest neighbors, best first.
    fn vector_search(&self, query: &VectorQuery<'_>) -> Result<Vec<ScoredDocument>, StoreError>;
}

/// Check a (possibly dotted) field name: segments of ASCII letters, digits,
/// `_` or `-`, separated by single dots.
pub fn validate_field(field: &str) -> Result<(), StoreError> {
    let ok = !field.is_empty()
        && field.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        });
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidField(field.to_string()))
    }
}

/// SQLite JSON path for a dotted field name.
pub(crate) fn json_path(field: &str) -> Result<String, StoreError> {
    validate_field(field)?;
    let quoted: Vec<String> = field.split('.').map(|s| format!("\"{s}\"")).collect();
    Ok(format!("$.{}", quoted.join(".")))
}

/// Render a JSON value as prompt/embedding text. Strings are used verbatim,
/// arrays are joined with `", "`, objects become `key: value` pairs.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            Some(parts.join(", "))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .filter_map(|(k, v)| value_text(v).map(|t| format!("{k}: {t}")))
                .collect();
            Some(parts.join(" "))
        }
    }
}
