//! Bulk removal of an obsolete field from every record.

use crate::error::StoreError;
use crate::store::{validate_field, DocumentStore};

use super::{EMBEDDING_MODEL_FIELD, EMBEDDING_UPDATED_AT_FIELD};

/// Outcome for one retired field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetiredField {
    pub field: String,
    pub modified: usize,
}

#[derive(Debug, Default)]
pub struct RetireReport {
    pub fields: Vec<RetiredField>,
    pub failures: Vec<(String, StoreError)>,
}

impl RetireReport {
    pub fn modified(&self) -> usize {
        self.fields.iter().map(|f| f.modified).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Removes fields in chunks so no single write covers the whole collection.
/// Running it again for the same field modifies nothing.
///
/// Retiring the vector field (or a field containing it) also removes the
/// embedding model tag and timestamp in the same per-record write, so no
/// record keeps metadata for a vector it no longer has.
pub struct FieldRetirer<'a, S> {
    store: &'a S,
    vector_field: String,
    chunk_size: usize,
}

impl<'a, S: DocumentStore> FieldRetirer<'a, S> {
    pub fn new(store: &'a S, vector_field: &str, chunk_size: usize) -> Self {
        Self {
            store,
            vector_field: vector_field.to_string(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Remove `field` from every record that has it. Returns how many
    /// records were modified.
    pub fn retire(&self, field: &str) -> Result<usize, StoreError> {
        validate_field(field)?;
        let mut fields = vec![field];
        if contains_field(field, &self.vector_field) {
            fields.extend([EMBEDDING_MODEL_FIELD, EMBEDDING_UPDATED_AT_FIELD]);
        }

        tracing::info!(?fields, chunk_size = self.chunk_size, "retiring field");
        let modified = self.store.unset_fields(&fields, self.chunk_size)?;
        tracing::info!(field, modified, "field retired");
        Ok(modified)
    }

    /// Retire each field in turn. A failure on one field does not stop the
    /// others.
    pub fn retire_all<I, F>(&self, fields: I) -> RetireReport
    where
        I: IntoIterator<Item = F>,
        F: AsRef<str>,
    {
        let mut report = RetireReport::default();
        for field in fields {
            let field = field.as_ref();
            match self.retire(field) {
                Ok(modified) => report.fields.push(RetiredField {
                    field: field.to_string(),
                    modified,
                }),
                Err(error) => {
                    tracing::error!(field, error = %error, "failed to retire field");
                    report.failures.push((field.to_string(), error));
                }
            }
        }
        report
    }
}

/// `outer` is `inner` itself or one of its parent objects.
fn contains_field(outer: &str, inner: &str) -> bool {
    inner == outer
        || inner
            .strip_prefix(outer)
            .is_some_and(|rest| rest.starts_with('.'))
}
