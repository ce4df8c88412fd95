//! CLI `retire-field` command.

use anyhow::Result;

use ragsync::config::RagsyncConfig;
use ragsync::sync::{FieldRetirer, EMBEDDING_MODEL_FIELD, EMBEDDING_UPDATED_AT_FIELD};

use super::open_store;

/// Remove each field from every record. The embedding model tag and
/// timestamp go too when the configured vector field is retired, or always
/// with `with_metadata`. Returns `false` if any field could not be removed.
pub fn retire_field(config: &RagsyncConfig, fields: &[String], with_metadata: bool) -> Result<bool> {
    let store = open_store(config)?;

    let mut targets: Vec<String> = fields.to_vec();
    if with_metadata {
        for meta in [EMBEDDING_MODEL_FIELD, EMBEDDING_UPDATED_AT_FIELD] {
            if !targets.iter().any(|f| f == meta) {
                targets.push(meta.to_string());
            }
        }
    }

    let retirer = FieldRetirer::new(
        &store,
        &config.sync.vector_field,
        config.store.retire_chunk_size,
    );
    let report = retirer.retire_all(&targets);

    for retired in &report.fields {
        println!("  {:<28} {} records modified", retired.field, retired.modified);
    }
    for (field, error) in &report.failures {
        println!("  {field:<28} FAILED: {error}");
    }
    println!("Total modified: {}", report.modified());

    Ok(report.is_complete())
}
