//! CLI `index` commands: create and list vector indexes.

use anyhow::{Context, Result};

use ragsync::config::RagsyncConfig;
use ragsync::store::{EnsureOutcome, Similarity, VectorIndex};

use super::open_store;

/// Create the configured index, or rebuild it if its definition changed.
pub fn ensure(config: &RagsyncConfig) -> Result<()> {
    let similarity: Similarity = config
        .retrieval
        .similarity
        .parse()
        .map_err(anyhow::Error::msg)
        .context("invalid retrieval.similarity")?;
    let index = VectorIndex {
        name: config.retrieval.index_name.clone(),
        field: config.sync.vector_field.clone(),
        dimensions: config.embedding.dimensions,
        similarity,
    };

    let store = open_store(config)?;
    match store
        .ensure_index(&index)
        .with_context(|| format!("failed to create index '{}'", index.name))?
    {
        EnsureOutcome::Created { backfilled } => println!(
            "Created index '{}' on '{}' ({} dims, {}), {backfilled} existing vectors indexed.",
            index.name, index.field, index.dimensions, index.similarity
        ),
        EnsureOutcome::Updated { backfilled } => println!(
            "Rebuilt index '{}' on '{}' ({} dims, {}), {backfilled} existing vectors indexed.",
            index.name, index.field, index.dimensions, index.similarity
        ),
        EnsureOutcome::AlreadyExists => println!("Index '{}' already exists.", index.name),
    }
    Ok(())
}

pub fn list(config: &RagsyncConfig) -> Result<()> {
    let store = open_store(config)?;
    let indexes = store.list_indexes()?;
    if indexes.is_empty() {
        println!("No vector indexes in '{}'.", store.collection());
        return Ok(());
    }

    println!("{:<28} {:<28} {:>6} {:<10} {:>8}", "NAME", "FIELD", "DIMS", "METRIC", "ROWS");
    for info in indexes {
        println!(
            "{:<28} {:<28} {:>6} {:<10} {:>8}",
            info.index.name, info.index.field, info.index.dimensions, info.index.similarity, info.rows
        );
    }
    Ok(())
}
