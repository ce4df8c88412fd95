//! CLI `status` command: embedding coverage for the configured model.

use anyhow::{Context, Result};

use ragsync::config::RagsyncConfig;
use ragsync::db;
use ragsync::store::{DocumentStore, Filter};
use ragsync::sync::EMBEDDING_MODEL_FIELD;

use super::open_store;

pub fn status(config: &RagsyncConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `ragsync import <file>` to create it.");
        return Ok(());
    }

    let store = open_store(config)?;
    let source = &config.sync.source_field;
    let vector = &config.sync.vector_field;
    let model = &config.embedding.model;

    let total = store.count(&Filter::And(vec![]))?;
    let with_source = store.count(&Filter::non_null(source))?;
    let pending = store.count(&Filter::And(vec![Filter::non_null(source), Filter::null(vector)]))?;
    let stale = store.count(&Filter::And(vec![
        Filter::non_null(source),
        Filter::non_null(vector),
        Filter::not_equal(EMBEDDING_MODEL_FIELD, model.as_str()),
    ]))?;
    let synchronized = with_source.saturating_sub(pending + stale);

    let conn = store.connection();
    let schema_version = db::schema::get_schema_version(conn).context("failed to read schema version")?;
    let vec_version = db::sqlite_vec_version(conn).context("sqlite-vec is not loaded")?;

    println!("ragsync status");
    println!("==============");
    println!();
    println!("Database:          {}", db_path.display());
    println!("Schema version:    {schema_version}");
    println!("sqlite-vec:        {vec_version}");
    println!("Collection:        {}", store.collection());
    println!("Model:             {model}");
    println!();
    println!("Records:");
    println!("  Total:           {total}");
    println!("  With '{source}': {with_source}");
    println!("  Synchronized:    {synchronized}");
    println!("  Stale:           {stale}");
    println!("  Pending:         {pending}");
    if stale + pending > 0 {
        println!("  Run `ragsync sync` to embed {} records.", stale + pending);
    }
    println!();

    let indexes = store.list_indexes()?;
    println!("Vector indexes:");
    if indexes.is_empty() {
        println!("  (none) Run `ragsync index ensure` to create one.");
    }
    for info in indexes {
        let marker = if info.index.name == config.retrieval.index_name {
            " (configured)"
        } else {
            ""
        };
        println!(
            "  {} on '{}': {} dims, {}, {} rows{marker}",
            info.index.name, info.index.field, info.index.dimensions, info.index.similarity, info.rows
        );
    }
    Ok(())
}
