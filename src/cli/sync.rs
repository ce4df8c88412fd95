//! CLI `sync` command: embed every pending or stale record.

use anyhow::{Context, Result};

use ragsync::config::RagsyncConfig;
use ragsync::embedding::{self, EmbeddingProvider};
use ragsync::sync::{BatchEmbedder, SyncRunner};

use super::{open_store, record_progress_bar, sync_target};

/// Run one sync. Returns `false` when any record was left pending.
pub async fn sync(config: &RagsyncConfig) -> Result<bool> {
    let store = open_store(config)?;
    let provider =
        embedding::create_provider(&config.embedding).context("failed to create embedding provider")?;

    if let Some(limit) = provider.max_batch_size() {
        if config.sync.batch_size > limit {
            tracing::warn!(
                batch_size = config.sync.batch_size,
                limit,
                "batch size exceeds provider limit, every batch will be rejected"
            );
        }
    }

    let embedder = BatchEmbedder::new(&provider, config.retry.policy(), config.sync.batch_size)
        .with_dimensions(config.embedding.dimensions);
    let runner = SyncRunner::new(&store, embedder, sync_target(config), &config.embedding.model);

    let stop = runner.stop_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received, stopping after the current batch...");
            stop.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });

    println!(
        "Embedding '{}' into '{}' with model '{}'...",
        config.sync.source_field, config.sync.vector_field, config.embedding.model
    );

    let pb = record_progress_bar(0)?;
    let report = runner
        .run(|progress| {
            pb.set_length(progress.total as u64);
            pb.set_position(progress.updated as u64);
        })
        .await
        .context("sync aborted")?;
    pb.finish_and_clear();
    ctrl_c.abort();

    if report.total == 0 {
        println!("All records are up to date.");
        return Ok(true);
    }

    println!("Sync finished: {}/{} records updated in {} batches.", report.updated, report.total, report.batches);
    for failure in &report.skipped {
        println!(
            "  Batch {} skipped ({} records): {}",
            failure.batch,
            failure.ids.len(),
            failure.error
        );
    }
    for failure in &report.write_failures {
        println!("  Write failed for {}: {}", failure.id, failure.error);
    }
    if report.interrupted {
        println!("  Interrupted; remaining records stay pending.");
    }
    if !report.is_complete() {
        println!("Records left pending: {}", report.skipped_ids().join(", "));
    }

    Ok(report.is_complete())
}
