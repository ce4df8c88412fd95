pub mod import;
pub mod index;
pub mod query;
pub mod retire;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use ragsync::config::RagsyncConfig;
use ragsync::store::SqliteStore;
use ragsync::sync::SyncTarget;

/// Open the configured database and bind it to the configured collection.
pub fn open_store(config: &RagsyncConfig) -> Result<SqliteStore> {
    let db_path = config.resolved_db_path();
    SqliteStore::open(&db_path, &config.store.collection)
        .with_context(|| format!("failed to open store at {}", db_path.display()))
}

pub fn sync_target(config: &RagsyncConfig) -> SyncTarget {
    SyncTarget {
        source_field: config.sync.source_field.clone(),
        vector_field: config.sync.vector_field.clone(),
    }
}

/// Bar counting records, e.g. `245/245`.
pub fn record_progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")
            .context("invalid progress template")?
            .progress_chars("##-"),
    );
    Ok(pb)
}
