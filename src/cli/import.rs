use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

use ragsync::config::RagsyncConfig;
use ragsync::store::Document;

use super::open_store;

/// Key holding a document's id in import files.
const ID_KEY: &str = "_id";

/// Parse a JSON array of objects, or one object per line (JSON Lines).
fn parse_documents(contents: &str) -> Result<Vec<Document>> {
    let values: Vec<Value> = if contents.trim_start().starts_with('[') {
        serde_json::from_str(contents).context("failed to parse JSON array")?
    } else {
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).with_context(|| format!("invalid JSON on line {}", n + 1))
            })
            .collect::<Result<_>>()?
    };

    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| match value {
            Value::Object(doc) => Ok(doc),
            other => anyhow::bail!("document {} is not a JSON object: {other}", i + 1),
        })
        .collect()
}

/// `_id` as a string; `{"$oid": ...}` wrappers are unwrapped.
fn take_id(doc: &mut Document) -> Option<String> {
    match doc.remove(ID_KEY)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(mut wrapper) => match wrapper.remove("$oid") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

/// Import documents from a file. Existing ids are skipped.
pub fn import(config: &RagsyncConfig, file: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;
    let documents = parse_documents(&contents)?;

    let store = open_store(config)?;
    println!(
        "Importing {} documents into '{}'...",
        documents.len(),
        store.collection()
    );

    let mut imported = 0u64;
    let mut skipped = 0u64;
    for mut doc in documents {
        let id = take_id(&mut doc);
        match store.insert_document(id.as_deref(), &doc)? {
            Some(_) => imported += 1,
            None => skipped += 1,
        }
    }

    println!("Import complete:");
    println!("  Documents imported: {imported}");
    println!("  Documents skipped:  {skipped} (already exist)");
    Ok(())
}
