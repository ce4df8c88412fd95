//! SQL DDL for the document store.
//!
//! Documents live in one `documents` table as JSON bodies keyed by
//! `(collection, id)`. Each vector index gets its own sqlite-vec `vec0`
//! table, created on demand by [`vec_table_sql`]. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

use crate::store::Similarity;

/// Schema version written to `schema_meta` on first initialization.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_SQL: &str = r#"
-- Document bodies (JSON objects). rowid gives the stable scan order.
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    body TEXT NOT NULL CHECK(json_valid(body)),
    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);

-- Vector index definitions; rows live in vec_index_<name>
CREATE TABLE IF NOT EXISTS vector_indexes (
    name TEXT PRIMARY KEY,
    collection TEXT NOT NULL,
    field TEXT NOT NULL,
    dimensions INTEGER NOT NULL CHECK(dimensions > 0),
    similarity TEXT NOT NULL CHECK(similarity IN ('cosine','euclidean')),
    created_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Name of the vec0 table backing index `name`. Callers validate `name`.
pub fn vec_table_name(index_name: &str) -> String {
    format!("vec_index_{index_name}")
}

/// vec0 DDL for one index (sqlite-vec syntax).
pub fn vec_table_sql(index_name: &str, dimensions: usize, similarity: Similarity) -> String {
    let metric = match similarity {
        Similarity::Cosine => " distance_metric=cosine",
        Similarity::Euclidean => "",
    };
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING vec0(\n    id TEXT PRIMARY KEY,\n    embedding FLOAT[{dimensions}]{metric}\n);",
        vec_table_name(index_name)
    )
}

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Stored schema version, `0` if unreadable.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"documents".to_string()));
        assert!(tables.contains(&"vector_indexes".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        let version: String = conn
            .query_row("SELECT vec_version()", [], |r| r.get(0))
            .unwrap();
        assert!(!version.is_empty());
    }

    #[test]
    fn schema_is_idempotent() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn vec_table_sql_uses_metric() {
        let sql = vec_table_sql("plots", 4, Similarity::Cosine);
        assert!(sql.contains("vec_index_plots"));
        assert!(sql.contains("FLOAT[4] distance_metric=cosine"));
        let sql = vec_table_sql("plots", 4, Similarity::Euclidean);
        assert!(!sql.contains("distance_metric"));
    }
}
