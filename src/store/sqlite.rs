//! [`DocumentStore`] over SQLite JSON bodies and sqlite-vec indexes.
//!
//! Every write that touches an indexed field also rewrites the matching
//! `vec0` row inside the same transaction, so an index never disagrees with
//! the document it was built from.

use anyhow::Context;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

use super::{
    json_path, Document, DocumentStore, Filter, ScanCursor, ScannedDocument,
    ScoredDocument, Similarity, VectorIndex, VectorQuery,
};
use crate::db::{self, schema};
use crate::error::StoreError;

/// sqlite-vec refuses KNN queries with `k` above this.
const MAX_KNN_K: usize = 4096;

/// Result of [`SqliteStore::ensure_index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created { backfilled: usize },
    /// The index existed with another definition and was rebuilt.
    Updated { backfilled: usize },
    AlreadyExists,
}

/// An index definition plus the number of vectors it currently holds.
#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    #[serde(flatten)]
    pub index: VectorIndex,
    pub rows: usize,
}

/// One collection inside a SQLite document database.
pub struct SqliteStore {
    conn: Connection,
    collection: String,
}

impl SqliteStore {
    pub fn new(conn: Connection, collection: impl Into<String>) -> Self {
        Self {
            conn,
            collection: collection.into(),
        }
    }

    /// Open (or create) the database file and bind to `collection`.
    pub fn open(path: impl AsRef<Path>, collection: &str) -> anyhow::Result<Self> {
        let conn = db::open_database(path).context("failed to open document database")?;
        Ok(Self::new(conn, collection))
    }

    pub fn open_in_memory(collection: &str) -> anyhow::Result<Self> {
        Ok(Self::new(db::open_memory_database()?, collection))
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Insert a new document. Uses `id` if given, otherwise a UUID v7.
    /// Returns `None` when a document with that id already exists.
    pub fn insert_document(
        &self,
        id: Option<&str>,
        fields: &Document,
    ) -> Result<Option<String>, StoreError> {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
        let body = serde_json::to_string(fields)?;

        let tx = self.conn.unchecked_transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
            params![self.collection, id, body],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        for index in self.indexes(&tx)? {
            reindex_document(&tx, &index, &id)?;
        }
        tx.commit()?;
        Ok(Some(id))
    }

    /// Full body of one document.
    pub fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![self.collection, id],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|b| serde_json::from_str(&b))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Create `index` if no index of that name exists, indexing every
    /// document that already carries a vector of the right length in the
    /// field. An existing index with a different definition is rebuilt in
    /// place. Index names are shared by all collections of the database.
    pub fn ensure_index(&self, index: &VectorIndex) -> Result<EnsureOutcome, StoreError> {
        validate_index_name(&index.name)?;
        let path = json_path(&index.field)?;

        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT collection FROM vector_indexes WHERE name = ?1",
                [&index.name],
                |row| row.get(0),
            )
            .optional()?;
        let replaced = match existing {
            Some(collection) if collection != self.collection => {
                return Err(StoreError::IndexConflict {
                    name: index.name.clone(),
                });
            }
            Some(_) => {
                let current = self.vector_index(&index.name)?;
                if current.as_ref() == Some(index) {
                    return Ok(EnsureOutcome::AlreadyExists);
                }
                current
            }
            None => None,
        };

        let table = schema::vec_table_name(&index.name);
        let tx = self.conn.unchecked_transaction()?;
        if replaced.is_some() {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))?;
            tx.execute("DELETE FROM vector_indexes WHERE name = ?1", [&index.name])?;
        }
        tx.execute_batch(&schema::vec_table_sql(
            &index.name,
            index.dimensions,
            index.similarity,
        ))?;
        tx.execute(
            "INSERT INTO vector_indexes (name, collection, field, dimensions, similarity, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                index.name,
                self.collection,
                index.field,
                index.dimensions as i64,
                index.similarity.as_str(),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        let backfilled = tx.execute(
            &format!(
                "INSERT INTO {table} (id, embedding) \
                 SELECT id, vec_f32(body -> ?1) FROM documents \
                 WHERE collection = ?2 AND json_type(body, ?1) = 'array' \
                 AND json_array_length(body, ?1) = ?3"
            ),
            params![path, self.collection, index.dimensions as i64],
        )?;
        tx.commit()?;

        match replaced {
            Some(previous) => {
                tracing::info!(
                    index = %index.name,
                    field = %index.field,
                    dimensions = index.dimensions,
                    previous_field = %previous.field,
                    previous_dimensions = previous.dimensions,
                    backfilled,
                    "vector index updated"
                );
                Ok(EnsureOutcome::Updated { backfilled })
            }
            None => {
                tracing::info!(
                    index = %index.name,
                    field = %index.field,
                    dimensions = index.dimensions,
                    backfilled,
                    "vector index created"
                );
                Ok(EnsureOutcome::Created { backfilled })
            }
        }
    }

    /// All indexes of this collection with their row counts.
    pub fn list_indexes(&self) -> Result<Vec<IndexInfo>, StoreError> {
        let mut infos = Vec::new();
        for index in self.indexes(&self.conn)? {
            let rows: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", schema::vec_table_name(&index.name)),
                [],
                |row| row.get(0),
            )?;
            infos.push(IndexInfo {
                index,
                rows: rows as usize,
            });
        }
        Ok(infos)
    }

    fn indexes(&self, conn: &Connection) -> Result<Vec<VectorIndex>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT name, field, dimensions, similarity FROM vector_indexes \
             WHERE collection = ?1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map([&self.collection], index_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Projected fields of one document, or `None` if it does not exist.
    fn project(&self, id: &str, projection: &[String]) -> Result<Option<Document>, StoreError> {
        let mut sql = String::from("SELECT 1");
        let mut values: Vec<SqlValue> = Vec::new();
        for field in projection {
            sql.push_str(", body -> ?");
            values.push(SqlValue::Text(json_path(field)?));
        }
        sql.push_str(" FROM documents WHERE collection = ? AND id = ?");
        values.push(SqlValue::Text(self.collection.clone()));
        values.push(SqlValue::Text(id.to_string()));

        let raw: Option<Vec<Option<String>>> = self
            .conn
            .query_row(&sql, params_from_iter(values), |row| {
                (0..projection.len())
                    .map(|i| row.get::<_, Option<String>>(i + 1))
                    .collect()
            })
            .optional()?;

        raw.map(|columns| build_projection(projection.iter().map(String::as_str), columns))
            .transpose()
    }
}

impl DocumentStore for SqliteStore {
    fn count(&self, filter: &Filter) -> Result<usize, StoreError> {
        let mut values = vec![SqlValue::Text(self.collection.clone())];
        let where_sql = filter_sql(filter, &mut values)?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM documents WHERE collection = ? AND ({where_sql})"),
            params_from_iter(values),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn scan(
        &self,
        filter: &Filter,
        after: ScanCursor,
        limit: usize,
        projection: &[&str],
    ) -> Result<Vec<ScannedDocument>, StoreError> {
        let mut sql = String::from("SELECT rowid, id");
        let mut values: Vec<SqlValue> = Vec::new();
        for field in projection {
            sql.push_str(", body -> ?");
            values.push(SqlValue::Text(json_path(field)?));
        }
        values.push(SqlValue::Text(self.collection.clone()));
        values.push(SqlValue::Integer(after.0));
        let where_sql = filter_sql(filter, &mut values)?;
        values.push(SqlValue::Integer(limit as i64));
        sql.push_str(&format!(
            " FROM documents WHERE collection = ? AND rowid > ? AND ({where_sql}) \
             ORDER BY rowid LIMIT ?"
        ));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                let rowid: i64 = row.get(0)?;
                let id: String = row.get(1)?;
                let columns = (0..projection.len())
                    .map(|i| row.get::<_, Option<String>>(i + 2))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok((rowid, id, columns))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(rowid, id, columns)| {
                Ok(ScannedDocument {
                    id,
                    cursor: ScanCursor(rowid),
                    fields: build_projection(projection.iter().copied(), columns)?,
                })
            })
            .collect()
    }

    fn set_fields(&self, id: &str, fields: &Document) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut sql = String::from("UPDATE documents SET body = json_set(body");
        let mut values: Vec<SqlValue> = Vec::new();
        for (field, value) in fields {
            sql.push_str(", ?, json(?)");
            values.push(SqlValue::Text(json_path(field)?));
            values.push(SqlValue::Text(serde_json::to_string(value)?));
        }
        sql.push_str(") WHERE collection = ? AND id = ?");
        values.push(SqlValue::Text(self.collection.clone()));
        values.push(SqlValue::Text(id.to_string()));

        // Dropping the transaction on any error rolls back the body update too.
        let tx = self.conn.unchecked_transaction()?;
        if tx.execute(&sql, params_from_iter(values))? == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        for index in self.indexes(&tx)? {
            if fields.keys().any(|f| fields_overlap(f, &index.field)) {
                reindex_document(&tx, &index, id)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn unset_fields(&self, fields: &[&str], chunk_size: usize) -> Result<usize, StoreError> {
        if fields.is_empty() {
            return Ok(0);
        }
        let paths = fields
            .iter()
            .map(|field| json_path(field))
            .collect::<Result<Vec<_>, _>>()?;
        let chunk_size = chunk_size.max(1);
        let indexes: Vec<VectorIndex> = self
            .indexes(&self.conn)?
            .into_iter()
            .filter(|index| fields.iter().any(|f| fields_overlap(f, &index.field)))
            .collect();

        let present = vec!["json_type(body, ?) IS NOT NULL"; paths.len()].join(" OR ");
        let select_sql = format!(
            "SELECT rowid, id FROM documents WHERE collection = ? AND ({present}) \
             ORDER BY rowid LIMIT ?"
        );
        let update_sql = format!(
            "UPDATE documents SET body = json_remove(body{}) WHERE rowid = ?",
            ", ?".repeat(paths.len())
        );

        let mut total = 0usize;
        loop {
            let tx = self.conn.unchecked_transaction()?;
            let chunk: Vec<(i64, String)> = {
                let mut values = vec![SqlValue::Text(self.collection.clone())];
                values.extend(paths.iter().cloned().map(SqlValue::Text));
                values.push(SqlValue::Integer(chunk_size as i64));
                let mut stmt = tx.prepare(&select_sql)?;
                let rows = stmt
                    .query_map(params_from_iter(values), |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };
            if chunk.is_empty() {
                break;
            }

            {
                let mut update = tx.prepare(&update_sql)?;
                for (rowid, id) in &chunk {
                    let mut values: Vec<SqlValue> =
                        paths.iter().cloned().map(SqlValue::Text).collect();
                    values.push(SqlValue::Integer(*rowid));
                    update.execute(params_from_iter(values))?;
                    for index in &indexes {
                        reindex_document(&tx, index, id)?;
                    }
                }
            }
            tx.commit()?;

            total += chunk.len();
            tracing::debug!(?fields, chunk = chunk.len(), total, "removed fields from chunk");
        }

        Ok(total)
    }

    fn vector_index(&self, name: &str) -> Result<Option<VectorIndex>, StoreError> {
        let index = self
            .conn
            .query_row(
                "SELECT name, field, dimensions, similarity FROM vector_indexes \
                 WHERE name = ?1 AND collection = ?2",
                params![name, self.collection],
                index_from_row,
            )
            .optional()?;
        Ok(index)
    }

    fn vector_search(&self, query: &VectorQuery<'_>) -> Result<Vec<ScoredDocument>, StoreError> {
        let index = self
            .vector_index(query.index)?
            .ok_or_else(|| StoreError::NoIndex(query.index.to_string()))?;
        if query.vector.len() != index.dimensions {
            return Err(StoreError::Dimension {
                expected: index.dimensions,
                got: query.vector.len(),
            });
        }
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let k = query.num_candidates.max(query.limit).min(MAX_KNN_K);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, distance FROM {} WHERE embedding MATCH ?1 AND k = ?2 ORDER BY distance",
            schema::vec_table_name(&index.name)
        ))?;
        let mut hits: Vec<(String, f64)> = stmt
            .query_map(params![vector_to_bytes(query.vector), k as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        hits.truncate(query.limit);

        let mut results = Vec::with_capacity(hits.len());
        for (id, distance) in hits {
            if let Some(fields) = self.project(&id, query.projection)? {
                results.push(ScoredDocument {
                    score: index.similarity.score(distance),
                    id,
                    fields,
                });
            }
        }
        Ok(results)
    }
}

/// Rewrite the vec0 row of `id` from the document's current value of the
/// indexed field. A missing or non-array value leaves no row behind.
fn reindex_document(tx: &Transaction, index: &VectorIndex, id: &str) -> Result<(), StoreError> {
    let table = schema::vec_table_name(&index.name);
    tx.execute(&format!("DELETE FROM {table} WHERE id = ?1"), [id])?;
    tx.execute(
        &format!(
            "INSERT INTO {table} (id, embedding) \
             SELECT id, vec_f32(body -> ?1) FROM documents \
             WHERE collection = (SELECT collection FROM vector_indexes WHERE name = ?2) \
             AND id = ?3 AND json_type(body, ?1) = 'array'"
        ),
        params![json_path(&index.field)?, index.name, id],
    )?;
    Ok(())
}

fn index_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VectorIndex> {
    let similarity: String = row.get(3)?;
    let dimensions: i64 = row.get(2)?;
    Ok(VectorIndex {
        name: row.get(0)?,
        field: row.get(1)?,
        dimensions: dimensions as usize,
        similarity: similarity.parse().unwrap_or(Similarity::Cosine),
    })
}

/// `a` and `b` name the same field, or one is nested inside the other.
fn fields_overlap(a: &str, b: &str) -> bool {
    a == b
        || b.strip_prefix(a).is_some_and(|rest| rest.starts_with('.'))
        || a.strip_prefix(b).is_some_and(|rest| rest.starts_with('.'))
}

fn validate_index_name(name: &str) -> Result<(), StoreError> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidField(name.to_string()))
    }
}

/// Zip projected field names with the JSON text SQLite returned for them.
/// Absent fields are left out of the result.
fn build_projection<'a>(
    fields: impl Iterator<Item = &'a str>,
    columns: Vec<Option<String>>,
) -> Result<Document, StoreError> {
    let mut doc = Document::new();
    for (field, column) in fields.zip(columns) {
        if let Some(text) = column {
            doc.insert(field.to_string(), serde_json::from_str(&text)?);
        }
    }
    Ok(doc)
}

/// Render `filter` as a SQL boolean expression over `body`, pushing its
/// parameters onto `values` in placeholder order.
fn filter_sql(filter: &Filter, values: &mut Vec<SqlValue>) -> Result<String, StoreError> {
    let sql = match filter {
        Filter::Exists(field) => {
            values.push(SqlValue::Text(json_path(field)?));
            "json_type(body, ?) IS NOT NULL".to_string()
        }
        Filter::Missing(field) => {
            values.push(SqlValue::Text(json_path(field)?));
            "json_type(body, ?) IS NULL".to_string()
        }
        Filter::NonNull(field) => {
            values.push(SqlValue::Text(json_path(field)?));
            "COALESCE(json_type(body, ?), 'null') <> 'null'".to_string()
        }
        Filter::Null(field) => {
            values.push(SqlValue::Text(json_path(field)?));
            "COALESCE(json_type(body, ?), 'null') = 'null'".to_string()
        }
        Filter::NotEqual(field, value) => {
            values.push(SqlValue::Text(json_path(field)?));
            match scalar(value) {
                Some(v) => {
                    values.push(v);
                    "json_extract(body, ?) IS NOT ?".to_string()
                }
                None => {
                    values.push(SqlValue::Text(serde_json::to_string(value)?));
                    "(body -> ?) IS NOT ?".to_string()
                }
            }
        }
        Filter::And(parts) => join_filters(parts, " AND ", "1", values)?,
        Filter::Or(parts) => join_filters(parts, " OR ", "0", values)?,
    };
    Ok(sql)
}

fn join_filters(
    parts: &[Filter],
    separator: &str,
    empty: &str,
    values: &mut Vec<SqlValue>,
) -> Result<String, StoreError> {
    if parts.is_empty() {
        return Ok(empty.to_string());
    }
    let rendered = parts
        .iter()
        .map(|part| filter_sql(part, values).map(|sql| format!("({sql})")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rendered.join(separator))
}

/// SQL value `json_extract` would produce for a scalar JSON value.
fn scalar(value: &Value) -> Option<SqlValue> {
    match value {
        Value::Null => Some(SqlValue::Null),
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real)),
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Native-endian f32 bytes, the blob layout sqlite-vec reads.
fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_ne_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory("movies").unwrap()
    }

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    fn plots_index() -> VectorIndex {
        VectorIndex {
            name: "plots".into(),
            field: "plot_embedding".into(),
            dimensions: 3,
            similarity: Similarity::Cosine,
        }
    }

    #[test]
    fn insert_assigns_id_and_skips_duplicates() {
        let store = store();
        let id = store
            .insert_document(None, &doc(json!({"title": "Jaws"})))
            .unwrap()
            .unwrap();
        assert!(!id.is_empty());
        let again = store
            .insert_document(Some(&id), &doc(json!({"title": "Jaws 2"})))
            .unwrap();
        assert!(again.is_none());
        assert_eq!(store.get_document(&id).unwrap().unwrap()["title"], "Jaws");
    }

    #[test]
    fn filters_distinguish_missing_null_and_values() {
        let store = store();
        store.insert_document(Some("a"), &doc(json!({"plot": "x"}))).unwrap();
        store.insert_document(Some("b"), &doc(json!({"plot": null}))).unwrap();
        store.insert_document(Some("c"), &doc(json!({"other": 1}))).unwrap();
        store
            .insert_document(Some("d"), &doc(json!({"plot": "y", "model": "m1"})))
            .unwrap();

        assert_eq!(store.count(&Filter::exists("plot")).unwrap(), 3);
        assert_eq!(store.count(&Filter::missing("plot")).unwrap(), 1);
        assert_eq!(store.count(&Filter::non_null("plot")).unwrap(), 2);
        assert_eq!(store.count(&Filter::null("plot")).unwrap(), 2);
        assert_eq!(store.count(&Filter::not_equal("model", "m1")).unwrap(), 3);
        assert_eq!(
            store
                .count(&Filter::And(vec![
                    Filter::non_null("plot"),
                    Filter::not_equal("model", "m1"),
                ]))
                .unwrap(),
            1
        );
        assert_eq!(store.count(&Filter::And(vec![])).unwrap(), 4);
    }

    #[test]
    fn scan_pages_by_cursor_with_projection() {
        let store = store();
        for i in 0..5 {
            store
                .insert_document(
                    Some(&format!("doc-{i}")),
                    &doc(json!({"plot": format!("plot {i}"), "big": [1, 2, 3]})),
                )
                .unwrap();
        }

        let first = store
            .scan(&Filter::exists("plot"), ScanCursor::default(), 2, &["plot"])
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, "doc-0");
        assert_eq!(first[0].fields["plot"], "plot 0");
        assert!(!first[0].fields.contains_key("big"));

        let rest = store
            .scan(&Filter::exists("plot"), first[1].cursor, 10, &["plot"])
            .unwrap();
        let ids: Vec<&str> = rest.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["doc-2", "doc-3", "doc-4"]);
    }

    #[test]
    fn set_fields_is_atomic_on_dimension_error() {
        let store = store();
        store.ensure_index(&plots_index()).unwrap();
        store.insert_document(Some("a"), &doc(json!({"plot": "x"}))).unwrap();

        // 2 dims into a 3-dim index: the vec0 insert fails, body must be untouched
        let bad = doc(json!({"plot_embedding": [1.0, 0.0], "embedding_model": "m"}));
        assert!(store.set_fields("a", &bad).is_err());
        let body = store.get_document("a").unwrap().unwrap();
        assert!(!body.contains_key("plot_embedding"));
        assert!(!body.contains_key("embedding_model"));

        let good = doc(json!({"plot_embedding": [1.0, 0.0, 0.0], "embedding_model": "m"}));
        store.set_fields("a", &good).unwrap();
        let body = store.get_document("a").unwrap().unwrap();
        assert_eq!(body["embedding_model"], "m");
        assert_eq!(store.list_indexes().unwrap()[0].rows, 1);
    }

    #[test]
    fn set_fields_on_unknown_id_is_not_found() {
        let store = store();
        let err = store
            .set_fields("nope", &doc(json!({"x": 1})))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn unset_field_in_chunks_and_clears_index_rows() {
        let store = store();
        store.ensure_index(&plots_index()).unwrap();
        for i in 0..7 {
            store
                .insert_document(
                    Some(&format!("d{i}")),
                    &doc(json!({"plot_embedding": [1.0, i as f64, 0.0]})),
                )
                .unwrap();
        }
        assert_eq!(store.list_indexes().unwrap()[0].rows, 7);

        assert_eq!(store.unset_field("plot_embedding", 3).unwrap(), 7);
        assert_eq!(store.count(&Filter::exists("plot_embedding")).unwrap(), 0);
        assert_eq!(store.list_indexes().unwrap()[0].rows, 0);

        assert_eq!(store.unset_field("plot_embedding", 3).unwrap(), 0);
    }

    #[test]
    fn unset_fields_removes_all_listed_fields_per_record() {
        let store = store();
        store
            .insert_document(Some("a"), &doc(json!({"v": [1.0], "m": "x", "keep": 1})))
            .unwrap();
        store
            .insert_document(Some("b"), &doc(json!({"m": "only metadata"})))
            .unwrap();
        store.insert_document(Some("c"), &doc(json!({"keep": 2}))).unwrap();

        assert_eq!(store.unset_fields(&["v", "m"], 1).unwrap(), 2);
        assert_eq!(store.get_document("a").unwrap().unwrap(), doc(json!({"keep": 1})));
        assert!(store.get_document("b").unwrap().unwrap().is_empty());
        assert_eq!(store.unset_fields(&["v", "m"], 1).unwrap(), 0);
        assert_eq!(store.unset_fields(&[], 1).unwrap(), 0);
    }

    #[test]
    fn ensure_index_backfills_and_rebuilds_on_change() {
        let store = store();
        store
            .insert_document(Some("a"), &doc(json!({"plot_embedding": [0.0, 1.0, 0.0]})))
            .unwrap();
        store
            .insert_document(Some("b"), &doc(json!({"plot": "no vector", "short": [1.0, 0.0]})))
            .unwrap();

        assert_eq!(
            store.ensure_index(&plots_index()).unwrap(),
            EnsureOutcome::Created { backfilled: 1 }
        );
        assert_eq!(
            store.ensure_index(&plots_index()).unwrap(),
            EnsureOutcome::AlreadyExists
        );

        // same field, new dimension: stored 3-dim vectors no longer fit
        let mut resized = plots_index();
        resized.dimensions = 2;
        assert_eq!(
            store.ensure_index(&resized).unwrap(),
            EnsureOutcome::Updated { backfilled: 0 }
        );

        let moved = VectorIndex {
            field: "short".into(),
            similarity: Similarity::Euclidean,
            ..resized
        };
        assert_eq!(
            store.ensure_index(&moved).unwrap(),
            EnsureOutcome::Updated { backfilled: 1 }
        );
        assert_eq!(store.vector_index("plots").unwrap(), Some(moved.clone()));
        let infos = store.list_indexes().unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].rows, 1);
        assert_eq!(store.ensure_index(&moved).unwrap(), EnsureOutcome::AlreadyExists);

        // writes go to the rebuilt table
        store
            .set_fields("a", &doc(json!({"short": [0.5, 0.5]})))
            .unwrap();
        assert_eq!(store.list_indexes().unwrap()[0].rows, 2);
    }

    #[test]
    fn index_name_owned_by_another_collection_conflicts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("docs.db");
        let movies = SqliteStore::open(&path, "movies").unwrap();
        let books = SqliteStore::open(&path, "books").unwrap();

        movies.ensure_index(&plots_index()).unwrap();
        assert!(matches!(
            books.ensure_index(&plots_index()),
            Err(StoreError::IndexConflict { .. })
        ));
    }

    #[test]
    fn vector_search_orders_by_similarity() {
        let store = store();
        store.ensure_index(&plots_index()).unwrap();
        store
            .insert_document(
                Some("near"),
                &doc(json!({"title": "Near", "plot_embedding": [1.0, 0.1, 0.0]})),
            )
            .unwrap();
        store
            .insert_document(
                Some("far"),
                &doc(json!({"title": "Far", "plot_embedding": [0.0, 0.0, 1.0]})),
            )
            .unwrap();

        let projection = vec!["title".to_string()];
        let hits = store
            .vector_search(&VectorQuery {
                index: "plots",
                vector: &[1.0, 0.0, 0.0],
                limit: 2,
                num_candidates: 10,
                projection: &projection,
            })
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "near");
        assert_eq!(hits[0].text("title").as_deref(), Some("Near"));
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn vector_search_without_index_fails() {
        let store = store();
        let err = store
            .vector_search(&VectorQuery {
                index: "missing",
                vector: &[1.0],
                limit: 1,
                num_candidates: 1,
                projection: &[],
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::NoIndex(_)));
    }

    #[test]
    fn overlapping_fields() {
        assert!(fields_overlap("a", "a"));
        assert!(fields_overlap("a", "a.b"));
        assert!(fields_overlap("a.b", "a"));
        assert!(!fields_overlap("a", "ab"));
    }
}
