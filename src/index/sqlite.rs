//! `SqliteFactIndex` — fact index backed by a SQLite FTS5 table.
//!
//! One virtual table holds everything: entry id (stored, not tokenized)
//! plus the four projected fields.  Term queries use a column-scoped FTS5
//! `MATCH` with BM25 ranking; field-equality queries use plain column
//! constraints.  The index is in-memory by default; `open` persists it to a
//! database file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::index::{EntryId, FactIndex, IndexDocument, SearchHit, SearchQuery};

/// Execute the schema DDL on a freshly-opened connection.
///
/// A single FTS5 virtual table; `id` is `UNINDEXED` (stored but not
/// tokenized), the four projection columns are searchable.
fn init_schema(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "
        CREATE VIRTUAL TABLE IF NOT EXISTS facts USING fts5(
            id UNINDEXED,
            subject,
            predicate,
            object,
            graph
        );
        ",
    )
    .map_err(|e| AppError::Index(format!("initialize schema: {e}")))
}

/// Escape a user-supplied string for use in an FTS5 `MATCH` query.
///
/// FTS5 parses the argument to `MATCH` with its own mini-language, so
/// characters like `:`, `"` and `(` are significant even through parameter
/// binding.  Whitespace splits the query into tokens; any token containing
/// a non-alphanumeric character is wrapped in double-quotes with internal
/// quotes doubled.
fn escape_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|tok| {
            if tok.chars().all(|c| c.is_alphanumeric()) {
                tok.to_string()
            } else {
                let escaped = tok.replace('"', "\"\"");
                format!("\"{escaped}\"")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct SqliteFactIndex {
    conn: Mutex<Connection>,
}

impl SqliteFactIndex {
    /// An index living entirely in memory; dropped with the value.
    pub fn in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Index(format!("open in-memory index: {e}")))?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// An index stored in a database file at `path`.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let conn = Connection::open(path)
            .map_err(|e| AppError::Index(format!("open {}: {e}", path.display())))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| AppError::Index(format!("set journal_mode WAL: {e}")))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| AppError::Index(format!("set busy_timeout: {e}")))?;

        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Number of indexed entries.
    pub fn len(&self) -> Result<usize, AppError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT count(*) FROM facts", [], |row| row.get(0))
            .map_err(|e| AppError::Index(format!("count entries: {e}")))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::Index("index connection lock poisoned".into()))
    }
}

impl FactIndex for SqliteFactIndex {
    fn insert(&self, doc: &IndexDocument) -> Result<EntryId, AppError> {
        let id = Uuid::now_v7().to_string();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO facts (id, subject, predicate, object, graph)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id, doc.subject, doc.predicate, doc.object, doc.graph],
        )
        .map_err(|e| AppError::Index(format!("insert entry: {e}")))?;
        Ok(EntryId::new(id))
    }

    fn remove(&self, id: &EntryId) -> Result<(), AppError> {
        let conn = self.lock()?;
        let affected = conn
            .execute("DELETE FROM facts WHERE id = ?1", rusqlite::params![id.as_str()])
            .map_err(|e| AppError::Index(format!("remove entry {id}: {e}")))?;
        if affected == 0 {
            debug!(entry = %id, "remove matched no index entry");
        }
        Ok(())
    }

    fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, AppError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<String> = Vec::new();

        let scored = query.term.is_some();
        if let Some(term) = &query.term {
            clauses.push(format!("facts MATCH ?{}", params.len() + 1));
            params.push(format!("object: ({})", escape_fts5_query(term)));
        }
        if let Some(filter) = &query.filter {
            for (column, value) in [
                ("subject", &filter.subject),
                ("predicate", &filter.predicate),
                ("object", &filter.object),
                ("graph", &filter.graph),
            ] {
                if let Some(value) = value {
                    clauses.push(format!("{column} = ?{}", params.len() + 1));
                    params.push(value.clone());
                }
            }
        }

        let score_expr = if scored { "-bm25(facts)" } else { "0.0" };
        let mut sql = format!(
            "SELECT id, subject, predicate, object, graph, {score_expr} AS score FROM facts"
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if scored {
            sql.push_str(" ORDER BY score DESC");
        }
        sql.push_str(&format!(" LIMIT {}", query.limit));

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Index(format!("prepare search: {e}")))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(SearchHit {
                    id: EntryId::new(row.get::<_, String>(0)?),
                    document: IndexDocument {
                        subject: row.get(1)?,
                        predicate: row.get(2)?,
                        object: row.get(3)?,
                        graph: row.get(4)?,
                    },
                    score: row.get::<_, f64>(5)? as f32,
                })
            })
            .map_err(|e| AppError::Index(format!("run search: {e}")))?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row.map_err(|e| AppError::Index(format!("read search row: {e}")))?);
        }
        Ok(hits)
    }
}
