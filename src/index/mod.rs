//! Secondary index — flat fact documents, opaque entry ids, and search.
//!
//! The index only understands flat string fields, so facts are projected
//! into [`IndexDocument`]s before insertion.  Every insertion yields an
//! opaque [`EntryId`]; removal requires one.  Search accepts a free-text
//! term (matched against the object field), a field-equality filter, or
//! both.

#[cfg(feature = "fts-index")]
pub mod sqlite;

#[cfg(feature = "fts-index")]
pub use sqlite::SqliteFactIndex;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::Fact;

// ── Documents and ids ─────────────────────────────────────────────────────────

/// The flat, string-only projection of a fact that the index stores.
/// The default graph projects to the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub graph: String,
}

impl From<&Fact> for IndexDocument {
    fn from(fact: &Fact) -> Self {
        Self {
            subject: fact.subject().value().to_string(),
            predicate: fact.predicate().value().to_string(),
            object: fact.object().value().to_string(),
            graph: fact.graph().value().to_string(),
        }
    }
}

/// Opaque handle to one indexed document, minted by the index on insertion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Queries ───────────────────────────────────────────────────────────────────

/// Field-equality constraints; bound fields must match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldFilter {
    pub subject: Option<String>,
    pub predicate: Option<String>,
    pub object: Option<String>,
    pub graph: Option<String>,
}

impl FieldFilter {
    /// A filter binding all four fields to the document's values.
    pub fn for_document(doc: &IndexDocument) -> Self {
        Self {
            subject: Some(doc.subject.clone()),
            predicate: Some(doc.predicate.clone()),
            object: Some(doc.object.clone()),
            graph: Some(doc.graph.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Free-text term, matched against the object field.
    pub term: Option<String>,
    pub filter: Option<FieldFilter>,
    /// Maximum number of hits to return; `0` means no hits.
    pub limit: usize,
}

impl SearchQuery {
    pub fn term(term: impl Into<String>, limit: usize) -> Self {
        Self { term: Some(term.into()), filter: None, limit }
    }

    pub fn fields(filter: FieldFilter, limit: usize) -> Self {
        Self { term: None, filter: Some(filter), limit }
    }
}

/// One search result: the entry's id, its stored document, and a relevance
/// score (higher is better; equality-only queries score all hits `0.0`).
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: EntryId,
    pub document: IndexDocument,
    pub score: f32,
}

// ── The index seam ────────────────────────────────────────────────────────────

/// What the synchroniser needs from a full-text fact index.
///
/// Operations are synchronous; async callers dispatch them through
/// `spawn_blocking` the way the rest of the crate does for store I/O.
pub trait FactIndex: Send + Sync {
    fn insert(&self, doc: &IndexDocument) -> Result<EntryId, AppError>;

    fn remove(&self, id: &EntryId) -> Result<(), AppError>;

    fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Term;

    #[test]
    fn document_projects_default_graph_to_empty_string() {
        let fact = Fact::triple(
            Term::named("http://example.org/alice"),
            Term::named("http://xmlns.com/foaf/0.1/name"),
            Term::literal("Alice"),
        )
        .unwrap();

        let doc = IndexDocument::from(&fact);
        assert_eq!(doc.subject, "http://example.org/alice");
        assert_eq!(doc.object, "Alice");
        assert_eq!(doc.graph, "");
    }

    #[test]
    fn filter_for_document_binds_every_field() {
        let doc = IndexDocument {
            subject: "s".into(),
            predicate: "p".into(),
            object: "o".into(),
            graph: "g".into(),
        };
        let filter = FieldFilter::for_document(&doc);
        assert_eq!(filter.subject.as_deref(), Some("s"));
        assert_eq!(filter.predicate.as_deref(), Some("p"));
        assert_eq!(filter.object.as_deref(), Some("o"));
        assert_eq!(filter.graph.as_deref(), Some("g"));
    }
}
