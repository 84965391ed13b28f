//! Fact search engine — the query surface an agent uses to find existing
//! facts.
//!
//! Thin wrapper over a [`FactIndex`]: free-text search against the object
//! field, returning the projected fact plus its relevance score.

use std::sync::Arc;

use serde::Serialize;

use crate::error::AppError;
use crate::index::{FactIndex, SearchQuery};

/// One search result, ready for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct FactHit {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub score: f32,
}

pub struct FactSearchEngine {
    index: Arc<dyn FactIndex>,
}

impl FactSearchEngine {
    pub fn new(index: Arc<dyn FactIndex>) -> Self {
        Self { index }
    }

    /// Facts whose object matches `query`, best first.
    ///
    /// Synchronous, like the index it wraps; async callers dispatch through
    /// `spawn_blocking`.
    pub fn search_facts(&self, query: &str, limit: usize) -> Result<Vec<FactHit>, AppError> {
        let hits = self.index.search(&SearchQuery::term(query, limit))?;
        Ok(hits
            .into_iter()
            .map(|hit| FactHit {
                subject: hit.document.subject,
                predicate: hit.document.predicate,
                object: hit.document.object,
                score: hit.score,
            })
            .collect())
    }
}
