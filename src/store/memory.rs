//! In-memory quad store.
//!
//! The reference [`GraphStore`] implementation: a deduplicated `Vec<Fact>`
//! behind a lock.  `match_pattern` snapshots the matching facts at call
//! time and delivers them lazily, so a match stream is stable against later
//! mutations.  Pattern and graph removal apply synchronously; stream-fed
//! operations drain their input on a detached task.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::AppError;
use crate::model::{Fact, FactPattern, GraphRef};
use crate::store::stream::FactStream;
use crate::store::{Completion, GraphStore};

#[derive(Default)]
pub struct MemoryStore {
    facts: Arc<Mutex<Vec<Fact>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of every stored fact, in insertion order.
    pub fn facts(&self) -> Result<Vec<Fact>, AppError> {
        Ok(self.lock()?.clone())
    }

    pub fn len(&self) -> Result<usize, AppError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Fact>>, AppError> {
        self.facts
            .lock()
            .map_err(|_| AppError::Store("memory store lock poisoned".into()))
    }
}

impl GraphStore for MemoryStore {
    fn match_pattern(&self, pattern: &FactPattern) -> Result<FactStream, AppError> {
        let matches: Vec<Fact> = self
            .lock()?
            .iter()
            .filter(|fact| pattern.matches(fact))
            .cloned()
            .collect();
        Ok(FactStream::from_facts(matches))
    }

    fn import(&self, facts: FactStream) -> Completion {
        let store = self.facts.clone();
        Completion::spawn(async move {
            let mut stream = facts;
            while let Some(fact) = stream.next().await? {
                let mut guard = store
                    .lock()
                    .map_err(|_| AppError::Store("memory store lock poisoned".into()))?;
                if !guard.contains(&fact) {
                    guard.push(fact);
                }
            }
            Ok(())
        })
    }

    fn remove(&self, facts: FactStream) -> Completion {
        let store = self.facts.clone();
        Completion::spawn(async move {
            let mut stream = facts;
            while let Some(fact) = stream.next().await? {
                let mut guard = store
                    .lock()
                    .map_err(|_| AppError::Store("memory store lock poisoned".into()))?;
                guard.retain(|existing| existing != &fact);
            }
            Ok(())
        })
    }

    fn remove_matches(&self, pattern: &FactPattern) -> Completion {
        let result = self
            .lock()
            .map(|mut guard| guard.retain(|fact| !pattern.matches(fact)));
        Completion::ready(result)
    }

    fn delete_graph(&self, graph: GraphRef) -> Completion {
        let graph = graph.to_term();
        let result = self
            .lock()
            .map(|mut guard| guard.retain(|fact| fact.graph() != &graph));
        Completion::ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Term;

    fn named_fact(subject: &str, object: &str, graph: Option<&str>) -> Fact {
        let graph = match graph {
            Some(iri) => Term::named(iri),
            None => Term::DefaultGraph,
        };
        Fact::new(
            Term::named(subject),
            Term::named("http://example.org/p"),
            Term::literal(object),
            graph,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn import_deduplicates() {
        let store = MemoryStore::new();
        let fact = named_fact("http://example.org/a", "one", None);
        store
            .import(FactStream::from_facts(vec![fact.clone(), fact.clone()]))
            .wait()
            .await
            .unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn match_snapshots_at_call_time() {
        let store = MemoryStore::new();
        let fact = named_fact("http://example.org/a", "one", None);
        store
            .import(FactStream::from_facts(vec![fact.clone()]))
            .wait()
            .await
            .unwrap();

        let matched = store.match_pattern(&FactPattern::any()).unwrap();
        // Mutate after the match call; the stream still delivers the snapshot.
        store.remove_matches(&FactPattern::any()).wait().await.unwrap();
        assert_eq!(store.len().unwrap(), 0);
        assert_eq!(matched.collect().await.unwrap(), vec![fact]);
    }

    #[tokio::test]
    async fn remove_matches_filters_by_pattern() {
        let store = MemoryStore::new();
        let a = named_fact("http://example.org/a", "one", None);
        let b = named_fact("http://example.org/b", "two", None);
        store
            .import(FactStream::from_facts(vec![a, b.clone()]))
            .wait()
            .await
            .unwrap();

        store
            .remove_matches(&FactPattern::any().subject(Term::named("http://example.org/a")))
            .wait()
            .await
            .unwrap();
        assert_eq!(store.facts().unwrap(), vec![b]);
    }

    #[tokio::test]
    async fn delete_graph_accepts_strings_and_terms() {
        let store = MemoryStore::new();
        let g1 = named_fact("http://example.org/a", "one", Some("http://example.org/g1"));
        let g2 = named_fact("http://example.org/b", "two", Some("http://example.org/g2"));
        store
            .import(FactStream::from_facts(vec![g1, g2.clone()]))
            .wait()
            .await
            .unwrap();

        store
            .delete_graph(GraphRef::from("http://example.org/g1"))
            .wait()
            .await
            .unwrap();
        assert_eq!(store.facts().unwrap(), vec![g2.clone()]);

        store
            .delete_graph(GraphRef::from(Term::named("http://example.org/g2")))
            .wait()
            .await
            .unwrap();
        assert!(store.is_empty().unwrap());
    }
}
