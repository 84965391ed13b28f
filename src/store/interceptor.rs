//! Store interceptor — an event-emitting decorator over a [`GraphStore`].
//!
//! The interceptor implements the same operation set as the store it wraps.
//! Each call emits exactly one [`StoreEvent`] to every registered listener,
//! synchronously and in call order, *before* delegating; the delegate's
//! result is returned unchanged.  Listeners observe what the store is asked
//! to do without changing what callers see.
//!
//! Only calls made through the interceptor emit events.  A wrapped store
//! whose `remove_matches` internally performs its own match-then-remove
//! calls those methods on itself directly, so one top-level call emits one
//! event, never several.
//!
//! Listeners run on the caller's task during emission, so they must not
//! block; anything slow belongs on a spawned task.  The listener list is
//! snapshotted before invocation, which lets a listener re-enter the
//! interceptor (the index synchroniser re-issues match queries from inside
//! its handler).

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::error::AppError;
use crate::model::{FactPattern, GraphRef};
use crate::store::stream::FactStream;
use crate::store::{Completion, GraphStore};

// ── Events ────────────────────────────────────────────────────────────────────

/// One intercepted store call.  Stream-carrying variants hold a tap of the
/// same sequence handed to the wrapped store, so listeners and the store
/// each observe every fact.
pub enum StoreEvent {
    Match { pattern: FactPattern },
    Import { facts: FactStream },
    Remove { facts: FactStream },
    RemoveMatches { pattern: FactPattern },
    DeleteGraph { graph: GraphRef },
}

impl StoreEvent {
    /// The operation name, for logging and assertions.
    pub fn operation(&self) -> &'static str {
        match self {
            StoreEvent::Match { .. } => "match",
            StoreEvent::Import { .. } => "import",
            StoreEvent::Remove { .. } => "remove",
            StoreEvent::RemoveMatches { .. } => "removematches",
            StoreEvent::DeleteGraph { .. } => "deletegraph",
        }
    }
}

/// Identifies a registered listener so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

// ── Interceptor ───────────────────────────────────────────────────────────────

pub struct StoreInterceptor {
    inner: Arc<dyn GraphStore>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl StoreInterceptor {
    pub fn new(inner: Arc<dyn GraphStore>) -> Self {
        Self {
            inner,
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener for every subsequent store event.
    pub fn on(&self, listener: impl Fn(&StoreEvent) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, Arc::new(listener)));
        id
    }

    /// Remove a previously registered listener.  Returns `false` if it was
    /// already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    fn emit(&self, event: &StoreEvent) {
        trace!(operation = event.operation(), "store call intercepted");
        // Snapshot outside the lock so listeners may call back into the
        // interceptor (or register/remove listeners) without deadlocking.
        let snapshot: Vec<Listener> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl GraphStore for StoreInterceptor {
    fn match_pattern(&self, pattern: &FactPattern) -> Result<FactStream, AppError> {
        self.emit(&StoreEvent::Match { pattern: pattern.clone() });
        self.inner.match_pattern(pattern)
    }

    fn import(&self, facts: FactStream) -> Completion {
        self.emit(&StoreEvent::Import { facts: facts.tap() });
        self.inner.import(facts)
    }

    fn remove(&self, facts: FactStream) -> Completion {
        self.emit(&StoreEvent::Remove { facts: facts.tap() });
        self.inner.remove(facts)
    }

    fn remove_matches(&self, pattern: &FactPattern) -> Completion {
        self.emit(&StoreEvent::RemoveMatches { pattern: pattern.clone() });
        self.inner.remove_matches(pattern)
    }

    fn delete_graph(&self, graph: GraphRef) -> Completion {
        self.emit(&StoreEvent::DeleteGraph { graph: graph.clone() });
        self.inner.delete_graph(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fact, Term};
    use crate::store::MemoryStore;

    fn sample_fact() -> Fact {
        Fact::triple(
            Term::named("http://example.org/alice"),
            Term::named("http://xmlns.com/foaf/0.1/name"),
            Term::literal("Alice"),
        )
        .unwrap()
    }

    fn recording_interceptor() -> (Arc<StoreInterceptor>, Arc<Mutex<Vec<&'static str>>>) {
        let interceptor = Arc::new(StoreInterceptor::new(Arc::new(MemoryStore::new())));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        interceptor.on(move |event| {
            sink.lock().unwrap().push(event.operation());
        });
        (interceptor, seen)
    }

    #[tokio::test]
    async fn each_operation_emits_one_event_in_call_order() {
        let (interceptor, seen) = recording_interceptor();

        interceptor.match_pattern(&FactPattern::any()).unwrap();
        interceptor
            .import(FactStream::from_facts(vec![sample_fact()]))
            .wait()
            .await
            .unwrap();
        interceptor
            .remove(FactStream::from_facts(vec![sample_fact()]))
            .wait()
            .await
            .unwrap();
        interceptor.remove_matches(&FactPattern::any()).wait().await.unwrap();
        interceptor
            .delete_graph(GraphRef::from("http://example.org/g"))
            .wait()
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["match", "import", "remove", "removematches", "deletegraph"]
        );
    }

    #[tokio::test]
    async fn off_stops_delivery() {
        let interceptor = Arc::new(StoreInterceptor::new(Arc::new(MemoryStore::new())));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = interceptor.on(move |event| {
            sink.lock().unwrap().push(event.operation());
        });

        interceptor.match_pattern(&FactPattern::any()).unwrap();
        assert!(interceptor.off(id));
        assert!(!interceptor.off(id));
        interceptor.match_pattern(&FactPattern::any()).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["match"]);
    }

    #[tokio::test]
    async fn import_event_stream_observes_all_facts() {
        let interceptor = Arc::new(StoreInterceptor::new(Arc::new(MemoryStore::new())));
        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        interceptor.on(move |event| {
            if let StoreEvent::Import { facts } = event {
                sink.lock().unwrap().push(facts.tap());
            }
        });

        interceptor
            .import(FactStream::from_facts(vec![sample_fact()]))
            .wait()
            .await
            .unwrap();

        let tap = captured.lock().unwrap().pop().unwrap();
        assert_eq!(tap.collect().await.unwrap(), vec![sample_fact()]);
    }

    #[tokio::test]
    async fn listener_may_reenter_the_interceptor() {
        let interceptor = Arc::new(StoreInterceptor::new(Arc::new(MemoryStore::new())));
        let weak = Arc::downgrade(&interceptor);
        let resolved = Arc::new(Mutex::new(0usize));
        let count = resolved.clone();
        interceptor.on(move |event| {
            if let StoreEvent::RemoveMatches { pattern } = event {
                if let Some(interceptor) = weak.upgrade() {
                    interceptor.match_pattern(pattern).unwrap();
                    *count.lock().unwrap() += 1;
                }
            }
        });

        interceptor.remove_matches(&FactPattern::any()).wait().await.unwrap();
        assert_eq!(*resolved.lock().unwrap(), 1);
    }
}
