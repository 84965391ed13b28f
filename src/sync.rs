//! Index synchroniser — keeps a fact index consistent with an intercepted
//! store.
//!
//! [`attach`] registers one listener on a [`StoreInterceptor`] and spawns a
//! worker task that owns the fact→entry mapping.  The listener does the
//! synchronous part at emission time — tapping the carried stream, or
//! resolving a removal pattern against pre-mutation store state — and
//! enqueues a job; the worker applies jobs to the index strictly in
//! emission order.
//!
//! Synchronisation is eventually consistent with the store.  Callers that
//! need read-after-write behaviour against the index await
//! [`SyncHandle::settled`] first.  Handler failures never reach the caller
//! that triggered them; they surface on the diagnostics channel (and the
//! log) instead.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, warn};

use crate::index::{EntryId, FactIndex, FieldFilter, IndexDocument, SearchQuery};
use crate::model::{Fact, FactPattern};
use crate::store::interceptor::{ListenerId, StoreEvent, StoreInterceptor};
use crate::store::stream::FactStream;
use crate::store::GraphStore;

// ── Options ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Hit cap for the fallback field-equality search used when a removal
    /// finds no mapping entry.
    pub fallback_search_limit: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { fallback_search_limit: 100 }
    }
}

// ── Diagnostics ───────────────────────────────────────────────────────────────

/// One observable synchronisation incident, timestamped at emission.
#[derive(Debug, Clone, Serialize)]
pub struct SyncDiagnostic {
    /// RFC 3339 timestamp.
    pub at: String,
    pub kind: SyncDiagnosticKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SyncDiagnosticKind {
    /// An index insert or remove failed for one fact; the rest of the batch
    /// still ran.
    IndexFailed { signature: String, detail: String },
    /// A removal found neither a mapping entry nor a fallback hit.  Not an
    /// error — the fact may never have been indexed — but observable.
    RemoveUnmatched { signature: String },
    /// The sequence carried by a notification failed mid-drain; the
    /// remainder of that batch was abandoned.
    StreamFailed { operation: String, detail: String },
    /// Re-querying the store to resolve a pattern removal failed.
    ResolveFailed { operation: String, detail: String },
}

impl SyncDiagnostic {
    fn new(kind: SyncDiagnosticKind) -> Self {
        Self {
            at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            kind,
        }
    }
}

type DiagnosticSender = mpsc::UnboundedSender<SyncDiagnostic>;

fn report(diagnostics: &DiagnosticSender, kind: SyncDiagnosticKind) {
    let _ = diagnostics.send(SyncDiagnostic::new(kind));
}

// ── Sync state ────────────────────────────────────────────────────────────────

/// The fact→entry mapping.  Owned by exactly one worker; moved in and out
/// of blocking sections rather than shared, and never persisted.
#[derive(Debug, Default, Clone)]
pub struct SyncState {
    entries: HashMap<String, EntryId>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, signature: String, id: EntryId) {
        self.entries.insert(signature, id);
    }

    pub fn take(&mut self, signature: &str) -> Option<EntryId> {
        self.entries.remove(signature)
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.entries.contains_key(signature)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Pending-work gauge ────────────────────────────────────────────────────────

/// Counts notifications whose index effects have not yet been applied.
/// Incremented at emission time on the caller's task, decremented by the
/// worker after the job finishes, so `idle` observing zero means every
/// notification emitted so far has been applied.
struct PendingWork {
    count: AtomicUsize,
    notify: Notify,
}

impl PendingWork {
    fn new() -> Self {
        Self { count: AtomicUsize::new(0), notify: Notify::new() }
    }

    fn begin(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify.notify_waiters();
        }
    }

    async fn idle(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            // Register before checking, so a finish() between the check and
            // the await still wakes us.
            notified.as_mut().enable();
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

// ── Jobs ──────────────────────────────────────────────────────────────────────

enum SyncJob {
    Index { facts: FactStream },
    Deindex { facts: FactStream, operation: &'static str },
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Owner's handle to a running synchroniser.
///
/// Dropping the handle detaches it just like [`SyncHandle::detach`]:
/// already-queued work finishes, later mutations are no longer observed.
pub struct SyncHandle {
    interceptor: Arc<StoreInterceptor>,
    listener: Option<ListenerId>,
    jobs: Option<mpsc::UnboundedSender<SyncJob>>,
    pending: Arc<PendingWork>,
    diagnostics: Option<mpsc::UnboundedReceiver<SyncDiagnostic>>,
}

impl SyncHandle {
    /// Resolves once every notification emitted so far has been applied to
    /// the index.
    pub async fn settled(&self) {
        self.pending.idle().await;
    }

    /// Stop observing the interceptor.  Jobs already queued still run;
    /// mutations after this call are not reflected in the index.
    pub fn detach(mut self) {
        self.release();
    }

    /// The error-reporting channel for detached handler failures and sync
    /// divergence.  Yields `None` once, after which the handle keeps the
    /// receiver's slot empty.
    pub fn take_diagnostics(&mut self) -> Option<mpsc::UnboundedReceiver<SyncDiagnostic>> {
        self.diagnostics.take()
    }

    fn release(&mut self) {
        if let Some(id) = self.listener.take() {
            self.interceptor.off(id);
        }
        // Dropping the sender lets the worker drain its queue and exit.
        self.jobs = None;
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.release();
    }
}

// ── Attach ────────────────────────────────────────────────────────────────────

/// Wire a synchroniser between `interceptor` and `index`.
///
/// One listener is registered for the interceptor's notifications and one
/// worker task is spawned to apply them.  The returned handle is the only
/// way to detach them again.
pub fn attach(
    interceptor: &Arc<StoreInterceptor>,
    index: Arc<dyn FactIndex>,
    options: SyncOptions,
) -> SyncHandle {
    let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
    let (diag_tx, diag_rx) = mpsc::unbounded_channel();
    let pending = Arc::new(PendingWork::new());

    tokio::spawn(worker(jobs_rx, index, options, diag_tx.clone(), pending.clone()));

    // The listener holds only a weak interceptor reference: the interceptor
    // owns the listener, and a strong reference would keep both alive
    // forever.
    let weak = Arc::downgrade(interceptor);
    let listener_jobs = jobs_tx.clone();
    let listener_pending = pending.clone();
    let listener_diag = diag_tx;

    let listener = interceptor.on(move |event| {
        let enqueue = |job: SyncJob| {
            listener_pending.begin();
            if listener_jobs.send(job).is_err() {
                listener_pending.finish();
            }
        };

        match event {
            StoreEvent::Match { .. } => {}
            StoreEvent::Import { facts } => {
                enqueue(SyncJob::Index { facts: facts.tap() });
            }
            StoreEvent::Remove { facts } => {
                enqueue(SyncJob::Deindex { facts: facts.tap(), operation: "remove" });
            }
            StoreEvent::RemoveMatches { pattern } => {
                resolve_removal(&weak, pattern.clone(), "removematches", &enqueue, &listener_diag);
            }
            StoreEvent::DeleteGraph { graph } => {
                let pattern = FactPattern::any().graph(graph.to_term());
                resolve_removal(&weak, pattern, "deletegraph", &enqueue, &listener_diag);
            }
        }
    });

    SyncHandle {
        interceptor: interceptor.clone(),
        listener: Some(listener),
        jobs: Some(jobs_tx),
        pending,
        diagnostics: Some(diag_rx),
    }
}

/// Resolve which facts a pattern removal affects by re-querying the store
/// through the interceptor.  Runs synchronously during emission, before the
/// store applies the removal, so the match observes pre-mutation state.
fn resolve_removal(
    interceptor: &std::sync::Weak<StoreInterceptor>,
    pattern: FactPattern,
    operation: &'static str,
    enqueue: &impl Fn(SyncJob),
    diagnostics: &DiagnosticSender,
) {
    let Some(interceptor) = interceptor.upgrade() else {
        return;
    };
    match interceptor.match_pattern(&pattern) {
        Ok(facts) => enqueue(SyncJob::Deindex { facts, operation }),
        Err(e) => {
            warn!(operation, error = %e, "failed to resolve facts for removal");
            report(
                diagnostics,
                SyncDiagnosticKind::ResolveFailed { operation: operation.into(), detail: e.to_string() },
            );
        }
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

async fn worker(
    mut jobs: mpsc::UnboundedReceiver<SyncJob>,
    index: Arc<dyn FactIndex>,
    options: SyncOptions,
    diagnostics: DiagnosticSender,
    pending: Arc<PendingWork>,
) {
    let mut state = SyncState::new();
    while let Some(job) = jobs.recv().await {
        state = run_job(job, state, &index, &options, &diagnostics).await;
        pending.finish();
    }
    debug!(mapped = state.len(), "index synchroniser stopped");
}

async fn run_job(
    job: SyncJob,
    state: SyncState,
    index: &Arc<dyn FactIndex>,
    options: &SyncOptions,
    diagnostics: &DiagnosticSender,
) -> SyncState {
    let (facts, operation, removal) = match job {
        SyncJob::Index { facts } => (facts, "import", false),
        SyncJob::Deindex { facts, operation } => (facts, operation, true),
    };

    let batch = match facts.collect().await {
        Ok(batch) => batch,
        Err(e) => {
            warn!(operation, error = %e, "notification stream failed");
            report(
                diagnostics,
                SyncDiagnosticKind::StreamFailed { operation: operation.into(), detail: e.to_string() },
            );
            return state;
        }
    };

    // Index calls are blocking I/O; run the batch off the async executor,
    // moving the mapping in and out so it stays singly owned.
    let snapshot = state.clone();
    let index = index.clone();
    let diagnostics_task = diagnostics.clone();
    let fallback_limit = options.fallback_search_limit;
    let result = tokio::task::spawn_blocking(move || {
        if removal {
            deindex_batch(batch, state, &*index, fallback_limit, &diagnostics_task)
        } else {
            index_batch(batch, state, &*index, &diagnostics_task)
        }
    })
    .await;

    match result {
        Ok(state) => state,
        Err(e) => {
            warn!(operation, error = %e, "index batch task failed");
            snapshot
        }
    }
}

fn index_batch(
    facts: Vec<Fact>,
    mut state: SyncState,
    index: &dyn FactIndex,
    diagnostics: &DiagnosticSender,
) -> SyncState {
    for fact in facts {
        let signature = fact.signature();
        if state.contains(&signature) {
            debug!(%signature, "fact already indexed, skipping");
            continue;
        }
        let doc = IndexDocument::from(&fact);
        match index.insert(&doc) {
            Ok(id) => {
                state.record(signature, id);
            }
            Err(e) => {
                warn!(%signature, error = %e, "index insert failed");
                report(
                    diagnostics,
                    SyncDiagnosticKind::IndexFailed { signature, detail: e.to_string() },
                );
            }
        }
    }
    state
}

fn deindex_batch(
    facts: Vec<Fact>,
    mut state: SyncState,
    index: &dyn FactIndex,
    fallback_limit: usize,
    diagnostics: &DiagnosticSender,
) -> SyncState {
    for fact in facts {
        let signature = fact.signature();

        if let Some(id) = state.take(&signature) {
            if let Err(e) = index.remove(&id) {
                warn!(%signature, error = %e, "index remove failed");
                report(
                    diagnostics,
                    SyncDiagnosticKind::IndexFailed { signature, detail: e.to_string() },
                );
            }
            continue;
        }

        // No mapping — the fact may have been indexed before this
        // synchroniser attached.  Fall back to an exact field-equality
        // search and remove the first hit.
        let doc = IndexDocument::from(&fact);
        let query = SearchQuery::fields(FieldFilter::for_document(&doc), fallback_limit);
        match index.search(&query) {
            Ok(hits) => match hits.into_iter().next() {
                Some(hit) => {
                    if let Err(e) = index.remove(&hit.id) {
                        warn!(%signature, error = %e, "fallback index remove failed");
                        report(
                            diagnostics,
                            SyncDiagnosticKind::IndexFailed { signature, detail: e.to_string() },
                        );
                    }
                }
                None => {
                    debug!(%signature, "removal found no index entry");
                    report(diagnostics, SyncDiagnosticKind::RemoveUnmatched { signature });
                }
            },
            Err(e) => {
                warn!(%signature, error = %e, "fallback index search failed");
                report(
                    diagnostics,
                    SyncDiagnosticKind::IndexFailed { signature, detail: e.to_string() },
                );
            }
        }
    }
    state
}
