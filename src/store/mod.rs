//! Store layer — the quad-store operation set and its decorators.
//!
//! [`GraphStore`] is the seam between this crate and whatever engine
//! actually holds the facts: five operations, lazy result streams, and
//! detached completion handles for the mutating calls.  [`MemoryStore`] is
//! the reference in-memory implementation; [`StoreInterceptor`] wraps any
//! implementation and emits one typed notification per call.

pub mod interceptor;
pub mod memory;
pub mod stream;

use std::future::Future;

use tokio::sync::oneshot;

use crate::error::AppError;
use crate::model::{FactPattern, GraphRef};

pub use interceptor::{ListenerId, StoreEvent, StoreInterceptor};
pub use memory::MemoryStore;
pub use stream::{FactRead, FactStream, FactStreamWriter};

// ── Completion handles ────────────────────────────────────────────────────────

/// Handle to a mutating store operation that may still be running.
///
/// The operation proceeds whether or not the handle is awaited; `wait`
/// exists for callers that need to know the outcome.
pub struct Completion {
    rx: oneshot::Receiver<Result<(), AppError>>,
}

impl Completion {
    /// Run `work` on a detached task and hand back a handle to its outcome.
    pub fn spawn(work: impl Future<Output = Result<(), AppError>> + Send + 'static) -> Self {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(work.await);
        });
        Self { rx }
    }

    /// A handle for an operation that already finished.
    pub fn ready(result: Result<(), AppError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// Wait for the operation to finish and return its outcome.
    pub async fn wait(self) -> Result<(), AppError> {
        self.rx
            .await
            .map_err(|_| AppError::Store("operation dropped before completing".into()))?
    }
}

// ── The store operation set ───────────────────────────────────────────────────

/// The five operations a primary quad store exposes.
///
/// Implementations are `Send + Sync`; mutating operations return a
/// [`Completion`] rather than blocking the caller, mirroring how fire-and-
/// forget store work is dispatched elsewhere in the crate.
pub trait GraphStore: Send + Sync {
    /// All facts matching `pattern`, as a lazy stream.
    fn match_pattern(&self, pattern: &FactPattern) -> Result<FactStream, AppError>;

    /// Add every fact in `facts` to the store.
    fn import(&self, facts: FactStream) -> Completion;

    /// Remove every fact in `facts` from the store.
    fn remove(&self, facts: FactStream) -> Completion;

    /// Remove all facts matching `pattern`.
    fn remove_matches(&self, pattern: &FactPattern) -> Completion;

    /// Remove every fact in the given graph.
    fn delete_graph(&self, graph: GraphRef) -> Completion;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_completion_resolves_immediately() {
        assert!(Completion::ready(Ok(())).wait().await.is_ok());

        let err = Completion::ready(Err(AppError::Store("boom".into())))
            .wait()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn spawned_completion_reports_outcome() {
        let ok = Completion::spawn(async { Ok(()) });
        assert!(ok.wait().await.is_ok());

        let failing = Completion::spawn(async { Err(AppError::Store("task failed".into())) });
        assert!(failing.wait().await.is_err());
    }
}
