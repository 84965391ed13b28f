//! Stream adapter — one lazy fact sequence over three delivery protocols.
//!
//! Store implementations in the wild hand back fact sequences in different
//! shapes: a plain iterator, a pull-style reader, or a push-style producer
//! that emits items until it signals end or failure.  [`FactStream`]
//! normalises all three behind a single async consumption contract so the
//! rest of the crate depends on exactly one.
//!
//! A stream is backed by shared state: items pulled from the source are
//! retained in a buffer, and [`FactStream::tap`] creates a second handle
//! onto the same sequence that observes it from the beginning.  This is how
//! an interceptor notification and the wrapped store can both consume "the
//! same" sequence without starving each other.  Each handle is single-pass;
//! the buffer makes taps cheap, not the source restartable.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};

use crate::error::AppError;
use crate::model::Fact;

// ── Pull protocol ─────────────────────────────────────────────────────────────

/// Pull-style fact source: `read` returns the next fact, `None` at the end,
/// or an error that terminates the sequence.
pub trait FactRead: Send {
    fn read(&mut self) -> Result<Option<Fact>, AppError>;
}

// ── Shared state ──────────────────────────────────────────────────────────────

enum Source {
    Iter(Box<dyn Iterator<Item = Fact> + Send>),
    Reader(Box<dyn FactRead>),
    /// Filled by the producer task spawned in [`FactStream::channel`].
    Channel,
}

struct Shared {
    source: Source,
    buffer: Vec<Fact>,
    done: bool,
    failed: Option<String>,
    wake: watch::Sender<u64>,
}

impl Shared {
    fn wake_consumers(&self) {
        self.wake.send_modify(|v| *v = v.wrapping_add(1));
    }
}

// ── FactStream ────────────────────────────────────────────────────────────────

/// A lazy, finite, single-pass sequence of [`Fact`]s.
pub struct FactStream {
    shared: Arc<Mutex<Shared>>,
    wake: watch::Receiver<u64>,
    cursor: usize,
}

impl std::fmt::Debug for FactStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactStream")
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

enum Step {
    Item(Fact),
    End,
    Fail(String),
    Retry,
    Wait,
}

impl FactStream {
    fn with_source(source: Source) -> Self {
        let (wake_tx, wake_rx) = watch::channel(0u64);
        Self {
            shared: Arc::new(Mutex::new(Shared {
                source,
                buffer: Vec::new(),
                done: false,
                failed: None,
                wake: wake_tx,
            })),
            wake: wake_rx,
            cursor: 0,
        }
    }

    /// A stream over an in-memory batch of facts.
    pub fn from_facts(facts: Vec<Fact>) -> Self {
        Self::from_iter(facts.into_iter())
    }

    /// A stream over a native lazy sequence.
    pub fn from_iter(iter: impl Iterator<Item = Fact> + Send + 'static) -> Self {
        Self::with_source(Source::Iter(Box::new(iter)))
    }

    /// A stream over a pull-style reader.
    pub fn from_reader(reader: impl FactRead + 'static) -> Self {
        Self::with_source(Source::Reader(Box::new(reader)))
    }

    /// A push-style stream.  The producer side pushes facts through the
    /// returned writer and ends the sequence by dropping it (or calling
    /// [`FactStreamWriter::fail`] to terminate with an error).
    ///
    /// Must be called from within a tokio runtime: the writer is bridged to
    /// the stream by a spawned forwarding task.
    pub fn channel() -> (FactStreamWriter, FactStream) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Result<Fact, String>>();
        let stream = Self::with_source(Source::Channel);
        let shared = stream.shared.clone();

        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                let mut sh = shared.lock().await;
                let failed = match item {
                    Ok(fact) => {
                        sh.buffer.push(fact);
                        false
                    }
                    Err(message) => {
                        sh.failed = Some(message);
                        true
                    }
                };
                sh.wake_consumers();
                if failed {
                    return;
                }
            }
            let mut sh = shared.lock().await;
            sh.done = true;
            sh.wake_consumers();
        });

        (FactStreamWriter { tx }, stream)
    }

    /// A second handle onto the same sequence, observing it from the
    /// beginning.  Items already pulled by another handle replay from the
    /// shared buffer.
    pub fn tap(&self) -> FactStream {
        FactStream {
            shared: self.shared.clone(),
            wake: self.wake.clone(),
            cursor: 0,
        }
    }

    /// The next fact, `None` at the end of the sequence, or the source's
    /// failure once all items buffered before it have been delivered.
    pub async fn next(&mut self) -> Result<Option<Fact>, AppError> {
        loop {
            // Mark the current wake generation as seen before inspecting
            // state, so a producer update between the check and the wait
            // still registers as a change.
            self.wake.borrow_and_update();

            let step = {
                let mut sh = self.shared.lock().await;
                if self.cursor < sh.buffer.len() {
                    let fact = sh.buffer[self.cursor].clone();
                    self.cursor += 1;
                    Step::Item(fact)
                } else if let Some(message) = sh.failed.clone() {
                    Step::Fail(message)
                } else if sh.done {
                    Step::End
                } else {
                    match &mut sh.source {
                        Source::Iter(iter) => {
                            match iter.next() {
                                Some(fact) => sh.buffer.push(fact),
                                None => sh.done = true,
                            }
                            Step::Retry
                        }
                        Source::Reader(reader) => {
                            match reader.read() {
                                Ok(Some(fact)) => sh.buffer.push(fact),
                                Ok(None) => sh.done = true,
                                Err(e) => sh.failed = Some(e.to_string()),
                            }
                            Step::Retry
                        }
                        Source::Channel => Step::Wait,
                    }
                }
            };

            match step {
                Step::Item(fact) => return Ok(Some(fact)),
                Step::End => return Ok(None),
                Step::Fail(message) => return Err(AppError::Stream(message)),
                Step::Retry => {}
                Step::Wait => {
                    if self.wake.changed().await.is_err() {
                        return Err(AppError::Stream("stream producer vanished".into()));
                    }
                }
            }
        }
    }

    /// Drain the remaining sequence into a vector.
    pub async fn collect(mut self) -> Result<Vec<Fact>, AppError> {
        let mut facts = Vec::new();
        while let Some(fact) = self.next().await? {
            facts.push(fact);
        }
        Ok(facts)
    }
}

impl Clone for FactStream {
    fn clone(&self) -> Self {
        self.tap()
    }
}

// ── Push protocol writer ──────────────────────────────────────────────────────

/// Producer side of [`FactStream::channel`].
pub struct FactStreamWriter {
    tx: mpsc::UnboundedSender<Result<Fact, String>>,
}

impl FactStreamWriter {
    pub fn push(&self, fact: Fact) {
        let _ = self.tx.send(Ok(fact));
    }

    /// Terminate the sequence with an error.  Items pushed earlier are still
    /// delivered before consumers observe the failure.
    pub fn fail(self, message: impl Into<String>) {
        let _ = self.tx.send(Err(message.into()));
    }

    /// End the sequence.  Equivalent to dropping the writer.
    pub fn end(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Term;

    fn fact(n: u32) -> Fact {
        Fact::triple(
            Term::named(format!("http://example.org/s{n}")),
            Term::named("http://example.org/p"),
            Term::literal(format!("v{n}")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn iter_stream_preserves_order() {
        let stream = FactStream::from_facts(vec![fact(1), fact(2), fact(3)]);
        let facts = stream.collect().await.unwrap();
        assert_eq!(facts, vec![fact(1), fact(2), fact(3)]);
    }

    #[tokio::test]
    async fn reader_stream_drains_until_none() {
        struct CountDown(u32);
        impl FactRead for CountDown {
            fn read(&mut self) -> Result<Option<Fact>, AppError> {
                if self.0 == 0 {
                    return Ok(None);
                }
                self.0 -= 1;
                Ok(Some(fact(self.0)))
            }
        }

        let facts = FactStream::from_reader(CountDown(3)).collect().await.unwrap();
        assert_eq!(facts, vec![fact(2), fact(1), fact(0)]);
    }

    #[tokio::test]
    async fn reader_error_terminates_stream() {
        struct OneThenFail(bool);
        impl FactRead for OneThenFail {
            fn read(&mut self) -> Result<Option<Fact>, AppError> {
                if !self.0 {
                    self.0 = true;
                    return Ok(Some(fact(1)));
                }
                Err(AppError::Stream("reader broke".into()))
            }
        }

        let mut stream = FactStream::from_reader(OneThenFail(false));
        assert_eq!(stream.next().await.unwrap(), Some(fact(1)));
        let err = stream.next().await.unwrap_err();
        assert!(err.to_string().contains("reader broke"));
    }

    #[tokio::test]
    async fn channel_stream_delivers_pushed_facts() {
        let (writer, stream) = FactStream::channel();
        writer.push(fact(1));
        writer.push(fact(2));
        writer.end();

        let facts = stream.collect().await.unwrap();
        assert_eq!(facts, vec![fact(1), fact(2)]);
    }

    #[tokio::test]
    async fn channel_error_surfaces_after_buffered_items() {
        let (writer, mut stream) = FactStream::channel();
        writer.push(fact(1));
        writer.fail("producer exploded");

        assert_eq!(stream.next().await.unwrap(), Some(fact(1)));
        let err = stream.next().await.unwrap_err();
        assert!(err.to_string().contains("producer exploded"));
    }

    #[tokio::test]
    async fn dropping_writer_ends_stream() {
        let (writer, stream) = FactStream::channel();
        writer.push(fact(1));
        drop(writer);

        let facts = stream.collect().await.unwrap();
        assert_eq!(facts, vec![fact(1)]);
    }

    #[tokio::test]
    async fn tap_replays_the_full_sequence() {
        let mut primary = FactStream::from_facts(vec![fact(1), fact(2)]);
        let tap = primary.tap();

        // Drain the primary handle completely first.
        assert_eq!(primary.next().await.unwrap(), Some(fact(1)));
        assert_eq!(primary.next().await.unwrap(), Some(fact(2)));
        assert_eq!(primary.next().await.unwrap(), None);

        // The tap still observes every item, replayed from the buffer.
        let facts = tap.collect().await.unwrap();
        assert_eq!(facts, vec![fact(1), fact(2)]);
    }

    #[tokio::test]
    async fn concurrent_taps_each_see_all_items() {
        let (writer, stream) = FactStream::channel();
        let tap = stream.tap();

        let a = tokio::spawn(stream.collect());
        let b = tokio::spawn(tap.collect());

        writer.push(fact(1));
        writer.push(fact(2));
        writer.end();

        assert_eq!(a.await.unwrap().unwrap(), vec![fact(1), fact(2)]);
        assert_eq!(b.await.unwrap().unwrap(), vec![fact(1), fact(2)]);
    }
}
