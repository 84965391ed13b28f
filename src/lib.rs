//! quadsync — quad-store interception and full-text index synchronisation
//! for graph-backed agents.
//!
//! The crate wires two stores together without coupling either to the
//! other:
//!
//! - [`store::StoreInterceptor`] decorates a [`store::GraphStore`] and emits
//!   one typed [`store::StoreEvent`] per operation, before delegating.
//! - [`store::FactStream`] normalises the three ways fact sequences are
//!   delivered (iterator, pull reader, push channel) into one lazy
//!   contract.
//! - [`sync::attach`] subscribes a synchroniser that mirrors store
//!   mutations into a [`index::FactIndex`], tracking which index entry
//!   belongs to which fact.
//!
//! The primary store stays authoritative; the index follows, eventually.
//! [`sync::SyncHandle::settled`] is the opt-in barrier for callers that
//! need read-after-write behaviour against the index.

pub mod config;
pub mod error;
pub mod index;
pub mod iri;
pub mod logger;
pub mod model;
pub mod search;
pub mod store;
pub mod sync;

pub use error::AppError;
pub use model::{Fact, FactPattern, GraphRef, Term};
pub use store::{Completion, FactStream, GraphStore, MemoryStore, StoreInterceptor};
pub use sync::{SyncHandle, SyncOptions, attach};
