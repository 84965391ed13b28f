//! IRI minting for newly-created resources.
//!
//! When the agent asserts a fact about something that does not exist yet,
//! it needs a fresh subject IRI.  `urn:uuid:` IRIs are collision-free
//! without any coordination or configured namespace.

use uuid::Uuid;

use crate::model::Term;

#[derive(Debug, Clone, Copy, Default)]
pub struct IriGenerator;

impl IriGenerator {
    pub fn new() -> Self {
        Self
    }

    /// A fresh `urn:uuid:` IRI.
    pub fn generate(&self) -> String {
        format!("urn:uuid:{}", Uuid::new_v4())
    }

    /// A fresh named term, ready for the subject position of a fact.
    pub fn named(&self) -> Term {
        Term::Named(self.generate())
    }
}
