//! Data model — terms, facts, and match patterns.
//!
//! A [`Fact`] is an immutable 4-tuple of [`Term`]s: subject, predicate,
//! object, and the graph (partition) it belongs to.  Facts are never
//! mutated in place; "updating" data means removing one fact and importing
//! another.  A [`FactPattern`] is the same shape with every position
//! optional, used for querying and bulk removal.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ── Terms ─────────────────────────────────────────────────────────────────────

/// One position of a fact.
///
/// `Named` carries an IRI, `Blank` an anonymous-node label, `Variable` a
/// query-variable name.  `DefaultGraph` is the sentinel for the implicit,
/// unnamed partition and only makes sense in the graph position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    Named(String),
    Blank(String),
    Literal {
        value: String,
        language: Option<String>,
        /// IRI of the literal's datatype, when one was given.
        datatype: Option<String>,
    },
    Variable(String),
    DefaultGraph,
}

impl Term {
    pub fn named(iri: impl Into<String>) -> Self {
        Term::Named(iri.into())
    }

    pub fn blank(label: impl Into<String>) -> Self {
        Term::Blank(label.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal { value: value.into(), language: None, datatype: None }
    }

    pub fn literal_lang(value: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal { value: value.into(), language: Some(language.into()), datatype: None }
    }

    pub fn literal_typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal { value: value.into(), language: None, datatype: Some(datatype.into()) }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Term::Variable(name.into())
    }

    /// The string projection of this term: the IRI, label, name or literal
    /// value.  The default graph projects to the empty string.
    pub fn value(&self) -> &str {
        match self {
            Term::Named(iri) => iri,
            Term::Blank(label) => label,
            Term::Literal { value, .. } => value,
            Term::Variable(name) => name,
            Term::DefaultGraph => "",
        }
    }

    pub fn is_default_graph(&self) -> bool {
        matches!(self, Term::DefaultGraph)
    }

    /// Short kind name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Term::Named(_) => "named",
            Term::Blank(_) => "blank",
            Term::Literal { .. } => "literal",
            Term::Variable(_) => "variable",
            Term::DefaultGraph => "default-graph",
        }
    }
}

// ── Facts ─────────────────────────────────────────────────────────────────────

/// An immutable (subject, predicate, object, graph) quad.
///
/// Construction is checked: literals cannot appear in the subject or
/// predicate position, and blank nodes cannot appear in the predicate
/// position.  The graph position defaults to [`Term::DefaultGraph`] when
/// built with [`Fact::triple`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    subject: Term,
    predicate: Term,
    object: Term,
    graph: Term,
}

impl Fact {
    pub fn new(subject: Term, predicate: Term, object: Term, graph: Term) -> Result<Self, AppError> {
        if matches!(subject, Term::Literal { .. }) {
            return Err(AppError::Model(format!(
                "{} term cannot be a subject",
                subject.kind()
            )));
        }
        if matches!(predicate, Term::Literal { .. } | Term::Blank(_)) {
            return Err(AppError::Model(format!(
                "{} term cannot be a predicate",
                predicate.kind()
            )));
        }
        Ok(Self { subject, predicate, object, graph })
    }

    /// A fact in the default graph.
    pub fn triple(subject: Term, predicate: Term, object: Term) -> Result<Self, AppError> {
        Self::new(subject, predicate, object, Term::DefaultGraph)
    }

    pub fn subject(&self) -> &Term {
        &self.subject
    }

    pub fn predicate(&self) -> &Term {
        &self.predicate
    }

    pub fn object(&self) -> &Term {
        &self.object
    }

    pub fn graph(&self) -> &Term {
        &self.graph
    }

    /// Derived string key `subject|predicate|object|graph` built from the
    /// term projections.  Two structurally different facts can share a
    /// signature when their projections coincide (e.g. a named node and a
    /// literal with the same value); consumers tolerate that precision loss.
    pub fn signature(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.subject.value(),
            self.predicate.value(),
            self.object.value(),
            self.graph.value()
        )
    }
}

// ── Patterns ──────────────────────────────────────────────────────────────────

/// A fact template with optional positions; `None` matches any value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactPattern {
    pub subject: Option<Term>,
    pub predicate: Option<Term>,
    pub object: Option<Term>,
    pub graph: Option<Term>,
}

impl FactPattern {
    /// The wildcard pattern: matches every fact.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn subject(mut self, term: Term) -> Self {
        self.subject = Some(term);
        self
    }

    pub fn predicate(mut self, term: Term) -> Self {
        self.predicate = Some(term);
        self
    }

    pub fn object(mut self, term: Term) -> Self {
        self.object = Some(term);
        self
    }

    pub fn graph(mut self, term: Term) -> Self {
        self.graph = Some(term);
        self
    }

    pub fn matches(&self, fact: &Fact) -> bool {
        fn position(bound: &Option<Term>, term: &Term) -> bool {
            match bound {
                None => true,
                Some(t) => t == term,
            }
        }

        position(&self.subject, fact.subject())
            && position(&self.predicate, fact.predicate())
            && position(&self.object, fact.object())
            && position(&self.graph, fact.graph())
    }
}

// ── Graph references ──────────────────────────────────────────────────────────

/// The argument of `delete_graph`: either a structured term or a raw IRI
/// string, which normalises to a named term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphRef {
    Term(Term),
    Iri(String),
}

impl GraphRef {
    pub fn to_term(&self) -> Term {
        match self {
            GraphRef::Term(term) => term.clone(),
            GraphRef::Iri(iri) => Term::Named(iri.clone()),
        }
    }
}

impl From<Term> for GraphRef {
    fn from(term: Term) -> Self {
        GraphRef::Term(term)
    }
}

impl From<&str> for GraphRef {
    fn from(iri: &str) -> Self {
        GraphRef::Iri(iri.to_string())
    }
}

impl From<String> for GraphRef {
    fn from(iri: String) -> Self {
        GraphRef::Iri(iri)
    }
}
