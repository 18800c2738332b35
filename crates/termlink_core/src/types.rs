//! Domain types shared by every stage of the annotation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Term ──────────────────────────────────────────────────────

/// Stable identifier of a vocabulary term (its IRI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermRef(String);

impl TermRef {
    pub fn new(iri: impl Into<String>) -> Self {
        Self(iri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TermRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TermRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub iri: TermRef,
    pub label: String,
    #[serde(default)]
    pub definition: String,
}

// ── Resource ──────────────────────────────────────────────────

/// What an occurrence or assignment is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "iri", rename_all = "snake_case")]
pub enum ResourceRef {
    /// A stored file (document).
    File(String),
    /// The definition text of a term.
    TermDefinition(TermRef),
}

impl ResourceRef {
    pub fn file(iri: impl Into<String>) -> Self {
        Self::File(iri.into())
    }

    pub fn term_definition(iri: impl Into<String>) -> Self {
        Self::TermDefinition(TermRef::new(iri))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::TermDefinition(_) => "term",
        }
    }

    pub fn iri(&self) -> &str {
        match self {
            Self::File(iri) => iri,
            Self::TermDefinition(term) => term.as_str(),
        }
    }

    /// Inverse of (`kind()`, `iri()`).
    pub fn from_parts(kind: &str, iri: &str) -> Option<Self> {
        match kind {
            "file" => Some(Self::File(iri.to_string())),
            "term" => Some(Self::TermDefinition(TermRef::new(iri))),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.iri())
    }
}

// ── Lifecycle state ───────────────────────────────────────────

/// Review state of an occurrence or assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationState {
    #[default]
    Suggested,
    Confirmed,
}

impl AnnotationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Suggested => "suggested",
            Self::Confirmed => "confirmed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "suggested" => Some(Self::Suggested),
            "confirmed" => Some(Self::Confirmed),
            _ => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

impl std::fmt::Display for AnnotationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Selectors ─────────────────────────────────────────────────

/// Content-based locator: the quoted text plus its immediate context.
///
/// Two selectors denote the same location iff all three strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextQuoteSelector {
    pub exact: String,
    pub prefix: String,
    pub suffix: String,
}

/// Character range the mention had in the analysed text. Run-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPositionSelector {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceTarget {
    pub source: ResourceRef,
    pub quote: TextQuoteSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<TextPositionSelector>,
}

// ── Occurrence ────────────────────────────────────────────────

/// Identity of an occurrence for reconciliation, independent of its row id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccurrenceKey {
    pub term: TermRef,
    pub quote: TextQuoteSelector,
}

/// A located mention of a term in a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermOccurrence {
    pub id: Uuid,
    pub term: TermRef,
    pub target: OccurrenceTarget,
    pub state: AnnotationState,
    /// Confidence reported by the analysis, when it reported one.
    #[serde(default)]
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl TermOccurrence {
    pub fn key(&self) -> OccurrenceKey {
        OccurrenceKey {
            term: self.term.clone(),
            quote: self.target.quote.clone(),
        }
    }

    pub fn source(&self) -> &ResourceRef {
        &self.target.source
    }
}

// ── Assignment ────────────────────────────────────────────────

/// "This resource is about this term", derived from its occurrences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermAssignment {
    pub id: Uuid,
    pub term: TermRef,
    pub resource: ResourceRef,
    pub state: AnnotationState,
    pub created_at: DateTime<Utc>,
}
