//! Candidate extraction from an analysed document.
//!
//! Turns the annotated elements of an [`AnnotatedDocument`] into an ordered list
//! of [`CandidateMention`]s. Elements this engine cannot use are skipped and
//! reported; a reference to a term the vocabulary does not know fails the run.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::{AnnotationError, Result};
use crate::markup::{AnnotatedDocument, AnnotatedElement, ATTR_RESOURCE, ATTR_SCORE, ATTR_TYPE};
use crate::types::{ResourceRef, TermRef};

/// `typeof` of a mention of a known term.
pub const TERM_OCCURRENCE_TYPE: &str = "term-occurrence";
/// `typeof` of a new-term (keyword) suggestion.
pub const TERM_SUGGESTION_TYPE: &str = "term-suggestion";

/// A mention found by one analysis run, before overlap resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMention {
    /// `None` for a new-term suggestion.
    pub term: Option<TermRef>,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub score: Option<f64>,
}

impl CandidateMention {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &CandidateMention) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Why an element did not become a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    UnsupportedAnnotationKind(String),
    EmptyAnnotationContent,
    /// A term mentioned inside its own definition.
    SelfReference,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedAnnotationKind(kind) => write!(f, "unsupported annotation kind '{kind}'"),
            Self::EmptyAnnotationContent => f.write_str("empty annotation content"),
            Self::SelfReference => f.write_str("term referenced in its own definition"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedElement {
    /// Index into [`AnnotatedDocument::elements`].
    pub index: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub candidates: Vec<CandidateMention>,
    pub skipped: Vec<SkippedElement>,
}

enum ElementKind {
    Occurrence,
    Suggestion,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CandidateExtractor;

impl CandidateExtractor {
    /// Distinct term IRIs referenced by supported, non-empty elements.
    ///
    /// The caller resolves these against the vocabulary before [`Self::extract`].
    pub fn term_references(&self, doc: &AnnotatedDocument) -> BTreeSet<TermRef> {
        doc.elements
            .iter()
            .filter(|el| matches!(classify(el), Ok(ElementKind::Occurrence)))
            .filter(|el| has_content(el))
            .filter_map(|el| el.attribute(ATTR_RESOURCE))
            .filter(|iri| !iri.trim().is_empty())
            .map(|iri| TermRef::new(iri.trim()))
            .collect()
    }

    /// Extract candidates in document order.
    ///
    /// `is_known` answers whether a referenced term exists in the vocabulary.
    pub fn extract(
        &self,
        doc: &AnnotatedDocument,
        origin: &ResourceRef,
        is_known: impl Fn(&TermRef) -> bool,
    ) -> Result<Extraction> {
        let mut out = Extraction::default();

        for (index, el) in doc.elements.iter().enumerate() {
            let kind = match classify(el) {
                Ok(kind) => kind,
                Err(reason) => {
                    skip(&mut out, index, el, reason);
                    continue;
                }
            };

            if !has_content(el) {
                skip(&mut out, index, el, SkipReason::EmptyAnnotationContent);
                continue;
            }

            let term = match kind {
                ElementKind::Suggestion => None,
                ElementKind::Occurrence => {
                    let iri = el.attribute(ATTR_RESOURCE).map(str::trim).unwrap_or("");
                    if iri.is_empty() {
                        skip(&mut out, index, el, SkipReason::EmptyAnnotationContent);
                        continue;
                    }
                    let term = TermRef::new(iri);
                    if !is_known(&term) {
                        return Err(AnnotationError::UnknownTermReference(term));
                    }
                    if matches!(origin, ResourceRef::TermDefinition(own) if *own == term) {
                        skip(&mut out, index, el, SkipReason::SelfReference);
                        continue;
                    }
                    Some(term)
                }
            };

            out.candidates.push(CandidateMention {
                term,
                text: el.content.clone(),
                start: el.start,
                end: el.end,
                score: parse_score(el),
            });
        }

        Ok(out)
    }
}

fn classify(el: &AnnotatedElement) -> std::result::Result<ElementKind, SkipReason> {
    match el.attribute(ATTR_TYPE).map(str::trim) {
        Some(TERM_OCCURRENCE_TYPE) => Ok(ElementKind::Occurrence),
        Some(TERM_SUGGESTION_TYPE) => Ok(ElementKind::Suggestion),
        other => Err(SkipReason::UnsupportedAnnotationKind(
            other.unwrap_or_default().to_string(),
        )),
    }
}

/// Non-blank text over a non-empty character range.
fn has_content(el: &AnnotatedElement) -> bool {
    el.start < el.end && !el.content.trim().is_empty()
}

fn skip(out: &mut Extraction, index: usize, el: &AnnotatedElement, reason: SkipReason) {
    tracing::debug!(
        element = index,
        start = el.start,
        end = el.end,
        %reason,
        "skipping annotated element"
    );
    out.skipped.push(SkippedElement { index, reason });
}

fn parse_score(el: &AnnotatedElement) -> Option<f64> {
    let raw = el.attribute(ATTR_SCORE)?;
    match raw.trim().parse::<f64>() {
        Ok(score) if score.is_finite() => Some(score),
        _ => {
            tracing::debug!(score = raw, "ignoring unparseable occurrence score");
            None
        }
    }
}
