//! Derivation of term assignments from the reconciled occurrences of a resource.
//!
//! Aggregation only adds: it creates missing assignments and promotes
//! suggested ones backed by a confirmed occurrence. It never removes or demotes.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AnnotationState, ResourceRef, TermAssignment, TermOccurrence, TermRef};

/// Scores the occurrences of one term in one resource.
pub trait AssignmentScorer: Send + Sync {
    fn score(&self, occurrences: &[&TermOccurrence]) -> f64;
}

/// One point per occurrence.
#[derive(Debug, Default, Clone, Copy)]
pub struct OccurrenceCount;

impl AssignmentScorer for OccurrenceCount {
    fn score(&self, occurrences: &[&TermOccurrence]) -> f64 {
        occurrences.len() as f64
    }
}

/// Sum of the analysis confidences; an occurrence without one counts as 1.0.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfidenceWeighted;

impl AssignmentScorer for ConfidenceWeighted {
    fn score(&self, occurrences: &[&TermOccurrence]) -> f64 {
        occurrences.iter().map(|o| o.score.unwrap_or(1.0)).sum()
    }
}

/// Scoring function selected by configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    #[default]
    Count,
    Confidence,
}

impl ScoringMethod {
    pub fn scorer(&self) -> Box<dyn AssignmentScorer> {
        match self {
            Self::Count => Box::new(OccurrenceCount),
            Self::Confidence => Box::new(ConfidenceWeighted),
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "count" => Some(Self::Count),
            "confidence" => Some(Self::Confidence),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentPlan {
    pub created: Vec<TermAssignment>,
    /// Ids of suggested assignments to promote to confirmed.
    pub promoted: Vec<Uuid>,
}

impl AssignmentPlan {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.promoted.is_empty()
    }
}

pub fn aggregate<'a>(
    resource: &ResourceRef,
    occurrences: impl IntoIterator<Item = &'a TermOccurrence>,
    existing: &[TermAssignment],
    scorer: &dyn AssignmentScorer,
    min_score: f64,
) -> AssignmentPlan {
    let mut by_term: BTreeMap<&TermRef, Vec<&TermOccurrence>> = BTreeMap::new();
    for occurrence in occurrences {
        by_term.entry(&occurrence.term).or_default().push(occurrence);
    }
    let assigned: HashMap<&TermRef, &TermAssignment> =
        existing.iter().map(|a| (&a.term, a)).collect();

    let mut plan = AssignmentPlan::default();
    let now = Utc::now();

    for (term, group) in by_term {
        let score = scorer.score(&group);
        if score < min_score {
            tracing::trace!(%resource, %term, score, min_score, "below assignment threshold");
            continue;
        }
        let confirmed = group.iter().any(|o| o.state.is_confirmed());
        match assigned.get(term) {
            Some(assignment) => {
                if confirmed && !assignment.state.is_confirmed() {
                    plan.promoted.push(assignment.id);
                }
            }
            None => plan.created.push(TermAssignment {
                id: Uuid::new_v4(),
                term: term.clone(),
                resource: resource.clone(),
                state: if confirmed {
                    AnnotationState::Confirmed
                } else {
                    AnnotationState::Suggested
                },
                created_at: now,
            }),
        }
    }

    plan
}
