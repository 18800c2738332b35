//! Keyed merge of freshly found occurrences into the persisted set of a resource.
//!
//! Matching is by value, on [`OccurrenceKey`] (term + quote selector), never by
//! row id. A matched row is kept as it is, so its id and its review state
//! survive re-analysis. Unmatched suggested rows are dropped; unmatched
//! confirmed rows are retained.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use uuid::Uuid;

use crate::selector::FoundOccurrence;
use crate::types::{AnnotationState, OccurrenceKey, OccurrenceTarget, ResourceRef, TermOccurrence};

/// Outcome of reconciling one analysis run against the persisted occurrences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Persisted occurrences that stay, untouched.
    pub kept: Vec<TermOccurrence>,
    /// New occurrences to insert.
    pub created: Vec<TermOccurrence>,
    /// Persisted occurrences to delete.
    pub dropped: Vec<TermOccurrence>,
    /// Confirmed occurrences kept although this run did not find them again.
    pub retained_confirmed: usize,
    /// Duplicate keys met (and deduplicated) on either side.
    pub violations: usize,
}

impl Reconciliation {
    /// The reconciled set: kept plus created.
    pub fn occurrences(&self) -> impl Iterator<Item = &TermOccurrence> {
        self.kept.iter().chain(self.created.iter())
    }

    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.dropped.is_empty()
    }
}

pub fn reconcile(
    source: &ResourceRef,
    found: Vec<FoundOccurrence>,
    existing: Vec<TermOccurrence>,
) -> Reconciliation {
    let mut out = Reconciliation::default();

    // Index persisted rows by key; a confirmed row is the canonical match for its key.
    let mut index: HashMap<OccurrenceKey, usize> = HashMap::with_capacity(existing.len());
    for (i, occurrence) in existing.iter().enumerate() {
        let key = occurrence.key();
        match index.get(&key).copied() {
            None => {
                index.insert(key, i);
            }
            Some(current) => {
                out.violations += 1;
                tracing::warn!(
                    resource = %source,
                    term = %occurrence.term,
                    first = %existing[current].id,
                    duplicate = %occurrence.id,
                    "persisted occurrences share a key"
                );
                if occurrence.state.is_confirmed() && !existing[current].state.is_confirmed() {
                    index.insert(key, i);
                }
            }
        }
    }

    let mut matched: HashSet<usize> = HashSet::with_capacity(found.len());
    let mut seen: HashSet<OccurrenceKey> = HashSet::with_capacity(found.len());
    let now = Utc::now();

    for occurrence in found {
        let key = OccurrenceKey {
            term: occurrence.term.clone(),
            quote: occurrence.quote.clone(),
        };
        if !seen.insert(key.clone()) {
            out.violations += 1;
            tracing::warn!(
                resource = %source,
                term = %occurrence.term,
                quote = %occurrence.quote.exact,
                "duplicate occurrence key in one analysis run, dropping duplicate"
            );
            continue;
        }
        match index.get(&key) {
            Some(&i) => {
                matched.insert(i);
            }
            None => out.created.push(TermOccurrence {
                id: Uuid::new_v4(),
                term: occurrence.term,
                target: OccurrenceTarget {
                    source: source.clone(),
                    quote: occurrence.quote,
                    position: Some(occurrence.position),
                },
                state: AnnotationState::Suggested,
                score: occurrence.score,
                created_at: now,
            }),
        }
    }

    for (i, occurrence) in existing.into_iter().enumerate() {
        if matched.contains(&i) {
            out.kept.push(occurrence);
        } else if occurrence.state.is_confirmed() {
            out.retained_confirmed += 1;
            out.kept.push(occurrence);
        } else {
            out.dropped.push(occurrence);
        }
    }

    out
}
