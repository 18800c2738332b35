//! Overlap resolution between candidates of one analysis run.
//!
//! Candidates are scanned in document order and accepted greedily: a candidate
//! is dropped when its `[start, end)` range intersects one already accepted.
//! At an equal start offset a known-term candidate is scanned before a
//! suggestion, then the longer span before the shorter, then extraction order.
//! Suggestions take part in the scan (they can suppress later overlapping
//! mentions) and are discarded once it is done.

use std::cmp::Reverse;

use crate::extract::CandidateMention;
use crate::types::TermRef;

/// An accepted candidate that references a known term.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMention {
    pub term: TermRef,
    pub candidate: CandidateMention,
}

pub fn resolve_overlaps(mut candidates: Vec<CandidateMention>) -> Vec<ResolvedMention> {
    // Stable sort keeps extraction order as the last tie-break.
    candidates.sort_by_key(|c| (c.start, c.term.is_none(), Reverse(c.len())));

    let mut accepted: Vec<CandidateMention> = Vec::with_capacity(candidates.len());
    let mut dropped = 0usize;
    for candidate in candidates {
        if accepted.iter().any(|a| a.overlaps(&candidate)) {
            dropped += 1;
            continue;
        }
        accepted.push(candidate);
    }

    let before = accepted.len();
    let resolved: Vec<ResolvedMention> = accepted
        .into_iter()
        .filter_map(|candidate| {
            let term = candidate.term.clone()?;
            Some(ResolvedMention { term, candidate })
        })
        .collect();

    tracing::debug!(
        accepted = resolved.len(),
        overlapping = dropped,
        suggestions = before - resolved.len(),
        "resolved candidate overlaps"
    );
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mention(term: Option<&str>, start: usize, end: usize) -> CandidateMention {
        CandidateMention {
            term: term.map(TermRef::new),
            text: "x".repeat(end - start),
            start,
            end,
            score: None,
        }
    }

    fn terms(resolved: &[ResolvedMention]) -> Vec<&str> {
        resolved.iter().map(|r| r.term.as_str()).collect()
    }

    #[test]
    fn first_in_document_order_wins() {
        let out = resolve_overlaps(vec![mention(Some("A"), 10, 25), mention(Some("B"), 20, 30)]);
        assert_eq!(terms(&out), vec!["A"]);
    }

    #[test]
    fn adjacent_mentions_both_survive() {
        let out = resolve_overlaps(vec![mention(Some("A"), 0, 5), mention(Some("B"), 5, 9)]);
        assert_eq!(terms(&out), vec!["A", "B"]);
    }

    #[test]
    fn suggestion_loses_to_known_term_at_same_start() {
        let out = resolve_overlaps(vec![mention(None, 3, 12), mention(Some("A"), 3, 8)]);
        assert_eq!(terms(&out), vec!["A"]);
    }

    #[test]
    fn earlier_suggestion_suppresses_later_mention_and_is_discarded() {
        let out = resolve_overlaps(vec![mention(None, 0, 10), mention(Some("A"), 4, 8)]);
        assert!(out.is_empty());
    }

    #[test]
    fn longer_span_wins_at_same_start() {
        let out = resolve_overlaps(vec![mention(Some("short"), 0, 4), mention(Some("long"), 0, 9)]);
        assert_eq!(terms(&out), vec!["long"]);
    }

    #[test]
    fn extraction_order_breaks_full_ties() {
        let out = resolve_overlaps(vec![mention(Some("first"), 2, 6), mention(Some("second"), 2, 6)]);
        assert_eq!(terms(&out), vec!["first"]);
    }

    #[test]
    fn nested_mention_inside_accepted_one_is_dropped() {
        let out = resolve_overlaps(vec![
            mention(Some("outer"), 0, 20),
            mention(Some("inner"), 5, 10),
            mention(Some("after"), 20, 25),
        ]);
        assert_eq!(terms(&out), vec!["outer", "after"]);
    }

    proptest! {
        #[test]
        fn accepted_ranges_never_intersect(
            spans in prop::collection::vec((0usize..200, 1usize..30, any::<bool>()), 0..40)
        ) {
            let candidates: Vec<_> = spans
                .iter()
                .enumerate()
                .map(|(i, (start, len, known))| {
                    let name = format!("t{i}");
                    mention(known.then_some(name.as_str()), *start, start + len)
                })
                .collect();
            let out = resolve_overlaps(candidates);
            for (i, a) in out.iter().enumerate() {
                for b in &out[i + 1..] {
                    prop_assert!(!a.candidate.overlaps(&b.candidate));
                }
            }
            prop_assert!(out.windows(2).all(|w| w[0].candidate.start < w[1].candidate.start));
        }
    }
}
