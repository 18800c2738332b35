//! Offset-independent selectors for accepted mentions.

use crate::overlap::ResolvedMention;
use crate::types::{TermRef, TextPositionSelector, TextQuoteSelector};

pub const DEFAULT_CONTEXT_LENGTH: usize = 32;

/// A mention ready for reconciliation: which term, and where, by content.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundOccurrence {
    pub term: TermRef,
    pub quote: TextQuoteSelector,
    pub position: TextPositionSelector,
    pub score: Option<f64>,
}

/// Builds `{prefix, exact, suffix}` selectors from the document text.
#[derive(Debug, Clone, Copy)]
pub struct SelectorBuilder {
    context_length: usize,
}

impl Default for SelectorBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_LENGTH)
    }
}

impl SelectorBuilder {
    /// `context_length` is the maximum number of characters taken on each side.
    pub fn new(context_length: usize) -> Self {
        Self { context_length }
    }

    pub fn build_all(&self, text: &str, mentions: Vec<ResolvedMention>) -> Vec<FoundOccurrence> {
        let chars: Vec<char> = text.chars().collect();
        mentions
            .into_iter()
            .map(|mention| self.build(&chars, mention))
            .collect()
    }

    fn build(&self, chars: &[char], mention: ResolvedMention) -> FoundOccurrence {
        let len = chars.len();
        let end = mention.candidate.end.min(len);
        let start = mention.candidate.start.min(end);
        if end != mention.candidate.end {
            tracing::warn!(
                term = %mention.term,
                start = mention.candidate.start,
                end = mention.candidate.end,
                text_len = len,
                "mention range exceeds document text, clipping"
            );
        }
        let prefix_start = start.saturating_sub(self.context_length);
        let suffix_end = end.saturating_add(self.context_length).min(len);

        FoundOccurrence {
            term: mention.term,
            quote: TextQuoteSelector {
                exact: chars[start..end].iter().collect(),
                prefix: chars[prefix_start..start].iter().collect(),
                suffix: chars[end..suffix_end].iter().collect(),
            },
            position: TextPositionSelector { start, end },
            score: mention.candidate.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::CandidateMention;

    fn resolved(term: &str, start: usize, end: usize) -> ResolvedMention {
        ResolvedMention {
            term: TermRef::new(term),
            candidate: CandidateMention {
                term: Some(TermRef::new(term)),
                text: String::new(),
                start,
                end,
                score: Some(0.5),
            },
        }
    }

    #[test]
    fn context_windows_are_bounded() {
        let text = "0123456789parcel0123456789";
        let out = SelectorBuilder::new(4).build_all(text, vec![resolved("t:p", 10, 16)]);
        let quote = &out[0].quote;
        assert_eq!(quote.exact, "parcel");
        assert_eq!(quote.prefix, "6789");
        assert_eq!(quote.suffix, "0123");
        assert_eq!(out[0].position, TextPositionSelector { start: 10, end: 16 });
        assert_eq!(out[0].score, Some(0.5));
    }

    #[test]
    fn context_is_clipped_at_document_edges() {
        let out = SelectorBuilder::new(32).build_all("land plot", vec![resolved("t:l", 0, 4)]);
        assert_eq!(out[0].quote.prefix, "");
        assert_eq!(out[0].quote.exact, "land");
        assert_eq!(out[0].quote.suffix, " plot");
    }

    #[test]
    fn repeated_quote_gets_distinct_selectors() {
        let text = "a plot here and a plot there";
        let out = SelectorBuilder::new(6)
            .build_all(text, vec![resolved("t:p", 2, 6), resolved("t:p", 18, 22)]);
        assert_eq!(out[0].quote.exact, out[1].quote.exact);
        assert_ne!(out[0].quote, out[1].quote);
    }

    #[test]
    fn windows_count_characters() {
        let text = "žluťoučký kůň";
        let out = SelectorBuilder::new(3).build_all(text, vec![resolved("t:k", 10, 13)]);
        assert_eq!(out[0].quote.exact, "kůň");
        assert_eq!(out[0].quote.prefix, "ký ");
        assert_eq!(out[0].quote.suffix, "");
    }

    #[test]
    fn selector_ignores_absolute_offsets() {
        let a = SelectorBuilder::new(5).build_all("xx the plot is", vec![resolved("t:p", 7, 11)]);
        let b = SelectorBuilder::new(5)
            .build_all("yyyyyyy the plot is", vec![resolved("t:p", 12, 16)]);
        assert_eq!(a[0].quote, b[0].quote);
        assert_ne!(a[0].position, b[0].position);
    }
}
