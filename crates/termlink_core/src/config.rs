use serde::{Deserialize, Serialize};

use crate::aggregate::ScoringMethod;
use crate::selector::DEFAULT_CONTEXT_LENGTH;

/// Tuning of the annotation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Characters of context captured on each side of a quote.
    pub selector_context_length: usize,
    /// Score a term must reach in a resource before it is assigned to it.
    pub min_assignment_score: f64,
    pub scoring: ScoringMethod,
    /// Media types of files that may be annotated.
    pub annotatable_media_types: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            selector_context_length: DEFAULT_CONTEXT_LENGTH,
            min_assignment_score: 1.0,
            scoring: ScoringMethod::Count,
            annotatable_media_types: vec![
                "text/html".into(),
                "application/xhtml+xml".into(),
                "text/plain".into(),
            ],
        }
    }
}

impl EngineConfig {
    /// Matches on the essence of `media_type`, ignoring parameters and case.
    pub fn is_annotatable(&self, media_type: &str) -> bool {
        let essence = media_type.split(';').next().unwrap_or("").trim();
        self.annotatable_media_types
            .iter()
            .any(|m| m.eq_ignore_ascii_case(essence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.selector_context_length, 32);
        assert_eq!(cfg.min_assignment_score, 1.0);
        assert_eq!(cfg.scoring, ScoringMethod::Count);
    }

    #[test]
    fn media_type_parameters_are_ignored() {
        let cfg = EngineConfig::default();
        assert!(cfg.is_annotatable("text/html; charset=utf-8"));
        assert!(cfg.is_annotatable("TEXT/PLAIN"));
        assert!(!cfg.is_annotatable("image/png"));
        assert!(!cfg.is_annotatable(""));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"min_assignment_score": 2.5, "scoring": "confidence"}"#).unwrap();
        assert_eq!(cfg.min_assignment_score, 2.5);
        assert_eq!(cfg.scoring, ScoringMethod::Confidence);
        assert_eq!(cfg.selector_context_length, 32);
        assert_eq!(cfg.annotatable_media_types.len(), 3);
    }
}
