use thiserror::Error;

use crate::types::{ResourceRef, TermRef};

pub type Result<T> = std::result::Result<T, AnnotationError>;

/// Run-level failures of the annotation pipeline.
///
/// Per-element rejections are not errors; see [`crate::extract::SkipReason`].
#[derive(Debug, Error)]
pub enum AnnotationError {
    /// The analysis output references a term the vocabulary does not know.
    #[error("unknown term referenced: {0}")]
    UnknownTermReference(TermRef),

    #[error("unsupported resource type: {0}")]
    UnsupportedResourceType(String),

    #[error("annotation target not found: {0}")]
    TargetNotFound(ResourceRef),

    #[error("malformed annotated markup: {0}")]
    MalformedMarkup(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AnnotationError {
    /// True when the error was caused by the analysis output or the request,
    /// as opposed to the storage layer.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_term() {
        let e = AnnotationError::UnknownTermReference(TermRef::new("http://ex.org/t/missing"));
        assert_eq!(
            e.to_string(),
            "unknown term referenced: http://ex.org/t/missing"
        );
    }

    #[test]
    fn display_target_not_found() {
        let e = AnnotationError::TargetNotFound(ResourceRef::file("http://ex.org/f/1"));
        assert_eq!(
            e.to_string(),
            "annotation target not found: file:http://ex.org/f/1"
        );
    }

    #[test]
    fn display_storage() {
        let e = AnnotationError::Storage(anyhow::anyhow!("connection reset"));
        assert_eq!(e.to_string(), "storage: connection reset");
    }

    #[test]
    fn storage_is_not_client_error() {
        assert!(!AnnotationError::Storage(anyhow::anyhow!("boom")).is_client_error());
        assert!(AnnotationError::UnsupportedResourceType("image/png".into()).is_client_error());
        assert!(AnnotationError::MalformedMarkup("eof".into()).is_client_error());
    }
}
