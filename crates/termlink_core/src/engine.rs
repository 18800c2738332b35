//! Annotation engine: the entry points of the pipeline.
//!
//! `generate_annotations` runs
//! extract → resolve overlaps → build selectors → reconcile → aggregate → persist.
//! Everything up to selector building is pure and runs before the resource's
//! write session is opened; read, reconcile, aggregate and persist run inside
//! it, so one writer per resource holds across every engine sharing the store.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::{aggregate, AssignmentScorer};
use crate::config::EngineConfig;
use crate::error::{AnnotationError, Result};
use crate::extract::CandidateExtractor;
use crate::markup::AnnotatedDocument;
use crate::overlap::resolve_overlaps;
use crate::persist::{persist, AnnotationChangeSet};
use crate::ports::{AnnotationStore, FileCatalog, TermResolver};
use crate::reconcile::reconcile;
use crate::selector::SelectorBuilder;
use crate::sweeper::OrphanSweeper;
use crate::types::{AnnotationState, ResourceRef, TermOccurrence, TermRef};

/// Summary of one `generate_annotations` run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationReport {
    pub resource: ResourceRef,
    pub candidates: usize,
    pub skipped: usize,
    pub accepted: usize,
    pub occurrences_kept: usize,
    pub occurrences_created: usize,
    pub occurrences_dropped: usize,
    pub confirmed_retained: usize,
    pub assignments_created: usize,
    pub assignments_promoted: usize,
    pub violations: usize,
    /// False when the run changed nothing.
    pub committed: bool,
}

impl AnnotationReport {
    fn new(resource: ResourceRef) -> Self {
        Self {
            resource,
            candidates: 0,
            skipped: 0,
            accepted: 0,
            occurrences_kept: 0,
            occurrences_created: 0,
            occurrences_dropped: 0,
            confirmed_retained: 0,
            assignments_created: 0,
            assignments_promoted: 0,
            violations: 0,
            committed: false,
        }
    }
}

pub struct AnnotationEngine {
    store: Arc<dyn AnnotationStore>,
    vocabulary: Arc<dyn TermResolver>,
    files: Arc<dyn FileCatalog>,
    config: EngineConfig,
    scorer: Box<dyn AssignmentScorer>,
}

impl AnnotationEngine {
    pub fn new(
        store: Arc<dyn AnnotationStore>,
        vocabulary: Arc<dyn TermResolver>,
        files: Arc<dyn FileCatalog>,
        config: EngineConfig,
    ) -> Self {
        let scorer = config.scoring.scorer();
        Self {
            store,
            vocabulary,
            files,
            config,
            scorer,
        }
    }

    /// Replace the configured scoring function.
    pub fn with_scorer(mut self, scorer: Box<dyn AssignmentScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse annotated markup and run [`Self::generate_annotations`] on it.
    pub async fn annotate_markup(
        &self,
        markup: &str,
        target: &ResourceRef,
    ) -> Result<AnnotationReport> {
        let doc = AnnotatedDocument::parse(markup)?;
        self.generate_annotations(&doc, target).await
    }

    /// Reconcile the occurrences of `target` with one analysis of its content.
    ///
    /// On error nothing has been written.
    pub async fn generate_annotations(
        &self,
        doc: &AnnotatedDocument,
        target: &ResourceRef,
    ) -> Result<AnnotationReport> {
        self.check_target(target).await?;

        let extractor = CandidateExtractor;
        let known = self.known_terms(extractor.term_references(doc)).await?;
        let extraction = extractor.extract(doc, target, |t| known.contains(t))?;

        let mut report = AnnotationReport::new(target.clone());
        report.candidates = extraction.candidates.len();
        report.skipped = extraction.skipped.len();

        let resolved = resolve_overlaps(extraction.candidates);
        report.accepted = resolved.len();
        let found = SelectorBuilder::new(self.config.selector_context_length)
            .build_all(&doc.text, resolved);

        let mut session = self.store.begin_write(target).await?;

        let existing = session.occurrences().await?;
        let reconciliation = reconcile(target, found, existing);
        let assignments = session.assignments().await?;
        let plan = aggregate(
            target,
            reconciliation.occurrences(),
            &assignments,
            self.scorer.as_ref(),
            self.config.min_assignment_score,
        );

        report.occurrences_kept = reconciliation.kept.len();
        report.occurrences_created = reconciliation.created.len();
        report.occurrences_dropped = reconciliation.dropped.len();
        report.confirmed_retained = reconciliation.retained_confirmed;
        report.violations = reconciliation.violations;
        report.assignments_created = plan.created.len();
        report.assignments_promoted = plan.promoted.len();

        let change_set = AnnotationChangeSet::new(target.clone(), &reconciliation, plan);
        report.committed = persist(session, &change_set).await?;

        tracing::info!(
            target: "termlink.engine",
            resource = %target,
            candidates = report.candidates,
            skipped = report.skipped,
            kept = report.occurrences_kept,
            created = report.occurrences_created,
            dropped = report.occurrences_dropped,
            assignments_created = report.assignments_created,
            assignments_promoted = report.assignments_promoted,
            violations = report.violations,
            "annotations generated"
        );
        Ok(report)
    }

    /// Mark an occurrence as reviewed and accepted.
    pub async fn approve_occurrence(&self, id: Uuid) -> Result<()> {
        if !self
            .store
            .set_occurrence_state(id, AnnotationState::Confirmed)
            .await?
        {
            return Err(AnnotationError::NotFound(format!("occurrence {id}")));
        }
        tracing::info!(target: "termlink.engine", occurrence = %id, "occurrence confirmed");
        Ok(())
    }

    pub async fn occurrences_of_term(&self, term: &TermRef) -> Result<Vec<TermOccurrence>> {
        self.store.occurrences_of_term(term).await
    }

    /// Run one orphan sweep. Failures are logged, not returned.
    pub async fn cleanup_orphans(&self) {
        if let Err(e) = self.sweeper().sweep_once().await {
            tracing::error!(target: "termlink.sweeper", error = %e, "orphan cleanup failed");
        }
    }

    /// A sweeper sharing this engine's ports.
    pub fn sweeper(&self) -> OrphanSweeper {
        OrphanSweeper::new(self.store.clone(), self.files.clone(), self.vocabulary.clone())
    }

    async fn check_target(&self, target: &ResourceRef) -> Result<()> {
        match target {
            ResourceRef::File(iri) => {
                let info = self
                    .files
                    .describe(iri)
                    .await?
                    .ok_or_else(|| AnnotationError::TargetNotFound(target.clone()))?;
                if !self.config.is_annotatable(&info.media_type) {
                    return Err(AnnotationError::UnsupportedResourceType(info.media_type));
                }
            }
            ResourceRef::TermDefinition(term) => {
                if !self.vocabulary.exists(term).await? {
                    return Err(AnnotationError::TargetNotFound(target.clone()));
                }
            }
        }
        Ok(())
    }

    async fn known_terms(&self, refs: BTreeSet<TermRef>) -> Result<BTreeSet<TermRef>> {
        let mut known = BTreeSet::new();
        for term in refs {
            if self.vocabulary.exists(&term).await? {
                known.insert(term);
            }
        }
        Ok(known)
    }
}
