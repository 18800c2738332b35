//! Orphan sweeper.
//!
//! Removes occurrences and assignments whose resource no longer exists:
//! - `File` resources are checked against the [`FileCatalog`]
//! - `TermDefinition` resources are checked against the [`TermResolver`]
//!
//! A resource with a run in flight is skipped and picked up again on the next
//! pass. A failure on one resource does not stop the pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::interval;

use crate::error::Result;
use crate::ports::{AnnotationStore, FileCatalog, TermResolver};
use crate::types::ResourceRef;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    /// Annotated resources examined.
    pub checked: usize,
    /// Orphaned resources whose annotations were removed.
    pub orphans_removed: usize,
    pub occurrences_removed: u64,
    pub assignments_removed: u64,
    /// Orphans skipped because a run held their lock.
    pub busy: usize,
    /// Resources whose check or removal failed.
    pub failed: usize,
    pub swept_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct OrphanSweeper {
    store: Arc<dyn AnnotationStore>,
    files: Arc<dyn FileCatalog>,
    vocabulary: Arc<dyn TermResolver>,
}

impl OrphanSweeper {
    pub fn new(
        store: Arc<dyn AnnotationStore>,
        files: Arc<dyn FileCatalog>,
        vocabulary: Arc<dyn TermResolver>,
    ) -> Self {
        Self {
            store,
            files,
            vocabulary,
        }
    }

    /// Run one pass. Fails only when the annotated resources cannot be listed.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let resources = self.store.annotated_resources().await?;
        let mut report = SweepReport {
            checked: resources.len(),
            ..Default::default()
        };

        for resource in resources {
            match self.resource_exists(&resource).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(target: "termlink.sweeper", %resource, error = %e, "existence check failed");
                    continue;
                }
            }

            let mut session = match self.store.try_begin_write(&resource).await {
                Ok(Some(session)) => session,
                Ok(None) => {
                    report.busy += 1;
                    tracing::debug!(target: "termlink.sweeper", %resource, "orphan busy, deferring");
                    continue;
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(target: "termlink.sweeper", %resource, error = %e, "orphan lock failed");
                    continue;
                }
            };

            match session.remove_all().await {
                Ok(removed) => {
                    report.orphans_removed += 1;
                    report.occurrences_removed += removed.occurrences;
                    report.assignments_removed += removed.assignments;
                    tracing::debug!(
                        target: "termlink.sweeper",
                        %resource,
                        occurrences = removed.occurrences,
                        assignments = removed.assignments,
                        "removed orphaned annotations"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(target: "termlink.sweeper", %resource, error = %e, "orphan removal failed");
                }
            }
        }

        report.swept_at = Some(Utc::now());
        tracing::info!(
            target: "termlink.sweeper",
            checked = report.checked,
            orphans_removed = report.orphans_removed,
            occurrences_removed = report.occurrences_removed,
            assignments_removed = report.assignments_removed,
            busy = report.busy,
            failed = report.failed,
            "orphan sweep completed"
        );
        Ok(report)
    }

    /// Sweep every `period`, forever. Call inside `tokio::spawn`.
    pub async fn run(self, period: Duration) {
        let mut timer = interval(period);
        // Skip the first immediate tick
        timer.tick().await;

        tracing::info!(
            target: "termlink.sweeper",
            interval_secs = period.as_secs(),
            "orphan sweeper started"
        );

        loop {
            timer.tick().await;
            if let Err(e) = self.sweep_once().await {
                tracing::error!(target: "termlink.sweeper", error = %e, "orphan sweep failed");
            }
        }
    }

    async fn resource_exists(&self, resource: &ResourceRef) -> Result<bool> {
        match resource {
            ResourceRef::File(iri) => self.files.exists(iri).await,
            ResourceRef::TermDefinition(term) => self.vocabulary.exists(term).await,
        }
    }
}
