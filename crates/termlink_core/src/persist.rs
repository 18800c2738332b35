//! Occurrence persistor: hands the net change of one run to the store.

use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::AssignmentPlan;
use crate::error::Result;
use crate::ports::ResourceWrite;
use crate::reconcile::Reconciliation;
use crate::types::{ResourceRef, TermAssignment, TermOccurrence};

/// Everything one analysis run changes for one resource, committed as a unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationChangeSet {
    pub source: ResourceRef,
    /// Ids of persisted occurrences to delete. Stores only delete rows still suggested.
    pub removed: Vec<Uuid>,
    pub inserted: Vec<TermOccurrence>,
    pub created_assignments: Vec<TermAssignment>,
    /// Ids of suggested assignments to set to confirmed.
    pub promoted_assignments: Vec<Uuid>,
}

impl AnnotationChangeSet {
    pub fn new(source: ResourceRef, reconciliation: &Reconciliation, plan: AssignmentPlan) -> Self {
        Self {
            source,
            removed: reconciliation.dropped.iter().map(|o| o.id).collect(),
            inserted: reconciliation.created.clone(),
            created_assignments: plan.created,
            promoted_assignments: plan.promoted,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
            && self.inserted.is_empty()
            && self.created_assignments.is_empty()
            && self.promoted_assignments.is_empty()
    }
}

/// Commit `change_set` through `session`, releasing it either way.
/// Returns false when there was nothing to write.
pub async fn persist(
    mut session: Box<dyn ResourceWrite>,
    change_set: &AnnotationChangeSet,
) -> Result<bool> {
    if change_set.is_empty() {
        tracing::debug!(resource = %change_set.source, "nothing to persist");
        return Ok(false);
    }
    session.commit(change_set).await?;
    tracing::debug!(
        resource = %change_set.source,
        removed = change_set.removed.len(),
        inserted = change_set.inserted.len(),
        assignments_created = change_set.created_assignments.len(),
        assignments_promoted = change_set.promoted_assignments.len(),
        "annotation change set committed"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::ports::AnnotationStore;
    use crate::types::{AnnotationState, OccurrenceTarget, TermRef, TextQuoteSelector};
    use chrono::Utc;

    fn occurrence(exact: &str) -> TermOccurrence {
        TermOccurrence {
            id: Uuid::new_v4(),
            term: TermRef::new("t:a"),
            target: OccurrenceTarget {
                source: ResourceRef::file("f"),
                quote: TextQuoteSelector {
                    exact: exact.into(),
                    prefix: String::new(),
                    suffix: String::new(),
                },
                position: None,
            },
            state: AnnotationState::Suggested,
            score: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn empty_change_set_is_not_sent() {
        let store = MemoryStore::new();
        store.fail_next_commit();
        let cs = AnnotationChangeSet::new(
            ResourceRef::file("f"),
            &Reconciliation::default(),
            AssignmentPlan::default(),
        );
        let f = ResourceRef::file("f");
        let session = store.begin_write(&f).await.unwrap();
        assert!(!persist(session, &cs).await.unwrap());
        assert_eq!(store.commit_count(), 0);
        assert!(store.try_begin_write(&f).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn change_set_carries_dropped_ids_and_created_rows() {
        let stale = occurrence("old");
        let fresh = occurrence("new");
        let reconciliation = Reconciliation {
            created: vec![fresh.clone()],
            dropped: vec![stale.clone()],
            ..Default::default()
        };
        let cs = AnnotationChangeSet::new(
            ResourceRef::file("f"),
            &reconciliation,
            AssignmentPlan::default(),
        );
        assert_eq!(cs.removed, vec![stale.id]);
        assert_eq!(cs.inserted, vec![fresh]);

        let store = MemoryStore::new();
        let session = store.begin_write(&cs.source).await.unwrap();
        assert!(persist(session, &cs).await.unwrap());
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn commit_failure_propagates() {
        let store = MemoryStore::new();
        store.fail_next_commit();
        let reconciliation = Reconciliation {
            created: vec![occurrence("x")],
            ..Default::default()
        };
        let cs = AnnotationChangeSet::new(
            ResourceRef::file("f"),
            &reconciliation,
            AssignmentPlan::default(),
        );
        let session = store.begin_write(&cs.source).await.unwrap();
        let err = persist(session, &cs).await.unwrap_err();
        assert!(!err.is_client_error());
        assert!(store
            .occurrences_for(&ResourceRef::file("f"))
            .await
            .unwrap()
            .is_empty());
    }
}
