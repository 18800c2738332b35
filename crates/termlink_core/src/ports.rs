//! Storage and lookup port traits.
//! Implemented in memory (`crate::memory`) and by termlink_postgres; the
//! pipeline depends only on these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::persist::AnnotationChangeSet;
use crate::types::{AnnotationState, ResourceRef, Term, TermAssignment, TermOccurrence, TermRef};

/// Vocabulary lookups.
#[async_trait]
pub trait TermResolver: Send + Sync {
    async fn resolve(&self, term: &TermRef) -> Result<Option<Term>>;

    async fn exists(&self, term: &TermRef) -> Result<bool> {
        Ok(self.resolve(term).await?.is_some())
    }
}

/// What the file store knows about a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub iri: String,
    pub media_type: String,
}

#[async_trait]
pub trait FileCatalog: Send + Sync {
    async fn describe(&self, iri: &str) -> Result<Option<FileInfo>>;

    async fn exists(&self, iri: &str) -> Result<bool> {
        Ok(self.describe(iri).await?.is_some())
    }
}

/// Rows removed for one resource by [`AnnotationStore::remove_annotations`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedAnnotations {
    pub occurrences: u64,
    pub assignments: u64,
}

impl RemovedAnnotations {
    pub fn is_empty(&self) -> bool {
        self.occurrences == 0 && self.assignments == 0
    }
}

/// Exclusive write access to the annotations of one resource.
///
/// Obtained from [`AnnotationStore::begin_write`]. The resource's writer lock is
/// held, across processes when the store is shared, until the session commits,
/// removes or is dropped. Reads through the session see every write committed
/// before the lock was taken. Dropping the session without finishing it writes
/// nothing.
#[async_trait]
pub trait ResourceWrite: Send {
    fn resource(&self) -> &ResourceRef;

    async fn occurrences(&mut self) -> Result<Vec<TermOccurrence>>;

    async fn assignments(&mut self) -> Result<Vec<TermAssignment>>;

    /// Apply a change set atomically and release the lock.
    async fn commit(&mut self, change_set: &AnnotationChangeSet) -> Result<()>;

    /// Delete every occurrence and assignment of the resource and release the lock.
    async fn remove_all(&mut self) -> Result<RemovedAnnotations>;
}

/// Persistence of occurrences and assignments.
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// All occurrences whose target source is `resource`.
    async fn occurrences_for(&self, resource: &ResourceRef) -> Result<Vec<TermOccurrence>>;

    /// All occurrences of `term`, across resources.
    async fn occurrences_of_term(&self, term: &TermRef) -> Result<Vec<TermOccurrence>>;

    async fn assignments_for(&self, resource: &ResourceRef) -> Result<Vec<TermAssignment>>;

    /// Wait for exclusive write access to `resource`.
    async fn begin_write(&self, resource: &ResourceRef) -> Result<Box<dyn ResourceWrite>>;

    /// Exclusive write access to `resource`, or `None` while another writer holds it.
    async fn try_begin_write(&self, resource: &ResourceRef)
        -> Result<Option<Box<dyn ResourceWrite>>>;

    /// Returns false when no occurrence has this id.
    async fn set_occurrence_state(&self, id: Uuid, state: AnnotationState) -> Result<bool>;

    /// Distinct resources that own at least one occurrence or assignment.
    async fn annotated_resources(&self) -> Result<Vec<ResourceRef>>;

    /// Apply a change set under the writer lock of its source.
    async fn commit(&self, change_set: &AnnotationChangeSet) -> Result<()> {
        let mut session = self.begin_write(&change_set.source).await?;
        session.commit(change_set).await
    }

    /// Delete every occurrence and assignment attached to `resource`.
    async fn remove_annotations(&self, resource: &ResourceRef) -> Result<RemovedAnnotations> {
        let mut session = self.begin_write(resource).await?;
        session.remove_all().await
    }
}
