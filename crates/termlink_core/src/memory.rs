//! In-memory port implementations for tests and local runs.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::locks::{ResourceGuard, ResourceLocks};
use crate::persist::AnnotationChangeSet;
use crate::ports::{
    AnnotationStore, FileCatalog, FileInfo, RemovedAnnotations, ResourceWrite, TermResolver,
};
use crate::types::{AnnotationState, ResourceRef, Term, TermAssignment, TermOccurrence, TermRef};

// ── MemoryStore ──

#[derive(Debug, Default)]
struct Tables {
    occurrences: Vec<TermOccurrence>,
    assignments: Vec<TermAssignment>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    fail_next_commit: AtomicBool,
    commits: AtomicUsize,
}

impl Shared {
    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>> {
        Ok(self.tables.read().map_err(|e| anyhow!("Lock: {}", e))?)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>> {
        Ok(self.tables.write().map_err(|e| anyhow!("Lock: {}", e))?)
    }

    fn occurrences_for(&self, resource: &ResourceRef) -> Result<Vec<TermOccurrence>> {
        Ok(self
            .read()?
            .occurrences
            .iter()
            .filter(|o| o.source() == resource)
            .cloned()
            .collect())
    }

    fn assignments_for(&self, resource: &ResourceRef) -> Result<Vec<TermAssignment>> {
        Ok(self
            .read()?
            .assignments
            .iter()
            .filter(|a| &a.resource == resource)
            .cloned()
            .collect())
    }
}

/// In-memory AnnotationStore.
///
/// Writers are serialized per resource by a [`ResourceLocks`] table shared by
/// every engine using the store. Commits apply under one table write lock, so
/// readers never see half a change set. Mirrors the database constraints:
/// deletes only touch suggested rows and a second assignment for the same
/// (term, resource) is ignored.
#[derive(Debug, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    locks: ResourceLocks,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` fail without writing anything.
    pub fn fail_next_commit(&self) {
        self.shared.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }

    pub fn insert_occurrence(&self, occurrence: TermOccurrence) -> Result<()> {
        self.shared.write()?.occurrences.push(occurrence);
        Ok(())
    }

    pub fn insert_assignment(&self, assignment: TermAssignment) -> Result<()> {
        self.shared.write()?.assignments.push(assignment);
        Ok(())
    }

    pub fn all_occurrences(&self) -> Result<Vec<TermOccurrence>> {
        Ok(self.shared.read()?.occurrences.clone())
    }

    pub fn all_assignments(&self) -> Result<Vec<TermAssignment>> {
        Ok(self.shared.read()?.assignments.clone())
    }

    fn session(&self, guard: ResourceGuard) -> Box<dyn ResourceWrite> {
        Box::new(MemoryWrite {
            shared: self.shared.clone(),
            resource: guard.resource().clone(),
            guard: Some(guard),
        })
    }
}

#[async_trait]
impl AnnotationStore for MemoryStore {
    async fn occurrences_for(&self, resource: &ResourceRef) -> Result<Vec<TermOccurrence>> {
        self.shared.occurrences_for(resource)
    }

    async fn occurrences_of_term(&self, term: &TermRef) -> Result<Vec<TermOccurrence>> {
        let tables = self.shared.read()?;
        Ok(tables
            .occurrences
            .iter()
            .filter(|o| &o.term == term)
            .cloned()
            .collect())
    }

    async fn assignments_for(&self, resource: &ResourceRef) -> Result<Vec<TermAssignment>> {
        self.shared.assignments_for(resource)
    }

    async fn begin_write(&self, resource: &ResourceRef) -> Result<Box<dyn ResourceWrite>> {
        let guard = self.locks.lock(resource).await;
        Ok(self.session(guard))
    }

    async fn try_begin_write(
        &self,
        resource: &ResourceRef,
    ) -> Result<Option<Box<dyn ResourceWrite>>> {
        Ok(self.locks.try_lock(resource).map(|guard| self.session(guard)))
    }

    async fn set_occurrence_state(&self, id: Uuid, state: AnnotationState) -> Result<bool> {
        let mut tables = self.shared.write()?;
        match tables.occurrences.iter_mut().find(|o| o.id == id) {
            Some(o) => {
                o.state = state;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn annotated_resources(&self) -> Result<Vec<ResourceRef>> {
        let tables = self.shared.read()?;
        let resources: BTreeSet<ResourceRef> = tables
            .occurrences
            .iter()
            .map(|o| o.source().clone())
            .chain(tables.assignments.iter().map(|a| a.resource.clone()))
            .collect();
        Ok(resources.into_iter().collect())
    }
}

/// Write session on a [`MemoryStore`]; holds the resource's slot in its lock table.
struct MemoryWrite {
    shared: Arc<Shared>,
    resource: ResourceRef,
    guard: Option<ResourceGuard>,
}

impl MemoryWrite {
    fn ensure_open(&self) -> Result<()> {
        if self.guard.is_none() {
            return Err(anyhow!("write session for {} already finished", self.resource).into());
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceWrite for MemoryWrite {
    fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    async fn occurrences(&mut self) -> Result<Vec<TermOccurrence>> {
        self.ensure_open()?;
        self.shared.occurrences_for(&self.resource)
    }

    async fn assignments(&mut self) -> Result<Vec<TermAssignment>> {
        self.ensure_open()?;
        self.shared.assignments_for(&self.resource)
    }

    async fn commit(&mut self, cs: &AnnotationChangeSet) -> Result<()> {
        self.ensure_open()?;
        if cs.source != self.resource {
            return Err(anyhow!(
                "change set for {} committed through session for {}",
                cs.source,
                self.resource
            )
            .into());
        }
        let _guard = self.guard.take();
        if self.shared.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("injected commit failure for {}", cs.source).into());
        }
        let mut tables = self.shared.write()?;

        tables.occurrences.retain(|o| {
            !(o.state == AnnotationState::Suggested && cs.removed.contains(&o.id))
        });
        tables.occurrences.extend(cs.inserted.iter().cloned());

        for assignment in &cs.created_assignments {
            let taken = tables
                .assignments
                .iter()
                .any(|a| a.term == assignment.term && a.resource == assignment.resource);
            if !taken {
                tables.assignments.push(assignment.clone());
            }
        }
        for a in tables.assignments.iter_mut() {
            if cs.promoted_assignments.contains(&a.id) {
                a.state = AnnotationState::Confirmed;
            }
        }

        self.shared.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_all(&mut self) -> Result<RemovedAnnotations> {
        self.ensure_open()?;
        let _guard = self.guard.take();
        let mut tables = self.shared.write()?;
        let before = (tables.occurrences.len(), tables.assignments.len());
        let resource = &self.resource;
        tables.occurrences.retain(|o| o.source() != resource);
        tables.assignments.retain(|a| &a.resource != resource);
        Ok(RemovedAnnotations {
            occurrences: (before.0 - tables.occurrences.len()) as u64,
            assignments: (before.1 - tables.assignments.len()) as u64,
        })
    }
}

// ── MemoryVocabulary ──

#[derive(Debug, Default)]
pub struct MemoryVocabulary {
    terms: RwLock<HashMap<TermRef, Term>>,
}

impl MemoryVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, term: Term) -> Result<()> {
        let mut terms = self.terms.write().map_err(|e| anyhow!("Lock: {}", e))?;
        terms.insert(term.iri.clone(), term);
        Ok(())
    }

    pub fn remove(&self, iri: &TermRef) -> Result<Option<Term>> {
        let mut terms = self.terms.write().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(terms.remove(iri))
    }
}

#[async_trait]
impl TermResolver for MemoryVocabulary {
    async fn resolve(&self, term: &TermRef) -> Result<Option<Term>> {
        let terms = self.terms.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(terms.get(term).cloned())
    }
}

// ── MemoryFileCatalog ──

#[derive(Debug, Default)]
pub struct MemoryFileCatalog {
    files: RwLock<HashMap<String, FileInfo>>,
}

impl MemoryFileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, iri: &str, media_type: &str) -> Result<()> {
        let mut files = self.files.write().map_err(|e| anyhow!("Lock: {}", e))?;
        files.insert(
            iri.to_string(),
            FileInfo {
                iri: iri.to_string(),
                media_type: media_type.to_string(),
            },
        );
        Ok(())
    }

    pub fn remove(&self, iri: &str) -> Result<bool> {
        let mut files = self.files.write().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(files.remove(iri).is_some())
    }
}

#[async_trait]
impl FileCatalog for MemoryFileCatalog {
    async fn describe(&self, iri: &str) -> Result<Option<FileInfo>> {
        let files = self.files.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(files.get(iri).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OccurrenceTarget, TextQuoteSelector};
    use chrono::Utc;

    fn occurrence(resource: &ResourceRef, term: &str, state: AnnotationState) -> TermOccurrence {
        TermOccurrence {
            id: Uuid::new_v4(),
            term: TermRef::new(term),
            target: OccurrenceTarget {
                source: resource.clone(),
                quote: TextQuoteSelector {
                    exact: term.into(),
                    prefix: String::new(),
                    suffix: String::new(),
                },
                position: None,
            },
            state,
            score: None,
            created_at: Utc::now(),
        }
    }

    fn assignment(resource: &ResourceRef, term: &str) -> TermAssignment {
        TermAssignment {
            id: Uuid::new_v4(),
            term: TermRef::new(term),
            resource: resource.clone(),
            state: AnnotationState::Suggested,
            created_at: Utc::now(),
        }
    }

    fn change_set(resource: &ResourceRef) -> AnnotationChangeSet {
        AnnotationChangeSet {
            source: resource.clone(),
            removed: vec![],
            inserted: vec![],
            created_assignments: vec![],
            promoted_assignments: vec![],
        }
    }

    #[tokio::test]
    async fn commit_never_deletes_confirmed_rows() {
        let store = MemoryStore::new();
        let f = ResourceRef::file("f");
        let confirmed = occurrence(&f, "t:a", AnnotationState::Confirmed);
        let suggested = occurrence(&f, "t:b", AnnotationState::Suggested);
        store.insert_occurrence(confirmed.clone()).unwrap();
        store.insert_occurrence(suggested.clone()).unwrap();

        let mut cs = change_set(&f);
        cs.removed = vec![confirmed.id, suggested.id];
        store.commit(&cs).await.unwrap();

        assert_eq!(store.occurrences_for(&f).await.unwrap(), vec![confirmed]);
    }

    #[tokio::test]
    async fn duplicate_assignment_is_ignored_and_promotion_applies() {
        let store = MemoryStore::new();
        let f = ResourceRef::file("f");
        let existing = assignment(&f, "t:a");
        store.insert_assignment(existing.clone()).unwrap();

        let mut cs = change_set(&f);
        cs.created_assignments = vec![assignment(&f, "t:a"), assignment(&f, "t:b")];
        cs.promoted_assignments = vec![existing.id];
        store.commit(&cs).await.unwrap();

        let all = store.assignments_for(&f).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, existing.id);
        assert_eq!(all[0].state, AnnotationState::Confirmed);
    }

    #[tokio::test]
    async fn injected_failure_writes_nothing() {
        let store = MemoryStore::new();
        let f = ResourceRef::file("f");
        store.fail_next_commit();
        let mut cs = change_set(&f);
        cs.inserted = vec![occurrence(&f, "t:a", AnnotationState::Suggested)];
        assert!(store.commit(&cs).await.is_err());
        assert!(store.all_occurrences().unwrap().is_empty());
        store.commit(&cs).await.unwrap();
        assert_eq!(store.all_occurrences().unwrap().len(), 1);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn annotated_resources_and_removal() {
        let store = MemoryStore::new();
        let f = ResourceRef::file("f");
        let t = ResourceRef::term_definition("t:x");
        store.insert_occurrence(occurrence(&f, "t:a", AnnotationState::Confirmed)).unwrap();
        store.insert_assignment(assignment(&f, "t:a")).unwrap();
        store.insert_assignment(assignment(&t, "t:a")).unwrap();

        let resources = store.annotated_resources().await.unwrap();
        assert_eq!(resources, vec![f.clone(), t.clone()]);

        let removed = store.remove_annotations(&f).await.unwrap();
        assert_eq!(removed, RemovedAnnotations { occurrences: 1, assignments: 1 });
        assert_eq!(store.annotated_resources().await.unwrap(), vec![t]);
        assert!(store.remove_annotations(&f).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_session_excludes_other_writers_until_finished() {
        let store = MemoryStore::new();
        let f = ResourceRef::file("f");
        let mut session = store.begin_write(&f).await.unwrap();
        assert!(store.try_begin_write(&f).await.unwrap().is_none());
        assert!(store
            .try_begin_write(&ResourceRef::file("g"))
            .await
            .unwrap()
            .is_some());

        let mut cs = change_set(&f);
        cs.inserted = vec![occurrence(&f, "t:a", AnnotationState::Suggested)];
        session.commit(&cs).await.unwrap();
        assert!(session.commit(&cs).await.is_err());
        assert!(session.occurrences().await.is_err());

        let mut next = store.try_begin_write(&f).await.unwrap().unwrap();
        assert_eq!(next.occurrences().await.unwrap().len(), 1);
        drop(next);
        assert!(store.try_begin_write(&f).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn session_rejects_change_set_of_another_resource() {
        let store = MemoryStore::new();
        let f = ResourceRef::file("f");
        let mut cs = change_set(&ResourceRef::file("g"));
        cs.inserted = vec![occurrence(&f, "t:a", AnnotationState::Suggested)];
        let mut session = store.begin_write(&f).await.unwrap();
        assert!(session.commit(&cs).await.is_err());
        assert!(store.all_occurrences().unwrap().is_empty());
    }

    #[tokio::test]
    async fn approve_unknown_occurrence_reports_missing() {
        let store = MemoryStore::new();
        assert!(!store
            .set_occurrence_state(Uuid::new_v4(), AnnotationState::Confirmed)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn catalog_and_vocabulary_lookups() {
        let files = MemoryFileCatalog::new();
        files.insert("f1", "text/html").unwrap();
        assert!(files.exists("f1").await.unwrap());
        assert!(!files.exists("f2").await.unwrap());
        assert!(files.remove("f1").unwrap());
        assert!(files.describe("f1").await.unwrap().is_none());

        let vocab = MemoryVocabulary::new();
        vocab
            .insert(Term {
                iri: TermRef::new("t:a"),
                label: "a".into(),
                definition: String::new(),
            })
            .unwrap();
        assert!(vocab.exists(&TermRef::new("t:a")).await.unwrap());
        assert!(!vocab.exists(&TermRef::new("t:b")).await.unwrap());
    }
}
