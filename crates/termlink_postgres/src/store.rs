//! Postgres implementations of the termlink_core port traits.
//!
//! Each adapter is a newtype wrapping PgPool. All SQL is runtime-checked
//! (sqlx::query, not sqlx::query!) to avoid compile-time DB requirement.

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use termlink_core::error::{AnnotationError, Result};
use termlink_core::persist::AnnotationChangeSet;
use termlink_core::ports::{
    AnnotationStore, FileCatalog, FileInfo, RemovedAnnotations, ResourceWrite, TermResolver,
};
use termlink_core::types::{
    AnnotationState, ResourceRef, Term, TermAssignment, TermOccurrence, TermRef,
};

use crate::sqlx_types::{offset_column, PgAssignmentRow, PgOccurrenceRow, PgResourceRow};

const OCCURRENCE_COLUMNS: &str = r#"
    occurrence_id, term_iri, resource_kind, resource_iri,
    exact, prefix, suffix, start_offset, end_offset,
    state, score, created_at
"#;

fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = String>,
{
    rows.into_iter()
        .map(|r| T::try_from(r).map_err(|e| AnnotationError::Storage(anyhow!(e))))
        .collect()
}

// ── Row access ────────────────────────────────────────────────

async fn fetch_occurrences(
    conn: &mut PgConnection,
    resource: &ResourceRef,
) -> Result<Vec<TermOccurrence>> {
    let query = format!(
        r#"
        SELECT {OCCURRENCE_COLUMNS}
        FROM termlink.term_occurrences
        WHERE resource_kind = $1 AND resource_iri = $2
        ORDER BY created_at, occurrence_id
        "#
    );
    let rows = sqlx::query_as::<_, PgOccurrenceRow>(&query)
        .bind(resource.kind())
        .bind(resource.iri())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?;
    convert(rows)
}

async fn fetch_assignments(
    conn: &mut PgConnection,
    resource: &ResourceRef,
) -> Result<Vec<TermAssignment>> {
    let rows = sqlx::query_as::<_, PgAssignmentRow>(
        r#"
        SELECT assignment_id, term_iri, resource_kind, resource_iri, state, created_at
        FROM termlink.term_assignments
        WHERE resource_kind = $1 AND resource_iri = $2
        ORDER BY created_at, assignment_id
        "#,
    )
    .bind(resource.kind())
    .bind(resource.iri())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| anyhow!(e))?;
    convert(rows)
}

async fn apply_change_set(conn: &mut PgConnection, cs: &AnnotationChangeSet) -> Result<()> {
    if !cs.removed.is_empty() {
        // Rows confirmed since they were read are left alone.
        sqlx::query(
            r#"
            DELETE FROM termlink.term_occurrences
            WHERE occurrence_id = ANY($1) AND state = 'suggested'
            "#,
        )
        .bind(&cs.removed)
        .execute(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?;
    }

    for o in &cs.inserted {
        sqlx::query(
            r#"
            INSERT INTO termlink.term_occurrences
                (occurrence_id, term_iri, resource_kind, resource_iri,
                 exact, prefix, suffix, start_offset, end_offset,
                 state, score, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(o.id)
        .bind(o.term.as_str())
        .bind(o.source().kind())
        .bind(o.source().iri())
        .bind(&o.target.quote.exact)
        .bind(&o.target.quote.prefix)
        .bind(&o.target.quote.suffix)
        .bind(o.target.position.map(|p| offset_column(p.start)))
        .bind(o.target.position.map(|p| offset_column(p.end)))
        .bind(o.state.as_str())
        .bind(o.score)
        .bind(o.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?;
    }

    for a in &cs.created_assignments {
        sqlx::query(
            r#"
            INSERT INTO termlink.term_assignments
                (assignment_id, term_iri, resource_kind, resource_iri, state, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (term_iri, resource_kind, resource_iri) DO NOTHING
            "#,
        )
        .bind(a.id)
        .bind(a.term.as_str())
        .bind(a.resource.kind())
        .bind(a.resource.iri())
        .bind(a.state.as_str())
        .bind(a.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?;
    }

    if !cs.promoted_assignments.is_empty() {
        sqlx::query(
            r#"
            UPDATE termlink.term_assignments
            SET state = 'confirmed', updated_at = now()
            WHERE assignment_id = ANY($1) AND state = 'suggested'
            "#,
        )
        .bind(&cs.promoted_assignments)
        .execute(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?;
    }

    Ok(())
}

async fn delete_resource(
    conn: &mut PgConnection,
    resource: &ResourceRef,
) -> Result<RemovedAnnotations> {
    let occurrences = sqlx::query(
        "DELETE FROM termlink.term_occurrences WHERE resource_kind = $1 AND resource_iri = $2",
    )
    .bind(resource.kind())
    .bind(resource.iri())
    .execute(&mut *conn)
    .await
    .map_err(|e| anyhow!(e))?
    .rows_affected();

    let assignments = sqlx::query(
        "DELETE FROM termlink.term_assignments WHERE resource_kind = $1 AND resource_iri = $2",
    )
    .bind(resource.kind())
    .bind(resource.iri())
    .execute(&mut *conn)
    .await
    .map_err(|e| anyhow!(e))?
    .rows_affected();

    Ok(RemovedAnnotations {
        occurrences,
        assignments,
    })
}

// ── Writer locks ──────────────────────────────────────────────

/// Advisory lock name of a resource; hashed to the lock key in SQL.
pub fn lock_name(resource: &ResourceRef) -> String {
    format!("termlink:{}:{}", resource.kind(), resource.iri())
}

/// Block until this transaction holds the writer lock of `resource`.
async fn advisory_xact_lock(conn: &mut PgConnection, resource: &ResourceRef) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(lock_name(resource))
        .execute(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?;
    Ok(())
}

/// Take the writer lock of `resource` for this transaction if it is free.
async fn try_advisory_xact_lock(conn: &mut PgConnection, resource: &ResourceRef) -> Result<bool> {
    let (acquired,) =
        sqlx::query_as::<_, (bool,)>("SELECT pg_try_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(lock_name(resource))
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| anyhow!(e))?;
    Ok(acquired)
}

// ── PgAnnotationStore ─────────────────────────────────────────

/// Postgres-backed occurrence and assignment store.
///
/// Write sessions are transactions holding a transaction-scoped advisory lock
/// keyed by the resource, so writers in different processes exclude each other.
pub struct PgAnnotationStore {
    pool: PgPool,
}

impl PgAnnotationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnnotationStore for PgAnnotationStore {
    async fn occurrences_for(&self, resource: &ResourceRef) -> Result<Vec<TermOccurrence>> {
        let mut conn = self.pool.acquire().await.map_err(|e| anyhow!(e))?;
        fetch_occurrences(&mut conn, resource).await
    }

    async fn occurrences_of_term(&self, term: &TermRef) -> Result<Vec<TermOccurrence>> {
        let query = format!(
            r#"
            SELECT {OCCURRENCE_COLUMNS}
            FROM termlink.term_occurrences
            WHERE term_iri = $1
            ORDER BY resource_kind, resource_iri, created_at
            "#
        );
        let rows = sqlx::query_as::<_, PgOccurrenceRow>(&query)
            .bind(term.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        convert(rows)
    }

    async fn assignments_for(&self, resource: &ResourceRef) -> Result<Vec<TermAssignment>> {
        let mut conn = self.pool.acquire().await.map_err(|e| anyhow!(e))?;
        fetch_assignments(&mut conn, resource).await
    }

    async fn begin_write(&self, resource: &ResourceRef) -> Result<Box<dyn ResourceWrite>> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        advisory_xact_lock(&mut tx, resource).await?;
        Ok(Box::new(PgResourceWrite {
            resource: resource.clone(),
            tx: Some(tx),
        }))
    }

    async fn try_begin_write(
        &self,
        resource: &ResourceRef,
    ) -> Result<Option<Box<dyn ResourceWrite>>> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        if !try_advisory_xact_lock(&mut tx, resource).await? {
            tx.rollback().await.map_err(|e| anyhow!(e))?;
            return Ok(None);
        }
        Ok(Some(Box::new(PgResourceWrite {
            resource: resource.clone(),
            tx: Some(tx),
        })))
    }

    async fn set_occurrence_state(&self, id: Uuid, state: AnnotationState) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE termlink.term_occurrences
            SET state = $2, updated_at = now()
            WHERE occurrence_id = $1
            "#,
        )
        .bind(id)
        .bind(state.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn annotated_resources(&self) -> Result<Vec<ResourceRef>> {
        let rows = sqlx::query_as::<_, PgResourceRow>(
            r#"
            SELECT resource_kind, resource_iri FROM termlink.term_occurrences
            UNION
            SELECT resource_kind, resource_iri FROM termlink.term_assignments
            ORDER BY resource_kind, resource_iri
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        convert(rows)
    }
}

/// One resource's write session. Dropping it rolls the transaction back,
/// which releases the advisory lock.
pub struct PgResourceWrite {
    resource: ResourceRef,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgResourceWrite {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        let resource = &self.resource;
        self.tx
            .as_mut()
            .ok_or_else(|| anyhow!("write session for {resource} already finished").into())
    }

    fn finish(&mut self) -> Result<Transaction<'static, Postgres>> {
        let resource = &self.resource;
        self.tx
            .take()
            .ok_or_else(|| anyhow!("write session for {resource} already finished").into())
    }
}

#[async_trait]
impl ResourceWrite for PgResourceWrite {
    fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    async fn occurrences(&mut self) -> Result<Vec<TermOccurrence>> {
        let resource = self.resource.clone();
        fetch_occurrences(self.tx()?, &resource).await
    }

    async fn assignments(&mut self) -> Result<Vec<TermAssignment>> {
        let resource = self.resource.clone();
        fetch_assignments(self.tx()?, &resource).await
    }

    async fn commit(&mut self, cs: &AnnotationChangeSet) -> Result<()> {
        if cs.source != self.resource {
            return Err(anyhow!(
                "change set for {} committed through session for {}",
                cs.source,
                self.resource
            )
            .into());
        }
        let mut tx = self.finish()?;
        apply_change_set(&mut tx, cs).await?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn remove_all(&mut self) -> Result<RemovedAnnotations> {
        let mut tx = self.finish()?;
        let removed = delete_resource(&mut tx, &self.resource).await?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(removed)
    }
}

// ── PgVocabulary ──────────────────────────────────────────────

/// Term lookups against `termlink.terms`.
pub struct PgVocabulary {
    pool: PgPool,
}

impl PgVocabulary {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TermResolver for PgVocabulary {
    async fn resolve(&self, term: &TermRef) -> Result<Option<Term>> {
        let row = sqlx::query_as::<_, (String, String, String)>(
            "SELECT iri, label, definition FROM termlink.terms WHERE iri = $1",
        )
        .bind(term.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(|(iri, label, definition)| Term {
            iri: TermRef::new(iri),
            label,
            definition,
        }))
    }

    async fn exists(&self, term: &TermRef) -> Result<bool> {
        let (exists,) = sqlx::query_as::<_, (bool,)>(
            "SELECT EXISTS (SELECT 1 FROM termlink.terms WHERE iri = $1)",
        )
        .bind(term.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(exists)
    }
}

// ── PgFileCatalog ─────────────────────────────────────────────

/// File metadata lookups against `termlink.files`.
pub struct PgFileCatalog {
    pool: PgPool,
}

impl PgFileCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileCatalog for PgFileCatalog {
    async fn describe(&self, iri: &str) -> Result<Option<FileInfo>> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT iri, media_type FROM termlink.files WHERE iri = $1",
        )
        .bind(iri)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(|(iri, media_type)| FileInfo { iri, media_type }))
    }
}
