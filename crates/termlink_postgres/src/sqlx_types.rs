//! Row types for the `termlink` schema and their conversion into core types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use termlink_core::types::{
    AnnotationState, OccurrenceTarget, ResourceRef, TermAssignment, TermOccurrence, TermRef,
    TextPositionSelector, TextQuoteSelector,
};

fn resource(kind: &str, iri: &str) -> Result<ResourceRef, String> {
    ResourceRef::from_parts(kind, iri).ok_or_else(|| format!("unknown resource kind '{kind}'"))
}

fn state(s: &str) -> Result<AnnotationState, String> {
    AnnotationState::from_str(s).ok_or_else(|| format!("unknown annotation state '{s}'"))
}

fn offset(value: i32) -> Result<usize, String> {
    usize::try_from(value).map_err(|_| format!("negative text offset {value}"))
}

#[derive(Debug, sqlx::FromRow)]
pub struct PgOccurrenceRow {
    pub occurrence_id: Uuid,
    pub term_iri: String,
    pub resource_kind: String,
    pub resource_iri: String,
    pub exact: String,
    pub prefix: String,
    pub suffix: String,
    pub start_offset: Option<i32>,
    pub end_offset: Option<i32>,
    pub state: String,
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PgOccurrenceRow> for TermOccurrence {
    type Error = String;

    fn try_from(row: PgOccurrenceRow) -> Result<Self, Self::Error> {
        let position = match (row.start_offset, row.end_offset) {
            (Some(start), Some(end)) => Some(TextPositionSelector {
                start: offset(start)?,
                end: offset(end)?,
            }),
            _ => None,
        };
        Ok(TermOccurrence {
            id: row.occurrence_id,
            term: TermRef::new(row.term_iri),
            target: OccurrenceTarget {
                source: resource(&row.resource_kind, &row.resource_iri)?,
                quote: TextQuoteSelector {
                    exact: row.exact,
                    prefix: row.prefix,
                    suffix: row.suffix,
                },
                position,
            },
            state: state(&row.state)?,
            score: row.score,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct PgAssignmentRow {
    pub assignment_id: Uuid,
    pub term_iri: String,
    pub resource_kind: String,
    pub resource_iri: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PgAssignmentRow> for TermAssignment {
    type Error = String;

    fn try_from(row: PgAssignmentRow) -> Result<Self, Self::Error> {
        Ok(TermAssignment {
            id: row.assignment_id,
            term: TermRef::new(row.term_iri),
            resource: resource(&row.resource_kind, &row.resource_iri)?,
            state: state(&row.state)?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct PgResourceRow {
    pub resource_kind: String,
    pub resource_iri: String,
}

impl TryFrom<PgResourceRow> for ResourceRef {
    type Error = String;

    fn try_from(row: PgResourceRow) -> Result<Self, Self::Error> {
        resource(&row.resource_kind, &row.resource_iri)
    }
}

/// Offset column value for a position, clamped to the `INTEGER` range.
pub(crate) fn offset_column(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
