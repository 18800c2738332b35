//! termlink_core: term occurrence reconciliation, with no database dependencies.
//!
//! # Pipeline
//!
//! ```text
//! annotated markup ──► AnnotatedDocument
//!                          │
//!                          ▼
//!   CandidateExtractor ──► resolve_overlaps ──► SelectorBuilder      (pure, unlocked)
//!                                                    │
//!                       ┌────────────────────────────┘
//!                       ▼          per-resource write session
//!   reconcile ──► aggregate ──► persist ──► AnnotationStore
//! ```
//!
//! Storage, the vocabulary and the file catalog sit behind the traits in
//! [`ports`]; [`memory`] implements them in process and termlink_postgres
//! implements them on PostgreSQL.
//!
//! - Occurrences are matched across runs by (term, quote selector), never by offset
//! - A confirmed occurrence is never changed or deleted by a re-run
//! - Assignments are only created or promoted, never removed by aggregation

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod locks;
pub mod markup;
pub mod memory;
pub mod overlap;
pub mod persist;
pub mod ports;
pub mod reconcile;
pub mod selector;
pub mod sweeper;
pub mod types;

pub use aggregate::{AssignmentScorer, ConfidenceWeighted, OccurrenceCount, ScoringMethod};
pub use config::EngineConfig;
pub use engine::{AnnotationEngine, AnnotationReport};
pub use error::{AnnotationError, Result};
pub use markup::AnnotatedDocument;
pub use persist::AnnotationChangeSet;
pub use ports::{
    AnnotationStore, FileCatalog, FileInfo, RemovedAnnotations, ResourceWrite, TermResolver,
};
pub use sweeper::{OrphanSweeper, SweepReport};
pub use types::*;
