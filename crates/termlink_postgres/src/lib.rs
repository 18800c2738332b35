//! termlink_postgres: PostgreSQL adapters for the termlink_core ports.

pub mod sqlx_types;
pub mod store;

use std::sync::Arc;

use sqlx::PgPool;

use termlink_core::{AnnotationEngine, EngineConfig};

pub use store::{lock_name, PgAnnotationStore, PgFileCatalog, PgResourceWrite, PgVocabulary};

/// All Postgres adapters over one pool.
#[derive(Clone)]
pub struct PgStores {
    pub annotations: Arc<PgAnnotationStore>,
    pub vocabulary: Arc<PgVocabulary>,
    pub files: Arc<PgFileCatalog>,
}

impl PgStores {
    pub fn new(pool: PgPool) -> Self {
        Self {
            annotations: Arc::new(PgAnnotationStore::new(pool.clone())),
            vocabulary: Arc::new(PgVocabulary::new(pool.clone())),
            files: Arc::new(PgFileCatalog::new(pool)),
        }
    }

    pub fn engine(&self, config: EngineConfig) -> AnnotationEngine {
        AnnotationEngine::new(
            self.annotations.clone(),
            self.vocabulary.clone(),
            self.files.clone(),
            config,
        )
    }
}

/// Apply the bundled schema migrations.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("termlink schema migrations applied");
    Ok(())
}
