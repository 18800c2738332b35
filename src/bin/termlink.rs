//! termlink command line interface.
//!
//! # Usage
//!
//! ```bash
//! # Reconcile a file's occurrences with the analysis output for it
//! termlink annotate --file http://ex.org/file/deed deed.annotated.html
//!
//! # Same for a term definition
//! termlink annotate --term http://ex.org/term/parcel parcel-definition.html
//!
//! # One orphan sweep, or the scheduled sweeper
//! termlink sweep
//! termlink sweeper
//!
//! # Confirm a suggested occurrence
//! termlink approve 550e8400-e29b-41d4-a716-446655440000
//! ```
//!
//! Configuration is read from the environment; see `termlink::config`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use termlink::{spawn_orphan_sweeper, ServiceConfig};
use termlink_core::ResourceRef;
use termlink_postgres::PgStores;

#[derive(Parser)]
#[command(name = "termlink")]
#[command(version = "0.1.0")]
#[command(about = "Term occurrence reconciliation: annotate resources and sweep orphaned annotations")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile stored occurrences with annotated markup for one resource
    Annotate {
        /// IRI of the file the markup was produced from
        #[arg(long, conflicts_with = "term", required_unless_present = "term")]
        file: Option<String>,

        /// IRI of the term whose definition the markup was produced from
        #[arg(long)]
        term: Option<String>,

        /// Path to the annotated markup
        markup: PathBuf,
    },

    /// Run one orphan sweep
    Sweep,

    /// Run the orphan sweeper on its schedule until interrupted
    Sweeper,

    /// Confirm a suggested occurrence
    Approve {
        occurrence_id: Uuid,
    },

    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,termlink=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig::from_env()?;

    tracing::info!("Connecting to database: {}", config.masked_database_url());
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    if let Commands::Migrate = cli.command {
        return termlink_postgres::migrate(&pool).await;
    }

    let stores = PgStores::new(pool);
    let engine = stores.engine(config.engine.clone());

    match cli.command {
        Commands::Annotate { file, term, markup } => {
            let target = match (file, term) {
                (Some(iri), _) => ResourceRef::file(iri),
                (None, Some(iri)) => ResourceRef::term_definition(iri),
                (None, None) => anyhow::bail!("one of --file or --term is required"),
            };
            let content = tokio::fs::read_to_string(&markup)
                .await
                .with_context(|| format!("reading {}", markup.display()))?;
            let report = engine.annotate_markup(&content, &target).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Sweep => {
            let report = engine.sweeper().sweep_once().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Sweeper => {
            let handle = spawn_orphan_sweeper(engine.sweeper(), config.sweep_interval);
            tokio::signal::ctrl_c()
                .await
                .context("waiting for shutdown signal")?;
            tracing::info!("Shutting down orphan sweeper");
            handle.abort();
        }
        Commands::Approve { occurrence_id } => {
            engine.approve_occurrence(occurrence_id).await?;
            println!("confirmed {occurrence_id}");
        }
        Commands::Migrate => {}
    }

    Ok(())
}
