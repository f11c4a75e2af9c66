//! # tree-ingest CLI Interface
//!
//! Command parsing and wiring for the `tree-ingest` binary. All traversal, scheduling
//! and upsert logic lives in `tree-ingest-core`; this module only builds the concrete
//! collaborators from config and hands them to [`Pipeline`].
//!
//! - For command-line users: run the installed `tree-ingest` binary with `--help`.
//! - For programmatic/integration use: call [`run`] with a constructed [`Cli`].

use crate::hacker_news::HackerNewsClient;
use crate::json_store::JsonDirStore;
use crate::load_config::{load_config, CliConfig, SourceSection, StoreSection};
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tree_ingest_core::contract::Store;
use tree_ingest_core::memory::MemoryStore;
use tree_ingest_core::pipeline::{Pipeline, Summary};

/// CLI for tree-ingest: mirror upstream item trees into a document store.
#[derive(Parser)]
#[clap(
    name = "tree-ingest",
    version,
    about = "Fetch Hacker News stories with all their comments and upsert them into a document store"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest one story list into the configured store
    Ingest {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Maximum number of stories processed at once (overrides config and env)
        #[clap(long)]
        concurrency: Option<usize>,
        /// Number of stories to ingest (overrides config and env)
        #[clap(long)]
        limit: Option<usize>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Ingest {
            config,
            concurrency,
            limit,
        } => {
            let mut config = load_config(config)?;
            if let Some(concurrency) = concurrency {
                config.pipeline.concurrency = concurrency;
            }
            if let Some(limit) = limit {
                config.pipeline.root_limit = limit;
            }
            config.pipeline.validate()?;
            config.trace_loaded();

            tracing::info!(command = "ingest", "Starting ingestion");
            match ingest(&config).await {
                Ok(summary) => {
                    tracing::info!(command = "ingest", ?summary, "Ingestion complete");
                    println!("Ingestion complete.\nSummary:");
                    println!("{:#?}", summary);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "ingest", error = %e, "Ingestion failed");
                    Err(e)
                }
            }
        }
    }
}

/// Build the collaborators described by `config` and run one pipeline over them.
pub async fn ingest(config: &CliConfig) -> Result<Summary> {
    let source = match &config.source {
        SourceSection::HackerNews(hn) => {
            HackerNewsClient::new(hn.base_url.as_deref(), hn.list)?
                .with_root_fetch_concurrency(config.pipeline.concurrency)
        }
    };

    // Store failures here are fatal: no task can run without a store.
    let store: Arc<dyn Store> = match (&config.store, config.collection_dir()) {
        (StoreSection::JsonDir(_), Some(dir)) => Arc::new(
            JsonDirStore::open(&dir)
                .await
                .map_err(|e| anyhow!("Failed to open store at {}: {e}", dir.display()))?,
        ),
        (StoreSection::Memory, _) => Arc::new(MemoryStore::new()),
        (StoreSection::JsonDir(_), None) => {
            return Err(anyhow!("json_dir store is missing a collection directory"))
        }
    };

    let pipeline = Pipeline::new(Arc::new(source), store, config.pipeline.clone());
    Ok(pipeline.run().await?)
}
