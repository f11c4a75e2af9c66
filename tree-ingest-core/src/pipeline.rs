//! High-level pipeline: orchestrates fetch → resolve → upsert for every root.
//!
//! This module provides the top-level orchestration of an ingestion run. It:
//!   - Fetches the root set from the [`ItemSource`] once
//!   - Submits one task per root to a [`TaskScheduler`] capped at `concurrency`
//!   - In each task, resolves the full tree with [`TreeFetcher`] and persists it with
//!     [`UpsertPolicy`]
//!   - Waits for the scheduler to drain, folds every task's outcome into a [`Summary`]
//!     and closes the [`Store`]
//!
//! # Error Handling
//! A failing task is logged with its root id and counted in [`Summary::failed`]; it never
//! affects other tasks. Only a failing root-set fetch, an invalid config, or a failing
//! store close abort the run with a [`PipelineError`].
//!
//! # Navigation
//! - Main entrypoint: [`Pipeline::run`]
//! - Supporting types: [`Summary`], [`PipelineConfig`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::contract::{Item, ItemSource, Store};
use crate::error::{PipelineError, TaskError};
use crate::fetcher::TreeFetcher;
use crate::scheduler::{TaskReport, TaskScheduler};
use crate::upsert::{UpsertOutcome, UpsertPolicy};

/// Aggregate result of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.skipped + self.failed
    }

    fn record(&mut self, report: &TaskReport<UpsertOutcome>) {
        match &report.result {
            Ok(outcome) => {
                match outcome {
                    UpsertOutcome::Inserted => self.inserted += 1,
                    UpsertOutcome::Updated => self.updated += 1,
                    UpsertOutcome::Skipped => self.skipped += 1,
                }
                info!(root = %report.label, outcome = %outcome, "[INGEST] Task complete");
            }
            Err(e) => {
                self.failed += 1;
                error!(root = %report.label, outcome = "fail", error = %e, "[INGEST][ERROR] Task failed");
            }
        }
    }
}

pub struct Pipeline<S: ?Sized, D: ?Sized> {
    source: Arc<S>,
    store: Arc<D>,
    config: PipelineConfig,
}

impl<S, D> Pipeline<S, D>
where
    S: ItemSource + ?Sized + 'static,
    D: Store + ?Sized + 'static,
{
    pub fn new(source: Arc<S>, store: Arc<D>, config: PipelineConfig) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    /// Ingest every root once and report what happened.
    ///
    /// The store is closed before returning, whatever the outcome.
    pub async fn run(&self) -> Result<Summary, PipelineError> {
        if let Err(e) = self.config.validate() {
            error!(error = %e, "[INGEST][ERROR] Invalid pipeline config");
            self.close_after_abort().await;
            return Err(e);
        }
        let started = Instant::now();
        let started_at = unix_millis(SystemTime::now());
        info!(
            started_at_ms = started_at,
            concurrency = self.config.concurrency,
            root_limit = self.config.root_limit,
            "[INGEST] Starting ingestion run"
        );

        let roots = match self.source.fetch_root_set(self.config.root_limit).await {
            Ok(roots) => roots,
            Err(e) => {
                error!(error = %e, "[INGEST][ERROR] Failed to fetch root set");
                self.close_after_abort().await;
                return Err(PipelineError::RootSet(e));
            }
        };
        let roots = unique_roots(roots);
        info!(roots = roots.len(), "[INGEST] Root set fetched");

        let scheduler = TaskScheduler::new(self.config.concurrency)?;
        let fetcher = TreeFetcher::new(Arc::clone(&self.source));
        let policy = UpsertPolicy::new(Arc::clone(&self.store), self.config.change_detection);

        for root in roots {
            scheduler.submit(
                root.id.to_string(),
                ingest_root(fetcher.clone(), policy.clone(), root),
            );
        }

        let reports = scheduler.drain_and_wait().await;

        let mut summary = Summary::default();
        for report in &reports {
            summary.record(report);
        }

        self.store.close().await?;

        summary.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            started_at_ms = started_at,
            finished_at_ms = unix_millis(SystemTime::now()),
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            elapsed_ms = summary.elapsed_ms,
            "[INGEST] Ingestion run complete"
        );
        Ok(summary)
    }

    /// Close the store on an aborted run; the abort reason wins over a close error.
    async fn close_after_abort(&self) {
        if let Err(e) = self.store.close().await {
            warn!(error = %e, "[INGEST] Store close failed after aborted run");
        }
    }
}

fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Drop repeated root ids, keeping the first occurrence, so no two tasks share a key.
fn unique_roots(roots: Vec<Item>) -> Vec<Item> {
    let mut seen = HashSet::with_capacity(roots.len());
    roots
        .into_iter()
        .filter(|root| {
            let fresh = seen.insert(root.id);
            if !fresh {
                warn!(root = %root.id, "[INGEST] Duplicate root id in root set, ignoring");
            }
            fresh
        })
        .collect()
}

async fn ingest_root<S, D>(
    fetcher: TreeFetcher<S>,
    policy: UpsertPolicy<D>,
    root: Item,
) -> Result<UpsertOutcome, TaskError>
where
    S: ItemSource + ?Sized,
    D: Store + ?Sized,
{
    let id = root.id;
    debug!(root = %id, "[INGEST] Processing root");
    let tree = fetcher.resolve(root).await?;
    debug!(root = %id, nodes = tree.node_count(), "[INGEST] Tree resolved");
    Ok(policy.apply(&tree).await?)
}
