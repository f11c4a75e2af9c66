//! Error taxonomy for ingestion.
//!
//! Source and store failures are fatal to the task that hit them and nothing else.
//! Only [`PipelineError`] ever reaches the caller of a run.

use thiserror::Error;

use crate::contract::ItemId;

/// Upstream fetch failed.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Request never produced a response (connect, TLS, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-success status.
    #[error("Upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Response body could not be decoded into an item.
    #[error("Failed to decode upstream payload: {0}")]
    Decode(String),

    /// Upstream has no item with this id.
    #[error("Item not found upstream: {id}")]
    NotFound { id: ItemId },

    #[error("{0}")]
    Other(String),
}

/// Persistence read or write failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Partial update targeted a record that does not exist.
    #[error("Record not found: {id}")]
    NotFound { id: ItemId },

    /// The store was closed before this call.
    #[error("Store is closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// A descendant could not be resolved into the tree.
#[derive(Debug, Error)]
pub enum TraversalError {
    #[error("Failed to fetch child {child} of item {parent}: {source}")]
    Fetch {
        parent: ItemId,
        child: ItemId,
        #[source]
        source: SourceError,
    },

    /// `id` appears among its own ancestors.
    #[error("Reference cycle at item {id} (path: {path:?})")]
    Cycle { id: ItemId, path: Vec<ItemId> },
}

/// Terminal failure of a single ingestion task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Traversal(#[from] TraversalError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Task {label} panicked: {message}")]
    Panicked { label: String, message: String },
}

/// Failures that abort a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to fetch root set: {0}")]
    RootSet(#[source] SourceError),

    #[error("Store failure outside of any task: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
