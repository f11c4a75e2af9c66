//! # contract: data model and collaborator interfaces
//!
//! This module defines the item/tree/record types that flow through an ingestion run,
//! and the two traits the core consumes:
//!
//! - [`ItemSource`]: the read-only upstream (an HTTP API in production, fakes in tests).
//! - [`Store`]: the document store records are persisted to.
//!
//! Both traits are annotated for `mockall`, so tests (and downstream crates with the
//! `test-export-mocks` feature) get `MockItemSource` and `MockStore`.
//!
//! ## Serialized shape
//! Items keep the upstream field names: child ids live under `kids`, the descendant
//! count under `descendants`. Every other upstream field is carried untouched in
//! `fields`. A tree serializes as its item plus a `children` array of subtrees, and that
//! is also the document shape a store persists.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{SourceError, StoreError};

/// Opaque, stable identifier of an upstream item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(ItemId)
    }
}

impl From<u64> for ItemId {
    fn from(raw: u64) -> Self {
        ItemId(raw)
    }
}

/// A single node as returned by the upstream API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Ordered child references. Absent upstream means no children.
    #[serde(rename = "kids", default, skip_serializing_if = "Vec::is_empty")]
    pub child_ids: Vec<ItemId>,
    /// Upstream's own count of descendants. Absent upstream means 0.
    #[serde(rename = "descendants", default)]
    pub descendant_count: u64,
    /// Everything else upstream sent (title, author, timestamps...), opaque to the core.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Item {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            child_ids: Vec::new(),
            descendant_count: 0,
            fields: Map::new(),
        }
    }

    pub fn with_children<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ItemId>,
    {
        self.child_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_descendants(mut self, count: u64) -> Self {
        self.descendant_count = count;
        self
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

/// An item with every descendant resolved, children in `child_ids` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    #[serde(flatten)]
    pub item: Item,
    #[serde(default)]
    pub children: Vec<Tree>,
}

impl Tree {
    pub fn leaf(item: Item) -> Self {
        Self {
            item,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> ItemId {
        self.item.id
    }

    pub fn descendant_count(&self) -> u64 {
        self.item.descendant_count
    }

    /// Number of nodes in this tree, root included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Tree::node_count).sum::<usize>()
    }

    /// True when `other` has the same ids in the same positions at every depth.
    pub fn same_shape(children: &[Tree], other: &[Tree]) -> bool {
        children.len() == other.len()
            && children
                .iter()
                .zip(other)
                .all(|(a, b)| a.id() == b.id() && Tree::same_shape(&a.children, &b.children))
    }
}

/// The persisted document for one tree.
///
/// Only `descendant_count` and `children` are ever rewritten after insertion; every
/// other persisted field, including ones written by other tools, lives in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: ItemId,
    #[serde(rename = "descendants", default)]
    pub descendant_count: u64,
    #[serde(default)]
    pub children: Vec<Tree>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// The record a store should hold right after inserting `tree`.
    pub fn from_tree(tree: &Tree) -> Self {
        let mut fields = tree.item.fields.clone();
        if !tree.item.child_ids.is_empty() {
            fields.insert(
                "kids".to_string(),
                Value::Array(
                    tree.item
                        .child_ids
                        .iter()
                        .map(|id| Value::from(id.0))
                        .collect(),
                ),
            );
        }
        Self {
            id: tree.id(),
            descendant_count: tree.descendant_count(),
            children: tree.children.clone(),
            fields,
        }
    }

    /// Apply a partial update in place, leaving `fields` untouched.
    pub fn apply(&mut self, update: RecordUpdate) {
        self.descendant_count = update.descendant_count;
        self.children = update.children;
    }
}

/// The only fields an existing record is ever updated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordUpdate {
    #[serde(rename = "descendants")]
    pub descendant_count: u64,
    pub children: Vec<Tree>,
}

impl RecordUpdate {
    pub fn from_tree(tree: &Tree) -> Self {
        Self {
            descendant_count: tree.descendant_count(),
            children: tree.children.clone(),
        }
    }
}

/// Trait for the read-only upstream items are fetched from.
///
/// Implementations must be safe to call from many tasks at once. Retry, if any, is the
/// implementation's business: the core treats every error as final for the task.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Fetch the first `count` top-level items a run should ingest.
    async fn fetch_root_set(&self, count: usize) -> Result<Vec<Item>, SourceError>;

    /// Fetch a single item by id.
    async fn fetch_item(&self, id: ItemId) -> Result<Item, SourceError>;
}

/// Trait for the document store records are persisted to.
///
/// Uniqueness per id is the store's responsibility. The store is shared by every task
/// of a run and must tolerate concurrent calls on distinct keys.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up the record for `id`, if one was ever inserted.
    async fn find_by_key(&self, id: ItemId) -> Result<Option<Record>, StoreError>;

    /// Persist `tree` as a new record.
    async fn insert_record(&self, tree: &Tree) -> Result<(), StoreError>;

    /// Overwrite `descendants` and `children` of an existing record, nothing else.
    async fn update_partial(&self, id: ItemId, update: RecordUpdate) -> Result<(), StoreError>;

    /// Release the underlying connection. Called once, after the last task settled.
    async fn close(&self) -> Result<(), StoreError>;
}
