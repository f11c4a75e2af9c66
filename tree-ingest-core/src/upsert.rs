//! Insert / update / skip decision for one fetched tree.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ChangeDetection;
use crate::contract::{Record, RecordUpdate, Store, Tree};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Skipped,
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UpsertOutcome::Inserted => "insert",
            UpsertOutcome::Updated => "update",
            UpsertOutcome::Skipped => "skip",
        })
    }
}

pub struct UpsertPolicy<D: ?Sized> {
    store: Arc<D>,
    change_detection: ChangeDetection,
}

impl<D: ?Sized> Clone for UpsertPolicy<D> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            change_detection: self.change_detection,
        }
    }
}

impl<D> UpsertPolicy<D>
where
    D: Store + ?Sized,
{
    pub fn new(store: Arc<D>, change_detection: ChangeDetection) -> Self {
        Self {
            store,
            change_detection,
        }
    }

    /// Persist `tree` unless the stored record is already current.
    ///
    /// An existing record is only ever touched through a single
    /// [`Store::update_partial`] carrying `descendants` and `children`.
    pub async fn apply(&self, tree: &Tree) -> Result<UpsertOutcome, StoreError> {
        let id = tree.id();

        let existing = match self.store.find_by_key(id).await? {
            Some(record) => record,
            None => {
                self.store.insert_record(tree).await?;
                info!(id = %id, nodes = tree.node_count(), "[UPSERT] Inserted new record");
                return Ok(UpsertOutcome::Inserted);
            }
        };

        if self.is_current(&existing, tree) {
            debug!(
                id = %id,
                descendants = tree.descendant_count(),
                "[UPSERT] Record already current, skipping"
            );
            return Ok(UpsertOutcome::Skipped);
        }

        debug!(
            id = %id,
            stored = existing.descendant_count,
            fetched = tree.descendant_count(),
            "[UPSERT] Record out of date, updating descendants and children"
        );
        self.store
            .update_partial(id, RecordUpdate::from_tree(tree))
            .await?;
        Ok(UpsertOutcome::Updated)
    }

    fn is_current(&self, existing: &Record, tree: &Tree) -> bool {
        if existing.descendant_count != tree.descendant_count() {
            return false;
        }
        match self.change_detection {
            ChangeDetection::DescendantCount => true,
            ChangeDetection::Structure => Tree::same_shape(&existing.children, &tree.children),
        }
    }
}
