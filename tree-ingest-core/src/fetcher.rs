//! Depth-first materialization of an item into a [`Tree`].
//!
//! Children are fetched one at a time in `kids` order. Parallelism only ever happens
//! across roots (see [`crate::scheduler`]), never inside one tree, so a tree's shape and
//! the number of requests it has outstanding are both deterministic.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::contract::{Item, ItemId, ItemSource, Tree};
use crate::error::TraversalError;

pub struct TreeFetcher<S: ?Sized> {
    source: Arc<S>,
}

impl<S: ?Sized> Clone for TreeFetcher<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<S> TreeFetcher<S>
where
    S: ItemSource + ?Sized,
{
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    /// Resolve every descendant of `item`.
    ///
    /// The first failing fetch aborts the whole traversal; no partial tree is returned.
    /// An id that shows up among its own ancestors is reported as
    /// [`TraversalError::Cycle`]. The same id under two different parents is fine and is
    /// resolved in both places.
    pub async fn resolve(&self, item: Item) -> Result<Tree, TraversalError> {
        let mut path = Vec::new();
        self.resolve_node(item, &mut path).await
    }

    fn resolve_node<'a>(
        &'a self,
        item: Item,
        path: &'a mut Vec<ItemId>,
    ) -> BoxFuture<'a, Result<Tree, TraversalError>> {
        async move {
            if item.child_ids.is_empty() {
                return Ok(Tree::leaf(item));
            }

            path.push(item.id);
            let mut children = Vec::with_capacity(item.child_ids.len());

            for &child_id in &item.child_ids {
                if path.contains(&child_id) {
                    return Err(TraversalError::Cycle {
                        id: child_id,
                        path: path.clone(),
                    });
                }

                debug!(parent = %item.id, child = %child_id, depth = path.len(), "[FETCH] Processing kid");
                let child = self
                    .source
                    .fetch_item(child_id)
                    .await
                    .map_err(|source| TraversalError::Fetch {
                        parent: item.id,
                        child: child_id,
                        source,
                    })?;

                children.push(self.resolve_node(child, path).await?);
            }

            path.pop();
            Ok(Tree { item, children })
        }
        .boxed()
    }
}
