//! In-memory copy of the persisted project tree

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::Result;
use crate::hierarchy::tree::ProjectTree;
use crate::store::HierarchyStore;

/// Lazily loaded project tree, shared by every request handler.
///
/// The tree is loaded from the store on first use and dropped by
/// [`invalidate`](Self::invalidate) after a hierarchy sync. The lock is only
/// held to swap the `Arc`, never across a store call.
///
/// Every invalidation bumps a generation counter. A load that started before
/// an invalidation is handed to its caller but never cached.
pub struct HierarchyCache {
    customer_ids: Vec<i64>,
    generation: AtomicU64,
    tree: RwLock<Option<Arc<ProjectTree>>>,
}

impl HierarchyCache {
    pub fn new(customer_ids: Vec<i64>) -> Self {
        Self {
            customer_ids,
            generation: AtomicU64::new(0),
            tree: RwLock::new(None),
        }
    }

    /// Current tree, loading it from `store` when nothing is cached
    pub async fn tree<S: HierarchyStore + ?Sized>(&self, store: &S) -> Result<Arc<ProjectTree>> {
        let cached = self.tree.read().clone();
        if let Some(tree) = cached {
            return Ok(tree);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let nodes = store.load_tree().await?;
        let tree = Arc::new(ProjectTree::new(nodes, self.customer_ids.clone()));

        let mut slot = self.tree.write();
        if self.generation.load(Ordering::Acquire) == generation {
            debug!(projects = tree.len(), "Loaded project tree into cache");
            *slot = Some(Arc::clone(&tree));
        } else {
            debug!(projects = tree.len(), "Tree changed while loading, not caching");
        }
        Ok(tree)
    }

    /// Drop the cached tree so the next reader reloads it
    pub fn invalidate(&self) {
        let mut slot = self.tree.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        if slot.take().is_some() {
            info!("Project tree cache invalidated");
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.tree.read().is_some()
    }
}
