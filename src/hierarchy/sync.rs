//! Project hierarchy sync: fetch, snapshot, classify, persist

use tracing::{info, warn};

use crate::error::Result;
use crate::hierarchy::cache::HierarchyCache;
use crate::hierarchy::classify::{build_forest, LevelRules};
use crate::models::{ProjectRecord, SyncReport};
use crate::services::tracker::{BatchPlan, Collection, TrackerClient};
use crate::store::HierarchyStore;

/// Everything one hierarchy sync run touches
pub struct HierarchySync<'a, S: ?Sized> {
    pub tracker: &'a TrackerClient,
    pub store: &'a S,
    pub rules: &'a LevelRules,
    pub cache: &'a HierarchyCache,
}

impl<'a, S: HierarchyStore + ?Sized> HierarchySync<'a, S> {
    /// Pull every project, rewrite the flat snapshot and the classified tree.
    ///
    /// Failed batches are skipped. An empty fetch leaves both tables as they
    /// were and reports "nothing to sync".
    pub async fn sync(&self, plan: BatchPlan) -> Result<SyncReport> {
        self.tracker.probe(Collection::Projects).await?;

        let fetch = self.tracker.fetch_all(Collection::Projects, plan).await;
        let fetched = fetch.items.len();

        let records: Vec<ProjectRecord> = fetch
            .items
            .into_iter()
            .filter_map(ProjectRecord::from_json)
            .collect();
        if records.len() < fetched {
            warn!(skipped = fetched - records.len(), "Skipped projects without an id");
        }

        if records.is_empty() {
            info!(failed_batches = fetch.failed_batches, "No projects fetched, nothing to sync");
            return Ok(SyncReport {
                failed_batches: fetch.failed_batches,
                ..SyncReport::nothing_to_sync()
            });
        }

        self.store.replace_snapshot(&records).await?;

        let forest = build_forest(records, self.rules);
        let saved = self.store.replace_tree(&forest.nodes).await?;
        self.cache.invalidate();

        info!(
            fetched,
            saved,
            failed_batches = fetch.failed_batches,
            cyclic = forest.cyclic.len(),
            "Project hierarchy synced"
        );

        Ok(SyncReport {
            message: format!("Synced {} projects", saved),
            fetched,
            saved,
            failed_batches: fetch.failed_batches,
        })
    }
}
