//! Application state shared across handlers

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::hierarchy::{HierarchyCache, HierarchySync, LevelRules};
use crate::issues::status::sync_statuses;
use crate::issues::{IssueExtractor, IssueSync};
use crate::models::SyncReport;
use crate::routes::metrics::{Metrics, SyncKind};
use crate::services::roadmap::RoadmapSync;
use crate::services::{ApiKeyCipher, TrackerClient};
use crate::store::Store;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Cached tracker data
    pub store: Arc<dyn Store>,
    /// Upstream client authenticated with the system key
    pub tracker: TrackerClient,
    /// Project tree served to the drill-down endpoints
    pub hierarchy: Arc<HierarchyCache>,
    pub rules: Arc<LevelRules>,
    pub extractor: Arc<IssueExtractor>,
    pub cipher: ApiKeyCipher,
    pub config: Arc<Config>,
    /// Sync counters for Prometheus
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        let tracker = TrackerClient::new(&config.tracker)?;
        let cipher = ApiKeyCipher::from_base64(&config.api_key_secret)?;
        let extractor = IssueExtractor::new(config.field_roles.clone(), config.issue_time_offset_hours);

        Ok(Self {
            store,
            tracker,
            hierarchy: Arc::new(HierarchyCache::new(config.customer_project_ids.clone())),
            rules: Arc::new(config.level_rules()),
            extractor: Arc::new(extractor),
            cipher,
            config: Arc::new(config),
            metrics: Arc::new(Metrics::new()),
        })
    }

    /// Rebuild the project snapshot and tree; `limit` overrides the configured one
    pub async fn sync_projects(&self, limit: Option<usize>) -> Result<SyncReport> {
        let plan = self.config.project_plan(limit);
        let outcome = HierarchySync {
            tracker: &self.tracker,
            store: self.store.as_ref(),
            rules: &self.rules,
            cache: &self.hierarchy,
        }
        .sync(plan)
        .instrument(tracing::info_span!("project_sync", run_id = %Uuid::new_v4()))
        .await;

        self.metrics.observe(SyncKind::Projects, &outcome);
        outcome
    }

    pub async fn sync_issues(&self, limit: Option<usize>) -> Result<SyncReport> {
        let plan = self.config.issue_plan(limit);
        let outcome = IssueSync {
            tracker: &self.tracker,
            store: self.store.as_ref(),
            extractor: &self.extractor,
        }
        .sync(plan)
        .instrument(tracing::info_span!("issue_sync", run_id = %Uuid::new_v4()))
        .await;

        self.metrics.observe(SyncKind::Issues, &outcome);
        outcome
    }

    pub async fn sync_statuses(&self) -> Result<SyncReport> {
        let outcome = sync_statuses(&self.tracker, self.store.as_ref()).await;
        self.metrics.observe(SyncKind::Statuses, &outcome);
        outcome
    }

    pub async fn sync_roadmap(&self) -> Result<SyncReport> {
        let outcome = RoadmapSync {
            tracker: &self.tracker,
            store: self.store.as_ref(),
            customer_ids: &self.config.customer_project_ids,
            excluded_versions: &self.config.roadmap_excluded_versions,
        }
        .sync()
        .instrument(tracing::info_span!("roadmap_sync", run_id = %Uuid::new_v4()))
        .await;

        self.metrics.observe(SyncKind::Roadmap, &outcome);
        outcome
    }
}
