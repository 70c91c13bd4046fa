//! Issue cache sync

use std::collections::HashSet;

use tracing::{info, warn};

use crate::error::Result;
use crate::issues::extract::IssueExtractor;
use crate::models::{IssueRecord, SyncReport};
use crate::services::tracker::{BatchPlan, Collection, TrackerClient};
use crate::store::IssueStore;

pub struct IssueSync<'a, S: ?Sized> {
    pub tracker: &'a TrackerClient,
    pub store: &'a S,
    pub extractor: &'a IssueExtractor,
}

impl<'a, S: IssueStore + ?Sized> IssueSync<'a, S> {
    /// Fetch the most recently updated issues and swap them into the cache.
    /// Zero fetched issues is a successful no-op that keeps the current rows.
    pub async fn sync(&self, plan: BatchPlan) -> Result<SyncReport> {
        self.tracker.probe(Collection::Issues).await?;

        let fetch = self.tracker.fetch_all(Collection::Issues, plan).await;
        let fetched = fetch.items.len();

        // Pages can overlap while upstream ordering shifts; first copy wins.
        let mut seen = HashSet::new();
        let issues: Vec<IssueRecord> = fetch
            .items
            .into_iter()
            .filter_map(|raw| self.extractor.extract(raw))
            .filter(|issue| seen.insert(issue.redmine_id))
            .collect();
        if issues.len() < fetched {
            warn!(dropped = fetched - issues.len(), "Dropped issues without id or duplicated across pages");
        }

        if issues.is_empty() {
            info!(failed_batches = fetch.failed_batches, "No issues fetched, nothing to sync");
            return Ok(SyncReport {
                failed_batches: fetch.failed_batches,
                ..SyncReport::nothing_to_sync()
            });
        }

        let saved = self.store.replace_issues(&issues).await?;
        info!(fetched, saved, failed_batches = fetch.failed_batches, "Issue cache synced");

        Ok(SyncReport {
            message: format!("Synced {} issues", saved),
            fetched,
            saved,
            failed_batches: fetch.failed_batches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::extract::FieldRoleMap;
    use crate::issues::test_support::issue;
    use crate::services::tracker::TrackerConfig;
    use crate::store::memory::MemoryStore;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tracker(server: &MockServer) -> TrackerClient {
        TrackerClient::new(&TrackerConfig {
            base_url: server.uri(),
            api_key: "k".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_zero_issues_keeps_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"issues": []})))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        store
            .replace_issues(&[issue(1, 10, "2024-01-01 00:00:00", "2024-01-01 00:00:00")])
            .await
            .unwrap();

        let extractor = IssueExtractor::new(FieldRoleMap::default(), 9);
        let report = IssueSync {
            tracker: &tracker(&server),
            store: &store,
            extractor: &extractor,
        }
        .sync(BatchPlan::new(100, 50, 10))
        .await
        .unwrap();

        assert_eq!(report.saved, 0);
        assert_eq!(report.fetched, 0);
        assert_eq!(store.issue_count(), 1);
    }

    #[tokio::test]
    async fn test_sync_replaces_and_dedupes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [
                    {"id": 3, "project": {"id": 10, "name": "p"}, "status": {"id": 1, "name": "New"}},
                    {"id": 2, "project": {"id": 10, "name": "p"}, "status": {"id": 1, "name": "New"}}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [
                    {"id": 2, "project": {"id": 10, "name": "p"}, "status": {"id": 5, "name": "Closed"}},
                    {"id": 1}
                ]
            })))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        store
            .replace_issues(&[issue(99, 10, "2024-01-01 00:00:00", "2024-01-01 00:00:00")])
            .await
            .unwrap();

        let extractor = IssueExtractor::new(FieldRoleMap::default(), 9);
        let report = IssueSync {
            tracker: &tracker(&server),
            store: &store,
            extractor: &extractor,
        }
        .sync(BatchPlan::new(4, 2, 10))
        .await
        .unwrap();

        assert_eq!(report.fetched, 4);
        assert_eq!(report.saved, 3);
        assert_eq!(store.issue_count(), 3);
        assert!(store.issues_by_ids(&[99]).await.unwrap().is_empty());
        assert_eq!(store.issues_by_ids(&[2]).await.unwrap()[0].status_name, "New");
    }
}
