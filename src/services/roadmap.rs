//! Customer roadmap versions: sync from the tracker and the dashboard view

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::hierarchy::tree::display_name;
use crate::models::{IssueRecord, RoadmapVersion, SyncReport};
use crate::report::breakdown::{type_breakdown, TypeBreakdown};
use crate::services::tracker::TrackerClient;
use crate::store::{IssueStore, RoadmapStore};

/// Version names skipped by default; they are placeholders, not milestones
pub const DEFAULT_EXCLUDED_VERSIONS: [&str; 2] = ["기본설정", "기본 설정"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoadmapStatus {
    Open,
    Closed,
}

impl RoadmapStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RoadmapStatus::Open => "open",
            RoadmapStatus::Closed => "closed",
        }
    }
}

impl FromStr for RoadmapStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(RoadmapStatus::Open),
            "closed" => Ok(RoadmapStatus::Closed),
            other => Err(AppError::InvalidRequest(format!(
                "invalid status '{}', expected 'open' or 'closed'",
                other
            ))),
        }
    }
}

fn str_field(raw: &Value, key: &str) -> String {
    raw.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn timestamp(raw: &Value, key: &str) -> Option<DateTime<Utc>> {
    let value = raw.get(key)?.as_str()?;
    DateTime::parse_from_rfc3339(value).ok().map(|ts| ts.with_timezone(&Utc))
}

pub struct RoadmapSync<'a, S: ?Sized> {
    pub tracker: &'a TrackerClient,
    pub store: &'a S,
    pub customer_ids: &'a [i64],
    pub excluded_versions: &'a [String],
}

impl<'a, S: RoadmapStore + ?Sized> RoadmapSync<'a, S> {
    /// Rebuild the roadmap table from every customer project's versions.
    /// A project that cannot be read is logged and skipped; when none can be
    /// read the table is left as it was.
    pub async fn sync(&self) -> Result<SyncReport> {
        let mut versions = Vec::new();
        let mut failed = 0;

        for &project_id in self.customer_ids {
            match self.project_versions(project_id).await {
                Ok(found) => {
                    debug!(project_id, count = found.len(), "Fetched roadmap versions");
                    versions.extend(found);
                }
                Err(e) => {
                    warn!(project_id, error = %e, "Skipping roadmap of project");
                    failed += 1;
                }
            }
        }

        if failed > 0 && failed == self.customer_ids.len() {
            return Err(AppError::UpstreamError(
                "no customer project roadmap could be read".into(),
            ));
        }

        let fetched = versions.len();
        let saved = self.store.replace_roadmap(&versions).await?;
        info!(saved, failed_projects = failed, "Roadmap synced");

        Ok(SyncReport {
            message: format!("Synced {} roadmap versions", saved),
            fetched,
            saved,
            failed_batches: failed,
        })
    }

    async fn project_versions(&self, project_id: i64) -> Result<Vec<RoadmapVersion>> {
        let project = self.tracker.project(&project_id.to_string()).await?;
        let project_name = str_field(&project, "name");
        let identifier = str_field(&project, "identifier");
        if identifier.is_empty() {
            return Err(AppError::UpstreamError(format!(
                "project {} has no identifier",
                project_id
            )));
        }

        let mut versions = Vec::new();
        for raw in self.tracker.versions(&identifier).await? {
            let Some(version_id) = raw.get("id").and_then(Value::as_i64) else {
                continue;
            };
            let version_name = str_field(&raw, "name");
            if self.excluded_versions.iter().any(|name| name == version_name.trim()) {
                continue;
            }

            // issue links are best effort; the version itself is still kept
            let issue_ids = match self.tracker.version_issue_ids(version_id).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(version_id, error = %e, "Failed to fetch version issues");
                    Vec::new()
                }
            };

            let wiki_page_title = str_field(&raw, "wiki_page_title");
            let wiki_page_url = if wiki_page_title.is_empty() {
                String::new()
            } else {
                format!(
                    "{}/projects/{}/wiki/{}",
                    self.tracker.base_url(),
                    identifier,
                    wiki_page_title
                )
            };

            versions.push(RoadmapVersion {
                redmine_version_id: version_id,
                project_id,
                project_name: project_name.clone(),
                version_name,
                status: str_field(&raw, "status"),
                description: str_field(&raw, "description"),
                due_date: raw
                    .get("due_date")
                    .and_then(Value::as_str)
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
                created_on: timestamp(&raw, "created_on"),
                updated_on: timestamp(&raw, "updated_on"),
                wiki_page_title,
                wiki_page_url,
                connected_issue_ids: issue_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            });
        }
        Ok(versions)
    }
}

/// Versions with the given status; anything but `open`/`closed` is rejected
pub async fn roadmap_by_status<S: RoadmapStore + ?Sized>(store: &S, status: &str) -> Result<Vec<RoadmapVersion>> {
    let status: RoadmapStatus = status.parse()?;
    store.roadmap_by_status(status.as_str()).await
}

/// An open version with its cached issues
#[derive(Debug, Clone, Serialize)]
pub struct RoadmapEntry {
    #[serde(flatten)]
    pub version: RoadmapVersion,
    pub connected_issues_detail: Vec<IssueRecord>,
    pub connected_issues_analysis: Option<TypeBreakdown>,
}

/// Open versions grouped by customer display name
pub async fn roadmap_dashboard<S: RoadmapStore + IssueStore + ?Sized>(
    store: &S,
) -> Result<BTreeMap<String, Vec<RoadmapEntry>>> {
    let mut dashboard: BTreeMap<String, Vec<RoadmapEntry>> = BTreeMap::new();

    for mut version in store.roadmap_by_status(RoadmapStatus::Open.as_str()).await? {
        version.project_name = display_name(&version.project_name);
        let issues = store.issues_by_ids(&version.issue_ids()).await?;
        let analysis = (!issues.is_empty()).then(|| type_breakdown(&issues));

        dashboard
            .entry(version.project_name.clone())
            .or_default()
            .push(RoadmapEntry {
                version,
                connected_issues_detail: issues,
                connected_issues_analysis: analysis,
            });
    }
    Ok(dashboard)
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn excluded() -> Vec<String> {
        DEFAULT_EXCLUDED_VERSIONS.iter().map(|s| s.to_string()).collect()
    }

    async fn mount_customer(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/projects/100.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "project": {"id": 100, "name": "01. Acme", "identifier": "acme"}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/acme/versions.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "versions": [
                    {"id": 7, "name": "2024 Q1", "status": "open", "due_date": "2024-03-31",
                     "wiki_page_title": "Q1_Plan", "created_on": "2024-01-02T03:04:05Z"},
                    {"id": 8, "name": " 기본 설정 ", "status": "open"}
                ]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .and(query_param("fixed_version_id", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [{"id": 11}, {"id": 12}]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_sync_builds_versions_and_skips_failed_projects() {
        let server = MockServer::start().await;
        mount_customer(&server).await;
        Mock::given(method("GET"))
            .and(path("/projects/200.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let tracker = tracker(&server);
        let excluded = excluded();
        let report = RoadmapSync {
            tracker: &tracker,
            store: &store,
            customer_ids: &[100, 200],
            excluded_versions: &excluded,
        }
        .sync()
        .await
        .unwrap();

        assert_eq!(report.saved, 1);
        assert_eq!(report.failed_batches, 1);

        let versions = roadmap_by_status(&store, "open").await.unwrap();
        assert_eq!(versions.len(), 1);
        let version = &versions[0];
        assert_eq!(version.project_id, 100);
        assert_eq!(version.connected_issue_ids, "11,12");
        assert_eq!(version.due_date, NaiveDate::from_ymd_opt(2024, 3, 31));
        assert_eq!(version.wiki_page_url, format!("{}/projects/acme/wiki/Q1_Plan", server.uri()));
        assert!(version.created_on.is_some());
    }

    #[tokio::test]
    async fn test_sync_fails_when_no_project_is_readable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let tracker = tracker(&server);
        let excluded = excluded();
        let err = RoadmapSync {
            tracker: &tracker,
            store: &store,
            customer_ids: &[100],
            excluded_versions: &excluded,
        }
        .sync()
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::UpstreamError(_)));
    }

    #[tokio::test]
    async fn test_status_validation() {
        let store = MemoryStore::new();
        assert!(roadmap_by_status(&store, "open").await.unwrap().is_empty());
        assert!(matches!(
            roadmap_by_status(&store, "Open").await,
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_dashboard_groups_open_versions() {
        let server = MockServer::start().await;
        mount_customer(&server).await;

        let store = MemoryStore::new();
        store
            .replace_issues(&[issue(11, 401, "2024-01-05 00:00:00", "2024-01-05 00:00:00")])
            .await
            .unwrap();
        let tracker = tracker(&server);
        let excluded = excluded();
        RoadmapSync {
            tracker: &tracker,
            store: &store,
            customer_ids: &[100],
            excluded_versions: &excluded,
        }
        .sync()
        .await
        .unwrap();

        let dashboard = roadmap_dashboard(&store).await.unwrap();
        let entries = &dashboard["Acme"];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].connected_issues_detail.len(), 1);
        assert!(entries[0].connected_issues_analysis.is_some());
    }
}
