//! Redmine REST API client
//!
//! This module provides:
//! - Paged collection fetches fanned out over a bounded number of requests
//! - Single project/issue reads and the issue status update
//! - Identity lookups used by login passthrough and key registration
//! - Wiki page and attachment passthrough for the main dashboard

use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::models::IssueStatus;

/// Header carrying the API key on every authenticated request
pub const API_KEY_HEADER: &str = "X-Redmine-API-Key";

const LOGIN_TIMEOUT_SECS: u64 = 5;
const VERSION_ISSUE_LIMIT: usize = 100;

/// Connection settings for the upstream tracker
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub base_url: String,
    /// System key used for syncs and reads not attributed to a user
    pub api_key: String,
    pub timeout: Duration,
}

/// Paged collections exposed by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Projects,
    Issues,
}

impl Collection {
    fn path(self) -> &'static str {
        match self {
            Collection::Projects => "/projects.json",
            Collection::Issues => "/issues.json",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Collection::Projects => "projects",
            Collection::Issues => "issues",
        }
    }

    fn extra_params(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Collection::Projects => &[],
            // every status, most recently touched first
            Collection::Issues => &[("sort", "updated_on:desc"), ("status_id", "*")],
        }
    }
}

/// How a paged fetch is split into offset batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub limit: usize,
    pub batch_size: usize,
    pub concurrency: usize,
}

impl BatchPlan {
    pub fn new(limit: usize, batch_size: usize, concurrency: usize) -> Self {
        Self {
            limit,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    pub fn max_batches(&self) -> usize {
        self.limit.div_ceil(self.batch_size)
    }

    pub fn offsets(&self) -> Vec<usize> {
        (0..self.max_batches()).map(|i| i * self.batch_size).collect()
    }
}

/// Items collected by a paged fetch
#[derive(Debug, Default)]
pub struct PagedFetch {
    pub items: Vec<Value>,
    pub batches: usize,
    pub failed_batches: usize,
}

/// Identity returned by `/users/current.json`
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerUser {
    #[serde(default)]
    pub id: Option<i64>,
    pub login: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
}

impl TrackerUser {
    /// "first last", falling back to the login when both are blank
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.firstname, self.lastname).trim().to_string();
        if name.is_empty() {
            self.login.clone()
        } else {
            name
        }
    }
}

/// A downloaded attachment
#[derive(Debug, Clone)]
pub struct Attachment {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Redmine REST API client
#[derive(Clone)]
pub struct TrackerClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl TrackerClient {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn ensure_success(response: Response, what: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Err(AppError::UpstreamError(format!("{} failed with {}: {}", what, status, text)))
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)], api_key: &str) -> Result<Value> {
        let response = self
            .client
            .get(self.url(path))
            .header(API_KEY_HEADER, api_key)
            .query(query)
            .send()
            .await?;
        let response = Self::ensure_success(response, path).await?;
        Ok(response.json().await?)
    }

    /// Fail fast when the tracker does not answer a one-item page
    pub async fn probe(&self, collection: Collection) -> Result<()> {
        self.fetch_page(collection, 0, 1).await.map(|_| ())
    }

    /// One page of a collection
    pub async fn fetch_page(&self, collection: Collection, offset: usize, limit: usize) -> Result<Vec<Value>> {
        let mut query = vec![("limit", limit.to_string()), ("offset", offset.to_string())];
        query.extend(collection.extra_params().iter().map(|(k, v)| (*k, v.to_string())));

        let body = self.get_json(collection.path(), &query, &self.api_key).await?;
        Ok(body
            .get(collection.key())
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Fetch every batch of `plan` with at most `plan.concurrency` requests in
    /// flight. Failed batches are logged and skipped; empty batches do not end
    /// the fetch early. Items come back ordered by batch offset.
    pub async fn fetch_all(&self, collection: Collection, plan: BatchPlan) -> PagedFetch {
        let offsets = plan.offsets();
        let batches = offsets.len();

        let mut results: Vec<(usize, Result<Vec<Value>>)> = stream::iter(offsets)
            .map(|offset| async move { (offset, self.fetch_page(collection, offset, plan.batch_size).await) })
            .buffer_unordered(plan.concurrency)
            .collect()
            .await;
        results.sort_by_key(|(offset, _)| *offset);

        let mut fetch = PagedFetch {
            batches,
            ..PagedFetch::default()
        };
        for (offset, result) in results {
            match result {
                Ok(items) => {
                    debug!(collection = collection.key(), offset, count = items.len(), "Fetched batch");
                    fetch.items.extend(items);
                }
                Err(e) => {
                    warn!(collection = collection.key(), offset, error = %e, "Batch fetch failed");
                    fetch.failed_batches += 1;
                }
            }
        }
        fetch
    }

    /// Single project by numeric id or identifier
    pub async fn project(&self, id_or_identifier: &str) -> Result<Value> {
        let body = self
            .get_json(&format!("/projects/{}.json", id_or_identifier), &[], &self.api_key)
            .await?;
        body.get("project")
            .cloned()
            .ok_or_else(|| AppError::UpstreamError("project payload missing".into()))
    }

    /// Single issue, read with `api_key` or the system key
    pub async fn issue(&self, redmine_id: i64, api_key: Option<&str>) -> Result<Value> {
        let body = self
            .get_json(
                &format!("/issues/{}.json", redmine_id),
                &[],
                api_key.unwrap_or(&self.api_key),
            )
            .await?;
        body.get("issue")
            .cloned()
            .ok_or_else(|| AppError::UpstreamError("issue payload missing".into()))
    }

    /// Ask the tracker to move an issue to `status_id`. Returns whether the
    /// request was accepted; acceptance alone does not prove the change stuck.
    pub async fn update_issue_status(&self, redmine_id: i64, status_id: i64, api_key: &str) -> Result<bool> {
        let response = self
            .client
            .put(self.url(&format!("/issues/{}.json", redmine_id)))
            .header(API_KEY_HEADER, api_key)
            .json(&json!({ "issue": { "status_id": status_id } }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(redmine_id, %status, "Issue update rejected");
        }
        Ok(status.is_success())
    }

    /// Identity behind an API key, or `None` when the tracker rejects it
    pub async fn current_user(&self, api_key: &str) -> Result<Option<TrackerUser>> {
        let response = self
            .client
            .get(self.url("/users/current.json"))
            .header(API_KEY_HEADER, api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(None);
        }
        let body: Value = response.json().await?;
        let user = body
            .get("user")
            .cloned()
            .ok_or_else(|| AppError::UpstreamError("user payload missing".into()))?;
        Ok(Some(serde_json::from_value(user).map_err(|e| {
            AppError::UpstreamError(format!("malformed user payload: {}", e))
        })?))
    }

    /// Login passthrough: only HTTP 200 counts as valid credentials
    pub async fn login(&self, username: &str, password: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.url("/users/current.json"))
            .basic_auth(username, Some(password))
            .timeout(Duration::from_secs(LOGIN_TIMEOUT_SECS))
            .send()
            .await?;
        Ok(response.status() == StatusCode::OK)
    }

    pub async fn issue_statuses(&self) -> Result<Vec<IssueStatus>> {
        let body = self.get_json("/issue_statuses.json", &[], &self.api_key).await?;
        let statuses = body
            .get("issue_statuses")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|s| {
                        let id = s.get("id")?.as_i64()?;
                        let name = s.get("name")?.as_str()?.to_string();
                        let is_closed = s.get("is_closed").and_then(Value::as_bool).unwrap_or(false);
                        Some(IssueStatus { id, name, is_closed })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(statuses)
    }

    /// Versions (roadmap milestones) of a project
    pub async fn versions(&self, project_identifier: &str) -> Result<Vec<Value>> {
        let body = self
            .get_json(&format!("/projects/{}/versions.json", project_identifier), &[], &self.api_key)
            .await?;
        Ok(body
            .get("versions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Ids of issues attached to a version, any status
    pub async fn version_issue_ids(&self, version_id: i64) -> Result<Vec<i64>> {
        let query = [
            ("fixed_version_id", version_id.to_string()),
            ("limit", VERSION_ISSUE_LIMIT.to_string()),
            ("status_id", "*".to_string()),
        ];
        let body = self.get_json("/issues.json", &query, &self.api_key).await?;
        Ok(body
            .get("issues")
            .and_then(Value::as_array)
            .map(|issues| issues.iter().filter_map(|i| i.get("id")?.as_i64()).collect())
            .unwrap_or_default())
    }

    /// Wiki page with its attachment list
    pub async fn wiki_page(&self, project: &str, page: &str) -> Result<Value> {
        let query = [("include", "attachments".to_string())];
        let body = self
            .get_json(&format!("/projects/{}/wiki/{}.json", project, page), &query, &self.api_key)
            .await?;
        body.get("wiki_page")
            .cloned()
            .ok_or_else(|| AppError::UpstreamError("wiki payload missing".into()))
    }

    pub fn attachment_url(&self, attachment_id: i64, filename: &str) -> String {
        self.url(&format!("/attachments/download/{}/{}", attachment_id, filename))
    }

    pub async fn attachment(&self, attachment_id: i64) -> Result<Attachment> {
        let response = self
            .client
            .get(self.url(&format!("/attachments/download/{}", attachment_id)))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let response = Self::ensure_success(response, "attachment download").await?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        Ok(Attachment { content_type, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_eq, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> TrackerClient {
        TrackerClient::new(&TrackerConfig {
            base_url: format!("{}/", server.uri()),
            api_key: "system-key".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_batch_plan() {
        let plan = BatchPlan::new(120, 50, 10);
        assert_eq!(plan.max_batches(), 3);
        assert_eq!(plan.offsets(), vec![0, 50, 100]);

        assert_eq!(BatchPlan::new(0, 50, 10).max_batches(), 0);
        assert_eq!(BatchPlan::new(50, 50, 10).offsets(), vec![0]);
        assert_eq!(BatchPlan::new(10, 0, 0).batch_size, 1);
    }

    #[test]
    fn test_display_name_falls_back_to_login() {
        let user = TrackerUser {
            id: None,
            login: "jdoe".into(),
            firstname: " ".into(),
            lastname: String::new(),
        };
        assert_eq!(user.display_name(), "jdoe");
    }

    #[tokio::test]
    async fn test_fetch_all_merges_batches_and_skips_failures() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/projects.json"))
            .and(query_param("offset", "0"))
            .and(header_eq(API_KEY_HEADER, "system-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "projects": [{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]
            })))
            .mount(&server)
            .await;
        // sparse page in the middle must not stop the fetch
        Mock::given(method("GET"))
            .and(path("/projects.json"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"projects": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects.json"))
            .and(query_param("offset", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "projects": [{"id": 5, "name": "e"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects.json"))
            .and(query_param("offset", "6"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetch = client(&server)
            .fetch_all(Collection::Projects, BatchPlan::new(8, 2, 3))
            .await;

        assert_eq!(fetch.batches, 4);
        assert_eq!(fetch.failed_batches, 1);
        let ids: Vec<i64> = fetch.items.iter().map(|p| p["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 5]);
    }

    #[tokio::test]
    async fn test_issue_pages_request_all_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .and(query_param("status_id", "*"))
            .and(query_param("sort", "updated_on:desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"issues": [{"id": 7}]})))
            .mount(&server)
            .await;

        let page = client(&server).fetch_page(Collection::Issues, 0, 50).await.unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_probe_fails_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects.json"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client(&server).probe(Collection::Projects).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamError(_)));
    }

    #[tokio::test]
    async fn test_login_requires_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/current.json"))
            .and(header_eq("authorization", "Basic amRvZTpzZWNyZXQ="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {"login": "jdoe"}})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/current.json"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let tracker = client(&server);
        assert!(tracker.login("jdoe", "secret").await.unwrap());
        assert!(!tracker.login("jdoe", "wrong").await.unwrap());
    }

    #[tokio::test]
    async fn test_current_user_with_rejected_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/current.json"))
            .and(header_eq(API_KEY_HEADER, "good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": {"id": 3, "login": "jdoe", "firstname": "Jane", "lastname": "Doe"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/current.json"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let tracker = client(&server);
        let user = tracker.current_user("good").await.unwrap().unwrap();
        assert_eq!(user.display_name(), "Jane Doe");
        assert!(tracker.current_user("bad").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_issue_statuses_skip_incomplete_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issue_statuses.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issue_statuses": [
                    {"id": 1, "name": "New", "is_closed": false},
                    {"id": 5, "name": "Closed", "is_closed": true},
                    {"name": "No id"}
                ]
            })))
            .mount(&server)
            .await;

        let statuses = client(&server).issue_statuses().await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses[1].is_closed);
    }
}
