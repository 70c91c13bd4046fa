//! HTTP surface

pub mod auth;
pub mod health;
pub mod issues;
pub mod main_page;
pub mod metrics;
pub mod settings;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

/// All routes, without middleware layers
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health and metrics (Kubernetes probes + Prometheus)
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/metrics", get(metrics::prometheus_metrics))
        // Login passthrough
        .route("/api/login", post(auth::login))
        // Drill-down selectors
        .route("/api/issues/site", get(issues::sites))
        .route("/api/issues/sub-site", get(issues::sub_site))
        .route("/api/issues/sub-sites", post(issues::sub_sites))
        .route("/api/issues/product-list", get(issues::product_list))
        .route("/api/issues/product-lists", post(issues::product_lists))
        .route("/api/issues/get-all-product-list", post(issues::all_product_list))
        // Reports
        .route("/api/issues/get-summary-report", post(issues::summary_report))
        .route("/api/issues/get-progress-data", post(issues::progress_data))
        .route("/api/issues/get-type-data", post(issues::type_data))
        .route("/api/issues/get-member-data", post(issues::member_data))
        .route("/api/issues/get-hw-data", post(issues::hw_data))
        .route("/api/issues/get-sw-data", post(issues::sw_data))
        .route("/api/issues/update-progress-status", put(issues::update_progress_status))
        // Settings and manual syncs
        .route("/api/settings/save-user-api-key", post(settings::save_user_api_key))
        .route("/api/settings/check-user-api-key/:login", get(settings::check_user_api_key))
        .route("/api/settings/sync-statuses", post(settings::sync_statuses))
        .route("/api/settings/sync-issues", post(settings::sync_issues))
        .route("/api/settings/sync-projects", post(settings::sync_projects))
        .route("/api/settings/sync-roadmap-data", post(settings::sync_roadmap_data))
        // Main dashboard
        .route("/api/main/roadmap", get(main_page::roadmap_versions))
        .route("/api/main/roadmap-dashboard", get(main_page::roadmap))
        .route("/api/main/wiki-content", get(main_page::wiki))
        .route("/api/main/attachment-image/:attachment_id", get(main_page::attachment))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::build_forest;
    use crate::issues::test_support::issue;
    use crate::models::{ProjectRecord, RoadmapVersion};
    use crate::state::test_support::state;
    use crate::store::{HierarchyStore, IssueStore, RoadmapStore};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OFFLINE_TRACKER: &str = "http://127.0.0.1:9";

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = match body {
            Some(value) => Body::from(value.to_string()),
            None => Body::empty(),
        };
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn record(id: i64, name: &str, parent: Option<i64>) -> ProjectRecord {
        let mut raw = json!({"id": id, "name": name});
        if let Some(p) = parent {
            raw["parent"] = json!({"id": p});
        }
        ProjectRecord::from_json(raw).unwrap()
    }

    /// Customer 100 > site "Fab A" > building > "Etcher #01", "Etcher #02"
    async fn seeded_app() -> Router {
        let (state, store) = state(OFFLINE_TRACKER);
        let forest = build_forest(
            vec![
                record(100, "01. Customer", None),
                record(200, "Fab A", Some(100)),
                record(300, "Bldg 1", Some(200)),
                record(401, "Etcher #01", Some(300)),
                record(402, "Etcher #02", Some(300)),
            ],
            &state.rules,
        );
        store.replace_tree(&forest.nodes).await.unwrap();
        store
            .replace_issues(&[
                issue(1, 401, "2024-03-05 10:00:00", "2024-03-06 00:00:00"),
                issue(2, 402, "2024-04-10 10:00:00", "2024-04-10 10:00:00"),
            ])
            .await
            .unwrap();
        router(state)
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = state(OFFLINE_TRACKER);
        let (status, body) = call(router(state), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_site_and_product_listings() {
        let app = seeded_app().await;

        let (status, body) = call(app.clone(), "GET", "/api/issues/site", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["project_name"], "Customer");
        assert_eq!(body["data"][0]["site_index"], 0);

        let (_, body) = call(app.clone(), "GET", "/api/issues/sub-site?site_index=0", None).await;
        assert_eq!(body["data"], json!([{"project_name": "ALL"}, {"project_name": "Fab A"}]));

        let (_, body) = call(
            app.clone(),
            "GET",
            "/api/issues/product-list?sub_project_name=Fab%20A",
            None,
        )
        .await;
        assert_eq!(body["data"], json!([{"name": "ALL"}, {"name": "Etcher"}]));

        let (_, body) = call(app, "POST", "/api/issues/product-lists", Some(json!({"sub_site_names": []}))).await;
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_sub_site_index_out_of_range() {
        let app = seeded_app().await;
        let (status, body) = call(app, "GET", "/api/issues/sub-site?site_index=7", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_summary_report_filters_by_selector() {
        let app = seeded_app().await;
        let (status, body) = call(
            app,
            "POST",
            "/api/issues/get-summary-report",
            Some(json!({
                "start_date": "2024-03-01",
                "end_date": "2024-03-31",
                "site_index": 0,
                "sub_site_name": "ALL",
                "product_name": "Etcher"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "1 issues");
        let blocks = body["data"]["blocks"].as_array().unwrap();
        assert_eq!(blocks[0]["type"], "progress_summary");
        assert_eq!(blocks[1]["type"], "type_data_list");
    }

    #[tokio::test]
    async fn test_report_rejects_missing_selector() {
        let app = seeded_app().await;
        let (status, body) = call(
            app,
            "POST",
            "/api/issues/get-progress-data",
            Some(json!({"start_date": "2024-03-01", "end_date": "2024-03-31"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_status_change_requires_fields() {
        let app = seeded_app().await;
        let (status, _) = call(
            app,
            "PUT",
            "/api/issues/update-progress-status",
            Some(json!({"redmine_id": 1, "old_status_name": "New"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_roadmap_versions_by_status() {
        let (state, store) = state(OFFLINE_TRACKER);
        store
            .replace_roadmap(&[RoadmapVersion {
                redmine_version_id: 7,
                project_id: 100,
                project_name: "01. Customer".into(),
                version_name: "2024 Q1".into(),
                status: "closed".into(),
                description: String::new(),
                due_date: None,
                created_on: None,
                updated_on: None,
                wiki_page_title: String::new(),
                wiki_page_url: String::new(),
                connected_issue_ids: "1".into(),
            }])
            .await
            .unwrap();
        let app = router(state);

        let (status, body) = call(app.clone(), "GET", "/api/main/roadmap?status=closed", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["redmine_version_id"], 7);

        let (_, body) = call(app.clone(), "GET", "/api/main/roadmap?status=open", None).await;
        assert_eq!(body["data"], json!([]));

        let (status, _) = call(app, "GET", "/api/main/roadmap?status=all", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sync_limit_is_validated() {
        let (state, _) = state(OFFLINE_TRACKER);
        let (status, _) = call(router(state), "POST", "/api/settings/sync-projects?limit=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_check_unregistered_key() {
        let (state, _) = state(OFFLINE_TRACKER);
        let (status, body) = call(router(state), "GET", "/api/settings/check-user-api-key/jdoe", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["registered"], false);
    }

    #[tokio::test]
    async fn test_login_passthrough() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/current.json"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (state, _) = state(&server.uri());
        let (status, body) = call(
            router(state),
            "POST",
            "/api/login",
            Some(json!({"id": "jdoe", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_project_sync_updates_metrics() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "projects": [
                    {"id": 100, "name": "01. Customer"},
                    {"id": 200, "name": "Fab A", "parent": {"id": 100}}
                ],
                "total_count": 2
            })))
            .mount(&server)
            .await;

        let (state, _) = state(&server.uri());
        let app = router(state);
        let (status, body) = call(app.clone(), "POST", "/api/settings/sync-projects?limit=50", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["saved"], 2);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("tracker_dash_projects_synced_total 2"));
        assert!(text.contains("tracker_dash_sync_runs_total 1"));
    }
}
