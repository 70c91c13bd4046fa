//! Drill-down selectors, dashboard reports and the progress board

use std::collections::HashSet;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::hierarchy::tree::SiteEntry;
use crate::hierarchy::ALL;
use crate::issues::{StatusChange, StatusChanged, StatusChanger};
use crate::models::{ApiResponse, IssueFilter, IssueRecord};
use crate::report::{self, Block};
use crate::state::AppState;
use crate::store::IssueStore;

/// Selector body shared by every report endpoint.
///
/// The plural lists win; a singular field is the older single-select form and
/// is only read when its list is missing or empty.
#[derive(Debug, Default, Deserialize)]
pub struct SelectorRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub site_indexes: Vec<usize>,
    pub site_index: Option<usize>,
    #[serde(default)]
    pub sub_site_names: Vec<String>,
    pub sub_site_name: Option<String>,
    #[serde(default)]
    pub product_names: Vec<String>,
    pub product_name: Option<String>,
}

/// A validated selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub site_indexes: Vec<usize>,
    pub sub_site_names: Vec<String>,
    pub product_names: Vec<String>,
}

fn date(value: Option<&str>, field: &str) -> Result<NaiveDate> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::InvalidRequest(format!("{} is required", field)))?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| AppError::InvalidRequest(format!("invalid {} '{}': {}", field, value, e)))
}

fn names(plural: Vec<String>, single: Option<String>, field: &str) -> Result<Vec<String>> {
    let list = if plural.is_empty() {
        single.into_iter().filter(|s| !s.is_empty()).collect()
    } else {
        plural
    };
    if list.is_empty() {
        return Err(AppError::InvalidRequest(format!("{} is required", field)));
    }
    Ok(list)
}

impl SelectorRequest {
    pub fn into_selection(self) -> Result<Selection> {
        let start_date = date(self.start_date.as_deref(), "start_date")?;
        let end_date = date(self.end_date.as_deref(), "end_date")?;
        if end_date < start_date {
            return Err(AppError::InvalidRequest(format!(
                "end_date {} is before start_date {}",
                end_date, start_date
            )));
        }

        let site_indexes = if self.site_indexes.is_empty() {
            self.site_index.into_iter().collect()
        } else {
            self.site_indexes
        };
        if site_indexes.is_empty() {
            return Err(AppError::InvalidRequest("site_indexes is required".into()));
        }

        Ok(Selection {
            start_date,
            end_date,
            site_indexes,
            sub_site_names: names(self.sub_site_names, self.sub_site_name, "sub_site_names")?,
            product_names: names(self.product_names, self.product_name, "product_names")?,
        })
    }
}

/// Cached issues picked by a selector
async fn selected_issues(state: &AppState, request: SelectorRequest) -> Result<Vec<IssueRecord>> {
    let selection = request.into_selection()?;
    let tree = state.hierarchy.tree(state.store.as_ref()).await?;
    let project_ids = tree.resolve_all(
        &selection.site_indexes,
        &selection.sub_site_names,
        &selection.product_names,
    )?;

    let issues = state
        .store
        .issues_by_filter(&IssueFilter {
            start_date: selection.start_date,
            end_date: selection.end_date,
            project_ids,
        })
        .await?;
    debug!(count = issues.len(), "Selected issues for report");
    Ok(issues)
}

#[derive(Debug, Serialize)]
pub struct ReportData {
    pub blocks: Vec<Block>,
}

type ReportResponse = Result<Json<ApiResponse<ReportData>>>;

async fn run_report(
    state: &AppState,
    request: SelectorRequest,
    build: fn(&[IssueRecord]) -> Result<Vec<Block>>,
) -> ReportResponse {
    let issues = selected_issues(state, request).await?;
    let blocks = build(&issues)?;
    Ok(Json(ApiResponse::ok(
        format!("{} issues", issues.len()),
        ReportData { blocks },
    )))
}

/// POST /api/issues/get-summary-report
pub async fn summary_report(State(state): State<AppState>, Json(request): Json<SelectorRequest>) -> ReportResponse {
    run_report(&state, request, report::summary_report).await
}

/// POST /api/issues/get-progress-data
pub async fn progress_data(State(state): State<AppState>, Json(request): Json<SelectorRequest>) -> ReportResponse {
    run_report(&state, request, report::progress_report).await
}

/// POST /api/issues/get-type-data
pub async fn type_data(State(state): State<AppState>, Json(request): Json<SelectorRequest>) -> ReportResponse {
    run_report(&state, request, report::type_report).await
}

/// POST /api/issues/get-member-data
pub async fn member_data(State(state): State<AppState>, Json(request): Json<SelectorRequest>) -> ReportResponse {
    run_report(&state, request, report::member_report).await
}

/// POST /api/issues/get-hw-data
pub async fn hw_data(State(state): State<AppState>, Json(request): Json<SelectorRequest>) -> ReportResponse {
    run_report(&state, request, report::hw_report).await
}

/// POST /api/issues/get-sw-data
pub async fn sw_data(State(state): State<AppState>, Json(request): Json<SelectorRequest>) -> ReportResponse {
    run_report(&state, request, report::sw_report).await
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubSite {
    pub project_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub name: String,
}

fn with_all<T>(make: impl Fn(String) -> T, names: impl IntoIterator<Item = String>) -> Vec<T> {
    std::iter::once(ALL.to_string()).chain(names).map(make).collect()
}

fn dedup(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names.into_iter().filter(|name| seen.insert(name.clone())).collect()
}

/// GET /api/issues/site
pub async fn sites(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<SiteEntry>>>> {
    let tree = state.hierarchy.tree(state.store.as_ref()).await?;
    Ok(Json(ApiResponse::ok("Sites", tree.sites())))
}

#[derive(Debug, Deserialize)]
pub struct SiteQuery {
    pub site_index: usize,
}

/// GET /api/issues/sub-site?site_index=
pub async fn sub_site(
    State(state): State<AppState>,
    Query(query): Query<SiteQuery>,
) -> Result<Json<ApiResponse<Vec<SubSite>>>> {
    let tree = state.hierarchy.tree(state.store.as_ref()).await?;
    let children = tree
        .sub_sites(query.site_index)?
        .into_iter()
        .map(|node| node.project_name.clone());
    Ok(Json(ApiResponse::ok(
        "Sub-sites",
        with_all(|project_name| SubSite { project_name }, children),
    )))
}

#[derive(Debug, Default, Deserialize)]
pub struct SitesRequest {
    #[serde(default)]
    pub site_indexes: Vec<usize>,
}

/// POST /api/issues/sub-sites
///
/// Unknown site indexes are skipped.
pub async fn sub_sites(
    State(state): State<AppState>,
    Json(request): Json<SitesRequest>,
) -> Result<Json<ApiResponse<Vec<SubSite>>>> {
    if request.site_indexes.is_empty() {
        return Ok(Json(ApiResponse::ok("Sub-sites", Vec::new())));
    }

    let tree = state.hierarchy.tree(state.store.as_ref()).await?;
    let mut children = Vec::new();
    for site_index in request.site_indexes {
        match tree.sub_sites(site_index) {
            Ok(nodes) => children.extend(nodes.into_iter().map(|node| node.project_name.clone())),
            Err(e) => debug!(site_index, error = %e, "Skipping unknown site"),
        }
    }
    Ok(Json(ApiResponse::ok(
        "Sub-sites",
        with_all(|project_name| SubSite { project_name }, dedup(children)),
    )))
}

#[derive(Debug, Deserialize)]
pub struct SubSiteQuery {
    pub sub_project_name: String,
}

/// GET /api/issues/product-list?sub_project_name=
pub async fn product_list(
    State(state): State<AppState>,
    Query(query): Query<SubSiteQuery>,
) -> Result<Json<ApiResponse<Vec<Product>>>> {
    let tree = state.hierarchy.tree(state.store.as_ref()).await?;
    let products = tree.products(&query.sub_project_name);
    Ok(Json(ApiResponse::ok(
        "Products",
        with_all(|name| Product { name }, products),
    )))
}

async fn products_of(state: &AppState, sub_site_names: &[String]) -> Result<Vec<Product>> {
    if sub_site_names.is_empty() {
        return Ok(Vec::new());
    }
    let tree = state.hierarchy.tree(state.store.as_ref()).await?;
    let products = dedup(sub_site_names.iter().flat_map(|name| tree.products(name)));
    Ok(with_all(|name| Product { name }, products))
}

#[derive(Debug, Default, Deserialize)]
pub struct SubSitesRequest {
    #[serde(default)]
    pub sub_site_names: Vec<String>,
}

/// POST /api/issues/product-lists
pub async fn product_lists(
    State(state): State<AppState>,
    Json(request): Json<SubSitesRequest>,
) -> Result<Json<ApiResponse<Vec<Product>>>> {
    let products = products_of(&state, &request.sub_site_names).await?;
    Ok(Json(ApiResponse::ok("Products", products)))
}

#[derive(Debug, Default, Deserialize)]
pub struct SubSiteListRequest {
    #[serde(default)]
    pub sub_site_list: Vec<String>,
}

/// POST /api/issues/get-all-product-list
pub async fn all_product_list(
    State(state): State<AppState>,
    Json(request): Json<SubSiteListRequest>,
) -> Result<Json<ApiResponse<Vec<Product>>>> {
    let products = products_of(&state, &request.sub_site_list).await?;
    Ok(Json(ApiResponse::ok("Products", products)))
}

/// PUT /api/issues/update-progress-status
pub async fn update_progress_status(
    State(state): State<AppState>,
    Json(request): Json<StatusChange>,
) -> Result<Json<ApiResponse<StatusChanged>>> {
    let changed = StatusChanger {
        tracker: &state.tracker,
        store: state.store.as_ref(),
        cipher: &state.cipher,
    }
    .change(&request)
    .await?;

    Ok(Json(ApiResponse::ok(
        format!(
            "Issue #{} moved from '{}' to '{}'",
            changed.redmine_id, changed.old_status, changed.new_status
        ),
        changed,
    )))
}
