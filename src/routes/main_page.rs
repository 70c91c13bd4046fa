//! Main dashboard: roadmap, wiki pages and attachment images

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::Result;
use crate::models::{ApiResponse, RoadmapVersion};
use crate::services::roadmap::{roadmap_by_status, roadmap_dashboard, RoadmapEntry};
use crate::services::wiki::{attachment_image, wiki_content, InlineImage, WikiContent};
use crate::state::AppState;

/// GET /api/main/roadmap-dashboard
pub async fn roadmap(State(state): State<AppState>) -> Result<Json<ApiResponse<BTreeMap<String, Vec<RoadmapEntry>>>>> {
    let dashboard = roadmap_dashboard(state.store.as_ref()).await?;
    let versions: usize = dashboard.values().map(Vec::len).sum();
    Ok(Json(ApiResponse::ok(
        format!("{} open versions in {} projects", versions, dashboard.len()),
        dashboard,
    )))
}

#[derive(Debug, Deserialize)]
pub struct RoadmapQuery {
    pub status: String,
}

/// GET /api/main/roadmap?status=open|closed
pub async fn roadmap_versions(
    State(state): State<AppState>,
    Query(query): Query<RoadmapQuery>,
) -> Result<Json<ApiResponse<Vec<RoadmapVersion>>>> {
    let versions = roadmap_by_status(state.store.as_ref(), &query.status).await?;
    Ok(Json(ApiResponse::ok(
        format!("{} {} versions", versions.len(), query.status),
        versions,
    )))
}

#[derive(Debug, Deserialize)]
pub struct WikiQuery {
    pub wiki_url: String,
}

/// GET /api/main/wiki-content?wiki_url=
pub async fn wiki(
    State(state): State<AppState>,
    Query(query): Query<WikiQuery>,
) -> Result<Json<ApiResponse<WikiContent>>> {
    let content = wiki_content(&state.tracker, &query.wiki_url).await?;
    Ok(Json(ApiResponse::ok("Wiki page", content)))
}

/// GET /api/main/attachment-image/:attachment_id
pub async fn attachment(
    State(state): State<AppState>,
    Path(attachment_id): Path<i64>,
) -> Result<Json<ApiResponse<InlineImage>>> {
    let image = attachment_image(&state.tracker, attachment_id).await?;
    Ok(Json(ApiResponse::ok("Attachment", image)))
}
