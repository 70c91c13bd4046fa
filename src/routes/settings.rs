//! Settings: user API keys and manual syncs

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{ApiResponse, SyncReport, UserApiKey};
use crate::services::KeyRegistry;
use crate::state::AppState;
use crate::store::Store;

const MAX_ISSUE_SYNC_LIMIT: usize = 10_000;
const MAX_PROJECT_SYNC_LIMIT: usize = 1_000;

#[derive(Debug, Deserialize)]
pub struct SaveKeyRequest {
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct KeyStatus {
    pub registered: bool,
    pub user: Option<UserApiKey>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

fn checked_limit(limit: Option<usize>, max: usize) -> Result<Option<usize>> {
    match limit {
        Some(n) if n == 0 || n > max => Err(AppError::InvalidRequest(format!(
            "limit must be between 1 and {}",
            max
        ))),
        other => Ok(other),
    }
}

fn key_registry(state: &AppState) -> KeyRegistry<'_, dyn Store> {
    KeyRegistry {
        tracker: &state.tracker,
        store: state.store.as_ref(),
        cipher: &state.cipher,
        email_domain: &state.config.user_email_domain,
    }
}

/// POST /api/settings/save-user-api-key
pub async fn save_user_api_key(
    State(state): State<AppState>,
    Json(request): Json<SaveKeyRequest>,
) -> Result<Json<ApiResponse<UserApiKey>>> {
    let api_key = request
        .api_key
        .ok_or_else(|| AppError::InvalidRequest("api_key is required".into()))?;
    let saved = key_registry(&state).register(&api_key).await?;
    Ok(Json(ApiResponse::ok("API key saved", saved)))
}

/// GET /api/settings/check-user-api-key/:login
pub async fn check_user_api_key(
    State(state): State<AppState>,
    Path(login): Path<String>,
) -> Result<Json<ApiResponse<KeyStatus>>> {
    let user = key_registry(&state).lookup(login.trim()).await?;
    let message = if user.is_some() {
        "API key registered"
    } else {
        "No API key registered"
    };
    Ok(Json(ApiResponse::ok(
        message,
        KeyStatus {
            registered: user.is_some(),
            user,
        },
    )))
}

fn sync_response(report: SyncReport) -> Json<ApiResponse<SyncReport>> {
    Json(ApiResponse::ok(report.message.clone(), report))
}

/// POST /api/settings/sync-statuses
pub async fn sync_statuses(State(state): State<AppState>) -> Result<Json<ApiResponse<SyncReport>>> {
    Ok(sync_response(state.sync_statuses().await?))
}

/// POST /api/settings/sync-issues?limit=
pub async fn sync_issues(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<SyncReport>>> {
    let limit = checked_limit(query.limit, MAX_ISSUE_SYNC_LIMIT)?;
    Ok(sync_response(state.sync_issues(limit).await?))
}

/// POST /api/settings/sync-projects?limit=
pub async fn sync_projects(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<SyncReport>>> {
    let limit = checked_limit(query.limit, MAX_PROJECT_SYNC_LIMIT)?;
    Ok(sync_response(state.sync_projects(limit).await?))
}

/// POST /api/settings/sync-roadmap-data
pub async fn sync_roadmap_data(State(state): State<AppState>) -> Result<Json<ApiResponse<SyncReport>>> {
    Ok(sync_response(state.sync_roadmap().await?))
}
