//! Login passthrough against the tracker

use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub password: String,
}

/// POST /api/login
///
/// Valid only when the tracker accepts the same credentials
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ApiResponse<()>>> {
    if request.id.trim().is_empty() || request.password.is_empty() {
        return Err(AppError::InvalidRequest("id and password are required".into()));
    }

    if !state.tracker.login(request.id.trim(), &request.password).await? {
        return Err(AppError::Unauthorized("invalid id or password".into()));
    }

    info!(user = %request.id.trim(), "User logged in");
    Ok(Json(ApiResponse::ok("Login succeeded", ())))
}
