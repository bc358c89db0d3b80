//! Route handlers.

use axum::extract::{Path, State};
use axum::Json;
use rearm_core::types::ScheduledEvent;
use rearm_skill::{RequestEnvelope, SkillResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub registered: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingResponse {
    pub user_id: String,
    /// Four-digit code the user reads out to link their account.
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub user_ids: Vec<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// POST /v1/skill - answer one voice request.
///
/// Handler failures are already turned into a spoken apology, so this
/// always answers 200 for a well-formed envelope.
pub async fn skill(
    State(state): State<AppState>,
    Json(envelope): Json<RequestEnvelope>,
) -> Result<Json<SkillResponse>, ApiError> {
    if envelope.user_id().trim().is_empty() {
        return Err(ApiError::BadRequest("session.user.userId is required".to_string()));
    }
    Ok(Json(state.skill.dispatch(&envelope).await))
}

/// GET /v1/credentials - every user with a credential record.
pub async fn list_credentials(
    State(state): State<AppState>,
) -> Result<Json<UsersResponse>, ApiError> {
    let user_ids = state.registrar.list_user_ids().await?;
    Ok(Json(UsersResponse { user_ids }))
}

/// POST /v1/credentials - store a refresh token.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let user_id = body.user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::BadRequest("user_id is required".to_string()));
    }
    state.registrar.complete(user_id, &body.token).await?;
    info!(user_id = %user_id, "Credential registered over HTTP");
    Ok(Json(RegisterResponse {
        user_id: user_id.to_string(),
        registered: true,
    }))
}

/// POST /v1/credentials/{user_id}/pending - issue a register code.
pub async fn begin_registration(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PendingResponse>, ApiError> {
    let code = state.registrar.begin(&user_id).await?;
    Ok(Json(PendingResponse { user_id, code }))
}

/// GET /v1/events/{user_id} - latest scheduling decision for a user.
pub async fn get_event(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ScheduledEvent>, ApiError> {
    state
        .store
        .get_event(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No event for user {}", user_id)))
}
