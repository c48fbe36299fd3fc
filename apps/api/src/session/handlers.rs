use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;
use crate::session::{ResumeMetadata, SessionView};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InitRequest {
    pub resume_text: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct InitResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub available_sessions: Vec<String>,
    pub total_sessions: usize,
}

fn validate_metadata(raw: Value) -> Result<ResumeMetadata, AppError> {
    ResumeMetadata::from_value(raw).map_err(|e| AppError::Validation(e.to_string()))
}

/// POST /session/init
pub async fn handle_init_session(
    State(state): State<AppState>,
    Json(req): Json<InitRequest>,
) -> Result<Json<InitResponse>, AppError> {
    let metadata = req.metadata.map(validate_metadata).transpose()?;
    let session_id = state.sessions.create(req.resume_text, metadata)?;
    Ok(Json(InitResponse { session_id }))
}

/// GET /session/list
pub async fn handle_list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    let available_sessions = state.sessions.ids();
    Json(SessionListResponse {
        total_sessions: available_sessions.len(),
        available_sessions,
    })
}

/// GET /session/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.get_or_create(&id).await?;
    Ok(Json(session.view().await))
}

/// PUT /session/:id/metadata
pub async fn handle_set_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(raw): Json<Value>,
) -> Result<StatusCode, AppError> {
    let metadata = validate_metadata(raw)?;
    state.sessions.set_metadata(&id, metadata).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /session/:id
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.sessions.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Session {id} not found")))
    }
}
