//! Axum route handlers for the chat pipeline.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::chat::{converse, extract_metadata, ChatOutcome, ExtractionOutcome};
use crate::errors::AppError;
use crate::prompt::{build_prompt, PromptMode, PromptSpec};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PromptPreviewQuery {
    pub mode: String,
    pub question: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

/// POST /session/chat
///
/// Gateway failures still produce a 200 with `status: "error"`; only session and
/// prompt problems become HTTP errors.
pub async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatOutcome>, AppError> {
    let outcome = converse(
        &state.sessions,
        state.gateway.as_ref(),
        &req.session_id,
        &req.message,
        state.config.completion_timeout,
    )
    .await?;
    Ok(Json(outcome))
}

/// POST /session/:id/metadata/extract
pub async fn handle_extract_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExtractionOutcome>, AppError> {
    let outcome = extract_metadata(
        &state.sessions,
        state.gateway.as_ref(),
        &id,
        state.config.completion_timeout,
    )
    .await?;
    Ok(Json(outcome))
}

/// GET /session/:id/prompt?mode=chat&question=
///
/// Returns the prompt that would be sent for this session without calling the model.
pub async fn handle_preview_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PromptPreviewQuery>,
) -> Result<Json<PromptSpec>, AppError> {
    let mode: PromptMode = query.mode.parse()?;
    let session = state.sessions.get_or_create(&id).await?;
    let view = session.view().await;
    let prompt = build_prompt(mode, &view, query.question.as_deref().unwrap_or_default())?;
    Ok(Json(prompt))
}
