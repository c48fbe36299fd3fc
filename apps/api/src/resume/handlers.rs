use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::resume::ingest::{ingest_resume, ParsedResume};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ParseQuery {
    #[serde(alias = "fileName")]
    pub file_name: String,
}

#[derive(Debug, Serialize)]
pub struct ParseResumeResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub resume: ParsedResume,
}

/// GET /resume/parse?file_name=
///
/// Pulls the PDF from the resume bucket, extracts its text and opens a chat session for it.
pub async fn handle_parse_resume(
    State(state): State<AppState>,
    Query(query): Query<ParseQuery>,
) -> Result<Json<ParseResumeResponse>, AppError> {
    let resume = ingest_resume(
        &state.s3,
        &state.config.s3_bucket,
        &state.sessions,
        &query.file_name,
    )
    .await?;

    Ok(Json(ParseResumeResponse {
        status: "success",
        resume,
    }))
}
