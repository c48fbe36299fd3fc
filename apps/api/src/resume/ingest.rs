//! Resume ingestion — S3 fetch → PDF text extraction → new session.

use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::session::{SessionError, SessionStore};

/// Key prefix under which uploaded resumes live in the bucket.
const RESUME_PREFIX: &str = "resumes";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid file name '{0}'")]
    InvalidFileName(String),

    #[error("Object {0} not found")]
    ObjectNotFound(String),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Failed to extract PDF text: {0}")]
    Pdf(String),

    #[error("PDF contains no extractable text")]
    EmptyText,

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub file_name: String,
    pub file_size: String,
    pub file_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedResume {
    pub file_name: String,
    pub text_content: String,
    pub metadata: FileMetadata,
    pub session_id: String,
}

/// Rejects names that could escape the resume prefix.
pub fn validate_file_name(file_name: &str) -> Result<&str, IngestError> {
    let name = file_name.trim();
    let bad = name.is_empty()
        || name.starts_with('/')
        || name.contains('\\')
        || name.split('/').any(|part| part == ".." || part == "." || part.is_empty());
    if bad {
        Err(IngestError::InvalidFileName(file_name.to_string()))
    } else {
        Ok(name)
    }
}

pub fn format_file_size(bytes: usize) -> String {
    format!("{:.2} KB", bytes as f64 / 1024.0)
}

pub async fn fetch_resume_pdf(
    s3: &S3Client,
    bucket: &str,
    file_name: &str,
) -> Result<Bytes, IngestError> {
    let key = format!("{RESUME_PREFIX}/{file_name}");

    let output = s3
        .get_object()
        .bucket(bucket)
        .key(&key)
        .send()
        .await
        .map_err(|e| {
            if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                IngestError::ObjectNotFound(key.clone())
            } else {
                IngestError::S3(e.to_string())
            }
        })?;

    let body = output
        .body
        .collect()
        .await
        .map_err(|e| IngestError::S3(format!("Failed to read s3://{bucket}/{key}: {e}")))?;

    Ok(body.into_bytes())
}

pub fn extract_pdf_text(pdf: &[u8]) -> Result<String, IngestError> {
    let text = pdf_extract::extract_text_from_mem(pdf).map_err(|e| IngestError::Pdf(e.to_string()))?;
    if text.trim().is_empty() {
        return Err(IngestError::EmptyText);
    }
    Ok(text)
}

/// Runs `extract_pdf_text` on the blocking pool. A panic inside the parser surfaces
/// as `IngestError::Pdf` instead of unwinding through the handler.
pub async fn extract_pdf_text_blocking(pdf: Bytes) -> Result<String, IngestError> {
    parse_on_blocking_pool(pdf, extract_pdf_text).await
}

async fn parse_on_blocking_pool(
    pdf: Bytes,
    parse: fn(&[u8]) -> Result<String, IngestError>,
) -> Result<String, IngestError> {
    // CPU-bound parse — spawn_blocking to keep it off the async workers.
    tokio::task::spawn_blocking(move || parse(&pdf))
        .await
        .map_err(|e| IngestError::Pdf(format!("PDF extraction task failed: {e}")))?
}

/// Fetches `resumes/{file_name}`, extracts its text and opens a session for it.
pub async fn ingest_resume(
    s3: &S3Client,
    bucket: &str,
    sessions: &SessionStore,
    file_name: &str,
) -> Result<ParsedResume, IngestError> {
    let file_name = validate_file_name(file_name)?;
    let pdf = fetch_resume_pdf(s3, bucket, file_name).await?;
    let text_content = extract_pdf_text_blocking(pdf.clone()).await?;
    let session_id = sessions.create(text_content.clone(), None)?;

    info!(
        "Ingested resume {file_name} ({} bytes) into session {session_id}",
        pdf.len()
    );

    Ok(ParsedResume {
        file_name: file_name.to_string(),
        text_content,
        metadata: FileMetadata {
            file_name: file_name.to_string(),
            file_size: format_file_size(pdf.len()),
            file_type: "pdf".to_string(),
        },
        session_id,
    })
}
