//! Chat pipeline — resolves a session, assembles a prompt, runs the completion gateway
//! and records the turn.
//!
//! Flow: get_or_create → view → build prompt → gateway (under timeout) → append_turn.
//!
//! Session and prompt failures are returned as errors. Gateway failures are not: they
//! come back inside `ChatOutcome`/`ExtractionOutcome` so the caller can still answer
//! the user. A turn is appended only after the gateway succeeds, so a failed, timed-out
//! or cancelled call leaves the window untouched.

pub mod gateway;
pub mod handlers;

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::prompt::{build_chat_prompt, build_extraction_prompt};
use crate::session::{ResumeMetadata, SessionStore};
use gateway::{complete_with_timeout, CompletionGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Result of one chat turn. Always echoes the question.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub session_id: String,
    pub question: String,
    pub status: OutcomeStatus,
    pub answer: Option<String>,
    pub error: Option<String>,
}

/// Result of a metadata extraction run.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutcome {
    pub session_id: String,
    pub status: OutcomeStatus,
    pub metadata: Option<ResumeMetadata>,
    pub error: Option<String>,
}

/// Answers `question` against the session's resume and records the turn on success.
pub async fn converse(
    store: &SessionStore,
    gateway: &dyn CompletionGateway,
    session_id: &str,
    question: &str,
    timeout: Duration,
) -> Result<ChatOutcome, AppError> {
    let session = store.get_or_create(session_id).await?;
    let view = session.view().await;
    let prompt = build_chat_prompt(&view, question)?;

    match complete_with_timeout(gateway, &prompt, timeout).await {
        Ok(answer) => {
            if let Err(e) = store
                .append_turn(session_id, prompt.question(), answer.as_str())
                .await
            {
                // Session evicted while the model was answering.
                warn!("Turn for session {session_id} not recorded: {e}");
            }
            info!(
                "Session {session_id} answered ({} prior turns in prompt)",
                prompt.history().len()
            );
            Ok(ChatOutcome {
                session_id: session_id.to_string(),
                question: prompt.question().to_string(),
                status: OutcomeStatus::Success,
                answer: Some(answer),
                error: None,
            })
        }
        Err(e) => {
            warn!("Completion failed for session {session_id}: {e}");
            Ok(ChatOutcome {
                session_id: session_id.to_string(),
                question: prompt.question().to_string(),
                status: OutcomeStatus::Error,
                answer: None,
                error: Some(e.to_string()),
            })
        }
    }
}

/// Extracts contact details and skills from the session's resume and stores them.
pub async fn extract_metadata(
    store: &SessionStore,
    gateway: &dyn CompletionGateway,
    session_id: &str,
    timeout: Duration,
) -> Result<ExtractionOutcome, AppError> {
    let session = store.get_or_create(session_id).await?;
    let view = session.view().await;
    let prompt = build_extraction_prompt(&view)?;

    let failed = |error: String| ExtractionOutcome {
        session_id: session_id.to_string(),
        status: OutcomeStatus::Error,
        metadata: None,
        error: Some(error),
    };

    let raw = match complete_with_timeout(gateway, &prompt, timeout).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Metadata extraction failed for session {session_id}: {e}");
            return Ok(failed(e.to_string()));
        }
    };

    let metadata = match ResumeMetadata::from_model_output(&raw) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("Model returned invalid metadata for session {session_id}: {e}");
            return Ok(failed(format!("Model returned invalid metadata: {e}")));
        }
    };

    let missing = metadata.missing_keys();
    if !missing.is_empty() {
        info!("Extracted metadata for session {session_id} is missing: {missing:?}");
    }

    if let Err(e) = store.set_metadata(session_id, metadata.clone()).await {
        // Session evicted while the model was answering.
        warn!("Extracted metadata for session {session_id} not stored: {e}");
        return Ok(failed(format!("Metadata not stored: {e}")));
    }
    info!("Stored extracted metadata for session {session_id}");

    Ok(ExtractionOutcome {
        session_id: session_id.to_string(),
        status: OutcomeStatus::Success,
        metadata: Some(metadata),
        error: None,
    })
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::gateway::CompletionError;
    use super::testing::{EvictingGateway, ScriptedGateway, StalledGateway};
    use super::*;
    use crate::prompt::PromptMode;
    use crate::resume_store::InMemoryResumeStore;
    use crate::session::Turn;

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn make_store() -> SessionStore {
        let backing = InMemoryResumeStore::new().with_resume("u1", "10 years Go experience");
        SessionStore::new(Arc::new(backing), 2)
    }

    #[tokio::test]
    async fn test_successful_turn_is_recorded_and_fed_back() {
        let store = make_store();
        let gateway = ScriptedGateway::replying(vec![
            Ok("Go and Rust".to_string()),
            Ok("Ten years".to_string()),
        ]);

        let first = converse(&store, &gateway, "u1", "What languages?", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(first.status, OutcomeStatus::Success);
        assert_eq!(first.answer.as_deref(), Some("Go and Rust"));
        assert_eq!(first.question, "What languages?");

        converse(&store, &gateway, "u1", "How long?", TIMEOUT)
            .await
            .unwrap();

        let prompts = gateway.received();
        assert!(prompts[0].history().is_empty());
        assert_eq!(
            prompts[1].history(),
            &[Turn::new("What languages?", "Go and Rust")]
        );

        let session = store.get("u1").unwrap();
        assert_eq!(session.history().await.len(), 2);
    }

    #[tokio::test]
    async fn test_gateway_failure_is_captured_and_not_recorded() {
        let store = make_store();
        let gateway = ScriptedGateway::replying(vec![Err(CompletionError::Backend(
            "quota exceeded".to_string(),
        ))]);

        let outcome = converse(&store, &gateway, "u1", "What languages?", TIMEOUT)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert_eq!(outcome.question, "What languages?");
        assert!(outcome.answer.is_none());
        assert!(outcome.error.unwrap().contains("quota exceeded"));
        assert!(store.get("u1").unwrap().history().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_captured_and_not_recorded() {
        let store = make_store();

        let outcome = converse(&store, &StalledGateway, "u1", "What languages?", TIMEOUT)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(outcome.error.unwrap().contains("timed out"));
        assert!(store.get("u1").unwrap().history().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_turn_is_not_recorded() {
        let store = Arc::new(make_store());
        store.get_or_create("u1").await.unwrap();

        let task = {
            let store = store.clone();
            tokio::spawn(async move {
                converse(&store, &StalledGateway, "u1", "What languages?", TIMEOUT).await
            })
        };
        tokio::task::yield_now().await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert!(store.get("u1").unwrap().history().await.is_empty());
    }

    #[tokio::test]
    async fn test_session_removed_mid_turn_still_answers() {
        let store = Arc::new(make_store());
        let gateway = EvictingGateway {
            store: store.clone(),
            reply: "Go and Rust".to_string(),
        };

        let outcome = converse(&store, &gateway, "u1", "What languages?", TIMEOUT)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.answer.as_deref(), Some("Go and Rust"));
        assert!(store.get("u1").is_none());
    }

    #[tokio::test]
    async fn test_session_removed_mid_extraction_is_an_error_outcome() {
        let store = Arc::new(make_store());
        let gateway = EvictingGateway {
            store: store.clone(),
            reply: r#"{"name": "Ada"}"#.to_string(),
        };

        let outcome = extract_metadata(&store, &gateway, "u1", TIMEOUT)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(outcome.metadata.is_none());
        assert!(outcome.error.unwrap().contains("not stored"));
    }

    #[tokio::test]
    async fn test_unknown_session_is_an_error_not_an_outcome() {
        let store = make_store();
        let gateway = ScriptedGateway::default();

        let err = converse(&store, &gateway, "missing-id", "Hi", TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(gateway.received().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_extraction_stores_validated_metadata() {
        let store = make_store();
        let gateway = ScriptedGateway::replying(vec![Ok(r#"```json
            {"name": "Ada", "email": "ada@example.com", "phone": null,
             "address": "London", "skills": ["Go", "Rust"], "github": "ada"}
            ```"#
            .to_string())]);

        let outcome = extract_metadata(&store, &gateway, "u1", TIMEOUT)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Success);
        let stored = store.get("u1").unwrap().metadata().await;
        assert_eq!(Some(stored.clone()), outcome.metadata);
        assert_eq!(stored.name.as_deref(), Some("Ada"));
        assert_eq!(stored.skills, vec!["Go", "Rust"]);
        assert!(stored.extra.contains_key("github"));

        let prompts = gateway.received();
        assert_eq!(prompts[0].mode(), PromptMode::Extraction);
    }

    #[tokio::test]
    async fn test_extraction_rejects_prose_without_touching_metadata() {
        let store = make_store();
        let gateway =
            ScriptedGateway::replying(vec![Ok("The candidate is called Ada.".to_string())]);

        let outcome = extract_metadata(&store, &gateway, "u1", TIMEOUT)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(outcome.error.unwrap().starts_with("Model returned invalid metadata"));
        assert!(store.get("u1").unwrap().metadata().await.is_empty());
    }

    #[tokio::test]
    async fn test_extracted_metadata_reaches_chat_prompt() {
        let store = make_store();
        let gateway = ScriptedGateway::replying(vec![
            Ok(r#"{"name": "Ada", "skills": ["Go"]}"#.to_string()),
            Ok("Ada".to_string()),
        ]);

        extract_metadata(&store, &gateway, "u1", TIMEOUT)
            .await
            .unwrap();
        converse(&store, &gateway, "u1", "What is the name?", TIMEOUT)
            .await
            .unwrap();

        let prompts = gateway.received();
        assert!(prompts[1].system().contains("- Name: Ada"));
    }
}
