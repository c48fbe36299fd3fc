//! Completion Gateway — the seam between the chat pipeline and a text-generation backend.
//!
//! `AppState` holds an `Arc<dyn CompletionGateway>`. Production uses `LlmClient`;
//! tests plug in scripted gateways.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::llm_client::{LlmClient, LlmError, MODEL};
use crate::prompt::PromptSpec;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Completion timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Completion failed: {0}")]
    Backend(String),
}

/// Executes an assembled prompt. Implementations own any transport retry;
/// callers never retry on their behalf.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(&self, prompt: &PromptSpec) -> Result<String, CompletionError>;
}

#[async_trait]
impl CompletionGateway for LlmClient {
    async fn complete(&self, prompt: &PromptSpec) -> Result<String, CompletionError> {
        debug!(
            "Calling {MODEL} in {} mode with {} prior turn(s)",
            prompt.mode(),
            prompt.history().len()
        );
        let text = self
            .call_text(prompt.system(), prompt.history(), prompt.question())
            .await?;
        Ok(text)
    }
}

/// Runs the gateway under a deadline. Dropping the returned future cancels the call.
pub async fn complete_with_timeout(
    gateway: &dyn CompletionGateway,
    prompt: &PromptSpec,
    timeout: Duration,
) -> Result<String, CompletionError> {
    tokio::time::timeout(timeout, gateway.complete(prompt))
        .await
        .map_err(|_| CompletionError::Timeout(timeout))?
}
