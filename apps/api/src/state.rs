use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;

use crate::chat::gateway::CompletionGateway;
use crate::config::Config;
use crate::session::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// The one session table for this process. Built in `main`, cleared on shutdown.
    pub sessions: Arc<SessionStore>,
    /// Pluggable completion backend. Default: the Anthropic `LlmClient`.
    pub gateway: Arc<dyn CompletionGateway>,
    pub s3: S3Client,
    pub config: Config,
}
