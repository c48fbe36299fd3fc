pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::chat::handlers as chat;
use crate::resume::handlers as resume;
use crate::session::handlers as session;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Session API
        .route("/session/init", post(session::handle_init_session))
        .route("/session/list", get(session::handle_list_sessions))
        .route("/session/chat", post(chat::handle_chat))
        .route(
            "/session/:id",
            get(session::handle_get_session).delete(session::handle_delete_session),
        )
        .route("/session/:id/prompt", get(chat::handle_preview_prompt))
        .route("/session/:id/metadata", put(session::handle_set_metadata))
        .route(
            "/session/:id/metadata/extract",
            post(chat::handle_extract_metadata),
        )
        // Resume ingestion
        .route("/resume/parse", get(resume::handle_parse_resume))
        .with_state(state)
}
