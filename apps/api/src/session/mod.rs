//! Per-conversation state: resume text, extracted metadata and a bounded turn history.

pub mod handlers;
pub mod metadata;
pub mod store;
pub mod window;

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::resume_store::StoreError;

pub use metadata::ResumeMetadata;
pub use store::SessionStore;
pub use window::{ConversationWindow, Turn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session {0} not found")]
    NotFound(String),

    #[error("Resume store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Resume text must not be empty")]
    InvalidResume,
}

/// Mutable half of a session. Only ever touched under the session's own lock.
#[derive(Debug)]
struct SessionState {
    metadata: ResumeMetadata,
    window: ConversationWindow,
}

/// A live session. `resume_text` never changes after construction; metadata and
/// history sit behind a per-session mutex so sessions never contend with each other.
#[derive(Debug)]
pub struct Session {
    id: String,
    resume_text: String,
    created_at: DateTime<Utc>,
    last_active_ms: AtomicI64,
    state: Mutex<SessionState>,
}

/// Point-in-time copy of a session, taken under one lock acquisition.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: String,
    pub resume_text: String,
    pub metadata: ResumeMetadata,
    pub history: Vec<Turn>,
    pub window_capacity: usize,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(
        id: String,
        resume_text: String,
        metadata: ResumeMetadata,
        window_capacity: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            resume_text,
            created_at: now,
            last_active_ms: AtomicI64::new(now.timestamp_millis()),
            state: Mutex::new(SessionState {
                metadata,
                window: ConversationWindow::new(window_capacity),
            }),
        }
    }

    pub fn last_active_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_active_ms.load(Ordering::Relaxed))
            .unwrap_or(self.created_at)
    }

    pub(crate) fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub async fn view(&self) -> SessionView {
        let state = self.state.lock().await;
        SessionView {
            id: self.id.clone(),
            resume_text: self.resume_text.clone(),
            metadata: state.metadata.clone(),
            history: state.window.snapshot(),
            window_capacity: state.window.capacity(),
            created_at: self.created_at,
        }
    }

    pub(crate) async fn replace_metadata(&self, metadata: ResumeMetadata) {
        self.state.lock().await.metadata = metadata;
        self.touch();
    }

    /// Returns the number of turns evicted to make room.
    pub(crate) async fn push_turn(&self, question: String, answer: String) -> usize {
        let evicted = self.state.lock().await.window.push(question, answer);
        self.touch();
        evicted
    }
}

#[cfg(test)]
impl Session {
    pub fn resume_text(&self) -> &str {
        &self.resume_text
    }

    pub async fn metadata(&self) -> ResumeMetadata {
        self.state.lock().await.metadata.clone()
    }

    pub async fn history(&self) -> Vec<Turn> {
        self.state.lock().await.window.snapshot()
    }
}
