//! Backing Resume Store — read-only source of truth for resume text, keyed by user id.
//!
//! `SessionStore` holds an `Arc<dyn ResumeStore>`. Production wires `PgResumeStore`;
//! tests use `InMemoryResumeStore`.

pub mod postgres;

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

pub use postgres::PgResumeStore;

/// The slice of a stored resume the session layer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeRecord {
    pub raw_text: String,
}

/// An I/O failure talking to the store. A clean miss is `Ok(None)`, never an error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("resume store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ResumeStore: Send + Sync {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<ResumeRecord>, StoreError>;
}

/// Map-backed store standing in for Postgres in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct InMemoryResumeStore {
    resumes: RwLock<HashMap<String, String>>,
}

#[cfg(test)]
impl InMemoryResumeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resume(self, user_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        self.insert(user_id, raw_text);
        self
    }

    pub fn insert(&self, user_id: impl Into<String>, raw_text: impl Into<String>) {
        self.resumes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(user_id.into(), raw_text.into());
    }
}

#[cfg(test)]
#[async_trait]
impl ResumeStore for InMemoryResumeStore {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<ResumeRecord>, StoreError> {
        let resumes = self
            .resumes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(resumes.get(user_id).map(|raw_text| ResumeRecord {
            raw_text: raw_text.clone(),
        }))
    }
}
