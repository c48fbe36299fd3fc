use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::models::resume::ResumeRow;
use crate::resume_store::{ResumeRecord, ResumeStore, StoreError};

/// Reads resumes from the `resumes` table. Newest row wins when a user has several.
#[derive(Clone)]
pub struct PgResumeStore {
    pool: PgPool,
}

impl PgResumeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResumeStore for PgResumeStore {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<ResumeRecord>, StoreError> {
        let row = sqlx::query_as::<_, ResumeRow>(
            "SELECT * FROM resumes WHERE user_id = $1 ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        debug!(
            "Resume lookup for user {user_id}: {}",
            if row.is_some() { "hit" } else { "miss" }
        );

        Ok(row.map(|row| ResumeRecord {
            raw_text: row.raw_text,
        }))
    }
}

/// Connectivity failures are reported as `Unavailable`; everything else stays a database error.
fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Database(other),
    }
}
