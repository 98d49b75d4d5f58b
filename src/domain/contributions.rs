//! Contribution domain - metadata rows for uploaded videos
//!
//! The upload orchestrator and moderation only see the `ContributionRepo`
//! trait; `PostgrestContributions` is the production implementation.

use async_trait::async_trait;

use crate::models::{Contribution, NewContribution, PendingRow};
use crate::services::db::Postgrest;
use crate::services::error::BackendError;
use crate::services::session::AuthSession;

#[async_trait]
pub trait ContributionRepo: Send + Sync {
    async fn insert(
        &self,
        session: &AuthSession,
        row: &NewContribution,
    ) -> Result<Contribution, BackendError>;

    /// Unapproved rows with their word, newest first
    async fn pending(&self, session: &AuthSession) -> Result<Vec<PendingRow>, BackendError>;

    /// Set `is_approved = true`. Approving twice is not an error.
    async fn approve(&self, session: &AuthSession, id: i64) -> Result<(), BackendError>;

    /// Storage path of a row, `None` when the row does not exist
    async fn video_path(&self, session: &AuthSession, id: i64)
    -> Result<Option<String>, BackendError>;

    /// Delete a row; deleting a missing row is not an error
    async fn delete(&self, session: &AuthSession, id: i64) -> Result<(), BackendError>;
}

#[derive(Clone)]
pub struct PostgrestContributions {
    db: Postgrest,
}

impl PostgrestContributions {
    pub fn new(db: Postgrest) -> Self {
        Self { db }
    }
}

#[derive(serde::Deserialize)]
struct PathRow {
    video_url: String,
}

#[async_trait]
impl ContributionRepo for PostgrestContributions {
    async fn insert(
        &self,
        session: &AuthSession,
        row: &NewContribution,
    ) -> Result<Contribution, BackendError> {
        self.db.from("contributions").auth(session).insert(row).await
    }

    async fn pending(&self, session: &AuthSession) -> Result<Vec<PendingRow>, BackendError> {
        self.db
            .from("contributions")
            .select("id,video_url,created_at,words(text)")
            .eq("is_approved", false)
            .order("created_at", false)
            .auth(session)
            .fetch()
            .await
    }

    async fn approve(&self, session: &AuthSession, id: i64) -> Result<(), BackendError> {
        let touched = self
            .db
            .from("contributions")
            .eq("id", id)
            .auth(session)
            .update(&serde_json::json!({ "is_approved": true }))
            .await?;
        if touched == 0 {
            tracing::debug!("Approve matched no row for contribution {}", id);
        }
        Ok(())
    }

    async fn video_path(
        &self,
        session: &AuthSession,
        id: i64,
    ) -> Result<Option<String>, BackendError> {
        let row: Option<PathRow> = self
            .db
            .from("contributions")
            .select("video_url")
            .eq("id", id)
            .auth(session)
            .fetch_optional()
            .await?;
        Ok(row.map(|r| r.video_url))
    }

    async fn delete(&self, session: &AuthSession, id: i64) -> Result<(), BackendError> {
        self.db
            .from("contributions")
            .eq("id", id)
            .auth(session)
            .delete()
            .await?;
        Ok(())
    }
}
