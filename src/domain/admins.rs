//! Admin domain - moderation membership

use crate::services::db::Postgrest;
use crate::services::error::BackendError;
use crate::services::session::AuthSession;

/// Whether the signed-in user has a row in `admins`
pub async fn is_admin(db: &Postgrest, session: &AuthSession) -> Result<bool, BackendError> {
    let row: Option<serde_json::Value> = db
        .from("admins")
        .select("user_id")
        .eq("user_id", session.user_id)
        .auth(session)
        .fetch_optional()
        .await?;
    Ok(row.is_some())
}
